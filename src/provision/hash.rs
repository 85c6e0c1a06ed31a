//! Short, resource-name-safe identifiers for ephemeral workspaces.

use sha2::{Digest, Sha256};

/// Reduced 32-symbol alphabet for names that are safe as resource names and
/// hard to misread (no vowels beyond i/y, so no accidental words either).
const WORKSPACE_ALPHABET: &[u8; 32] = b"bcdfghijklmnpqrstvwxyz0123456789";

/// Derive a short deterministic identifier from the given inputs.
///
/// The inputs are hashed together and the digest truncated to its first four
/// bytes before encoding. Truncation raises the collision odds, but the
/// practical input space is tiny and short readable names win.
pub fn workspace_hash<I, S>(values: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut hasher = Sha256::new();
    for value in values {
        hasher.update(value.as_ref().as_bytes());
    }
    let digest = hasher.finalize();
    encode_no_pad(&digest[..4])
}

/// Base32 over the reduced alphabet, most-significant bits first, final
/// partial group zero-filled on the right, no padding.
fn encode_no_pad(bytes: &[u8]) -> String {
    let mut out = String::with_capacity((bytes.len() * 8 + 4) / 5);
    let mut acc: u32 = 0;
    let mut bits: u32 = 0;
    for &byte in bytes {
        acc = (acc << 8) | u32::from(byte);
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(WORKSPACE_ALPHABET[((acc >> bits) & 0x1f) as usize] as char);
        }
    }
    if bits > 0 {
        out.push(WORKSPACE_ALPHABET[((acc << (5 - bits)) & 0x1f) as usize] as char);
    }
    out
}
