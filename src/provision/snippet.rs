//! Human-readable connection hints pulled from workload logs.

use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use crate::platform::PodLogs;

/// Decorated log lines like `level=info msg="..."` reduce to their quoted
/// message; anything else passes through unchanged.
static DECORATED_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?m)^level=info msg="(.*)"$"#).expect("snippet regex is valid"));

/// Strip logging decoration from a raw log tail.
pub fn connection_snippet(raw: &str) -> String {
    DECORATED_LINE.replace_all(raw, "$1").into_owned()
}

/// Fetch the tail of the setup container's log and rewrite it into a
/// connection hint. Failures are logged and produce an empty snippet.
pub async fn extract_snippet(
    logs: &dyn PodLogs,
    namespace: &str,
    pod: &str,
    container: &str,
    lines: i64,
) -> String {
    match logs.tail(namespace, pod, container, lines).await {
        Ok(raw) => connection_snippet(&raw),
        Err(err) => {
            warn!("unable to get {} logs: {}", container, err);
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decoration_is_stripped() {
        assert_eq!(
            connection_snippet(r#"level=info msg="Login to cluster as ...""#),
            "Login to cluster as ..."
        );
    }

    #[test]
    fn plain_lines_pass_through() {
        assert_eq!(connection_snippet("no decoration here"), "no decoration here");
    }

    #[test]
    fn mixed_tail_rewrites_only_decorated_lines() {
        let raw = "level=info msg=\"Access the web console at https://console\"\nraw trailing line";
        assert_eq!(
            connection_snippet(raw),
            "Access the web console at https://console\nraw trailing line"
        );
    }

    #[test]
    fn other_levels_are_left_alone() {
        let raw = r#"level=error msg="something broke""#;
        assert_eq!(connection_snippet(raw), raw);
    }
}
