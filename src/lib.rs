//! cluster-launch - ephemeral cluster provisioning over a job platform
//!
//! This library drives an external job-orchestration platform through the
//! multi-stage lifecycle that stands up a short-lived cluster on behalf of a
//! requester: submit the job, wait for its reported URL, wait for the
//! workload to come up, pull connection credentials out of the running
//! container, confirm the cluster answers, and extract a human-readable
//! connection snippet from its logs.

pub mod config;
pub mod error;
pub mod platform;
pub mod provision;

// Re-export commonly used types
pub use config::{LauncherConfig, PollSettings};
pub use error::{LaunchError, PlatformError, Result};
pub use provision::launcher::ClusterLauncher;
pub use provision::request::{ClusterRequest, RequestMode};
