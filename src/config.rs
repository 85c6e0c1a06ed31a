use std::time::Duration;

/// Poll interval and overall deadline for one provisioning stage.
#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollSettings {
    pub const fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

/// Tuning for the provisioning lifecycle.
///
/// The defaults carry the canonical stage timings; override individual
/// stages when embedding the launcher in an environment with different
/// scheduling latency.
#[derive(Debug, Clone)]
pub struct LauncherConfig {
    /// Namespace the job resources are created in.
    pub control_namespace: String,
    /// Prefix prepended to the hashed workspace identifier.
    pub workspace_prefix: String,
    /// Container the credential artifact is read from.
    pub login_container: String,
    /// Container whose termination marks setup as complete.
    pub setup_container: String,
    /// Path of the credential artifact inside the login container.
    pub credential_path: String,
    /// Namespace fetched from the provisioned cluster to confirm it answers.
    pub probe_namespace: String,
    /// How many log lines feed the connection snippet.
    pub snippet_tail_lines: i64,
    pub url_poll: PollSettings,
    pub workload_poll: PollSettings,
    pub setup_poll: PollSettings,
    pub credential_poll: PollSettings,
    pub reachability_poll: PollSettings,
    /// Per-request timeout for clients built from retrieved credentials.
    pub probe_client_timeout: Duration,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            control_namespace: "ci".to_string(),
            workspace_prefix: "ci-ln-".to_string(),
            login_container: "test".to_string(),
            setup_container: "setup".to_string(),
            credential_path: "/tmp/admin.kubeconfig".to_string(),
            probe_namespace: "openshift-apiserver".to_string(),
            snippet_tail_lines: 2,
            url_poll: PollSettings::new(Duration::from_secs(10), Duration::from_secs(15 * 60)),
            workload_poll: PollSettings::new(Duration::from_secs(5), Duration::from_secs(15 * 60)),
            setup_poll: PollSettings::new(Duration::from_secs(5), Duration::from_secs(45 * 60)),
            credential_poll: PollSettings::new(Duration::from_secs(30), Duration::from_secs(10 * 60)),
            reachability_poll: PollSettings::new(Duration::from_secs(15), Duration::from_secs(20 * 60)),
            probe_client_timeout: Duration::from_secs(15),
        }
    }
}

impl LauncherConfig {
    /// Build a configuration from the environment, keeping defaults for
    /// anything unset.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(namespace) = std::env::var("LAUNCH_CONTROL_NAMESPACE") {
            config.control_namespace = namespace;
        }
        if let Ok(prefix) = std::env::var("LAUNCH_WORKSPACE_PREFIX") {
            config.workspace_prefix = prefix;
        }
        if let Ok(path) = std::env::var("LAUNCH_CREDENTIAL_PATH") {
            config.credential_path = path;
        }
        if let Ok(namespace) = std::env::var("LAUNCH_PROBE_NAMESPACE") {
            config.probe_namespace = namespace;
        }
        config
    }
}
