use serde::{Deserialize, Serialize};

/// How a provisioned cluster will be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestMode {
    /// Stand up a cluster and hand the requester its credentials.
    Launch,
    /// Run the job to completion without an interactive target.
    Test,
}

impl RequestMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestMode::Launch => "launch",
            RequestMode::Test => "test",
        }
    }

    /// Whether the lifecycle continues past URL assignment into workload
    /// tracking and credential extraction.
    pub fn is_interactive(&self) -> bool {
        matches!(self, RequestMode::Launch)
    }
}

/// A request to stand up an ephemeral cluster, plus the output slots the
/// orchestrator fills in as the lifecycle progresses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterRequest {
    /// Unique name; doubles as the job resource name.
    pub name: String,
    /// Job template the cluster is provisioned from.
    pub template: String,
    pub mode: RequestMode,
    pub requested_by: String,
    /// Notification channel the front end delivers results to.
    pub channel: String,
    pub install_image: String,
    #[serde(default)]
    pub upgrade_image: Option<String>,
    #[serde(default)]
    pub install_version: Option<String>,
    #[serde(default)]
    pub upgrade_version: Option<String>,

    /// Observation URL reported by the platform. Written by the orchestrator.
    #[serde(default)]
    pub url: String,
    /// Credential artifact extracted from the workload. Written by the
    /// orchestrator; cleared again if the cluster never becomes reachable.
    #[serde(default)]
    pub credentials: String,
    /// Human-readable connection hint from the workload logs. Written by the
    /// orchestrator.
    #[serde(default)]
    pub connection_snippet: String,
}

impl ClusterRequest {
    /// A request carrying both credential outputs is done; re-invoking the
    /// orchestrator for it is a no-op.
    pub fn is_fulfilled(&self) -> bool {
        !self.credentials.is_empty() && !self.connection_snippet.is_empty()
    }

    /// The (latest, initial) release image pair for the job environment.
    /// When an upgrade image is present it becomes the latest image and the
    /// install image seeds the initial one.
    pub fn release_images(&self) -> (String, String) {
        match self.upgrade_image.as_deref().filter(|image| !image.is_empty()) {
            Some(upgrade) => (upgrade.to_string(), self.install_image.clone()),
            None => (self.install_image.clone(), String::new()),
        }
    }

    /// Version pair for upgrade verification, present only when both ends of
    /// the edge are known.
    pub fn verification_versions(&self) -> Option<(&str, &str)> {
        let from = self.install_version.as_deref().filter(|v| !v.is_empty())?;
        let to = self.upgrade_version.as_deref().filter(|v| !v.is_empty())?;
        Some((from, to))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ClusterRequest {
        ClusterRequest {
            name: "launch-abc123".to_string(),
            template: "launch-cluster".to_string(),
            mode: RequestMode::Launch,
            requested_by: "someone".to_string(),
            channel: "C123".to_string(),
            install_image: "registry/img:latest".to_string(),
            upgrade_image: None,
            install_version: None,
            upgrade_version: None,
            url: String::new(),
            credentials: String::new(),
            connection_snippet: String::new(),
        }
    }

    #[test]
    fn fulfilled_requires_both_outputs() {
        let mut req = request();
        assert!(!req.is_fulfilled());
        req.credentials = "kubeconfig".to_string();
        assert!(!req.is_fulfilled());
        req.connection_snippet = "Login as admin".to_string();
        assert!(req.is_fulfilled());
    }

    #[test]
    fn install_only_release_images() {
        let req = request();
        let (latest, initial) = req.release_images();
        assert_eq!(latest, "registry/img:latest");
        assert_eq!(initial, "");
    }

    #[test]
    fn upgrade_shifts_install_to_initial() {
        let mut req = request();
        req.upgrade_image = Some("registry/img:next".to_string());
        let (latest, initial) = req.release_images();
        assert_eq!(latest, "registry/img:next");
        assert_eq!(initial, "registry/img:latest");
    }

    #[test]
    fn verification_needs_both_versions() {
        let mut req = request();
        assert_eq!(req.verification_versions(), None);
        req.install_version = Some("4.1.0".to_string());
        assert_eq!(req.verification_versions(), None);
        req.upgrade_version = Some("4.2.0".to_string());
        assert_eq!(req.verification_versions(), Some(("4.1.0", "4.2.0")));
    }
}
