//! The job resource submitted to the orchestration platform.

use k8s_openapi::api::core::v1::{Pod, PodSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use serde::{Deserialize, Serialize};

use crate::error::{LaunchError, Result};

/// API coordinates of the platform job resource.
pub const JOB_GROUP: &str = "launch.ci.dev";
pub const JOB_VERSION: &str = "v1";
pub const JOB_API_VERSION: &str = "launch.ci.dev/v1";
pub const JOB_KIND: &str = "LaunchJob";
pub const JOB_PLURAL: &str = "launchjobs";

/// Job type assigned to resolved templates.
pub const JOB_TYPE_PERIODIC: &str = "periodic";
/// State assigned to a freshly submitted job.
pub const STATE_TRIGGERED: &str = "triggered";

// Provenance annotations stamped onto submitted jobs.
pub const ANNOTATION_MODE: &str = "launch.ci.dev/mode";
pub const ANNOTATION_REQUESTED_BY: &str = "launch.ci.dev/requested-by";
pub const ANNOTATION_CHANNEL: &str = "launch.ci.dev/channel";
pub const ANNOTATION_WORKSPACE: &str = "launch.ci.dev/workspace";
pub const ANNOTATION_INSTALL_IMAGE: &str = "launch.ci.dev/install-image";
pub const ANNOTATION_UPGRADE_IMAGE: &str = "launch.ci.dev/upgrade-image";
pub const ANNOTATION_FROM_VERSION: &str = "launch.ci.dev/from-version";
pub const ANNOTATION_TO_VERSION: &str = "launch.ci.dev/to-version";
pub const ANNOTATION_JOB: &str = "job.launch.ci.dev/name";

// Discovery and classification labels.
pub const LABEL_LAUNCH: &str = "launch.ci.dev/launch";
pub const LABEL_VERIFY: &str = "launch.ci.dev/verify";
pub const LABEL_JOB_TYPE: &str = "job.launch.ci.dev/type";
pub const LABEL_JOB_NAME: &str = "job.launch.ci.dev/name";

/// A job resource as submitted to and reported by the platform.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JobResource {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    pub spec: JobResourceSpec,
    pub status: JobResourceStatus,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JobResourceSpec {
    /// Name of the job template this resource was resolved from.
    pub job: String,
    #[serde(rename = "type")]
    pub job_type: String,
    pub pod_spec: Option<PodSpec>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JobResourceStatus {
    pub state: String,
    /// Observation URL assigned by the platform once the job is scheduled.
    pub url: String,
    pub start_time: Option<Time>,
}

/// Find the interactive target's pod name by scanning unnamed containers for
/// a `--target=<name>` argument. Absence is a configuration failure, not a
/// default.
pub fn find_target_name(spec: Option<&PodSpec>) -> Result<String> {
    let spec = spec.ok_or_else(|| {
        LaunchError::Configuration("job has no pod spec, cannot find target pod name".to_string())
    })?;
    for container in &spec.containers {
        if !container.name.is_empty() {
            continue;
        }
        for arg in container.args.iter().flatten() {
            if let Some(name) = arg.strip_prefix("--target=") {
                if !name.is_empty() {
                    return Ok(name.to_string());
                }
            }
        }
    }
    Err(LaunchError::Configuration(
        "could not find argument --target=X in job pod spec to identify target pod name"
            .to_string(),
    ))
}

/// Exit code of the named container, if it has terminated.
pub fn container_exit_code(pod: &Pod, container_name: &str) -> Option<i32> {
    pod.status
        .as_ref()?
        .container_statuses
        .as_ref()?
        .iter()
        .find(|status| status.name == container_name)?
        .state
        .as_ref()?
        .terminated
        .as_ref()
        .map(|terminated| terminated.exit_code)
}

/// Whether the named container terminated cleanly.
pub fn container_succeeded(pod: &Pod, container_name: &str) -> bool {
    container_exit_code(pod, container_name) == Some(0)
}

/// Whether the pod has reached a terminal phase.
pub fn pod_terminal(pod: &Pod) -> bool {
    matches!(
        pod.status.as_ref().and_then(|status| status.phase.as_deref()),
        Some("Succeeded") | Some("Failed")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{
        Container, ContainerState, ContainerStateTerminated, ContainerStatus, PodStatus,
    };

    fn spec_with_args(name: &str, args: &[&str]) -> PodSpec {
        PodSpec {
            containers: vec![Container {
                name: name.to_string(),
                args: Some(args.iter().map(|a| a.to_string()).collect()),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    fn pod_with(phase: &str, container: Option<(&str, i32)>) -> Pod {
        Pod {
            status: Some(PodStatus {
                phase: Some(phase.to_string()),
                container_statuses: container.map(|(name, exit_code)| {
                    vec![ContainerStatus {
                        name: name.to_string(),
                        state: Some(ContainerState {
                            terminated: Some(ContainerStateTerminated {
                                exit_code,
                                ..Default::default()
                            }),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }]
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn target_found_in_unnamed_container() {
        let spec = spec_with_args("", &["--artifacts=/tmp", "--target=test"]);
        assert_eq!(find_target_name(Some(&spec)).unwrap(), "test");
    }

    #[test]
    fn named_containers_are_skipped() {
        let spec = spec_with_args("sidecar", &["--target=test"]);
        assert!(find_target_name(Some(&spec)).is_err());
    }

    #[test]
    fn empty_target_token_is_rejected() {
        let spec = spec_with_args("", &["--target="]);
        assert!(find_target_name(Some(&spec)).is_err());
    }

    #[test]
    fn missing_pod_spec_is_a_configuration_error() {
        let err = find_target_name(None).unwrap_err();
        assert!(err.to_string().contains("no pod spec"));
    }

    #[test]
    fn exit_codes_read_from_terminated_state() {
        let pod = pod_with("Running", Some(("setup", 0)));
        assert_eq!(container_exit_code(&pod, "setup"), Some(0));
        assert!(container_succeeded(&pod, "setup"));
        assert_eq!(container_exit_code(&pod, "teardown"), None);

        let failed = pod_with("Running", Some(("setup", 2)));
        assert!(!container_succeeded(&failed, "setup"));
    }

    #[test]
    fn terminal_phases() {
        assert!(pod_terminal(&pod_with("Succeeded", None)));
        assert!(pod_terminal(&pod_with("Failed", None)));
        assert!(!pod_terminal(&pod_with("Running", None)));
        assert!(!pod_terminal(&pod_with("Pending", None)));
    }
}
