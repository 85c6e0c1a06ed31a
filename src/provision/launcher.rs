//! Sequencing of the provisioning lifecycle.

use std::sync::Arc;

use k8s_openapi::api::core::v1::Pod;
use tracing::{info, warn};

use crate::config::LauncherConfig;
use crate::error::{LaunchError, PlatformError, Result};
use crate::platform::kubernetes::{KubeClusterProbe, KubeExec, KubeJobApi, KubeLogs, KubePodApi};
use crate::platform::{ClusterProbe, JobResourceApi, PodApi, PodLogs, RemoteExec};
use crate::provision::credentials::retrieve_credentials;
use crate::provision::hash::workspace_hash;
use crate::provision::job::{
    container_exit_code, find_target_name, pod_terminal, ANNOTATION_CHANNEL,
};
use crate::provision::poll::{poll_until_state, Readiness};
use crate::provision::reachability::wait_for_cluster_reachable;
use crate::provision::request::ClusterRequest;
use crate::provision::snippet::extract_snippet;
use crate::provision::template::{job_for_template, override_job_environment, stamp_job, JobCatalogSource};

/// Whether a stage has observed its pod at least once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PodPresence {
    NotSeen,
    Seen,
}

/// Drives provisioning requests through the platform.
pub struct ClusterLauncher {
    config: LauncherConfig,
    catalog: Arc<dyn JobCatalogSource>,
    jobs: Arc<dyn JobResourceApi>,
    pods: Arc<dyn PodApi>,
    exec: Arc<dyn RemoteExec>,
    logs: Arc<dyn PodLogs>,
    probe: Arc<dyn ClusterProbe>,
}

impl ClusterLauncher {
    pub fn new(
        config: LauncherConfig,
        catalog: Arc<dyn JobCatalogSource>,
        jobs: Arc<dyn JobResourceApi>,
        pods: Arc<dyn PodApi>,
        exec: Arc<dyn RemoteExec>,
        logs: Arc<dyn PodLogs>,
        probe: Arc<dyn ClusterProbe>,
    ) -> Self {
        Self {
            config,
            catalog,
            jobs,
            pods,
            exec,
            logs,
            probe,
        }
    }

    /// Wire the launcher to a Kubernetes-backed platform through one shared
    /// client.
    pub fn with_kubernetes(
        client: kube::Client,
        config: LauncherConfig,
        catalog: Arc<dyn JobCatalogSource>,
    ) -> Self {
        let probe = Arc::new(KubeClusterProbe::new(
            config.probe_namespace.clone(),
            config.probe_client_timeout,
        ));
        let jobs = Arc::new(KubeJobApi::new(client.clone(), &config.control_namespace));
        Self::new(
            config,
            catalog,
            jobs,
            Arc::new(KubePodApi::new(client.clone())),
            Arc::new(KubeExec::new(client.clone())),
            Arc::new(KubeLogs::new(client)),
            probe,
        )
    }

    /// The workspace namespace derived from a request name.
    pub fn workspace_for(&self, request_name: &str) -> String {
        format!(
            "{}{}",
            self.config.workspace_prefix,
            workspace_hash([request_name])
        )
    }

    /// Drive the full provisioning lifecycle for the request.
    ///
    /// Long running but re-entrant: a fulfilled request returns immediately,
    /// and submission tolerates resources left behind by an earlier attempt,
    /// so a crashed run can simply be invoked again.
    pub async fn launch(&self, request: &mut ClusterRequest) -> Result<()> {
        if request.is_fulfilled() {
            return Ok(());
        }

        let workspace = self.workspace_for(&request.name);

        let mut job = job_for_template(self.catalog.as_ref(), &request.template)?;
        let target_pod = find_target_name(job.spec.pod_spec.as_ref())?;

        stamp_job(&mut job, request, &workspace, &self.config.control_namespace);
        let (latest, initial) = request.release_images();
        if let Some(spec) = job.spec.pod_spec.as_mut() {
            override_job_environment(spec, &latest, &initial, &workspace);
        }

        match self.jobs.create(&job).await {
            Ok(()) => {}
            // a previous run of this request already submitted the job
            Err(PlatformError::AlreadyExists) => {}
            Err(err) => return Err(LaunchError::Submission(err.to_string())),
        }
        info!(
            "job {} launched to target workspace {}",
            request.name, workspace
        );

        request.url = self.await_job_url(&request.name).await?;

        if !request.mode.is_interactive() {
            return Ok(());
        }

        self.await_workload_visible(&request.name).await?;

        info!(
            "waiting for setup container in pod {}/{} to complete",
            workspace, target_pod
        );
        self.await_setup_complete(&workspace, &target_pod).await?;

        info!(
            "retrieving credentials from pod {}/{}",
            workspace, target_pod
        );
        request.credentials = retrieve_credentials(
            self.exec.as_ref(),
            self.pods.as_ref(),
            &workspace,
            &target_pod,
            &self.config.login_container,
            &self.config.credential_path,
            self.config.credential_poll,
        )
        .await?;

        let mut run_error = None;
        if let Err(err) = wait_for_cluster_reachable(
            self.probe.as_ref(),
            &request.credentials,
            self.config.reachability_poll,
        )
        .await
        {
            // never hand out credentials for a cluster that does not answer
            warn!("unable to wait for the cluster to start: {}", err);
            request.credentials = String::new();
            run_error = Some(err);
        }

        request.connection_snippet = extract_snippet(
            self.logs.as_ref(),
            &workspace,
            &target_pod,
            &self.config.setup_container,
            self.config.snippet_tail_lines,
        )
        .await;

        // clear the channel notification in case we crash so we don't
        // attempt to redeliver
        if let Err(err) = self
            .jobs
            .patch_annotation(&request.name, ANNOTATION_CHANNEL, "")
            .await
        {
            warn!("unable to clear channel annotation from job: {}", err);
        }

        match run_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Wait for the platform to assign the job its observation URL.
    async fn await_job_url(&self, name: &str) -> Result<String> {
        let settings = self.config.url_poll;
        poll_until_state(
            settings.interval,
            settings.timeout,
            String::new(),
            move |url| async move {
                match self.jobs.get(name).await {
                    Ok(job) if !job.status.url.is_empty() => (job.status.url, Ok(Readiness::Ready)),
                    Ok(_) => (url, Ok(Readiness::NotReady)),
                    Err(err) => (url, Err(err.into())),
                }
            },
        )
        .await
        .map_err(|err| err.into_stage_error(LaunchError::UrlUnavailable))
    }

    /// Wait for the job's own pod to show up in the control namespace.
    async fn await_workload_visible(&self, name: &str) -> Result<()> {
        let settings = self.config.workload_poll;
        poll_until_state(
            settings.interval,
            settings.timeout,
            PodPresence::NotSeen,
            move |presence| async move {
                let outcome = self.pods.get(&self.config.control_namespace, name).await;
                admit_workload(presence, outcome)
            },
        )
        .await
        .map(|_| ())
        .map_err(|err| err.into_stage_error(LaunchError::LaunchCheck))
    }

    /// Wait for the setup container of the target pod to terminate cleanly.
    async fn await_setup_complete(&self, workspace: &str, pod: &str) -> Result<()> {
        let settings = self.config.setup_poll;
        poll_until_state(
            settings.interval,
            settings.timeout,
            PodPresence::NotSeen,
            move |presence| async move {
                let outcome = self.pods.get(workspace, pod).await;
                admit_setup(presence, outcome, &self.config.setup_container)
            },
        )
        .await
        .map(|_| ())
        .map_err(|err| err.into_stage_error(LaunchError::PodUnavailable))
    }
}

/// Assess one observation of the workload pod. Ready as soon as the pod is
/// present and not terminal; a pod that disappears after being seen was
/// deleted out from under us.
fn admit_workload(
    presence: PodPresence,
    outcome: std::result::Result<Pod, PlatformError>,
) -> (PodPresence, Result<Readiness>) {
    match outcome {
        Err(PlatformError::NotFound) => match presence {
            PodPresence::Seen => (presence, Err(LaunchError::PodDeleted)),
            PodPresence::NotSeen => (presence, Ok(Readiness::NotReady)),
        },
        Err(err) => (presence, Err(err.into())),
        Ok(pod) => {
            if pod_terminal(&pod) {
                (PodPresence::Seen, Err(LaunchError::PodExited))
            } else {
                (PodPresence::Seen, Ok(Readiness::Ready))
            }
        }
    }
}

/// Assess one observation of the target pod's setup container. The pod may
/// not exist yet, and the workspace may not even admit us yet, so both
/// not-found and forbidden count as not-ready until the pod has been seen.
fn admit_setup(
    presence: PodPresence,
    outcome: std::result::Result<Pod, PlatformError>,
    setup_container: &str,
) -> (PodPresence, Result<Readiness>) {
    match outcome {
        Err(PlatformError::NotFound) | Err(PlatformError::Forbidden) => match presence {
            PodPresence::Seen => (presence, Err(LaunchError::PodDeleted)),
            PodPresence::NotSeen => (presence, Ok(Readiness::NotReady)),
        },
        Err(err) => (presence, Err(err.into())),
        Ok(pod) => {
            if pod_terminal(&pod) {
                return (PodPresence::Seen, Err(LaunchError::PodExited));
            }
            match container_exit_code(&pod, setup_container) {
                Some(0) => (PodPresence::Seen, Ok(Readiness::Ready)),
                Some(code) => (
                    PodPresence::Seen,
                    Ok(Readiness::Stalled(format!(
                        "setup container terminated with exit code {}",
                        code
                    ))),
                ),
                None => (PodPresence::Seen, Ok(Readiness::NotReady)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{
        ContainerState, ContainerStateTerminated, ContainerStatus, PodStatus,
    };

    fn pod(phase: &str, setup_exit: Option<i32>) -> Pod {
        Pod {
            status: Some(PodStatus {
                phase: Some(phase.to_string()),
                container_statuses: setup_exit.map(|exit_code| {
                    vec![ContainerStatus {
                        name: "setup".to_string(),
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
    fn workload_not_found_before_seen_retries() {
        let (presence, outcome) =
            admit_workload(PodPresence::NotSeen, Err(PlatformError::NotFound));
        assert_eq!(presence, PodPresence::NotSeen);
        assert!(matches!(outcome, Ok(Readiness::NotReady)));
    }

    #[test]
    fn workload_not_found_after_seen_is_deleted() {
        let (_, outcome) = admit_workload(PodPresence::Seen, Err(PlatformError::NotFound));
        assert!(matches!(outcome, Err(LaunchError::PodDeleted)));
    }

    #[test]
    fn workload_terminal_phase_has_exited() {
        let (_, outcome) = admit_workload(PodPresence::NotSeen, Ok(pod("Succeeded", None)));
        assert!(matches!(outcome, Err(LaunchError::PodExited)));
    }

    #[test]
    fn workload_running_pod_is_ready() {
        let (presence, outcome) = admit_workload(PodPresence::NotSeen, Ok(pod("Running", None)));
        assert_eq!(presence, PodPresence::Seen);
        assert!(matches!(outcome, Ok(Readiness::Ready)));
    }

    #[test]
    fn workload_other_errors_abort() {
        let (_, outcome) = admit_workload(
            PodPresence::NotSeen,
            Err(PlatformError::Api("boom".to_string())),
        );
        assert!(matches!(outcome, Err(LaunchError::Platform(_))));
    }

    #[test]
    fn setup_tolerates_forbidden_until_seen() {
        let (presence, outcome) = admit_setup(
            PodPresence::NotSeen,
            Err(PlatformError::Forbidden),
            "setup",
        );
        assert_eq!(presence, PodPresence::NotSeen);
        assert!(matches!(outcome, Ok(Readiness::NotReady)));

        let (_, outcome) = admit_setup(PodPresence::Seen, Err(PlatformError::Forbidden), "setup");
        assert!(matches!(outcome, Err(LaunchError::PodDeleted)));
    }

    #[test]
    fn setup_completes_on_clean_exit() {
        let (_, outcome) = admit_setup(PodPresence::NotSeen, Ok(pod("Running", Some(0))), "setup");
        assert!(matches!(outcome, Ok(Readiness::Ready)));
    }

    #[test]
    fn setup_failure_stalls_with_exit_code() {
        let (_, outcome) = admit_setup(PodPresence::NotSeen, Ok(pod("Running", Some(1))), "setup");
        match outcome {
            Ok(Readiness::Stalled(reason)) => {
                assert_eq!(reason, "setup container terminated with exit code 1");
            }
            other => panic!("expected stalled, got {:?}", other),
        }
    }

    #[test]
    fn setup_waits_while_container_runs() {
        let (_, outcome) = admit_setup(PodPresence::NotSeen, Ok(pod("Running", None)), "setup");
        assert!(matches!(outcome, Ok(Readiness::NotReady)));
    }

    #[test]
    fn setup_terminal_pod_has_exited() {
        let (_, outcome) = admit_setup(PodPresence::NotSeen, Ok(pod("Failed", Some(1))), "setup");
        assert!(matches!(outcome, Err(LaunchError::PodExited)));
    }
}
