//! Extraction of the credential artifact from the running workload.

use tracing::warn;

use crate::config::PollSettings;
use crate::error::{LaunchError, PlatformError, Result};
use crate::platform::{PodApi, RemoteExec};
use crate::provision::job::pod_terminal;
use crate::provision::poll::{poll_until_state, Readiness};

/// Poll a read command inside the login container until it yields the
/// credential artifact.
///
/// A missing container means the target simply has not started yet and is
/// retried, unless the pod itself is gone or terminal, which means the
/// cluster is never coming up. Any other execution failure is logged and
/// retried until the stage deadline.
pub async fn retrieve_credentials(
    exec: &dyn RemoteExec,
    pods: &dyn PodApi,
    namespace: &str,
    pod: &str,
    container: &str,
    credential_path: &str,
    settings: PollSettings,
) -> Result<String> {
    let command = vec!["cat".to_string(), credential_path.to_string()];
    let contents = poll_until_state(
        settings.interval,
        settings.timeout,
        String::new(),
        move |held| {
            let command = command.clone();
            async move {
                match exec.exec(namespace, pod, container, &command).await {
                    Ok(output) if !output.is_empty() => (output, Ok(Readiness::Ready)),
                    Ok(_) => (held, Ok(Readiness::NotReady)),
                    Err(PlatformError::ContainerNotFound) => {
                        // the target container may not have started yet; make
                        // sure the pod itself is still on its way
                        match pods.get(namespace, pod).await {
                            Err(PlatformError::NotFound) => (held, Err(LaunchError::PodGone)),
                            Ok(observed) if pod_terminal(&observed) => {
                                (held, Err(LaunchError::PodGone))
                            }
                            _ => (held, Ok(Readiness::NotReady)),
                        }
                    }
                    Err(err) => {
                        warn!("unable to retrieve credential contents: {}", err);
                        (held, Ok(Readiness::Stalled(err.to_string())))
                    }
                }
            }
        },
    )
    .await
    .map_err(|err| err.into_stage_error(LaunchError::CredentialRetrieval))?;
    Ok(contents)
}
