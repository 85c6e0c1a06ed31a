//! Confirmation that the provisioned cluster answers its own API.

use tracing::debug;

use crate::config::PollSettings;
use crate::error::{LaunchError, PlatformError, Result};
use crate::platform::ClusterProbe;
use crate::provision::poll::{poll_until, Readiness};

/// Slow-poll the cluster described by the credential artifact until one
/// probe succeeds or the stage deadline passes. A malformed artifact fails
/// immediately; everything else is retried.
pub async fn wait_for_cluster_reachable(
    probe: &dyn ClusterProbe,
    kubeconfig: &str,
    settings: PollSettings,
) -> Result<()> {
    poll_until(settings.interval, settings.timeout, move || async move {
        match probe.check(kubeconfig).await {
            Ok(()) => Ok(Readiness::Ready),
            Err(err @ PlatformError::InvalidCredentials(_)) => Err(LaunchError::from(err)),
            Err(err) => {
                debug!("cluster is not yet reachable: {}", err);
                Ok(Readiness::NotReady)
            }
        }
    })
    .await
    .map_err(|err| err.into_stage_error(LaunchError::Unreachable))
}
