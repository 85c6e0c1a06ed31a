//! Bounded condition polling shared by every provisioning stage.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::error::LaunchError;

/// Outcome of a single poll attempt.
#[derive(Debug)]
pub enum Readiness {
    /// The stage condition is satisfied.
    Ready,
    /// Not there yet; check again after the interval.
    NotReady,
    /// Not there yet, with a reason worth surfacing if the stage never
    /// becomes ready.
    Stalled(String),
}

/// Why a poll run stopped without the condition becoming ready.
#[derive(thiserror::Error, Debug)]
pub enum PollError {
    #[error("timed out after {:?}", .timeout)]
    TimedOut {
        timeout: Duration,
        /// Most recent stalled reason, if any attempt reported one.
        last_reason: Option<String>,
    },

    #[error(transparent)]
    Failed(#[from] LaunchError),
}

impl PollError {
    /// The most specific description available: a recorded stall reason
    /// beats the generic timeout text.
    pub fn into_message(self) -> String {
        match self {
            PollError::TimedOut {
                last_reason: Some(reason),
                ..
            } => reason,
            other => other.to_string(),
        }
    }

    /// Fold into the enclosing stage's error variant.
    pub fn into_stage_error(self, wrap: impl FnOnce(String) -> LaunchError) -> LaunchError {
        wrap(self.into_message())
    }
}

/// Poll `check` until it reports ready, fails, or the deadline passes.
///
/// The first check runs immediately; later ones are spaced by `interval`.
/// Stage state is threaded through by value so each attempt is a pure
/// function of the current observation and the prior state.
pub async fn poll_until_state<S, F, Fut>(
    interval: Duration,
    timeout: Duration,
    mut state: S,
    mut check: F,
) -> Result<S, PollError>
where
    F: FnMut(S) -> Fut,
    Fut: Future<Output = (S, Result<Readiness, LaunchError>)>,
{
    let deadline = Instant::now() + timeout;
    let mut last_reason: Option<String> = None;
    loop {
        let (next, outcome) = check(state).await;
        state = next;
        match outcome {
            Ok(Readiness::Ready) => return Ok(state),
            Ok(Readiness::NotReady) => {}
            Ok(Readiness::Stalled(reason)) => {
                debug!("stage not ready: {}", reason);
                last_reason = Some(reason);
            }
            Err(err) => return Err(PollError::Failed(err)),
        }
        if Instant::now() + interval > deadline {
            return Err(PollError::TimedOut {
                timeout,
                last_reason,
            });
        }
        sleep(interval).await;
    }
}

/// Stateless variant of [`poll_until_state`].
pub async fn poll_until<F, Fut>(
    interval: Duration,
    timeout: Duration,
    mut check: F,
) -> Result<(), PollError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Readiness, LaunchError>>,
{
    poll_until_state(interval, timeout, (), move |()| {
        let attempt = check();
        async move { ((), attempt.await) }
    })
    .await
    .map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TICK: Duration = Duration::from_millis(1);
    const SHORT: Duration = Duration::from_millis(30);

    #[tokio::test]
    async fn ready_on_first_attempt() {
        let calls = AtomicUsize::new(0);
        let result = poll_until(TICK, SHORT, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(Readiness::Ready) }
        })
        .await;
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_until_ready() {
        let calls = AtomicUsize::new(0);
        let result = poll_until(TICK, SHORT, || {
            let attempt = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 2 {
                    Ok(Readiness::NotReady)
                } else {
                    Ok(Readiness::Ready)
                }
            }
        })
        .await;
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn condition_error_aborts_immediately() {
        let calls = AtomicUsize::new(0);
        let result = poll_until(TICK, SHORT, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(LaunchError::PodDeleted) }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        match result {
            Err(PollError::Failed(err)) => assert_eq!(err.to_string(), "pod was deleted"),
            other => panic!("expected condition failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn timeout_without_reason_is_generic() {
        let result = poll_until(TICK, Duration::from_millis(5), || async {
            Ok(Readiness::NotReady)
        })
        .await;
        match result {
            Err(err @ PollError::TimedOut { .. }) => {
                assert!(err.into_message().starts_with("timed out"));
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn timeout_surfaces_last_stall_reason() {
        let result = poll_until(TICK, Duration::from_millis(5), || async {
            Ok(Readiness::Stalled("setup container terminated with exit code 1".to_string()))
        })
        .await;
        match result {
            Err(err @ PollError::TimedOut { .. }) => {
                assert_eq!(
                    err.into_message(),
                    "setup container terminated with exit code 1"
                );
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn state_threads_between_attempts() {
        let seen = poll_until_state(TICK, SHORT, 0u32, |count| async move {
            if count < 3 {
                (count + 1, Ok(Readiness::NotReady))
            } else {
                (count, Ok(Readiness::Ready))
            }
        })
        .await
        .expect("poll should finish");
        assert_eq!(seen, 3);
    }
}
