//! Readiness polling with a fixed interval and cancellation support.
//!
//! Every "wait until X" in the workflows goes through [`poll_until`]: the
//! builder VM's startup script, the builder reaching `TERMINATED`, the load
//! balancer serving its marker page, and SSH reachability of the load
//! generator host.

use backon::{BackoffBuilder, ConstantBuilder};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Polling cadence and attempt budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Delay between consecutive checks
    pub interval: Duration,
    /// Attempt budget; `None` polls until success or cancellation
    pub max_attempts: Option<u32>,
}

impl PollConfig {
    /// Give up after `attempts` failed checks
    pub fn bounded(attempts: u32, interval: Duration) -> Self {
        Self {
            interval,
            max_attempts: Some(attempts),
        }
    }

    /// Poll until the check succeeds or the wait is cancelled
    pub fn unbounded(interval: Duration) -> Self {
        Self {
            interval,
            max_attempts: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum WaitError {
    /// Attempt budget exhausted without the condition holding
    #[error("timed out waiting for {resource} after {attempts} attempts")]
    TimedOut { resource: String, attempts: u32 },

    /// Cancellation token fired before the condition held
    #[error("wait for {resource} cancelled")]
    Cancelled { resource: String },

    /// The check itself failed (not merely "not ready yet")
    #[error("checking {resource} failed: {error:#}")]
    Check {
        resource: String,
        error: anyhow::Error,
    },
}

impl WaitError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, WaitError::TimedOut { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, WaitError::Cancelled { .. })
    }
}

/// Poll `check` until it reports ready.
///
/// `check` returns `Ok(true)` when ready and `Ok(false)` to try again after
/// `config.interval`. Returns the number of attempts made on success.
///
/// With a bounded config the check runs at most `max_attempts` times and
/// there is no sleep after the last attempt. Cancellation is observed
/// before each attempt and during each sleep.
pub async fn poll_until<F, Fut>(
    config: PollConfig,
    cancel: Option<&CancellationToken>,
    mut check: F,
    resource: &str,
) -> Result<u32, WaitError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<bool>>,
{
    let mut delays = ConstantBuilder::default()
        .with_delay(config.interval)
        .without_max_times()
        .build();
    let mut attempts = 0u32;

    loop {
        if cancel.is_some_and(|token| token.is_cancelled()) {
            return Err(WaitError::Cancelled {
                resource: resource.to_string(),
            });
        }

        attempts += 1;
        match check().await {
            Ok(true) => {
                debug!(resource = %resource, attempts, "Ready");
                return Ok(attempts);
            }
            Ok(false) => {}
            Err(error) => {
                warn!(resource = %resource, error = %error, "Readiness check failed");
                return Err(WaitError::Check {
                    resource: resource.to_string(),
                    error,
                });
            }
        }

        if config.max_attempts.is_some_and(|max| attempts >= max) {
            return Err(WaitError::TimedOut {
                resource: resource.to_string(),
                attempts,
            });
        }

        let delay = delays.next().unwrap_or(config.interval);
        debug!(
            resource = %resource,
            attempt = attempts,
            delay_ms = delay.as_millis(),
            "Not ready, retrying"
        );

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = async {
                match cancel {
                    Some(token) => token.cancelled().await,
                    None => std::future::pending::<()>().await,
                }
            } => {
                return Err(WaitError::Cancelled {
                    resource: resource.to_string(),
                });
            }
        }
    }
}
