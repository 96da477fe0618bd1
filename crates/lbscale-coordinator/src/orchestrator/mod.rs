//! Provisioning and teardown orchestration
//!
//! The setup workflow runs the [`Provisioner`] pipeline and then waits for
//! the load balancer to serve the marker page. Teardown unwinds the same
//! pipeline in reverse through [`Teardown`].

pub mod confirm;
pub mod progress;
pub mod provision;
pub mod summary;
pub mod teardown;
pub mod types;

// Re-export core types
pub use confirm::{is_affirmative, AssumeYes, Confirm, TerminalConfirm};
pub use progress::{LogReporter, ProgressReporter};
pub use provision::{ProvisionTiming, Provisioner, STARTUP_COMPLETE_MARKER};
pub use teardown::{RetryPolicy, Teardown};
pub use types::{
    CleanupResult, CreateOutcome, DeletionRecord, ProvisionError, ResourceRecord, Step,
    StepError, StepOutcome, TeardownReport,
};

use crate::gcloud::ComputeApi;
use crate::probe::{endpoint_url, http_client, serves_marker};
use crate::wait::{poll_until, PollConfig};
use anyhow::{Context, Result};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// Interval of the post-setup load balancer readiness poll
pub const FRONTEND_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// How setup waits for the frontend to serve traffic
#[derive(Debug, Clone, Copy)]
pub struct FrontendWait<'a> {
    /// Body substring of a healthy response
    pub marker: &'a str,
    pub poll: PollConfig,
    pub cancel: &'a CancellationToken,
}

/// What the setup workflow produced
#[derive(Debug)]
pub struct SetupReport {
    pub steps: Vec<StepOutcome>,
    /// IPv4 address of the frontend
    pub address: Option<String>,
    /// Poll attempts until the frontend served the marker; `None` when the
    /// wait was skipped or cancelled
    pub ready_after: Option<u32>,
}

impl SetupReport {
    pub fn url(&self) -> Option<String> {
        self.address.as_deref().map(endpoint_url)
    }
}

/// Provision every resource, then optionally wait until the frontend serves
#[instrument(skip_all)]
pub async fn run_setup<A: ComputeApi, P: ProgressReporter>(
    provisioner: &Provisioner<'_, A, P>,
    reporter: &P,
    wait: Option<FrontendWait<'_>>,
) -> Result<SetupReport> {
    let steps = provisioner.run().await?;

    let address = provisioner
        .frontend_address()
        .await
        .context("Failed to look up the load balancer address")?;
    info!(address = ?address, "Load balancer provisioned");

    let Some(wait) = wait else {
        return Ok(SetupReport {
            steps,
            address,
            ready_after: None,
        });
    };

    let Some(ip) = address.as_deref() else {
        anyhow::bail!("forwarding rule exists but has no address assigned");
    };

    let client = http_client()?;
    let url = endpoint_url(ip);
    reporter.waiting(&format!("{url} to serve '{}' (Ctrl-C to stop waiting)", wait.marker));

    let client = &client;
    let url_ref = url.as_str();
    let marker = wait.marker;
    let ready_after = match poll_until(
        wait.poll,
        Some(wait.cancel),
        || async move { anyhow::Ok(serves_marker(client, url_ref, marker).await) },
        "load balancer",
    )
    .await
    {
        Ok(attempts) => {
            info!(url = %url, attempts, "Load balancer is serving");
            Some(attempts)
        }
        Err(e) if e.is_cancelled() => {
            warn!(url = %url, "Stopped waiting for the load balancer; it may need a few more minutes");
            None
        }
        Err(e) => return Err(e.into()),
    };

    Ok(SetupReport {
        steps,
        address,
        ready_after,
    })
}
