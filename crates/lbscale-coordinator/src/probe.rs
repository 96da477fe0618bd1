//! HTTP probing of the load balancer frontend

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::net::Ipv6Addr;
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

/// Per-request timeout for probes
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Build the HTTP client shared by probes and follow-mode sampling
pub fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(PROBE_TIMEOUT)
        .build()
        .context("Failed to build HTTP client")
}

/// Frontend URL for a forwarding-rule address (or `host:port`)
pub fn endpoint_url(address: &str) -> String {
    if address.parse::<Ipv6Addr>().is_ok() {
        format!("http://[{address}]/")
    } else {
        format!("http://{address}/")
    }
}

/// Outcome of one GET against the frontend
#[derive(Debug, Clone)]
pub struct ProbeSample {
    pub at: DateTime<Utc>,
    /// HTTP status, `None` on transport failure
    pub status: Option<u16>,
    pub latency: Duration,
    pub marker_found: bool,
    /// Transport or body error, if any
    pub error: Option<String>,
}

impl ProbeSample {
    /// 2xx response whose body contains the marker
    pub fn is_serving(&self) -> bool {
        self.status.is_some_and(|s| (200..300).contains(&s)) && self.marker_found
    }
}

/// Issue one GET and record status, latency and marker presence.
///
/// Never fails: transport errors are recorded in the sample.
pub async fn fetch(client: &reqwest::Client, url: &str, marker: &str) -> ProbeSample {
    let at = Utc::now();
    let start = Instant::now();

    let outcome = async {
        let response = client.get(url).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok::<_, reqwest::Error>((status, body))
    }
    .await;
    let latency = start.elapsed();

    match outcome {
        Ok((status, body)) => {
            trace!(url = %url, status, latency_ms = latency.as_millis(), "Probe response");
            ProbeSample {
                at,
                status: Some(status),
                latency,
                marker_found: body.contains(marker),
                error: None,
            }
        }
        Err(e) => ProbeSample {
            at,
            status: None,
            latency,
            marker_found: false,
            error: Some(e.to_string()),
        },
    }
}

/// Readiness predicate: a 2xx response carrying the marker.
///
/// Transport errors and error pages count as "not ready yet".
pub async fn serves_marker(client: &reqwest::Client, url: &str, marker: &str) -> bool {
    fetch(client, url, marker).await.is_serving()
}
