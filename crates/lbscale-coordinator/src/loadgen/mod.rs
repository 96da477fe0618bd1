//! Load generation against the deployed frontend
//!
//! A disposable VM close to one backend region runs ApacheBench against the
//! load balancer so that the autoscalers react to real traffic.

pub mod report;

pub use report::{AbReport, ReportParseError};

use crate::config::LoadTestConfig;
use crate::gcloud::{ignore_already_exists, ComputeApi};
use crate::plan::ResourcePlan;
use crate::probe::{endpoint_url, fetch, serves_marker, ProbeSample};
use crate::wait::{poll_until, PollConfig};
use anyhow::{Context, Result};
use lbscale_common::LatencyStats;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

/// Where the benchmark output lands on the load generator
pub const AB_LOG_PATH: &str = "/tmp/ab-results.log";
/// Per-request timings (`ab -g`) on the load generator
pub const AB_GNUPLOT_PATH: &str = "/tmp/ab-results.tsv";

/// Budget for the load generator accepting SSH after creation
pub const SSH_READY_POLL: PollConfig = PollConfig {
    interval: Duration::from_secs(10),
    max_attempts: Some(30),
};

const INSTALL_AB_COMMAND: &str =
    "sudo apt-get update -qq && sudo apt-get install -y -qq apache2-utils";

/// Remote shell command running the benchmark and keeping a copy of its output
pub fn ab_command(config: &LoadTestConfig, url: &str) -> String {
    format!(
        "ab -n {} -c {} -g {AB_GNUPLOT_PATH} {url} 2>&1 | tee {AB_LOG_PATH}",
        config.requests, config.concurrency
    )
}

/// Result of a benchmark run
#[derive(Debug, Clone)]
pub struct LoadTestOutcome {
    pub url: String,
    /// Readiness attempts before the frontend served the marker
    pub ready_after: u32,
    pub report: AbReport,
}

/// Drives the stress test from the load generator VM
pub struct LoadGenerator<'a, A> {
    api: &'a A,
    plan: &'a ResourcePlan,
    config: &'a LoadTestConfig,
    marker: &'a str,
    ssh_poll: PollConfig,
}

impl<'a, A: ComputeApi> LoadGenerator<'a, A> {
    pub fn new(
        api: &'a A,
        plan: &'a ResourcePlan,
        config: &'a LoadTestConfig,
        marker: &'a str,
    ) -> Self {
        Self {
            api,
            plan,
            config,
            marker,
            ssh_poll: SSH_READY_POLL,
        }
    }

    pub fn with_ssh_poll(mut self, poll: PollConfig) -> Self {
        self.ssh_poll = poll;
        self
    }

    /// Resolve the frontend, wait for it, then benchmark it from the VM
    #[instrument(skip_all)]
    pub async fn run(&self, client: &reqwest::Client) -> Result<LoadTestOutcome> {
        let api = self.api;
        let host = &self.plan.load_generator;

        let rule = self
            .plan
            .frontend
            .ipv4_rule()
            .context("no IPv4 forwarding rule configured")?;
        let address = api
            .forwarding_rule_address(&rule.name)
            .await
            .context("Failed to look up the load balancer address")?
            .with_context(|| {
                format!("forwarding rule {} has no address (run `lbscale setup` first)", rule.name)
            })?;
        let url = endpoint_url(&address);
        info!(url = %url, "Load balancer address resolved");

        if ignore_already_exists(api.create_instance(host).await)
            .with_context(|| format!("Failed to create load generator {}", host.name))?
            .is_none()
        {
            info!(host = %host.name, "Load generator already exists, reusing it");
        }

        let url_ref = url.as_str();
        let marker = self.marker;
        let ready_after = poll_until(
            PollConfig::bounded(self.config.ready_attempts, self.config.ready_interval),
            None,
            || async move { anyhow::Ok(serves_marker(client, url_ref, marker).await) },
            "load balancer",
        )
        .await
        .context("Load balancer is not serving; the benchmark would only measure errors")?;

        let (name, zone) = (host.name.as_str(), host.zone.as_str());
        poll_until(
            self.ssh_poll,
            None,
            || async move {
                match api.ssh(name, zone, "true").await {
                    Ok(_) => anyhow::Ok(true),
                    Err(e) => {
                        debug!(host = %name, error = %e, "SSH not ready");
                        anyhow::Ok(false)
                    }
                }
            },
            name,
        )
        .await
        .context("Load generator never accepted SSH")?;

        api.ssh(name, zone, INSTALL_AB_COMMAND)
            .await
            .context("Failed to install apache2-utils on the load generator")?;

        let command = ab_command(self.config, &url);
        info!(
            requests = self.config.requests,
            concurrency = self.config.concurrency,
            "Running benchmark (this takes a while)"
        );
        let output = api
            .ssh(name, zone, &command)
            .await
            .context("Benchmark command failed")?;
        let report = AbReport::parse(&output)?;
        info!(
            complete = report.complete_requests,
            failed = report.failed_requests,
            "Benchmark finished"
        );

        Ok(LoadTestOutcome {
            url,
            ready_after,
            report,
        })
    }
}

/// Sample the frontend every `interval` until cancelled.
///
/// Calls `on_sample` for each request and returns statistics over the
/// latencies of successful samples (ms).
pub async fn follow<F>(
    client: &reqwest::Client,
    url: &str,
    marker: &str,
    interval: Duration,
    cancel: &CancellationToken,
    mut on_sample: F,
) -> LatencyStats
where
    F: FnMut(&ProbeSample),
{
    let mut latencies = Vec::new();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let sample = tokio::select! {
            _ = cancel.cancelled() => break,
            sample = fetch(client, url, marker) => sample,
        };
        if sample.status.is_some() {
            latencies.push(sample.latency.as_secs_f64() * 1000.0);
        }
        on_sample(&sample);
    }

    LatencyStats::from_samples(&latencies)
}
