//! Configuration types for the coordinator
//!
//! Every workflow receives a `DeploymentConfig` explicitly; nothing reads
//! project or location settings from globals after startup.

use crate::gcloud::CommandRunner;
use anyhow::{Context, Result};
use garde::Validate;
use lbscale_common::defaults::{
    DEFAULT_BENCH_CONCURRENCY, DEFAULT_BENCH_REQUESTS, DEFAULT_LOADGEN_MACHINE_TYPE,
    DEFAULT_LOADGEN_REGION, DEFAULT_LOADGEN_ZONE, DEFAULT_MACHINE_TYPE, DEFAULT_NETWORK,
    DEFAULT_PRIMARY_REGION, DEFAULT_PRIMARY_ZONE, DEFAULT_READY_ATTEMPTS,
    DEFAULT_READY_INTERVAL_SECS, DEFAULT_READY_MARKER, DEFAULT_SECONDARY_REGION,
    DEFAULT_SECONDARY_ZONE,
};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Configuration validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No project was given and gcloud has none configured
    #[error("no project configured: pass --project or run `gcloud config set project <id>`")]
    MissingProject,

    /// A zone was paired with a region it does not belong to
    #[error("zone '{zone}' is not in region '{region}'")]
    ZoneOutsideRegion { zone: String, region: String },

    /// Field-level validation failures
    #[error("invalid configuration: {0}")]
    Invalid(#[from] garde::Report),
}

/// A region/zone pair
#[derive(Debug, Clone, PartialEq, Eq, Validate)]
pub struct Location {
    #[garde(length(min = 1))]
    pub region: String,
    #[garde(length(min = 1))]
    pub zone: String,
}

impl Location {
    pub fn new(region: impl Into<String>, zone: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            zone: zone.into(),
        }
    }

    /// Zones are named `<region>-<letter>`
    fn check_zone(&self) -> Result<(), ConfigError> {
        let in_region = self
            .zone
            .strip_prefix(&self.region)
            .is_some_and(|rest| rest.starts_with('-') && rest.len() > 1);
        if in_region {
            Ok(())
        } else {
            Err(ConfigError::ZoneOutsideRegion {
                zone: self.zone.clone(),
                region: self.region.clone(),
            })
        }
    }
}

/// Project, network and placement of every demo resource
#[derive(Debug, Clone, Validate)]
pub struct DeploymentConfig {
    /// Cloud project identifier
    #[garde(length(min = 1))]
    pub project: String,
    /// VPC network the demo lives in
    #[garde(length(min = 1))]
    pub network: String,
    /// Location of the first backend, the NAT and the image builder
    #[garde(dive)]
    pub primary: Location,
    /// Location of the second backend
    #[garde(dive)]
    pub secondary: Location,
    /// Location of the load generator host
    #[garde(dive)]
    pub loadgen: Location,
    /// Machine type for backends and the image builder
    #[garde(length(min = 1))]
    pub machine_type: String,
    /// Machine type for the load generator host
    #[garde(length(min = 1))]
    pub loadgen_machine_type: String,
    /// Body substring that marks a healthy response from the load balancer
    #[garde(length(min = 1))]
    pub ready_marker: String,
}

impl DeploymentConfig {
    /// Configuration with every default filled in for the given project
    pub fn with_project(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            network: DEFAULT_NETWORK.to_string(),
            primary: Location::new(DEFAULT_PRIMARY_REGION, DEFAULT_PRIMARY_ZONE),
            secondary: Location::new(DEFAULT_SECONDARY_REGION, DEFAULT_SECONDARY_ZONE),
            loadgen: Location::new(DEFAULT_LOADGEN_REGION, DEFAULT_LOADGEN_ZONE),
            machine_type: DEFAULT_MACHINE_TYPE.to_string(),
            loadgen_machine_type: DEFAULT_LOADGEN_MACHINE_TYPE.to_string(),
            ready_marker: DEFAULT_READY_MARKER.to_string(),
        }
    }

    /// Validate field constraints and zone/region pairing
    pub fn check(&self) -> Result<(), ConfigError> {
        self.validate()?;
        for location in [&self.primary, &self.secondary, &self.loadgen] {
            location.check_zone()?;
        }
        Ok(())
    }
}

/// Benchmark and readiness parameters for the stress test
#[derive(Debug, Clone, Validate)]
pub struct LoadTestConfig {
    /// Total requests issued by the benchmark
    #[garde(range(min = 1))]
    pub requests: u64,
    /// Concurrent connections
    #[garde(range(min = 1))]
    pub concurrency: u32,
    /// Attempts before the endpoint is declared unreachable
    #[garde(range(min = 1))]
    pub ready_attempts: u32,
    /// Delay between readiness attempts
    #[garde(skip)]
    pub ready_interval: Duration,
    /// Keep sampling the endpoint every second after the benchmark
    #[garde(skip)]
    pub follow: bool,
}

impl Default for LoadTestConfig {
    fn default() -> Self {
        Self {
            requests: DEFAULT_BENCH_REQUESTS,
            concurrency: DEFAULT_BENCH_CONCURRENCY,
            ready_attempts: DEFAULT_READY_ATTEMPTS,
            ready_interval: Duration::from_secs(DEFAULT_READY_INTERVAL_SECS),
            follow: false,
        }
    }
}

/// Resolve the project from an explicit value or the ambient gcloud configuration
pub async fn resolve_project<R: CommandRunner>(
    explicit: Option<String>,
    runner: &R,
) -> Result<String> {
    if let Some(project) = explicit.filter(|p| !p.trim().is_empty()) {
        return Ok(project);
    }

    let args = ["config", "get-value", "project"].map(String::from);
    let output = runner
        .run(&args)
        .await
        .context("Failed to read project from gcloud configuration")?;
    let project = output.trim();

    // gcloud prints "(unset)" on some versions instead of an empty line
    if project.is_empty() || project == "(unset)" {
        return Err(ConfigError::MissingProject.into());
    }

    debug!(project = %project, "Using project from gcloud configuration");
    Ok(project.to_string())
}
