//! lbscale-coordinator - autoscaling HTTP load balancer demo orchestrator
//!
//! Provisions a global HTTP load balancer in front of two autoscaling
//! regional instance groups through the gcloud CLI, reports on it, drives
//! load at it and tears it down again.

pub mod config;
pub mod gcloud;
pub mod loadgen;
pub mod orchestrator;
pub mod plan;
pub mod probe;
pub mod status;
pub mod wait;
