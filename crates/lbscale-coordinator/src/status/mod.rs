//! Read-only status reporting for a deployed demo
//!
//! A snapshot never fails as a whole: missing resources and failed queries
//! become warnings so a half-provisioned (or half-deleted) deployment can
//! still be inspected.

pub mod render;

pub use render::{render_probe, render_snapshot};

use crate::gcloud::models::{
    resource_name, BackendHealth, BackendServiceInfo, ForwardingRuleInfo, ManagedInstance,
};
use crate::gcloud::{ComputeApi, GcloudError};
use crate::plan::{Autoscaling, InstanceGroup, ResourcePlan};
use crate::probe::{endpoint_url, fetch, ProbeSample};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

/// Which part of the deployment to report on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum StatusView {
    #[default]
    Full,
    LoadBalancer,
    InstanceGroups,
}

impl StatusView {
    fn includes_load_balancer(self) -> bool {
        matches!(self, StatusView::Full | StatusView::LoadBalancer)
    }

    fn includes_groups(self) -> bool {
        matches!(self, StatusView::Full | StatusView::InstanceGroups)
    }
}

/// Frontend and backend service state
#[derive(Debug, Clone, Default)]
pub struct LoadBalancerStatus {
    pub forwarding_rules: Vec<ForwardingRuleInfo>,
    pub backend_service: Option<BackendServiceInfo>,
    pub health: Vec<BackendHealth>,
}

impl LoadBalancerStatus {
    /// (healthy, total) instances behind the named group
    pub fn group_health(&self, group: &str) -> Option<(usize, usize)> {
        self.health
            .iter()
            .find(|h| resource_name(&h.backend) == group)
            .map(|h| (h.healthy_count(), h.total_count()))
    }
}

/// One managed instance group with its autoscaler bounds
#[derive(Debug, Clone)]
pub struct GroupStatus {
    pub name: String,
    pub region: String,
    pub target_size: Option<u32>,
    pub stable: bool,
    /// `(min, max)` replicas as described by the cloud; `None` without an autoscaler
    pub autoscaling: Option<(u32, u32)>,
    pub instances: Vec<ManagedInstance>,
}

impl GroupStatus {
    /// Warning when the live autoscaler differs from what setup configures
    pub fn autoscaling_drift(&self, expected: &Autoscaling) -> Option<String> {
        let wanted = (expected.min_replicas, expected.max_replicas);
        match self.autoscaling {
            Some(actual) if actual == wanted => None,
            Some((min, max)) => Some(format!(
                "instance group {} autoscales {min}-{max}, expected {}-{}",
                self.name, wanted.0, wanted.1
            )),
            None => Some(format!("instance group {} has no autoscaler", self.name)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    pub view: StatusView,
    pub taken_at: DateTime<Utc>,
    pub load_balancer: Option<LoadBalancerStatus>,
    pub groups: Vec<GroupStatus>,
    /// Resources that were missing or could not be queried
    pub warnings: Vec<String>,
}

/// Queries the deployment described by a [`ResourcePlan`]
pub struct StatusReporter<'a, A> {
    api: &'a A,
    plan: &'a ResourcePlan,
}

impl<'a, A: ComputeApi> StatusReporter<'a, A> {
    pub fn new(api: &'a A, plan: &'a ResourcePlan) -> Self {
        Self { api, plan }
    }

    /// Query everything the view covers
    #[instrument(skip(self))]
    pub async fn snapshot(&self, view: StatusView) -> StatusSnapshot {
        let mut warnings = Vec::new();

        let load_balancer = if view.includes_load_balancer() {
            Some(self.load_balancer(&mut warnings).await)
        } else {
            None
        };

        let groups = if view.includes_groups() {
            let results = join_all(self.plan.groups.iter().map(|g| self.group(g))).await;
            let mut groups = Vec::with_capacity(results.len());
            for (result, planned) in results.into_iter().zip(&self.plan.groups) {
                match result {
                    Ok(group) => {
                        warnings.extend(group.autoscaling_drift(&planned.autoscaling));
                        groups.push(group);
                    }
                    Err(warning) => warnings.push(warning),
                }
            }
            groups
        } else {
            Vec::new()
        };

        StatusSnapshot {
            view,
            taken_at: Utc::now(),
            load_balancer,
            groups,
            warnings,
        }
    }

    async fn load_balancer(&self, warnings: &mut Vec<String>) -> LoadBalancerStatus {
        let rule_names: Vec<String> = self
            .plan
            .frontend
            .forwarding_rules
            .iter()
            .map(|r| r.name.clone())
            .collect();
        let service = &self.plan.backend_service.name;

        let mut status = LoadBalancerStatus::default();

        match self.api.list_forwarding_rules(&rule_names).await {
            Ok(rules) if rules.is_empty() => {
                warnings.push("no forwarding rules found (run `lbscale setup`)".to_string())
            }
            Ok(rules) => status.forwarding_rules = rules,
            Err(e) => warnings.push(describe_failure("forwarding rules", &e)),
        }

        match self.api.describe_backend_service(service).await {
            Ok(info) => status.backend_service = Some(info),
            Err(e) => warnings.push(describe_failure(&format!("backend service {service}"), &e)),
        }

        if status.backend_service.is_some() {
            match self.api.backend_health(service).await {
                Ok(health) => status.health = health,
                Err(e) => warnings.push(describe_failure("backend health", &e)),
            }
        }

        status
    }

    async fn group(&self, group: &InstanceGroup) -> Result<GroupStatus, String> {
        let label = format!("instance group {}", group.name);
        let info = self
            .api
            .describe_instance_group(&group.name, &group.region)
            .await
            .map_err(|e| describe_failure(&label, &e))?;
        let instances = self
            .api
            .list_group_instances(&group.name, &group.region)
            .await
            .map_err(|e| describe_failure(&label, &e))?;

        debug!(group = %group.name, instances = instances.len(), "Group queried");
        Ok(GroupStatus {
            name: group.name.clone(),
            region: group.region.clone(),
            target_size: info.target_size,
            stable: info.is_stable(),
            autoscaling: info.replica_bounds(),
            instances,
        })
    }

    /// One-shot GET against the IPv4 frontend
    pub async fn probe(&self, client: &reqwest::Client, marker: &str) -> Result<ProbeSample> {
        let rule = self
            .plan
            .frontend
            .ipv4_rule()
            .context("no IPv4 forwarding rule configured")?;
        let address = self
            .api
            .forwarding_rule_address(&rule.name)
            .await
            .context("Failed to look up the load balancer address")?
            .with_context(|| format!("forwarding rule {} not found (run `lbscale setup`)", rule.name))?;

        Ok(fetch(client, &endpoint_url(&address), marker).await)
    }

    /// Take a full snapshot every `interval` until cancelled.
    ///
    /// Returns the number of snapshots taken.
    pub async fn watch<F>(
        &self,
        interval: Duration,
        cancel: &CancellationToken,
        mut on_snapshot: F,
    ) -> u32
    where
        F: FnMut(&StatusSnapshot),
    {
        let mut taken = 0;
        while !cancel.is_cancelled() {
            let snapshot = self.snapshot(StatusView::Full).await;
            taken += 1;
            on_snapshot(&snapshot);

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = cancel.cancelled() => break,
            }
        }
        taken
    }
}

fn describe_failure(what: &str, error: &GcloudError) -> String {
    if error.is_not_found() {
        format!("{what} not found")
    } else {
        format!("could not query {what}: {error}")
    }
}
