//! Teardown of the demo deployment
//!
//! Deletes everything the provisioning pipeline creates, in reverse order,
//! then offers to remove leftovers found by name. Individual failures never
//! abort the teardown; they are collected in the [`TeardownReport`].

use super::confirm::Confirm;
use super::types::{CleanupResult, Step, TeardownReport};
use crate::gcloud::{ComputeApi, GcloudError, GcloudResult};
use crate::gcloud::models::ZonalResource;
use crate::plan::ResourcePlan;
use anyhow::Result;
use backon::{ExponentialBuilder, Retryable};
use lbscale_common::defaults::SWEEP_NAME_PATTERNS;
use lbscale_common::ResourceKind;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Backoff for deletions rejected with a transient error
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub max_times: usize,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(60),
            max_times: 5,
        }
    }
}

impl RetryPolicy {
    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_times)
    }
}

/// Reverse-ordered, fault-tolerant deletion of the demo
pub struct Teardown<'a, A, C> {
    api: &'a A,
    plan: &'a ResourcePlan,
    confirm: &'a C,
    retry: RetryPolicy,
}

impl<'a, A: ComputeApi, C: Confirm> Teardown<'a, A, C> {
    pub fn new(api: &'a A, plan: &'a ResourcePlan, confirm: &'a C) -> Self {
        Self {
            api,
            plan,
            confirm,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Confirm, delete auxiliary hosts, unwind the pipeline, then sweep
    #[instrument(skip_all)]
    pub async fn run(&self) -> Result<TeardownReport> {
        if !self
            .confirm
            .confirm("Delete every resource of the load balancer demo?")?
        {
            info!("Teardown declined, nothing deleted");
            return Ok(TeardownReport::declined());
        }

        let mut report = TeardownReport::default();

        self.delete_auxiliary_hosts(&mut report).await;
        for step in Step::teardown_order() {
            info!(step = %step, "Tearing down step");
            self.teardown_step(step, &mut report).await;
        }
        self.sweep(&mut report).await?;

        info!(
            deleted = report.deleted(),
            already_deleted = report.already_deleted(),
            failed = report.failed(),
            skipped = report.skipped(),
            "Teardown finished"
        );
        Ok(report)
    }

    /// VMs outside the pipeline that still reference the image
    async fn delete_auxiliary_hosts(&self, report: &mut TeardownReport) {
        let api = self.api;
        let hosts = [
            (ResourceKind::LoadGenerator, &self.plan.load_generator),
            (ResourceKind::BuilderInstance, &self.plan.image.builder),
        ];
        for (kind, host) in hosts {
            let result = self
                .delete(kind, &host.name, || api.delete_instance(&host.name, &host.zone))
                .await;
            report.record(kind, &host.name, result);
        }
    }

    /// Delete one step's resources in reverse creation order
    pub async fn teardown_step(&self, step: Step, report: &mut TeardownReport) {
        let api = self.api;
        let plan = self.plan;

        match step {
            Step::Frontend => {
                let frontend = &plan.frontend;
                for rule in frontend.forwarding_rules.iter().rev() {
                    let result = self
                        .delete(ResourceKind::ForwardingRule, &rule.name, || {
                            api.delete_forwarding_rule(&rule.name)
                        })
                        .await;
                    report.record(ResourceKind::ForwardingRule, &rule.name, result);
                }
                let result = self
                    .delete(ResourceKind::TargetProxy, &frontend.target_proxy, || {
                        api.delete_target_proxy(&frontend.target_proxy)
                    })
                    .await;
                report.record(ResourceKind::TargetProxy, &frontend.target_proxy, result);
                let result = self
                    .delete(ResourceKind::UrlMap, &frontend.url_map, || {
                        api.delete_url_map(&frontend.url_map)
                    })
                    .await;
                report.record(ResourceKind::UrlMap, &frontend.url_map, result);
            }
            Step::BackendService => {
                let name = &plan.backend_service.name;
                let result = self
                    .delete(ResourceKind::BackendService, name, || {
                        api.delete_backend_service(name)
                    })
                    .await;
                report.record(ResourceKind::BackendService, name, result);
            }
            Step::InstanceGroups => {
                for group in plan.groups.iter().rev() {
                    let result = self
                        .delete(ResourceKind::InstanceGroup, &group.name, || {
                            api.delete_instance_group(&group.name, &group.region)
                        })
                        .await;
                    report.record(ResourceKind::InstanceGroup, &group.name, result);
                }
            }
            Step::HealthCheck => {
                let name = &plan.health_check.name;
                let result = self
                    .delete(ResourceKind::HealthCheck, name, || api.delete_health_check(name))
                    .await;
                report.record(ResourceKind::HealthCheck, name, result);
            }
            Step::InstanceTemplate => {
                let name = &plan.template.name;
                let result = self
                    .delete(ResourceKind::InstanceTemplate, name, || {
                        api.delete_instance_template(name)
                    })
                    .await;
                report.record(ResourceKind::InstanceTemplate, name, result);
            }
            Step::SourceImage => {
                let name = &plan.image.name;
                let result = self
                    .delete(ResourceKind::Image, name, || api.delete_image(name))
                    .await;
                report.record(ResourceKind::Image, name, result);
            }
            Step::RouterNat => {
                let router_nat = &plan.router_nat;
                let result = self
                    .delete(ResourceKind::Nat, &router_nat.nat, || api.delete_nat(router_nat))
                    .await;
                report.record(ResourceKind::Nat, &router_nat.nat, result);
                let result = self
                    .delete(ResourceKind::Router, &router_nat.router, || {
                        api.delete_router(router_nat)
                    })
                    .await;
                report.record(ResourceKind::Router, &router_nat.router, result);
            }
            Step::Firewall => {
                let name = &plan.firewall.name;
                let result = self
                    .delete(ResourceKind::FirewallRule, name, || api.delete_firewall_rule(name))
                    .await;
                report.record(ResourceKind::FirewallRule, name, result);
            }
        }
    }

    /// Offer to delete leftover instances and disks whose names match the demo
    async fn sweep(&self, report: &mut TeardownReport) -> Result<()> {
        let api = self.api;

        let instances = self
            .list_leftovers("instances", api.list_instances_matching(SWEEP_NAME_PATTERNS))
            .await;
        self.sweep_category(ResourceKind::StrayInstance, &instances, report, |r| {
            api.delete_instance(&r.name, r.zone_name())
        })
        .await?;

        // Disks are listed after the instance deletions, which release them
        let disks = self
            .list_leftovers("disks", api.list_disks_matching(SWEEP_NAME_PATTERNS))
            .await;
        self.sweep_category(ResourceKind::StrayDisk, &disks, report, |r| {
            api.delete_disk(&r.name, r.zone_name())
        })
        .await?;

        Ok(())
    }

    async fn list_leftovers(
        &self,
        category: &str,
        listing: impl Future<Output = GcloudResult<Vec<ZonalResource>>>,
    ) -> Vec<ZonalResource> {
        match listing.await {
            Ok(found) => found,
            Err(e) => {
                warn!(category, error = %e, "Could not list leftovers, skipping sweep");
                Vec::new()
            }
        }
    }

    async fn sweep_category<'r, F, Fut>(
        &self,
        kind: ResourceKind,
        found: &'r [ZonalResource],
        report: &mut TeardownReport,
        delete_one: F,
    ) -> Result<()>
    where
        F: Fn(&'r ZonalResource) -> Fut,
        Fut: Future<Output = GcloudResult<()>>,
    {
        if found.is_empty() {
            debug!(kind = %kind, "No leftovers");
            return Ok(());
        }

        let names: Vec<String> = found
            .iter()
            .map(|r| format!("{} ({})", r.name, r.zone_name()))
            .collect();
        let prompt = format!(
            "Found {} leftover {kind}(s): {}. Delete them?",
            found.len(),
            names.join(", ")
        );

        if !self.confirm.confirm(&prompt)? {
            info!(kind = %kind, count = found.len(), "Leftovers kept");
            for resource in found {
                report.record(kind, &resource.name, CleanupResult::Skipped);
            }
            return Ok(());
        }

        for resource in found {
            let result = self.delete(kind, &resource.name, || delete_one(resource)).await;
            report.record(kind, &resource.name, result);
        }
        Ok(())
    }

    /// Delete one resource, retrying transient failures
    ///
    /// "Not found" counts as already deleted; any other failure is logged
    /// and reported, never propagated.
    async fn delete<F, Fut>(&self, kind: ResourceKind, name: &str, op: F) -> CleanupResult
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = GcloudResult<()>>,
    {
        let result = op
            .retry(self.retry.backoff())
            .when(|e: &GcloudError| e.is_retryable())
            .notify(|e: &GcloudError, dur: Duration| {
                warn!(
                    kind = %kind,
                    name = %name,
                    delay = ?dur,
                    error = %e,
                    "Deletion rejected, retrying..."
                );
            })
            .await;

        match result {
            Ok(()) => {
                info!(kind = %kind, name = %name, "Deleted");
                CleanupResult::Deleted
            }
            Err(e) if e.is_not_found() => {
                warn!(kind = %kind, name = %name, "Not found, already deleted");
                CleanupResult::AlreadyDeleted
            }
            Err(e) => {
                warn!(kind = %kind, name = %name, error = %e, "Deletion failed, continuing");
                CleanupResult::Failed
            }
        }
    }
}
