//! Provisioning pipeline
//!
//! Runs [`Step::PROVISION_ORDER`] strictly in sequence. Every step is
//! idempotent, so a failed run can be resumed by running setup again.

use super::progress::ProgressReporter;
use super::types::{CreateOutcome, ProvisionError, ResourceRecord, Step, StepError, StepOutcome};
use crate::gcloud::{ignore_already_exists, ignore_not_found, ComputeApi, GcloudResult};
use crate::plan::{InstanceGroup, ResourcePlan};
use crate::wait::{poll_until, PollConfig, WaitError};
use futures::future::try_join_all;
use lbscale_common::ResourceKind;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

/// Serial console line printed once the guest finished its startup scripts
pub const STARTUP_COMPLETE_MARKER: &str = "Finished running startup scripts";

/// Polling budgets for the image-baking waits
#[derive(Debug, Clone, Copy)]
pub struct ProvisionTiming {
    /// Startup script completion on the builder VM
    pub startup_script: PollConfig,
    /// Builder VM reaching `TERMINATED` after stop
    pub builder_stopped: PollConfig,
}

impl Default for ProvisionTiming {
    fn default() -> Self {
        Self {
            startup_script: PollConfig::bounded(60, Duration::from_secs(10)),
            builder_stopped: PollConfig::bounded(30, Duration::from_secs(5)),
        }
    }
}

/// Runs the provisioning pipeline against a [`ComputeApi`]
pub struct Provisioner<'a, A, P> {
    api: &'a A,
    plan: &'a ResourcePlan,
    reporter: &'a P,
    timing: ProvisionTiming,
    cancel: Option<&'a CancellationToken>,
}

impl<'a, A: ComputeApi, P: ProgressReporter> Provisioner<'a, A, P> {
    pub fn new(api: &'a A, plan: &'a ResourcePlan, reporter: &'a P) -> Self {
        Self {
            api,
            plan,
            reporter,
            timing: ProvisionTiming::default(),
            cancel: None,
        }
    }

    pub fn with_timing(mut self, timing: ProvisionTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Stop between steps and interrupt image-baking waits once `cancel` fires
    pub fn with_cancel(mut self, cancel: &'a CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Run every step in order, stopping at the first failure
    #[instrument(skip_all)]
    pub async fn run(&self) -> Result<Vec<StepOutcome>, ProvisionError> {
        let mut outcomes = Vec::with_capacity(Step::PROVISION_ORDER.len());

        for step in Step::PROVISION_ORDER {
            if self.cancel.is_some_and(|token| token.is_cancelled()) {
                return Err(ProvisionError::StepFailed {
                    step,
                    source: StepError::Wait(WaitError::Cancelled {
                        resource: step.to_string(),
                    }),
                });
            }
            self.reporter.step_started(step);
            let start = Instant::now();

            let resources = self
                .run_step(step)
                .await
                .map_err(|source| ProvisionError::StepFailed { step, source })?;

            let outcome = StepOutcome {
                step,
                resources,
                elapsed: start.elapsed(),
            };
            self.reporter.step_finished(&outcome);
            outcomes.push(outcome);
        }

        Ok(outcomes)
    }

    /// Run a single step
    pub async fn run_step(&self, step: Step) -> Result<Vec<ResourceRecord>, StepError> {
        let api = self.api;
        let plan = self.plan;

        let records = match step {
            Step::Firewall => vec![
                self.create(
                    step,
                    ResourceKind::FirewallRule,
                    &plan.firewall.name,
                    api.create_firewall_rule(&plan.firewall),
                )
                .await?,
            ],
            Step::RouterNat => {
                let router_nat = &plan.router_nat;
                vec![
                    self.create(
                        step,
                        ResourceKind::Router,
                        &router_nat.router,
                        api.create_router(router_nat),
                    )
                    .await?,
                    self.create(step, ResourceKind::Nat, &router_nat.nat, api.create_nat(router_nat))
                        .await?,
                ]
            }
            Step::SourceImage => vec![self.ensure_image().await?],
            Step::InstanceTemplate => vec![
                self.create(
                    step,
                    ResourceKind::InstanceTemplate,
                    &plan.template.name,
                    api.create_instance_template(&plan.template),
                )
                .await?,
            ],
            Step::HealthCheck => vec![
                self.create(
                    step,
                    ResourceKind::HealthCheck,
                    &plan.health_check.name,
                    api.create_health_check(&plan.health_check),
                )
                .await?,
            ],
            // The groups are independent of each other; both must exist
            // before the backend service references them.
            Step::InstanceGroups => {
                try_join_all(plan.groups.iter().map(|group| self.create_group(group))).await?
            }
            Step::BackendService => {
                let service = &plan.backend_service;
                let record = self
                    .create(
                        step,
                        ResourceKind::BackendService,
                        &service.name,
                        api.create_backend_service(service),
                    )
                    .await?;
                for backend in &service.backends {
                    let added = ignore_already_exists(api.add_backend(&service.name, backend).await)?;
                    debug!(
                        service = %service.name,
                        group = %backend.group,
                        mode = backend.mode.as_str(),
                        already_attached = added.is_none(),
                        "Backend attached"
                    );
                }
                vec![record]
            }
            Step::Frontend => {
                let frontend = &plan.frontend;
                let mut records = vec![
                    self.create(
                        step,
                        ResourceKind::UrlMap,
                        &frontend.url_map,
                        api.create_url_map(frontend),
                    )
                    .await?,
                    self.create(
                        step,
                        ResourceKind::TargetProxy,
                        &frontend.target_proxy,
                        api.create_target_proxy(frontend),
                    )
                    .await?,
                ];
                for rule in &frontend.forwarding_rules {
                    records.push(
                        self.create(
                            step,
                            ResourceKind::ForwardingRule,
                            &rule.name,
                            api.create_forwarding_rule(rule, &frontend.target_proxy),
                        )
                        .await?,
                    );
                }
                records
            }
        };

        Ok(records)
    }

    /// Issue a create call, accepting "already exists"
    async fn create(
        &self,
        step: Step,
        kind: ResourceKind,
        name: &str,
        op: impl Future<Output = GcloudResult<()>>,
    ) -> GcloudResult<ResourceRecord> {
        let outcome = match ignore_already_exists(op.await)? {
            Some(()) => CreateOutcome::Created,
            None => {
                info!(kind = %kind, name = %name, "Already exists, keeping it");
                CreateOutcome::AlreadyExists
            }
        };
        let record = ResourceRecord {
            kind,
            name: name.to_string(),
            outcome,
        };
        self.reporter.resource(step, &record);
        Ok(record)
    }

    /// Create one managed instance group with its named port and autoscaler
    async fn create_group(&self, group: &InstanceGroup) -> Result<ResourceRecord, StepError> {
        let record = self
            .create(
                Step::InstanceGroups,
                ResourceKind::InstanceGroup,
                &group.name,
                self.api.create_instance_group(group),
            )
            .await?;
        self.api.set_named_ports(group).await?;
        self.api.set_autoscaling(group).await?;
        debug!(
            group = %group.name,
            region = %group.region,
            min = group.autoscaling.min_replicas,
            max = group.autoscaling.max_replicas,
            "Autoscaling configured"
        );
        Ok(record)
    }

    /// Check-then-create: baking is slow, so an existing image is reused
    async fn ensure_image(&self) -> Result<ResourceRecord, StepError> {
        let image = &self.plan.image;
        let outcome = if self.api.image_exists(&image.name).await? {
            info!(image = %image.name, "Image already exists, skipping bake");
            CreateOutcome::AlreadyExists
        } else {
            self.bake_image().await?;
            CreateOutcome::Created
        };

        let record = ResourceRecord {
            kind: ResourceKind::Image,
            name: image.name.clone(),
            outcome,
        };
        self.reporter.resource(Step::SourceImage, &record);
        Ok(record)
    }

    /// Builder VM -> startup script done -> stopped -> image -> builder removed
    #[instrument(skip_all, fields(image = %self.plan.image.name))]
    async fn bake_image(&self) -> Result<(), StepError> {
        let api = self.api;
        let image = &self.plan.image;
        let builder = &image.builder;

        if ignore_already_exists(api.create_instance(builder).await)?.is_none() {
            info!(builder = %builder.name, "Reusing existing builder VM");
        }

        self.reporter.waiting("builder startup script to finish");
        poll_until(
            self.timing.startup_script,
            self.cancel,
            || async move {
                let output = api.serial_output(&builder.name, &builder.zone).await?;
                anyhow::Ok(output.contains(STARTUP_COMPLETE_MARKER))
            },
            &builder.name,
        )
        .await?;

        api.stop_instance(&builder.name, &builder.zone).await?;
        self.reporter.waiting("builder VM to stop");
        poll_until(
            self.timing.builder_stopped,
            self.cancel,
            || async move {
                let status = api.instance_status(&builder.name, &builder.zone).await?;
                debug!(builder = %builder.name, status = %status, "Builder status");
                anyhow::Ok(status.is_stopped())
            },
            &builder.name,
        )
        .await?;

        ignore_already_exists(api.create_image(image).await)?;
        info!(image = %image.name, disk = %image.source_disk(), "Image created");

        ignore_not_found(api.delete_instance(&builder.name, &builder.zone).await)?;
        // The boot disk outlives the VM (kept so the image could be taken)
        ignore_not_found(api.delete_disk(image.source_disk(), image.source_disk_zone()).await)?;
        debug!(builder = %builder.name, "Builder VM and disk removed");
        Ok(())
    }

    /// Address of the IPv4 forwarding rule, if it exists yet
    pub async fn frontend_address(&self) -> GcloudResult<Option<String>> {
        match self.plan.frontend.ipv4_rule() {
            Some(rule) => self.api.forwarding_rule_address(&rule.name).await,
            None => Ok(None),
        }
    }
}
