//! Core types for the orchestrators
//!
//! `Step` fixes the provisioning pipeline order; teardown walks the same
//! list backwards.

use crate::gcloud::GcloudError;
use crate::plan::ResourcePlan;
use crate::wait::WaitError;
use lbscale_common::ResourceKind;
use std::time::Duration;
use thiserror::Error;

/// One stage of the provisioning pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "kebab-case")]
pub enum Step {
    /// Ingress rule for health-check probes
    Firewall,
    /// Router and NAT for outbound access from private instances
    RouterNat,
    /// Web server image baked on a builder VM
    SourceImage,
    InstanceTemplate,
    HealthCheck,
    /// Both regional managed instance groups with autoscaling
    InstanceGroups,
    BackendService,
    /// URL map, target proxy and forwarding rules
    Frontend,
}

impl Step {
    /// Creation order; each step only references resources from earlier steps
    pub const PROVISION_ORDER: [Step; 8] = [
        Step::Firewall,
        Step::RouterNat,
        Step::SourceImage,
        Step::InstanceTemplate,
        Step::HealthCheck,
        Step::InstanceGroups,
        Step::BackendService,
        Step::Frontend,
    ];

    /// Deletion order: exactly the reverse of [`Step::PROVISION_ORDER`]
    pub fn teardown_order() -> [Step; 8] {
        let mut order = Self::PROVISION_ORDER;
        order.reverse();
        order
    }

    /// Resources this step creates, in creation order
    pub fn planned_resources(self, plan: &ResourcePlan) -> Vec<(ResourceKind, String)> {
        match self {
            Step::Firewall => vec![(ResourceKind::FirewallRule, plan.firewall.name.clone())],
            Step::RouterNat => vec![
                (ResourceKind::Router, plan.router_nat.router.clone()),
                (ResourceKind::Nat, plan.router_nat.nat.clone()),
            ],
            Step::SourceImage => vec![(ResourceKind::Image, plan.image.name.clone())],
            Step::InstanceTemplate => {
                vec![(ResourceKind::InstanceTemplate, plan.template.name.clone())]
            }
            Step::HealthCheck => vec![(ResourceKind::HealthCheck, plan.health_check.name.clone())],
            Step::InstanceGroups => plan
                .groups
                .iter()
                .map(|g| (ResourceKind::InstanceGroup, g.name.clone()))
                .collect(),
            Step::BackendService => vec![(
                ResourceKind::BackendService,
                plan.backend_service.name.clone(),
            )],
            Step::Frontend => {
                let frontend = &plan.frontend;
                let mut resources = vec![
                    (ResourceKind::UrlMap, frontend.url_map.clone()),
                    (ResourceKind::TargetProxy, frontend.target_proxy.clone()),
                ];
                resources.extend(
                    frontend
                        .forwarding_rules
                        .iter()
                        .map(|r| (ResourceKind::ForwardingRule, r.name.clone())),
                );
                resources
            }
        }
    }
}

/// Result of one create call
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum CreateOutcome {
    Created,
    /// Left over from an earlier run and accepted as-is
    AlreadyExists,
}

/// A resource touched by a provisioning step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRecord {
    pub kind: ResourceKind,
    pub name: String,
    pub outcome: CreateOutcome,
}

/// Summary of a completed step
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub step: Step,
    pub resources: Vec<ResourceRecord>,
    pub elapsed: Duration,
}

impl StepOutcome {
    pub fn created(&self) -> usize {
        self.resources
            .iter()
            .filter(|r| r.outcome == CreateOutcome::Created)
            .count()
    }

    /// Every resource of the step was already present
    pub fn was_noop(&self) -> bool {
        self.resources
            .iter()
            .all(|r| r.outcome == CreateOutcome::AlreadyExists)
    }
}

/// Why a single step failed
#[derive(Debug, Error)]
pub enum StepError {
    #[error(transparent)]
    Gcloud(#[from] GcloudError),

    #[error(transparent)]
    Wait(#[from] WaitError),
}

#[derive(Debug, Error)]
pub enum ProvisionError {
    /// A step failed; earlier steps' resources are left in place
    #[error(
        "provisioning step '{step}' failed; resources from earlier steps were left in place \
         (re-run setup to resume or run `lbscale cleanup` to remove them)"
    )]
    StepFailed {
        step: Step,
        #[source]
        source: StepError,
    },
}

impl ProvisionError {
    pub fn step(&self) -> Step {
        match self {
            ProvisionError::StepFailed { step, .. } => *step,
        }
    }
}

/// Result of a single deletion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupResult {
    /// Resource was successfully deleted
    Deleted,
    /// Resource was already deleted (not found)
    AlreadyDeleted,
    /// Deletion failed with error
    Failed,
    /// Operator declined the deletion
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionRecord {
    pub kind: ResourceKind,
    pub name: String,
    pub result: CleanupResult,
}

/// Report of a teardown run
#[derive(Debug, Default, Clone)]
pub struct TeardownReport {
    /// Operator declined the top-level confirmation; nothing was touched
    pub declined: bool,
    pub deletions: Vec<DeletionRecord>,
}

impl TeardownReport {
    pub fn declined() -> Self {
        Self {
            declined: true,
            deletions: Vec::new(),
        }
    }

    pub fn record(&mut self, kind: ResourceKind, name: impl Into<String>, result: CleanupResult) {
        self.deletions.push(DeletionRecord {
            kind,
            name: name.into(),
            result,
        });
    }

    fn count(&self, result: CleanupResult) -> usize {
        self.deletions.iter().filter(|d| d.result == result).count()
    }

    pub fn deleted(&self) -> usize {
        self.count(CleanupResult::Deleted)
    }

    pub fn already_deleted(&self) -> usize {
        self.count(CleanupResult::AlreadyDeleted)
    }

    pub fn failed(&self) -> usize {
        self.count(CleanupResult::Failed)
    }

    pub fn skipped(&self) -> usize {
        self.count(CleanupResult::Skipped)
    }

    pub fn has_failures(&self) -> bool {
        self.failed() > 0
    }

    /// Names of resources whose deletion failed
    pub fn failures(&self) -> impl Iterator<Item = &DeletionRecord> {
        self.deletions
            .iter()
            .filter(|d| d.result == CleanupResult::Failed)
    }
}
