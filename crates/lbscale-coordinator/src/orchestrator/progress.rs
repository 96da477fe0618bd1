//! Progress reporting abstractions for the orchestrators

use super::types::{ResourceRecord, Step, StepOutcome};
use tracing::info;

/// Trait for reporting provisioning progress
///
/// Keeps the pipeline independent of where progress ends up (log lines in
/// the CLI, a recorder in tests).
pub trait ProgressReporter: Send + Sync {
    /// A step is about to run
    fn step_started(&self, step: Step);

    /// A resource was created or found already present
    fn resource(&self, step: Step, record: &ResourceRecord);

    /// A long wait inside a step (image baking, LB readiness)
    fn waiting(&self, what: &str);

    /// A step completed
    fn step_finished(&self, outcome: &StepOutcome);
}

/// Progress reporter that emits `tracing` events
pub struct LogReporter;

impl LogReporter {
    /// Create a new log reporter
    pub fn new() -> Self {
        Self
    }
}

impl Default for LogReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for LogReporter {
    fn step_started(&self, step: Step) {
        info!(step = %step, "Starting step");
    }

    fn resource(&self, step: Step, record: &ResourceRecord) {
        info!(
            step = %step,
            kind = %record.kind,
            name = %record.name,
            outcome = %record.outcome,
            "Resource ready"
        );
    }

    fn waiting(&self, what: &str) {
        info!("Waiting for {what}");
    }

    fn step_finished(&self, outcome: &StepOutcome) {
        info!(
            step = %outcome.step,
            created = outcome.created(),
            existing = outcome.resources.len() - outcome.created(),
            elapsed_secs = outcome.elapsed.as_secs(),
            "Step complete"
        );
    }
}
