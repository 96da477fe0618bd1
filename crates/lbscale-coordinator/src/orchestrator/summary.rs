//! Summary tables for setup, dry runs and teardown

use super::types::{CleanupResult, Step, StepOutcome, TeardownReport};
use crate::plan::ResourcePlan;
use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, ContentArrangement, Table};

fn table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header.iter().map(Cell::new).collect::<Vec<_>>());
    table
}

/// Every resource setup would create, in order
pub fn plan_table(plan: &ResourcePlan) -> Table {
    let mut table = table(&["#", "Step", "Kind", "Name"]);
    for (i, step) in Step::PROVISION_ORDER.iter().enumerate() {
        for (kind, name) in step.planned_resources(plan) {
            table.add_row(vec![
                Cell::new(i + 1),
                Cell::new(step),
                Cell::new(kind),
                Cell::new(name),
            ]);
        }
    }
    table
}

pub fn setup_table(steps: &[StepOutcome]) -> Table {
    let mut table = table(&["Step", "Created", "Already present", "Elapsed (s)"]);
    for outcome in steps {
        table.add_row(vec![
            Cell::new(outcome.step),
            Cell::new(outcome.created()),
            Cell::new(outcome.resources.len() - outcome.created()),
            Cell::new(format!("{:.1}", outcome.elapsed.as_secs_f64())),
        ]);
    }
    table
}

fn result_label(result: CleanupResult) -> &'static str {
    match result {
        CleanupResult::Deleted => "deleted",
        CleanupResult::AlreadyDeleted => "already gone",
        CleanupResult::Failed => "FAILED",
        CleanupResult::Skipped => "kept",
    }
}

pub fn teardown_table(report: &TeardownReport) -> Table {
    let mut table = table(&["Kind", "Name", "Result"]);
    for deletion in &report.deletions {
        table.add_row(vec![
            Cell::new(deletion.kind),
            Cell::new(&deletion.name),
            Cell::new(result_label(deletion.result)),
        ]);
    }
    table
}
