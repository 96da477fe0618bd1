//! Table rendering for status snapshots and probes

use super::{GroupStatus, LoadBalancerStatus, StatusSnapshot};
use crate::gcloud::models::resource_name;
use crate::probe::ProbeSample;
use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, ContentArrangement, Table};
use std::fmt::Write;

fn table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header.iter().map(Cell::new).collect::<Vec<_>>());
    table
}

fn or_dash<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

/// Render a snapshot as stacked tables followed by any warnings
pub fn render_snapshot(snapshot: &StatusSnapshot) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "=== Status ({}) at {} ===",
        snapshot.view,
        snapshot.taken_at.format("%Y-%m-%d %H:%M:%S UTC")
    );

    if let Some(lb) = &snapshot.load_balancer {
        let _ = writeln!(out, "\nForwarding rules\n{}", forwarding_rules_table(lb));
        let _ = writeln!(out, "\nBackends\n{}", backends_table(lb));
    }

    if !snapshot.groups.is_empty() {
        let _ = writeln!(out, "\nInstance groups\n{}", groups_table(snapshot));
        for group in &snapshot.groups {
            let _ = writeln!(out, "\n{} instances\n{}", group.name, instances_table(group));
        }
    }

    for warning in &snapshot.warnings {
        let _ = writeln!(out, "warning: {warning}");
    }
    out
}

fn forwarding_rules_table(lb: &LoadBalancerStatus) -> Table {
    let mut table = table(&["Name", "IP version", "Address", "Ports", "Target"]);
    for rule in &lb.forwarding_rules {
        table.add_row(vec![
            Cell::new(&rule.name),
            Cell::new(or_dash(rule.ip_version.as_deref())),
            Cell::new(or_dash(rule.ip_address.as_deref())),
            Cell::new(or_dash(rule.port_range.as_deref())),
            Cell::new(or_dash(rule.target.as_deref().map(resource_name))),
        ]);
    }
    table
}

fn backends_table(lb: &LoadBalancerStatus) -> Table {
    let mut table = table(&["Group", "Mode", "Capacity", "Scaler", "Healthy"]);
    let Some(service) = &lb.backend_service else {
        return table;
    };

    for backend in &service.backends {
        let group = resource_name(&backend.group);
        let capacity = match (backend.max_rate_per_instance, backend.max_utilization) {
            (Some(rate), _) => format!("{rate} rps/instance"),
            (None, Some(util)) => format!("{:.0}% utilization", util * 100.0),
            (None, None) => "-".to_string(),
        };
        let healthy = lb
            .group_health(group)
            .map_or_else(|| "-".to_string(), |(ok, total)| format!("{ok}/{total}"));

        table.add_row(vec![
            Cell::new(group),
            Cell::new(or_dash(backend.balancing_mode.as_deref())),
            Cell::new(capacity),
            Cell::new(or_dash(backend.capacity_scaler)),
            Cell::new(healthy),
        ]);
    }
    table
}

fn groups_table(snapshot: &StatusSnapshot) -> Table {
    let mut table = table(&["Group", "Region", "Size", "Autoscaling", "Stable"]);
    for group in &snapshot.groups {
        table.add_row(vec![
            Cell::new(&group.name),
            Cell::new(&group.region),
            Cell::new(or_dash(group.target_size)),
            Cell::new(
                group
                    .autoscaling
                    .map_or_else(|| "-".to_string(), |(min, max)| format!("{min}-{max}")),
            ),
            Cell::new(if group.stable { "yes" } else { "no" }),
        ]);
    }
    table
}

fn instances_table(group: &GroupStatus) -> Table {
    let mut table = table(&["Instance", "Status", "Action"]);
    for instance in &group.instances {
        table.add_row(vec![
            Cell::new(instance.name()),
            Cell::new(or_dash(instance.instance_status.as_deref())),
            Cell::new(or_dash(instance.current_action.as_deref())),
        ]);
    }
    table
}

/// One line per probe: timestamp, status, latency, marker
pub fn render_probe(sample: &ProbeSample, marker: &str) -> String {
    let status = match (sample.status, &sample.error) {
        (Some(code), _) => code.to_string(),
        (None, Some(error)) => format!("error ({error})"),
        (None, None) => "error".to_string(),
    };
    format!(
        "{}  status={}  latency={:.1}ms  marker '{}' {}",
        sample.at.format("%H:%M:%S"),
        status,
        sample.latency.as_secs_f64() * 1000.0,
        marker,
        if sample.marker_found { "found" } else { "missing" }
    )
}
