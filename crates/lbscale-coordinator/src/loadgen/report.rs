//! ApacheBench (`ab`) summary parsing
//!
//! Only the `Key: value` summary block and the percentile table are read.
//! Values are surfaced exactly as ab printed them (no rescaling).

use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, ContentArrangement, Table};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ReportParseError {
    /// A field every completed ab run prints was absent
    #[error("benchmark output has no '{0}' line (did ab finish?)")]
    MissingField(&'static str),

    #[error("benchmark field '{field}' has unparseable value '{value}'")]
    InvalidValue { field: &'static str, value: String },
}

/// Parsed ab summary
#[derive(Debug, Clone, PartialEq)]
pub struct AbReport {
    pub complete_requests: u64,
    pub failed_requests: u64,
    pub non_2xx_responses: Option<u64>,
    pub concurrency: Option<u32>,
    pub time_taken: Option<Duration>,
    pub requests_per_second: Option<f64>,
    /// Mean time per request as seen by one client (ms)
    pub time_per_request_ms: Option<f64>,
    pub transfer_rate_kbps: Option<f64>,
    /// (percentile, ms) pairs from the "served within" table
    pub percentiles: Vec<(u8, u64)>,
}

const COMPLETE: &str = "Complete requests";
const FAILED: &str = "Failed requests";

/// First whitespace-separated token of a summary value, without trailing
/// punctuation (`500000.`)
fn first_token(value: &str) -> &str {
    value
        .split_whitespace()
        .next()
        .unwrap_or("")
        .trim_end_matches([',', ';', '.'])
}

fn number<T: std::str::FromStr>(field: &'static str, value: &str) -> Result<T, ReportParseError> {
    let token = first_token(value);
    token.parse().map_err(|_| ReportParseError::InvalidValue {
        field,
        value: token.to_string(),
    })
}

/// `  95%    412` or ` 100%   3011 (longest request)`
fn percentile_line(line: &str) -> Option<(u8, u64)> {
    let mut parts = line.split_whitespace();
    let pct = parts.next()?.strip_suffix('%')?.parse().ok()?;
    let ms = parts.next()?.parse().ok()?;
    Some((pct, ms))
}

impl AbReport {
    pub fn parse(text: &str) -> Result<Self, ReportParseError> {
        let mut complete = None;
        let mut failed = None;
        let mut report = AbReport {
            complete_requests: 0,
            failed_requests: 0,
            non_2xx_responses: None,
            concurrency: None,
            time_taken: None,
            requests_per_second: None,
            time_per_request_ms: None,
            transfer_rate_kbps: None,
            percentiles: Vec::new(),
        };

        for line in text.lines() {
            if let Some(entry) = percentile_line(line) {
                report.percentiles.push(entry);
                continue;
            }

            // Compact summaries put several `key: value` pairs on one line
            for pair in line.split([',', ';']) {
                let Some((key, value)) = pair.split_once(':') else {
                    continue;
                };
                match key.trim() {
                    COMPLETE => complete = Some(number(COMPLETE, value)?),
                    FAILED => failed = Some(number(FAILED, value)?),
                    "Non-2xx responses" => {
                        report.non_2xx_responses = Some(number("Non-2xx responses", value)?)
                    }
                    "Concurrency Level" => {
                        report.concurrency = Some(number("Concurrency Level", value)?)
                    }
                    "Time taken for tests" => {
                        let secs: f64 = number("Time taken for tests", value)?;
                        report.time_taken = Duration::try_from_secs_f64(secs).ok();
                    }
                    "Requests per second" => {
                        report.requests_per_second = Some(number("Requests per second", value)?)
                    }
                    // ab prints this twice; the first is the per-client mean
                    "Time per request" if report.time_per_request_ms.is_none() => {
                        report.time_per_request_ms = Some(number("Time per request", value)?)
                    }
                    "Transfer rate" => {
                        report.transfer_rate_kbps = Some(number("Transfer rate", value)?)
                    }
                    _ => {}
                }
            }
        }

        report.complete_requests = complete.ok_or(ReportParseError::MissingField(COMPLETE))?;
        report.failed_requests = failed.ok_or(ReportParseError::MissingField(FAILED))?;
        Ok(report)
    }

    /// Percentile latency in ms, if ab printed it
    pub fn percentile(&self, pct: u8) -> Option<u64> {
        self.percentiles
            .iter()
            .find(|(p, _)| *p == pct)
            .map(|(_, ms)| *ms)
    }

    pub fn to_table(&self) -> Table {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL_CONDENSED)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec![Cell::new("Metric"), Cell::new("Value")]);

        let mut row = |metric: &str, value: String| {
            table.add_row(vec![Cell::new(metric), Cell::new(value)]);
        };

        row(COMPLETE, self.complete_requests.to_string());
        row(FAILED, self.failed_requests.to_string());
        if let Some(n) = self.non_2xx_responses {
            row("Non-2xx responses", n.to_string());
        }
        if let Some(c) = self.concurrency {
            row("Concurrency", c.to_string());
        }
        if let Some(t) = self.time_taken {
            row("Time taken", format!("{:.3} s", t.as_secs_f64()));
        }
        if let Some(rps) = self.requests_per_second {
            row("Requests per second", format!("{rps:.2}"));
        }
        if let Some(ms) = self.time_per_request_ms {
            row("Time per request (mean)", format!("{ms:.3} ms"));
        }
        if let Some(rate) = self.transfer_rate_kbps {
            row("Transfer rate", format!("{rate:.2} KB/s"));
        }
        for pct in [50, 90, 99] {
            if let Some(ms) = self.percentile(pct) {
                row(&format!("p{pct}"), format!("{ms} ms"));
            }
        }
        table
    }
}
