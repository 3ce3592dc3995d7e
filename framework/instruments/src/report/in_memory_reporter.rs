mod summary_tables;

use std::fmt::Write as _;

use tabled::settings::Style;
use tabled::Table;

use crate::report::in_memory_reporter::summary_tables::{CheckRow, FailureReasonRow, TotalsRow};
use crate::report::MetricsSink;
use crate::Summary;

/// A very basic reporter that is useful while developing scenarios. It prints a summary of the run
/// to the console once the run has finished.
#[derive(Debug, Default)]
pub struct InMemoryReporter;

impl InMemoryReporter {
    pub fn new() -> Self {
        Self
    }
}

impl MetricsSink for InMemoryReporter {
    fn finalize(&mut self, summary: &Summary) {
        println!("{}", render_summary(summary));
    }
}

/// Render the totals, checks and failure reasons of a run as console tables.
pub fn render_summary(summary: &Summary) -> String {
    let mut out = String::new();

    let mut totals = Table::new([TotalsRow::from(summary)]);
    totals.with(Style::modern());
    let _ = write!(out, "\nSummary of iterations\n{totals}\n");

    if !summary.checks.is_empty() {
        let rows = summary
            .checks
            .iter()
            .map(|(name, counts)| CheckRow::new(name, counts))
            .collect::<Vec<_>>();
        let mut checks = Table::new(rows);
        checks.with(Style::modern());
        let _ = write!(out, "\nChecks\n{checks}\n");
    }

    if !summary.failure_reasons.is_empty() {
        let mut rows = summary
            .failure_reasons
            .iter()
            .map(|(reason, count)| FailureReasonRow {
                reason: reason.clone(),
                count: *count,
            })
            .collect::<Vec<_>>();
        rows.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.reason.cmp(&b.reason)));

        let mut reasons = Table::new(rows);
        reasons.with(Style::modern());
        let _ = write!(out, "\nFailure reasons\n{reasons}\n");
    }

    out
}
