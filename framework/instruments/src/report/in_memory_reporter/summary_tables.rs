use tabled::Tabled;

use crate::{CheckCounts, Summary};

#[derive(Tabled)]
pub struct TotalsRow {
    pub total_iterations: u64,
    pub successes: u64,
    pub failures: u64,
    pub abandoned: u64,
    #[tabled(display = "percent")]
    pub success_rate: Option<f64>,
}

impl From<&Summary> for TotalsRow {
    fn from(summary: &Summary) -> Self {
        Self {
            total_iterations: summary.total_iterations,
            successes: summary.success_count,
            failures: summary.failure_count,
            abandoned: summary.abandoned_iterations,
            success_rate: summary.success_rate(),
        }
    }
}

#[derive(Tabled)]
pub struct CheckRow {
    pub check: String,
    pub passes: u64,
    pub fails: u64,
    #[tabled(display = "percent")]
    pub pass_rate: Option<f64>,
}

impl CheckRow {
    pub fn new(name: &str, counts: &CheckCounts) -> Self {
        let total = counts.passes + counts.fails;
        Self {
            check: name.to_string(),
            passes: counts.passes,
            fails: counts.fails,
            pass_rate: (total > 0).then(|| counts.passes as f64 / total as f64),
        }
    }
}

#[derive(Tabled)]
pub struct FailureReasonRow {
    pub reason: String,
    pub count: u64,
}

fn percent(rate: &Option<f64>) -> String {
    match rate {
        Some(rate) => format!("{:.2}%", rate * 100.0),
        None => "n/a".to_string(),
    }
}
