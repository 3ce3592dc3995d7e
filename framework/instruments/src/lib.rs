mod aggregator;
mod outcome;
mod report;

pub use aggregator::{
    Aggregator, CheckCounts, PendingIteration, Summary, MAX_FAILURE_REASONS, OTHER_FAILURE_REASON,
};
pub use outcome::{CheckResult, Outcome};
pub use report::{
    render_summary, InMemoryReporter, MetricsSink, NoopReporter, OutcomeFileReporter,
    ReportConfig, Reporter,
};
