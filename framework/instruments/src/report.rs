mod in_memory_reporter;
mod outcome_file_reporter;

use std::path::PathBuf;

use parking_lot::Mutex;
use tokio::runtime::Handle;

use crate::{Outcome, Summary};

pub use in_memory_reporter::{render_summary, InMemoryReporter};
pub use outcome_file_reporter::OutcomeFileReporter;

/// Receives the results of a run.
///
/// Every outcome the [Aggregator](crate::Aggregator) accepts is passed to
/// [MetricsSink::add_outcome] while the run is in progress. Once all virtual users have stopped,
/// [MetricsSink::finalize] is called exactly once with the sealed [Summary].
pub trait MetricsSink: Send {
    fn add_outcome(&mut self, _outcome: &Outcome) {}

    fn finalize(&mut self, summary: &Summary);
}

/// Reports nothing. Useful for tests and for runs where only the returned [Summary] matters.
#[derive(Debug, Default)]
pub struct NoopReporter;

impl MetricsSink for NoopReporter {
    fn finalize(&mut self, _summary: &Summary) {}
}

/// Fans results out to every configured [MetricsSink].
pub struct Reporter {
    sinks: Vec<Mutex<Box<dyn MetricsSink>>>,
}

impl Reporter {
    pub fn new(sinks: Vec<Box<dyn MetricsSink>>) -> Self {
        Self {
            sinks: sinks.into_iter().map(Mutex::new).collect(),
        }
    }

    pub fn add_outcome(&self, outcome: &Outcome) {
        for sink in &self.sinks {
            sink.lock().add_outcome(outcome);
        }
    }

    pub fn finalize(&self, summary: &Summary) {
        for sink in &self.sinks {
            sink.lock().finalize(summary);
        }
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }
}

impl std::fmt::Debug for Reporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reporter")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

/// Chooses which sinks a run reports to.
pub struct ReportConfig {
    scenario_name: String,
    in_memory: bool,
    outcome_dir: Option<PathBuf>,
    custom: Vec<Box<dyn MetricsSink>>,
}

impl ReportConfig {
    pub fn new(scenario_name: impl Into<String>) -> Self {
        Self {
            scenario_name: scenario_name.into(),
            in_memory: false,
            outcome_dir: None,
            custom: Vec::new(),
        }
    }

    /// Print a summary of the run to the console when it finishes.
    pub fn enable_in_memory(mut self) -> Self {
        self.in_memory = true;
        self
    }

    /// Write every outcome to a JSON lines file in `dir`.
    pub fn enable_outcome_file(mut self, dir: PathBuf) -> Self {
        self.outcome_dir = Some(dir);
        self
    }

    pub fn add_sink(mut self, sink: Box<dyn MetricsSink>) -> Self {
        self.custom.push(sink);
        self
    }

    /// Create the configured sinks. Background writers are spawned on `runtime`.
    pub fn init(self, runtime: &Handle) -> anyhow::Result<Reporter> {
        let mut sinks: Vec<Box<dyn MetricsSink>> = Vec::new();

        if self.in_memory {
            sinks.push(Box::new(InMemoryReporter::new()));
        }

        if let Some(dir) = self.outcome_dir {
            let reporter = OutcomeFileReporter::new(runtime, dir, &self.scenario_name)?;
            log::info!("Writing outcomes to {}", reporter.path().display());
            sinks.push(Box::new(reporter));
        }

        sinks.extend(self.custom);

        Ok(Reporter::new(sinks))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[derive(Default)]
    struct Recorded {
        outcomes: usize,
        finalized: Option<Summary>,
    }

    struct RecordingSink(Arc<Mutex<Recorded>>);

    impl MetricsSink for RecordingSink {
        fn add_outcome(&mut self, _outcome: &Outcome) {
            self.0.lock().outcomes += 1;
        }

        fn finalize(&mut self, summary: &Summary) {
            self.0.lock().finalized = Some(summary.clone());
        }
    }

    #[test]
    fn reporter_fans_out_to_every_sink() {
        let first = Arc::new(Mutex::new(Recorded::default()));
        let second = Arc::new(Mutex::new(Recorded::default()));

        let runtime = tokio::runtime::Runtime::new().unwrap();
        let reporter = ReportConfig::new("fan_out")
            .add_sink(Box::new(RecordingSink(first.clone())))
            .add_sink(Box::new(RecordingSink(second.clone())))
            .add_sink(Box::new(NoopReporter))
            .init(runtime.handle())
            .unwrap();
        assert_eq!(3, reporter.sink_count());

        reporter.add_outcome(&Outcome::success(0, Duration::from_millis(3)));
        reporter.add_outcome(&Outcome::failure(1, Duration::from_millis(3), "nope"));

        let summary = Summary {
            total_iterations: 2,
            success_count: 1,
            failure_count: 1,
            ..Default::default()
        };
        reporter.finalize(&summary);

        for recorded in [first, second] {
            let recorded = recorded.lock();
            assert_eq!(2, recorded.outcomes);
            assert_eq!(Some(&summary), recorded.finalized.as_ref());
        }
    }
}
