use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::Outcome;

/// The number of distinct failure reasons that are tracked individually. Anything beyond this is
/// counted under [OTHER_FAILURE_REASON].
pub const MAX_FAILURE_REASONS: usize = 32;

pub const OTHER_FAILURE_REASON: &str = "(other)";

const UNKNOWN_FAILURE_REASON: &str = "unknown failure";

/// Pass and fail counts for a single named check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckCounts {
    pub passes: u64,
    pub fails: u64,
}

/// Aggregate counts for a run.
///
/// `success_count + failure_count == total_iterations` holds for every summary the
/// [Aggregator] hands out. Abandoned iterations never finished, so they are counted separately and
/// are not part of `total_iterations`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub total_iterations: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub abandoned_iterations: u64,
    pub checks: BTreeMap<String, CheckCounts>,
    pub failure_reasons: BTreeMap<String, u64>,
}

impl Summary {
    /// Fraction of completed iterations that succeeded, or `None` if nothing completed.
    pub fn success_rate(&self) -> Option<f64> {
        if self.total_iterations == 0 {
            None
        } else {
            Some(self.success_count as f64 / self.total_iterations as f64)
        }
    }
}

#[derive(Debug, Default)]
struct AggregatorState {
    summary: Summary,
    in_flight: u64,
    sealed: bool,
}

impl AggregatorState {
    fn count(&mut self, outcome: &Outcome) {
        let summary = &mut self.summary;
        summary.total_iterations += 1;
        if outcome.is_success() {
            summary.success_count += 1;
        } else {
            summary.failure_count += 1;

            let reason = outcome.detail().unwrap_or(UNKNOWN_FAILURE_REASON);
            if let Some(count) = summary.failure_reasons.get_mut(reason) {
                *count += 1;
            } else if summary.failure_reasons.len() < MAX_FAILURE_REASONS {
                summary.failure_reasons.insert(reason.to_string(), 1);
            } else {
                *summary
                    .failure_reasons
                    .entry(OTHER_FAILURE_REASON.to_string())
                    .or_default() += 1;
            }
        }

        for check in outcome.checks() {
            let counts = summary.checks.entry(check.name().to_string()).or_default();
            if check.passed() {
                counts.passes += 1;
            } else {
                counts.fails += 1;
            }
        }
    }
}

/// Collects outcomes from every virtual user into a [Summary].
///
/// All counters sit behind one lock so that each outcome is counted exactly once and every
/// snapshot is a consistent point-in-time view.
#[derive(Debug, Default)]
pub struct Aggregator {
    state: Mutex<AggregatorState>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an outcome. Returns false if the aggregator has been sealed, in which case the
    /// outcome is dropped.
    pub fn record(&self, outcome: &Outcome) -> bool {
        let mut state = self.state.lock();
        if state.sealed {
            log::debug!(
                "Dropping outcome from virtual user {} because the run has been finalized",
                outcome.virtual_user()
            );
            return false;
        }

        state.count(outcome);
        true
    }

    /// Register an iteration that is about to run.
    ///
    /// Returns `None` once the aggregator has been sealed. An iteration that is still pending when
    /// the aggregator is sealed is counted as abandoned.
    pub fn begin_iteration(self: &Arc<Self>) -> Option<PendingIteration> {
        let mut state = self.state.lock();
        if state.sealed {
            return None;
        }

        state.in_flight += 1;
        Some(PendingIteration {
            aggregator: self.clone(),
        })
    }

    pub fn snapshot(&self) -> Summary {
        self.state.lock().summary.clone()
    }

    pub fn in_flight(&self) -> u64 {
        self.state.lock().in_flight
    }

    pub fn is_sealed(&self) -> bool {
        self.state.lock().sealed
    }

    /// Stop accepting outcomes and produce the final summary.
    ///
    /// Sealing more than once is allowed and returns the same summary.
    pub fn seal(&self) -> Summary {
        let mut state = self.state.lock();
        if !state.sealed {
            state.sealed = true;
            state.summary.abandoned_iterations += state.in_flight;
            state.in_flight = 0;
        }

        state.summary.clone()
    }
}

/// An iteration that has started but not yet been recorded.
#[must_use = "a pending iteration that is never completed is counted as abandoned"]
#[derive(Debug)]
pub struct PendingIteration {
    aggregator: Arc<Aggregator>,
}

impl PendingIteration {
    /// Record the outcome of this iteration. Returns false if the aggregator was sealed while the
    /// iteration was running, in which case it has already been counted as abandoned and the
    /// outcome is dropped.
    pub fn complete(self, outcome: &Outcome) -> bool {
        self.complete_with(outcome, |_| {})
    }

    /// Like [PendingIteration::complete], and calls `on_accepted` if the outcome was counted.
    ///
    /// `on_accepted` runs while the aggregator is locked, so it has finished before
    /// [Aggregator::seal] can return. Anything it forwards the outcome to sees it before the
    /// final summary.
    pub fn complete_with(self, outcome: &Outcome, on_accepted: impl FnOnce(&Outcome)) -> bool {
        let mut state = self.aggregator.state.lock();
        if state.sealed {
            log::debug!(
                "Dropping abandoned iteration outcome from virtual user {}",
                outcome.virtual_user()
            );
            return false;
        }

        state.in_flight -= 1;
        state.count(outcome);
        on_accepted(outcome);
        true
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::CheckResult;

    fn ok(vu: usize) -> Outcome {
        Outcome::success(vu, Duration::from_millis(1))
    }

    fn failed(vu: usize, detail: &str) -> Outcome {
        Outcome::failure(vu, Duration::from_millis(1), detail)
    }

    #[test]
    fn concurrent_records_are_not_lost() {
        const VIRTUAL_USERS: usize = 16;
        const PER_USER: usize = 2_000;

        let aggregator = Aggregator::new();
        std::thread::scope(|s| {
            for vu in 0..VIRTUAL_USERS {
                let aggregator = &aggregator;
                s.spawn(move || {
                    for i in 0..PER_USER {
                        if i % 3 == 0 {
                            aggregator.record(&failed(vu, "boom"));
                        } else {
                            aggregator.record(&ok(vu));
                        }
                    }
                });
            }
        });

        let summary = aggregator.snapshot();
        assert_eq!((VIRTUAL_USERS * PER_USER) as u64, summary.total_iterations);
        assert_eq!(
            summary.total_iterations,
            summary.success_count + summary.failure_count
        );
        assert_eq!(Some(&summary.failure_count), summary.failure_reasons.get("boom"));
    }

    #[test]
    fn snapshots_during_recording_are_consistent() {
        let aggregator = Aggregator::new();
        std::thread::scope(|s| {
            for vu in 0..4 {
                let aggregator = &aggregator;
                s.spawn(move || {
                    for i in 0..5_000 {
                        if i % 2 == 0 {
                            aggregator.record(&ok(vu));
                        } else {
                            aggregator.record(&failed(vu, "bad"));
                        }
                    }
                });
            }

            let aggregator = &aggregator;
            s.spawn(move || {
                for _ in 0..1_000 {
                    let summary = aggregator.snapshot();
                    assert_eq!(
                        summary.total_iterations,
                        summary.success_count + summary.failure_count
                    );
                }
            });
        });
    }

    #[test]
    fn sealed_aggregator_drops_outcomes() {
        let aggregator = Aggregator::new();
        assert!(aggregator.record(&ok(0)));

        let sealed = aggregator.seal();
        assert!(!aggregator.record(&ok(0)));

        assert_eq!(sealed, aggregator.snapshot());
        assert_eq!(1, sealed.total_iterations);
        assert!(aggregator.is_sealed());
    }

    #[test]
    fn pending_iterations_are_abandoned_on_seal() {
        let aggregator = Arc::new(Aggregator::new());

        let finished = aggregator.begin_iteration().unwrap();
        let stuck = aggregator.begin_iteration().unwrap();
        assert_eq!(2, aggregator.in_flight());

        assert!(finished.complete(&ok(0)));

        let summary = aggregator.seal();
        assert_eq!(1, summary.total_iterations);
        assert_eq!(1, summary.abandoned_iterations);
        assert_eq!(0, aggregator.in_flight());

        // The late outcome is dropped, it was already counted as abandoned.
        assert!(!stuck.complete(&failed(1, "late")));
        assert_eq!(summary, aggregator.snapshot());

        assert!(aggregator.begin_iteration().is_none());
    }

    #[test]
    fn accepted_outcome_is_forwarded_before_seal_can_finish() {
        let aggregator = Arc::new(Aggregator::new());

        let pending = aggregator.begin_iteration().unwrap();
        let mut forwarded = 0;
        assert!(pending.complete_with(&ok(0), |outcome| {
            // Still holding the lock, so a concurrent seal is waiting on this.
            assert!(aggregator.state.try_lock().is_none());
            assert!(outcome.is_success());
            forwarded += 1;
        }));
        assert_eq!(1, forwarded);

        let late = aggregator.begin_iteration().unwrap();
        aggregator.seal();
        assert!(!late.complete_with(&ok(1), |_| forwarded += 1));
        assert_eq!(1, forwarded);
    }

    #[test]
    fn failure_reasons_are_bounded() {
        let aggregator = Aggregator::new();
        for i in 0..(MAX_FAILURE_REASONS + 10) {
            aggregator.record(&failed(0, &format!("reason {i}")));
        }
        aggregator.record(&Outcome::failure(0, Duration::ZERO, "reason 0"));

        let summary = aggregator.snapshot();
        assert_eq!(MAX_FAILURE_REASONS + 1, summary.failure_reasons.len());
        assert_eq!(Some(&10), summary.failure_reasons.get(OTHER_FAILURE_REASON));
        assert_eq!(Some(&2), summary.failure_reasons.get("reason 0"));
    }

    #[test]
    fn checks_are_counted_per_name() {
        let aggregator = Aggregator::new();
        aggregator.record(&ok(0).with_checks(vec![
            CheckResult::new("is status 200", true),
            CheckResult::new("is valid JSON", true),
        ]));
        aggregator.record(&failed(1, "check failed: is valid JSON").with_checks(vec![
            CheckResult::new("is status 200", true),
            CheckResult::new("is valid JSON", false),
        ]));

        let summary = aggregator.snapshot();
        assert_eq!(
            CheckCounts {
                passes: 2,
                fails: 0
            },
            summary.checks["is status 200"]
        );
        assert_eq!(
            CheckCounts {
                passes: 1,
                fails: 1
            },
            summary.checks["is valid JSON"]
        );
        assert_eq!(Some(0.5), summary.success_rate());
    }

    #[test]
    fn empty_summary_has_no_success_rate() {
        assert_eq!(None, Summary::default().success_rate());
    }
}
