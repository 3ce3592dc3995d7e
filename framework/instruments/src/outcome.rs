use std::time::{Duration, SystemTime};

/// A named assertion made by a scenario during a single iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    name: String,
    passed: bool,
}

impl CheckResult {
    pub fn new(name: impl Into<String>, passed: bool) -> Self {
        Self {
            name: name.into(),
            passed,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn passed(&self) -> bool {
        self.passed
    }
}

/// The result of one scenario invocation by one virtual user.
///
/// An outcome is built once, when the iteration finishes, and is not changed after it has been
/// handed to the [Aggregator](crate::Aggregator).
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    success: bool,
    timestamp: SystemTime,
    elapsed: Duration,
    detail: Option<String>,
    virtual_user: usize,
    checks: Vec<CheckResult>,
}

impl Outcome {
    pub fn success(virtual_user: usize, elapsed: Duration) -> Self {
        Self {
            success: true,
            timestamp: SystemTime::now(),
            elapsed,
            detail: None,
            virtual_user,
            checks: Vec::new(),
        }
    }

    pub fn failure(virtual_user: usize, elapsed: Duration, detail: impl Into<String>) -> Self {
        Self {
            success: false,
            timestamp: SystemTime::now(),
            elapsed,
            detail: Some(detail.into()),
            virtual_user,
            checks: Vec::new(),
        }
    }

    /// Set the time the iteration started. Defaults to the time the outcome was created.
    pub fn with_timestamp(mut self, timestamp: SystemTime) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_checks(mut self, checks: Vec<CheckResult>) -> Self {
        self.checks = checks;
        self
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    pub fn virtual_user(&self) -> usize {
        self.virtual_user
    }

    pub fn checks(&self) -> &[CheckResult] {
        &self.checks
    }

    pub fn failed_checks(&self) -> impl Iterator<Item = &CheckResult> {
        self.checks.iter().filter(|c| !c.passed())
    }
}
