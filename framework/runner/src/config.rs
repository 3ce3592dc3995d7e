use std::time::{Duration, Instant};

/// How long the runner waits for in-flight iterations after the run duration is up, unless the
/// scenario or CLI says otherwise.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(10);

/// Returned from [run](crate::prelude::run) when the run cannot start because its configuration is
/// not usable. Nothing has been started when this is returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidConfig {
    #[error("Invalid configuration: at least one virtual user is required")]
    NoVirtualUsers,
    #[error("Invalid configuration: the run duration must be greater than zero")]
    ZeroDuration,
    #[error("Invalid configuration: no run duration was set, use `--duration` or a default duration")]
    MissingDuration,
    #[error("Invalid configuration: the run duration is too long to schedule")]
    DurationTooLong,
}

/// The load shape of a run. Read-only once the run has started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub virtual_users: usize,
    pub duration: Duration,
    pub iteration_delay: Duration,
    pub grace_period: Duration,
}

impl RunConfig {
    pub fn new(virtual_users: usize, duration: Duration, iteration_delay: Duration) -> Self {
        Self {
            virtual_users,
            duration,
            iteration_delay,
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn validate(&self) -> Result<(), InvalidConfig> {
        if self.virtual_users == 0 {
            return Err(InvalidConfig::NoVirtualUsers);
        }

        if self.duration.is_zero() {
            return Err(InvalidConfig::ZeroDuration);
        }

        if Instant::now().checked_add(self.duration).is_none() {
            return Err(InvalidConfig::DurationTooLong);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_config() {
        let config = RunConfig::new(10, Duration::from_secs(2), Duration::ZERO);
        assert_eq!(Ok(()), config.validate());
        assert_eq!(DEFAULT_GRACE_PERIOD, config.grace_period);
    }

    #[test]
    fn zero_virtual_users_is_invalid() {
        let config = RunConfig::new(0, Duration::from_secs(2), Duration::from_secs(1));
        assert_eq!(Err(InvalidConfig::NoVirtualUsers), config.validate());
    }

    #[test]
    fn zero_duration_is_invalid() {
        let config = RunConfig::new(1, Duration::ZERO, Duration::from_secs(1));
        assert_eq!(Err(InvalidConfig::ZeroDuration), config.validate());
    }

    #[test]
    fn unschedulable_duration_is_invalid() {
        let config = RunConfig::new(1, Duration::MAX, Duration::ZERO);
        assert_eq!(Err(InvalidConfig::DurationTooLong), config.validate());

        let config = RunConfig::new(1, Duration::from_secs(u64::MAX), Duration::ZERO);
        assert_eq!(Err(InvalidConfig::DurationTooLong), config.validate());
    }
}
