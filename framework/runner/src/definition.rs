use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use stampede_instruments::{MetricsSink, ReportConfig};

use crate::cli::{ReporterOpt, StampedeScenarioCli};
use crate::config::{InvalidConfig, RunConfig, DEFAULT_GRACE_PERIOD};
use crate::context::{RunnerContext, UserValuesConstraint, VirtualUserContext};
use crate::init::init;

pub type HookResult = anyhow::Result<()>;

pub type GlobalHookMut<RV> = fn(&mut RunnerContext<RV>) -> HookResult;
pub type GlobalHook<RV> = fn(Arc<RunnerContext<RV>>) -> HookResult;
pub type VirtualUserHookMut<RV, V> = fn(&mut VirtualUserContext<RV, V>) -> HookResult;

/// The builder for a scenario definition.
///
/// This must be used at the start of a test to define the scenario that you want to run.
pub struct ScenarioDefinitionBuilder<RV: UserValuesConstraint, V: UserValuesConstraint> {
    /// The name of the scenario, which should be unique within the test suite.
    ///
    /// Recommended value is `env!("CARGO_PKG_NAME")`.
    name: String,
    cli: StampedeScenarioCli,
    default_virtual_users: usize,
    default_duration: Option<Duration>,
    default_iteration_delay: Duration,
    default_grace_period: Duration,
    /// Global setup hook for this scenario. It will be run once, before any virtual users are started.
    setup_fn: Option<GlobalHookMut<RV>>,
    /// Setup hook for a virtual user, which will be run once for each virtual user as it starts.
    ///
    /// A virtual user whose setup fails does not run its behaviour, the rest of the run continues.
    setup_virtual_user_fn: Option<VirtualUserHookMut<RV, V>>,
    /// The behaviour each virtual user repeats until the run is stopped. One call is one iteration.
    behaviour: Option<VirtualUserHookMut<RV, V>>,
    /// Teardown hook for a virtual user, run once after it has stopped. Best effort.
    teardown_virtual_user_fn: Option<VirtualUserHookMut<RV, V>>,
    /// Global teardown hook, run once after all virtual users have stopped. Best effort.
    teardown_fn: Option<GlobalHook<RV>>,
    sinks: Vec<Box<dyn MetricsSink>>,
}

pub struct ScenarioDefinition<RV: UserValuesConstraint, V: UserValuesConstraint> {
    pub name: String,
    pub config: RunConfig,
    pub connection_string: Option<String>,
    pub no_progress: bool,
    pub run_id: Option<String>,
    pub summary_file: Option<PathBuf>,
    pub setup_fn: Option<GlobalHookMut<RV>>,
    pub setup_virtual_user_fn: Option<VirtualUserHookMut<RV, V>>,
    pub behaviour: VirtualUserHookMut<RV, V>,
    pub teardown_virtual_user_fn: Option<VirtualUserHookMut<RV, V>>,
    pub teardown_fn: Option<GlobalHook<RV>>,
    pub report_config: ReportConfig,
}

impl<RV: UserValuesConstraint, V: UserValuesConstraint> ScenarioDefinitionBuilder<RV, V> {
    /// Initialise a new scenario definition from the scenario name and command line arguments,
    /// setting up logging on the way.
    pub fn new_with_init(name: &str) -> Self {
        Self::new(name, init())
    }

    /// Initialise a new scenario definition with an already parsed CLI.
    pub fn new(name: &str, cli: StampedeScenarioCli) -> Self {
        Self {
            name: name.to_string(),
            cli,
            default_virtual_users: 1,
            default_duration: None,
            default_iteration_delay: Duration::ZERO,
            default_grace_period: DEFAULT_GRACE_PERIOD,
            setup_fn: None,
            setup_virtual_user_fn: None,
            behaviour: None,
            teardown_virtual_user_fn: None,
            teardown_fn: None,
            sinks: Vec::new(),
        }
    }

    /// Number of virtual users to run if `--virtual-users` is not given.
    pub fn with_default_virtual_users(mut self, virtual_users: usize) -> Self {
        self.default_virtual_users = virtual_users;
        self
    }

    /// How long to run for if `--duration` is not given.
    pub fn with_default_duration_s(self, duration: u64) -> Self {
        self.with_default_duration(Duration::from_secs(duration))
    }

    /// How long to run for if `--duration` is not given.
    pub fn with_default_duration(mut self, duration: Duration) -> Self {
        self.default_duration = Some(duration);
        self
    }

    /// Pause between iterations if `--iteration-delay-ms` is not given.
    pub fn with_default_iteration_delay(mut self, delay: Duration) -> Self {
        self.default_iteration_delay = delay;
        self
    }

    /// Grace period for in-flight iterations if `--grace-period-ms` is not given.
    pub fn with_default_grace_period(mut self, grace_period: Duration) -> Self {
        self.default_grace_period = grace_period;
        self
    }

    /// Set the global setup hook [ScenarioDefinitionBuilder::setup_fn] for this scenario.
    pub fn use_setup(mut self, setup_fn: GlobalHookMut<RV>) -> Self {
        self.setup_fn = Some(setup_fn);
        self
    }

    /// Set the virtual user setup hook [ScenarioDefinitionBuilder::setup_virtual_user_fn].
    pub fn use_virtual_user_setup(mut self, setup_fn: VirtualUserHookMut<RV, V>) -> Self {
        self.setup_virtual_user_fn = Some(setup_fn);
        self
    }

    /// Set the behaviour [ScenarioDefinitionBuilder::behaviour] that every virtual user runs.
    pub fn use_behaviour(mut self, behaviour: VirtualUserHookMut<RV, V>) -> Self {
        if self.behaviour.is_some() {
            panic!("Behaviour is already defined for scenario [{}]", self.name);
        }

        self.behaviour = Some(behaviour);
        self
    }

    /// Set the virtual user teardown hook [ScenarioDefinitionBuilder::teardown_virtual_user_fn].
    pub fn use_virtual_user_teardown(mut self, teardown_fn: VirtualUserHookMut<RV, V>) -> Self {
        self.teardown_virtual_user_fn = Some(teardown_fn);
        self
    }

    /// Set the global teardown hook [ScenarioDefinitionBuilder::teardown_fn].
    pub fn use_teardown(mut self, teardown_fn: GlobalHook<RV>) -> Self {
        self.teardown_fn = Some(teardown_fn);
        self
    }

    /// Report to a custom sink, in addition to the reporter chosen on the CLI.
    pub fn use_sink(mut self, sink: impl MetricsSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    /// Resolve the CLI against the defaults and check that the result can be run.
    pub(crate) fn build(self) -> anyhow::Result<ScenarioDefinition<RV, V>> {
        let config = RunConfig {
            virtual_users: self.cli.virtual_users.unwrap_or(self.default_virtual_users),
            duration: self
                .cli
                .duration
                .map(Duration::from_secs)
                .or(self.default_duration)
                .ok_or(InvalidConfig::MissingDuration)?,
            iteration_delay: self
                .cli
                .iteration_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(self.default_iteration_delay),
            grace_period: self
                .cli
                .grace_period_ms
                .map(Duration::from_millis)
                .unwrap_or(self.default_grace_period),
        };
        config.validate()?;

        let behaviour = self.behaviour.ok_or_else(|| {
            anyhow::anyhow!("No behaviour defined for scenario [{}]", self.name)
        })?;

        let mut report_config = ReportConfig::new(self.name.clone());
        report_config = match self.cli.reporter {
            ReporterOpt::InMemory => report_config.enable_in_memory(),
            ReporterOpt::OutcomeFile => report_config
                .enable_in_memory()
                .enable_outcome_file(self.cli.outcome_dir.clone()),
            ReporterOpt::Noop => report_config,
        };
        for sink in self.sinks {
            report_config = report_config.add_sink(sink);
        }

        Ok(ScenarioDefinition {
            name: self.name,
            config,
            connection_string: self.cli.connection_string,
            no_progress: self.cli.no_progress,
            run_id: self.cli.run_id,
            summary_file: self.cli.summary_file,
            setup_fn: self.setup_fn,
            setup_virtual_user_fn: self.setup_virtual_user_fn,
            behaviour,
            teardown_virtual_user_fn: self.teardown_virtual_user_fn,
            teardown_fn: self.teardown_fn,
            report_config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn behaviour(_ctx: &mut VirtualUserContext<(), ()>) -> HookResult {
        Ok(())
    }

    fn builder(cli: StampedeScenarioCli) -> ScenarioDefinitionBuilder<(), ()> {
        ScenarioDefinitionBuilder::new("definition_test", cli).use_behaviour(behaviour)
    }

    #[test]
    fn defaults_are_used_without_cli_overrides() {
        let definition = builder(StampedeScenarioCli::default())
            .with_default_virtual_users(4)
            .with_default_duration_s(30)
            .with_default_iteration_delay(Duration::from_millis(500))
            .build()
            .unwrap();

        assert_eq!(
            RunConfig {
                virtual_users: 4,
                duration: Duration::from_secs(30),
                iteration_delay: Duration::from_millis(500),
                grace_period: DEFAULT_GRACE_PERIOD,
            },
            definition.config
        );
    }

    #[test]
    fn cli_overrides_defaults() {
        let cli = StampedeScenarioCli {
            virtual_users: Some(7),
            duration: Some(3),
            iteration_delay_ms: Some(20),
            grace_period_ms: Some(100),
            ..Default::default()
        };
        let definition = builder(cli)
            .with_default_virtual_users(4)
            .with_default_duration_s(30)
            .build()
            .unwrap();

        assert_eq!(7, definition.config.virtual_users);
        assert_eq!(Duration::from_secs(3), definition.config.duration);
        assert_eq!(Duration::from_millis(20), definition.config.iteration_delay);
        assert_eq!(Duration::from_millis(100), definition.config.grace_period);
    }

    #[test]
    fn missing_duration_is_invalid() {
        let err = builder(StampedeScenarioCli::default())
            .build()
            .err()
            .expect("build should fail without a duration");

        assert_eq!(
            Some(&InvalidConfig::MissingDuration),
            err.downcast_ref::<InvalidConfig>()
        );
    }

    #[test]
    fn zero_virtual_users_from_cli_is_invalid() {
        let cli = StampedeScenarioCli {
            virtual_users: Some(0),
            ..Default::default()
        };
        let err = builder(cli)
            .with_default_duration_s(5)
            .build()
            .err()
            .expect("build should fail with zero virtual users");

        assert_eq!(
            Some(&InvalidConfig::NoVirtualUsers),
            err.downcast_ref::<InvalidConfig>()
        );
    }

    #[test]
    fn behaviour_is_required() {
        let result = ScenarioDefinitionBuilder::<(), ()>::new(
            "no_behaviour",
            StampedeScenarioCli::default(),
        )
        .with_default_duration_s(5)
        .build();

        assert!(result.is_err());
    }

    #[test]
    #[should_panic(expected = "Behaviour is already defined")]
    fn behaviour_cannot_be_defined_twice() {
        let _ = builder(StampedeScenarioCli::default()).use_behaviour(behaviour);
    }
}
