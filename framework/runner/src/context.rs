use std::{fmt::Debug, sync::Arc};

use anyhow::Context as _;
use stampede_instruments::{Aggregator, CheckResult, Summary};

use crate::{
    executor::Executor,
    shutdown::{DelegatedShutdownListener, ShutdownHandle},
};

pub trait UserValuesConstraint: Default + Debug + Send + Sync + 'static {}

impl UserValuesConstraint for () {}

/// State shared by every virtual user in a run.
///
/// It is mutable in the global setup hook and read-only once virtual users have started.
#[derive(Debug)]
pub struct RunnerContext<RV: UserValuesConstraint> {
    executor: Arc<Executor>,
    aggregator: Arc<Aggregator>,
    shutdown_handle: ShutdownHandle,
    connection_string: Option<String>,
    run_id: String,
    value: RV,
}

impl<RV: UserValuesConstraint> RunnerContext<RV> {
    pub(crate) fn new(
        executor: Arc<Executor>,
        aggregator: Arc<Aggregator>,
        shutdown_handle: ShutdownHandle,
        connection_string: Option<String>,
        run_id: String,
    ) -> Self {
        Self {
            executor,
            aggregator,
            shutdown_handle,
            connection_string,
            run_id,
            value: Default::default(),
        }
    }

    pub fn executor(&self) -> &Arc<Executor> {
        &self.executor
    }

    /// The connection string from the CLI, if one was given.
    pub fn connection_string(&self) -> Option<&str> {
        self.connection_string.as_deref()
    }

    /// The connection string from the CLI, for scenarios that cannot run without one.
    pub fn get_connection_string(&self) -> anyhow::Result<&str> {
        self.connection_string()
            .context("This scenario requires a connection string, use `--connection-string`")
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// A point in time view of the outcomes recorded so far.
    pub fn snapshot(&self) -> Summary {
        self.aggregator.snapshot()
    }

    /// Stop the run early. Virtual users finish their current iteration and then stop, exactly as
    /// they do when the run duration is up.
    pub fn force_stop_scenario(&self) {
        log::info!("Scenario stop requested");
        self.shutdown_handle.shutdown();
    }

    pub fn is_stopping(&self) -> bool {
        self.shutdown_handle.is_shutdown()
    }

    pub fn get_mut(&mut self) -> &mut RV {
        &mut self.value
    }

    pub fn get(&self) -> &RV {
        &self.value
    }
}

/// State owned by a single virtual user.
pub struct VirtualUserContext<RV: UserValuesConstraint, V: UserValuesConstraint> {
    index: usize,
    virtual_user_id: String,
    runner_context: Arc<RunnerContext<RV>>,
    shutdown_listener: DelegatedShutdownListener,
    checks: Vec<CheckResult>,
    value: V,
}

impl<RV: UserValuesConstraint, V: UserValuesConstraint> VirtualUserContext<RV, V> {
    pub(crate) fn new(
        index: usize,
        runner_context: Arc<RunnerContext<RV>>,
        shutdown_listener: DelegatedShutdownListener,
    ) -> Self {
        Self {
            index,
            virtual_user_id: format!("vu-{index}"),
            runner_context,
            shutdown_listener,
            checks: Vec::new(),
            value: Default::default(),
        }
    }

    /// The index of this virtual user, from 0 to the number of virtual users.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn virtual_user_id(&self) -> &str {
        &self.virtual_user_id
    }

    pub fn runner_context(&self) -> &Arc<RunnerContext<RV>> {
        &self.runner_context
    }

    /// A listener for the stop signal, for behaviours that want to cut their own work short.
    pub fn shutdown_listener(&mut self) -> &mut DelegatedShutdownListener {
        &mut self.shutdown_listener
    }

    /// Record a named check for the current iteration and return whether it passed.
    ///
    /// Any failed check marks the iteration as failed, but the behaviour keeps running so that
    /// later checks are still recorded.
    pub fn check(&mut self, name: &str, passed: bool) -> bool {
        if !passed {
            log::debug!("Check [{}] failed for {}", name, self.virtual_user_id);
        }
        self.checks.push(CheckResult::new(name, passed));
        passed
    }

    pub(crate) fn take_checks(&mut self) -> Vec<CheckResult> {
        std::mem::take(&mut self.checks)
    }

    pub fn get_mut(&mut self) -> &mut V {
        &mut self.value
    }

    pub fn get(&self) -> &V {
        &self.value
    }
}
