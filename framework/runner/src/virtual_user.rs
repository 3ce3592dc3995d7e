use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant, SystemTime};

use anyhow::Context;
use stampede_core::prelude::VirtualUserBailError;
use stampede_instruments::{Aggregator, Outcome, Reporter};
use tokio::sync::mpsc::UnboundedSender;

use crate::context::{RunnerContext, UserValuesConstraint, VirtualUserContext};
use crate::definition::VirtualUserHookMut;
use crate::shutdown::DelegatedShutdownListener;

/// Everything a virtual user needs to run independently of the driver.
pub(crate) struct VirtualUser<RV: UserValuesConstraint, V: UserValuesConstraint> {
    pub index: usize,
    pub runner_context: Arc<RunnerContext<RV>>,
    pub aggregator: Arc<Aggregator>,
    pub reporter: Arc<Reporter>,
    pub iteration_delay: Duration,
    /// Wall clock end of the run. No iteration starts after this, even if the stop signal has not
    /// been raised yet.
    pub deadline: Instant,
    pub setup_fn: Option<VirtualUserHookMut<RV, V>>,
    pub behaviour: VirtualUserHookMut<RV, V>,
    pub teardown_fn: Option<VirtualUserHookMut<RV, V>>,
    /// For the loop to check if the virtual user should stop between iterations.
    pub cycle_shutdown_listener: DelegatedShutdownListener,
    /// For the behaviour implementation to listen for shutdown and respond appropriately.
    pub delegated_shutdown_listener: DelegatedShutdownListener,
}

/// Tells the driver that a virtual user has stopped, including when its thread panics.
struct StoppedNotifier {
    index: usize,
    stopped: UnboundedSender<usize>,
}

impl Drop for StoppedNotifier {
    fn drop(&mut self) {
        // The driver stops listening once it has given up on this virtual user.
        let _ = self.stopped.send(self.index);
    }
}

enum IterationEnd {
    Continue,
    Bail,
}

pub(crate) fn spawn_virtual_user<RV: UserValuesConstraint, V: UserValuesConstraint>(
    virtual_user: VirtualUser<RV, V>,
    stopped: UnboundedSender<usize>,
) -> anyhow::Result<JoinHandle<()>> {
    let index = virtual_user.index;
    std::thread::Builder::new()
        .name(format!("vu-{index}"))
        .spawn(move || {
            let _notifier = StoppedNotifier { index, stopped };
            virtual_user.run();
        })
        .with_context(|| format!("Failed to spawn thread for virtual user {index}"))
}

impl<RV: UserValuesConstraint, V: UserValuesConstraint> VirtualUser<RV, V> {
    fn run(mut self) {
        let mut context = VirtualUserContext::new(
            self.index,
            self.runner_context.clone(),
            self.delegated_shutdown_listener.clone(),
        );

        if let Some(setup_fn) = self.setup_fn {
            if let Err(e) = setup_fn(&mut context) {
                log::error!(
                    "Virtual user setup failed for {}: {:?}",
                    context.virtual_user_id(),
                    e
                );
                return;
            }
        }

        loop {
            if Instant::now() >= self.deadline || self.cycle_shutdown_listener.should_shutdown() {
                log::debug!("Stopping virtual user {}", context.virtual_user_id());
                break;
            }

            let Some(pending) = self.aggregator.begin_iteration() else {
                log::debug!(
                    "Run finalized, stopping virtual user {}",
                    context.virtual_user_id()
                );
                break;
            };

            let (outcome, end) = run_iteration(self.behaviour, &mut context);
            let reporter = &self.reporter;
            pending.complete_with(&outcome, |outcome| reporter.add_outcome(outcome));

            if let IterationEnd::Bail = end {
                log::warn!(
                    "Virtual user {} bailed: {}",
                    context.virtual_user_id(),
                    outcome.detail().unwrap_or_default()
                );
                break;
            }

            if !self.iteration_delay.is_zero() {
                self.pause();
            }
        }

        if let Some(teardown_fn) = self.teardown_fn {
            if let Err(e) = teardown_fn(&mut context) {
                log::error!(
                    "Virtual user teardown failed for {}: {:?}",
                    context.virtual_user_id(),
                    e
                );
            }
        }
    }

    /// Sleep between iterations, waking early if the run is stopped.
    fn pause(&mut self) {
        let delay = self.iteration_delay;
        let listener = &mut self.cycle_shutdown_listener;
        let result = self
            .runner_context
            .executor()
            .execute_in_place(async move {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {},
                    _ = listener.wait_for_shutdown() => {},
                }
                Ok(())
            });

        if let Err(e) = result {
            log::warn!("Pause between iterations failed: {e:?}");
        }
    }
}

/// Run the behaviour once and turn whatever it did into an [Outcome].
///
/// Errors and panics from the behaviour become failed outcomes, as does any failed check.
fn run_iteration<RV: UserValuesConstraint, V: UserValuesConstraint>(
    behaviour: VirtualUserHookMut<RV, V>,
    context: &mut VirtualUserContext<RV, V>,
) -> (Outcome, IterationEnd) {
    let index = context.index();
    let timestamp = SystemTime::now();
    let started = Instant::now();

    let result = catch_unwind(AssertUnwindSafe(|| behaviour(context)));

    let elapsed = started.elapsed();
    let checks = context.take_checks();

    let (outcome, end) = match result {
        Ok(Ok(())) => {
            let failed_check = checks.iter().find(|c| !c.passed());
            match failed_check {
                Some(check) => (
                    Outcome::failure(index, elapsed, format!("check failed: {}", check.name())),
                    IterationEnd::Continue,
                ),
                None => (Outcome::success(index, elapsed), IterationEnd::Continue),
            }
        }
        Ok(Err(e)) if e.is::<VirtualUserBailError>() => {
            (Outcome::failure(index, elapsed, e.to_string()), IterationEnd::Bail)
        }
        Ok(Err(e)) => {
            log::debug!("Behaviour failed for {}: {:?}", context.virtual_user_id(), e);
            (Outcome::failure(index, elapsed, e.to_string()), IterationEnd::Continue)
        }
        Err(panic) => {
            let detail = format!("behaviour panicked: {}", panic_message(panic.as_ref()));
            log::error!("{} in {}", detail, context.virtual_user_id());
            (Outcome::failure(index, elapsed, detail), IterationEnd::Continue)
        }
    };

    (outcome.with_timestamp(timestamp).with_checks(checks), end)
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg
    } else {
        "unknown panic"
    }
}
