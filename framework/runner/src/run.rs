use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use anyhow::Context;
use stampede_instruments::{Aggregator, Summary};
use stampede_summary_model::{append_run_summary, RunSummary};

use crate::monitor::start_monitor;
use crate::progress::start_progress;
use crate::types::StampedeResult;
use crate::virtual_user::{spawn_virtual_user, VirtualUser};
use crate::{
    config::InvalidConfig,
    context::{RunnerContext, UserValuesConstraint},
    definition::ScenarioDefinitionBuilder,
    executor::Executor,
    shutdown::start_shutdown_listener,
};

/// Environment variables that are copied into the run summary when they are set.
const SUMMARY_ENV_VARS: &[&str] = &["RUST_LOG"];

/// Run a scenario to completion and return the final [Summary].
///
/// Fails with [InvalidConfig](crate::prelude::InvalidConfig) before anything is started if the
/// configuration cannot be run, or with the error from the global setup hook. Failures inside the
/// behaviour never fail the run, they are counted in the summary.
pub fn run<RV: UserValuesConstraint, V: UserValuesConstraint>(
    definition: ScenarioDefinitionBuilder<RV, V>,
) -> StampedeResult<Summary> {
    let definition = definition.build()?;
    let config = definition.config.clone();

    log::info!(
        "Running scenario: {} with {} virtual users for {:?}",
        definition.name,
        config.virtual_users,
        config.duration
    );

    let runtime = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;
    let shutdown_handle = start_shutdown_listener(&runtime)?;
    let executor = Arc::new(Executor::new(runtime));
    let aggregator = Arc::new(Aggregator::new());

    let run_id = definition
        .run_id
        .clone()
        .unwrap_or_else(|| nanoid::nanoid!());
    let started_at = chrono::Utc::now().timestamp();

    let mut runner_context = RunnerContext::new(
        executor.clone(),
        aggregator.clone(),
        shutdown_handle.clone(),
        definition.connection_string.clone(),
        run_id.clone(),
    );

    if let Some(setup_fn) = definition.setup_fn {
        setup_fn(&mut runner_context)?;
    }

    // Only create sinks once setup has passed, so a failed setup leaves no empty outcome files.
    let reporter = Arc::new(definition.report_config.init(executor.handle())?);

    let mut driver_shutdown_listener = shutdown_handle.new_listener();

    if !definition.no_progress {
        start_progress(
            config.duration,
            aggregator.clone(),
            shutdown_handle.new_listener(),
        )?;
    }

    // Set a timer to stop the run once the duration has elapsed
    let deadline = Instant::now()
        .checked_add(config.duration)
        .ok_or(InvalidConfig::DurationTooLong)?;
    let deadline_handle = shutdown_handle.clone();
    let run_duration = config.duration;
    executor.spawn(async move {
        tokio::time::sleep(run_duration).await;
        log::info!("Run duration of {:?} reached, stopping virtual users", run_duration);
        deadline_handle.shutdown();
    });

    // Ready to start spawning virtual users so start the resource monitor to report high usage
    // which might lead to a misleading outcome.
    start_monitor(shutdown_handle.new_listener())?;

    let runner_context = Arc::new(runner_context);
    let (stopped_sender, mut stopped_receiver) = tokio::sync::mpsc::unbounded_channel();

    let mut handles: Vec<Option<JoinHandle<()>>> = Vec::with_capacity(config.virtual_users);
    let mut spawn_error = None;
    for index in 0..config.virtual_users {
        let virtual_user = VirtualUser {
            index,
            runner_context: runner_context.clone(),
            aggregator: aggregator.clone(),
            reporter: reporter.clone(),
            iteration_delay: config.iteration_delay,
            deadline,
            setup_fn: definition.setup_virtual_user_fn,
            behaviour: definition.behaviour,
            teardown_fn: definition.teardown_virtual_user_fn,
            cycle_shutdown_listener: shutdown_handle.new_listener(),
            delegated_shutdown_listener: shutdown_handle.new_listener(),
        };

        match spawn_virtual_user(virtual_user, stopped_sender.clone()) {
            Ok(handle) => handles.push(Some(handle)),
            Err(e) => {
                log::error!("Stopping the run, could not start all virtual users: {:?}", e);
                shutdown_handle.shutdown();
                spawn_error = Some(e);
                break;
            }
        }
    }
    drop(stopped_sender);
    let started = handles.len();

    // Wait for the stop signal, or for every virtual user to have stopped on its own.
    let (stopped, stopped_early) = executor.execute_in_place(async {
        let mut stopped = Vec::with_capacity(started);
        let mut stopped_early = 0;
        while stopped.len() < started {
            tokio::select! {
                _ = driver_shutdown_listener.wait_for_shutdown() => break,
                index = stopped_receiver.recv() => match index {
                    Some(index) => {
                        stopped.push(index);
                        // Virtual users also notice the deadline themselves, those are not early.
                        if Instant::now() < deadline {
                            stopped_early += 1;
                        }
                    }
                    None => break,
                },
            }
        }
        Ok((stopped, stopped_early))
    })?;

    if stopped_early == started {
        log::info!("All virtual users have stopped before the end of the run");
    }
    let virtual_users_end_count = started - stopped_early;

    shutdown_handle.shutdown();

    // Give in-flight iterations until the end of the grace period to finish.
    let grace_period = config.grace_period;
    let stopped = executor.execute_in_place(async {
        let mut stopped = stopped;
        let wait_for_rest = async {
            while stopped.len() < started {
                match stopped_receiver.recv().await {
                    Some(index) => stopped.push(index),
                    None => break,
                }
            }
        };
        if tokio::time::timeout(grace_period, wait_for_rest).await.is_err() {
            log::debug!("Grace period of {:?} elapsed", grace_period);
        }
        Ok(stopped)
    })?;

    let summary = aggregator.seal();

    let abandoned = started - stopped.len();
    if abandoned > 0 {
        log::warn!(
            "Abandoning {} virtual users that did not stop within the grace period of {:?}, {} in-flight iterations dropped",
            abandoned,
            grace_period,
            summary.abandoned_iterations
        );
    }

    for index in stopped {
        if let Some(handle) = handles.get_mut(index).and_then(Option::take) {
            if let Err(e) = handle.join() {
                log::error!("Virtual user vu-{} panicked: {:?}", index, e);
            }
        }
    }
    // Whatever is left in `handles` belongs to abandoned virtual users, their threads are detached.
    drop(handles);

    if let Some(teardown_fn) = definition.teardown_fn {
        // Don't crash the runner if the teardown fails. We still want the reporting and runner
        // shutdown to happen cleanly. The hook is documented as 'best effort'
        if let Err(e) = teardown_fn(runner_context.clone()) {
            log::error!("Teardown failed: {:?}", e);
        }
    }

    reporter.finalize(&summary);

    if let Some(path) = &definition.summary_file {
        let mut run_summary = RunSummary::new(
            run_id,
            definition.name.clone(),
            started_at,
            config.duration.as_millis() as u64,
            config.iteration_delay.as_millis() as u64,
            config.virtual_users,
            env!("CARGO_PKG_VERSION").to_string(),
        );
        run_summary.set_results(
            summary.total_iterations,
            summary.success_count,
            summary.failure_count,
            summary.abandoned_iterations,
        );
        run_summary.set_virtual_users_end_count(virtual_users_end_count);
        for key in SUMMARY_ENV_VARS {
            if let Ok(value) = std::env::var(key) {
                run_summary.add_env(key.to_string(), value);
            }
        }

        append_run_summary(&run_summary, path)
            .with_context(|| format!("Failed to write run summary to {}", path.display()))?;
        log::info!(
            "Run summary appended to {} with fingerprint {}",
            path.display(),
            run_summary.fingerprint()
        );
    }

    log::info!(
        "Scenario {} finished: {} iterations, {} succeeded, {} failed, {} abandoned",
        definition.name,
        summary.total_iterations,
        summary.success_count,
        summary.failure_count,
        summary.abandoned_iterations
    );

    if let Some(e) = spawn_error {
        return Err(e);
    }

    Ok(summary)
}
