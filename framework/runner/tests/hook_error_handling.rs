use std::sync::Arc;
use std::time::Duration;

use stampede_runner::prelude::{
    run, HookResult, ReporterOpt, RunnerContext, ScenarioDefinitionBuilder, StampedeScenarioCli,
    UserValuesConstraint, VirtualUserBailError, VirtualUserContext,
};

#[derive(Default, Debug)]
struct RunnerContextValue {}

impl UserValuesConstraint for RunnerContextValue {}

#[derive(Default, Debug)]
struct VirtualUserContextValue {
    value: i32,
}

impl UserValuesConstraint for VirtualUserContextValue {}

type TestContext = VirtualUserContext<RunnerContextValue, VirtualUserContextValue>;

fn sample_cli_cfg() -> StampedeScenarioCli {
    StampedeScenarioCli {
        connection_string: Some("test_connection_string".to_string()),
        no_progress: true,
        reporter: ReporterOpt::Noop,
        ..Default::default()
    }
}

fn noop_behaviour(_ctx: &mut TestContext) -> HookResult {
    Ok(())
}

/// Save time by stopping the run after a few iterations.
fn stop_after_a_few(ctx: &mut TestContext) -> HookResult {
    if ctx.get().value < 5 {
        ctx.get_mut().value += 1;
    } else {
        ctx.runner_context().force_stop_scenario();
    }
    Ok(())
}

fn scenario(name: &str) -> ScenarioDefinitionBuilder<RunnerContextValue, VirtualUserContextValue> {
    ScenarioDefinitionBuilder::new(name, sample_cli_cfg())
        .with_default_duration_s(5)
        .with_default_iteration_delay(Duration::from_millis(10))
}

#[test]
fn propagate_error_in_setup_hook() {
    fn setup(_ctx: &mut RunnerContext<RunnerContextValue>) -> HookResult {
        Err(anyhow::anyhow!("Error in setup hook"))
    }

    let result = run(scenario("propagate_error_in_setup_hook")
        .use_setup(setup)
        .use_behaviour(noop_behaviour));

    assert!(result.is_err());
    assert_eq!(result.unwrap_err().to_string(), "Error in setup hook");
}

#[test]
fn capture_error_in_virtual_user_setup() {
    fn virtual_user_setup(_ctx: &mut TestContext) -> HookResult {
        Err(anyhow::anyhow!("Error in virtual user setup hook"))
    }

    let result = run(scenario("capture_error_in_virtual_user_setup")
        .use_virtual_user_setup(virtual_user_setup)
        .use_behaviour(noop_behaviour));

    // The only virtual user never got to run its behaviour.
    let summary = result.unwrap();
    assert_eq!(0, summary.total_iterations);
}

#[test]
fn capture_error_in_behaviour_and_continue() {
    fn behaviour(ctx: &mut TestContext) -> HookResult {
        stop_after_a_few(ctx)?;
        Err(anyhow::anyhow!("Error in behaviour"))
    }

    let result = run(scenario("capture_error_in_behaviour_and_continue").use_behaviour(behaviour));

    let summary = result.unwrap();
    assert!(summary.total_iterations >= 6);
    assert_eq!(summary.total_iterations, summary.failure_count);
    assert_eq!(
        Some(&summary.failure_count),
        summary.failure_reasons.get("Error in behaviour")
    );
}

#[test]
fn capture_panic_in_behaviour_and_continue() {
    fn behaviour(ctx: &mut TestContext) -> HookResult {
        stop_after_a_few(ctx)?;
        panic!("Panic in behaviour");
    }

    let result = run(scenario("capture_panic_in_behaviour_and_continue").use_behaviour(behaviour));

    let summary = result.unwrap();
    assert!(summary.total_iterations >= 6);
    assert_eq!(0, summary.success_count);
    assert_eq!(
        Some(&summary.failure_count),
        summary
            .failure_reasons
            .get("behaviour panicked: Panic in behaviour")
    );
}

#[test]
fn bail_error_stops_virtual_user_behaviour() {
    fn behaviour(ctx: &mut TestContext) -> HookResult {
        if ctx.index() == 0 {
            return Err(VirtualUserBailError::new("bailing out").into());
        }
        Ok(())
    }

    let mut cfg = sample_cli_cfg();
    cfg.virtual_users = Some(2);
    let scenario = ScenarioDefinitionBuilder::<RunnerContextValue, VirtualUserContextValue>::new(
        "bail_error_stops_virtual_user_behaviour",
        cfg,
    )
    .with_default_duration_s(1)
    .with_default_iteration_delay(Duration::from_millis(50))
    .use_behaviour(behaviour);

    let summary = run(scenario).unwrap();

    // One failure from the virtual user that bailed, the other kept going until the end.
    assert_eq!(1, summary.failure_count);
    assert_eq!(Some(&1), summary.failure_reasons.get("bailing out"));
    assert!(summary.success_count > 1);
}

#[test]
fn capture_error_in_virtual_user_teardown() {
    fn virtual_user_teardown(_ctx: &mut TestContext) -> HookResult {
        Err(anyhow::anyhow!("Error in virtual user teardown hook"))
    }

    let result = run(scenario("capture_error_in_virtual_user_teardown")
        .use_behaviour(stop_after_a_few)
        .use_virtual_user_teardown(virtual_user_teardown));

    assert!(result.is_ok());
}

#[test]
fn capture_error_in_teardown() {
    fn teardown(_ctx: Arc<RunnerContext<RunnerContextValue>>) -> HookResult {
        Err(anyhow::anyhow!("Error in teardown hook"))
    }

    let result = run(scenario("capture_error_in_teardown")
        .use_behaviour(stop_after_a_few)
        .use_teardown(teardown));

    assert!(result.is_ok());
}
