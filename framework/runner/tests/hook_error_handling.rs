use std::sync::Arc;
use stampede_runner::prelude::{
    AgentBailError, AgentContext, HookResult, IterationSkipped, ReporterOpt, RunnerContext,
    ScenarioDefinitionBuilder, StampedeScenarioCli, UserValuesConstraint, run,
};

#[derive(Default, Debug)]
struct RunnerContextValue {}

impl UserValuesConstraint for RunnerContextValue {}

#[derive(Default, Debug)]
struct AgentContextValue {
    value: i32,
}

impl UserValuesConstraint for AgentContextValue {}

fn sample_cli_cfg() -> StampedeScenarioCli {
    StampedeScenarioCli {
        connection_string: Some("http://localhost:1".to_string()),
        config: None,
        agents: None,
        duration: None,
        stage: vec![],
        graceful_ramp_down: None,
        iterations: None,
        shared_iterations: None,
        soak: false,
        threshold: vec![],
        think_time: vec![],
        data: vec![],
        request_timeout: None,
        no_progress: true,
        reporter: ReporterOpt::Noop,
        run_id: None,
        summary_file: None,
    }
}

#[test]
fn propagate_error_in_setup_hook() {
    fn setup(_tx: &mut RunnerContext<RunnerContextValue>) -> HookResult {
        Err(anyhow::anyhow!("Error in setup hook"))
    }

    let scenario = ScenarioDefinitionBuilder::<RunnerContextValue, AgentContextValue>::new(
        "propagate_error_in_setup_hook",
        sample_cli_cfg(),
    )
    .with_default_duration_s(5)
    .use_setup(setup);

    let result = run(scenario);

    assert!(result.is_err());
    assert_eq!(result.unwrap_err().to_string(), "Error in setup hook");
}

#[test]
fn capture_error_in_agent_setup() {
    fn agent_setup(_ctx: &mut AgentContext<RunnerContextValue, AgentContextValue>) -> HookResult {
        Err(anyhow::anyhow!("Error in agent setup hook"))
    }

    let scenario = ScenarioDefinitionBuilder::<RunnerContextValue, AgentContextValue>::new(
        "capture_error_in_agent_setup",
        sample_cli_cfg(),
    )
    .with_default_duration_s(5)
    .use_agent_setup(agent_setup);

    let result = run(scenario);

    assert!(result.is_ok());
    assert_eq!(0, result.unwrap().worker_end_count);
}

#[test]
fn count_failed_behaviour_as_aborted_iteration_and_continue() {
    fn agent_behaviour(
        ctx: &mut AgentContext<RunnerContextValue, AgentContextValue>,
    ) -> HookResult {
        if ctx.get().value < 5 {
            ctx.get_mut().value += 1;
            Err(anyhow::anyhow!("Error in agent behaviour hook"))
        } else {
            // Save time running this test by shutting down once this has run a few times.
            ctx.runner_context().force_stop_scenario();
            Ok(())
        }
    }

    let scenario = ScenarioDefinitionBuilder::<RunnerContextValue, AgentContextValue>::new(
        "count_failed_behaviour_as_aborted_iteration_and_continue",
        sample_cli_cfg(),
    )
    .with_default_duration_s(5)
    .use_agent_behaviour(agent_behaviour);

    let report = run(scenario).unwrap();

    let (completed, aborted, skipped) = report
        .metrics
        .iteration_counts(&stampede_instruments::MetricFilter::All);
    assert_eq!(5, aborted);
    assert_eq!(1, completed);
    assert_eq!(0, skipped);
}

#[test]
fn skipped_iterations_are_not_failures() {
    fn agent_behaviour(
        ctx: &mut AgentContext<RunnerContextValue, AgentContextValue>,
    ) -> HookResult {
        Err(IterationSkipped::new(format!(
            "nothing to do for iteration {}",
            ctx.iteration().sequence()
        ))
        .into())
    }

    let mut cfg = sample_cli_cfg();
    cfg.agents = Some(2);
    cfg.iterations = Some(3);
    let scenario = ScenarioDefinitionBuilder::<RunnerContextValue, AgentContextValue>::new(
        "skipped_iterations_are_not_failures",
        cfg,
    )
    .use_agent_behaviour(agent_behaviour);

    let report = run(scenario).unwrap();

    let (completed, aborted, skipped) = report
        .metrics
        .iteration_counts(&stampede_instruments::MetricFilter::All);
    assert_eq!((0, 0, 6), (completed, aborted, skipped));
    assert!(report.passed());
}

#[test]
fn bail_error_stops_agent_behaviour() {
    fn agent_behaviour(ctx: &mut AgentContext<RunnerContextValue, AgentContextValue>) -> HookResult {
        if ctx.agent_index() == 0 {
            Err(AgentBailError::default().into())
        } else {
            Ok(())
        }
    }

    let mut cfg = sample_cli_cfg();
    cfg.agents = Some(2);
    let scenario = ScenarioDefinitionBuilder::<RunnerContextValue, AgentContextValue>::new(
        "bail_error_stops_agent_behaviour",
        cfg,
    )
    .with_default_duration_s(1)
    .use_agent_behaviour(agent_behaviour);

    let result = run(scenario);

    assert!(result.is_ok());
    assert_eq!(1, result.unwrap().worker_end_count);
}

#[test]
fn capture_error_in_agent_teardown() {
    fn agent_teardown(
        _ctx: &mut AgentContext<RunnerContextValue, AgentContextValue>,
    ) -> HookResult {
        Err(anyhow::anyhow!("Error in agent teardown hook"))
    }

    let scenario = ScenarioDefinitionBuilder::<RunnerContextValue, AgentContextValue>::new(
        "capture_error_in_agent_teardown",
        sample_cli_cfg(),
    )
    .with_default_duration_s(5)
    .use_agent_teardown(agent_teardown);

    let result = run(scenario);

    assert!(result.is_ok());
}

#[test]
fn capture_error_in_teardown() {
    fn teardown(_ctx: Arc<RunnerContext<RunnerContextValue>>) -> HookResult {
        Err(anyhow::anyhow!("Error in teardown hook"))
    }

    let scenario = ScenarioDefinitionBuilder::<RunnerContextValue, AgentContextValue>::new(
        "capture_error_in_teardown",
        sample_cli_cfg(),
    )
    .with_default_duration_s(5)
    .use_teardown(teardown);

    let result = run(scenario);

    assert!(result.is_ok());
}
