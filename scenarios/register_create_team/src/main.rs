use checkin_stampede_runner::prelude::*;
use std::process::ExitCode;
use std::time::Duration;

fn setup(ctx: &mut RunnerContext<CheckinRunnerContext>) -> HookResult {
    load_credentials(ctx)
}

fn main() -> StampedeResult<ExitCode> {
    let builder =
        ScenarioDefinitionBuilder::<CheckinRunnerContext, CheckinAgentContext>::new_with_init(
            env!("CARGO_PKG_NAME"),
        )
        .with_default_agents(10)
        .with_default_duration_s(20 * 60)
        .with_default_data("credentials", "data/user_data.json")
        .with_default_think_time("after_register", Duration::from_millis(500))
        .with_default_think_time("after_iteration", Duration::from_millis(500))
        .use_setup(setup)
        .use_iteration_plan(partition_credentials)
        .use_agent_setup(connect_client)
        .use_agent_behaviour(register_then_act);

    let report = run(builder)?;

    Ok(report.exit_code())
}
