use checkin_stampede_runner::prelude::*;
use std::process::ExitCode;

fn setup(ctx: &mut RunnerContext<CheckinRunnerContext>) -> HookResult {
    load_credentials(ctx)
}

// Logs every user in once, as fast as 8 agents allow, with no time limit. The tokens are saved for
// the scenarios that act as existing users.
fn main() -> StampedeResult<ExitCode> {
    let builder =
        ScenarioDefinitionBuilder::<CheckinRunnerContext, CheckinAgentContext>::new_with_init(
            env!("CARGO_PKG_NAME"),
        )
        .with_default_agents(8)
        .with_default_data("credentials", "data/user_data.json")
        .with_default_data("login_results", "data/login_results.json")
        .with_default_threshold("checks:rate>0.99")
        .use_setup(setup)
        .use_iteration_plan(partition_credentials)
        .use_agent_setup(connect_client)
        .use_agent_behaviour(login_behaviour)
        .use_teardown(write_login_results);

    let report = run(builder)?;

    Ok(report.exit_code())
}
