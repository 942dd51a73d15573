use checkin_stampede_runner::prelude::*;
use std::process::ExitCode;
use std::time::Duration;

fn setup(ctx: &mut RunnerContext<CheckinRunnerContext>) -> HookResult {
    load_credentials(ctx)?;
    load_teams(ctx)
}

fn main() -> StampedeResult<ExitCode> {
    // 3, 9, 27 ... 729 agents, 30 seconds each, sharing 10000 iterations
    let stages = RunSchedule::geometric(3, 3.0, 6, Duration::from_secs(30))?
        .stages()
        .collect();

    let builder =
        ScenarioDefinitionBuilder::<CheckinRunnerContext, CheckinAgentContext>::new_with_init(
            env!("CARGO_PKG_NAME"),
        )
        .with_default_stages(stages)
        .with_default_shared_iterations(10_000)
        .with_default_threshold("http_req_duration:p(95)<2000")
        .with_default_threshold("http_req_failed:rate<0.01")
        .with_default_data("credentials", "data/login_results.json")
        .with_default_data("teams", "data/team_info.json")
        .with_default_think_time("after_join", Duration::from_secs(1))
        .with_default_think_time("between_checkins", Duration::from_millis(500))
        .with_default_think_time("after_iteration", Duration::from_millis(500))
        .use_setup(setup)
        .use_agent_setup(connect_client)
        .use_agent_behaviour(join_then_fan_out);

    let report = run(builder)?;

    Ok(report.exit_code())
}
