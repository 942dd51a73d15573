use crate::catalog::{CredentialCatalog, CredentialRecord, TeamCatalog, TeamDescriptor};
use crate::context::CheckinAgentContext;
use crate::runner_context::CheckinRunnerContext;
use anyhow::Context;
use checkin_client_instrumented::prelude::{
    CheckinClient, Login, Registration, TeamId, TeamMember, Token,
};
use std::future::Future;
use std::sync::Arc;
use stampede_runner::prelude::{
    AgentContext, HookResult, IterationPlan, IterationSkipped, RunnerContext,
};

pub type CheckinAgent = AgentContext<CheckinRunnerContext, CheckinAgentContext>;

/// Load the credentials catalog named `credentials` into the [CheckinRunnerContext].
///
/// Call this from the scenario `setup`, the path comes from `--data credentials=<path>` or a
/// scenario default. Any problem with the file stops the run before workers start.
pub fn load_credentials(ctx: &mut RunnerContext<CheckinRunnerContext>) -> HookResult {
    let path = ctx.data_path("credentials")?.to_path_buf();
    let catalog = CredentialCatalog::load(&path)?;
    log::info!(
        "Loaded {} credentials from {}",
        catalog.len(),
        path.display()
    );

    ctx.get_mut().credentials = Some(Arc::new(catalog));
    Ok(())
}

/// Load the teams catalog named `teams` into the [CheckinRunnerContext].
pub fn load_teams(ctx: &mut RunnerContext<CheckinRunnerContext>) -> HookResult {
    let path = ctx.data_path("teams")?.to_path_buf();
    let catalog = TeamCatalog::load(&path)?;
    log::info!("Loaded {} teams from {}", catalog.len(), path.display());

    ctx.get_mut().teams = Some(Arc::new(catalog));
    Ok(())
}

/// Write every successful login to the data file named `login_results`, sorted by username.
///
/// Use this as the scenario `teardown` of a login run. The file can be loaded as the credentials
/// catalog of a later run.
pub fn write_login_results(ctx: Arc<RunnerContext<CheckinRunnerContext>>) -> HookResult {
    let path = ctx.data_path("login_results")?;
    let results = ctx.get().login_results();

    let content = serde_json::to_string_pretty(&results)?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write login results to {}", path.display()))?;
    log::info!("Wrote {} login results to {}", results.len(), path.display());

    Ok(())
}

/// Use every loaded credential exactly once, split between the workers.
pub fn partition_credentials(
    ctx: &RunnerContext<CheckinRunnerContext>,
) -> anyhow::Result<IterationPlan> {
    Ok(IterationPlan::Partitioned {
        catalog_size: ctx.get().credentials()?.len(),
    })
}

/// Give the agent its own client for the backend at the connection string.
///
/// Requests are recorded under the scenario name and the agent id.
pub fn connect_client(ctx: &mut CheckinAgent) -> HookResult {
    let runner_context = ctx.runner_context();
    let client = CheckinClient::new(
        runner_context.get_connection_string(),
        runner_context.request_timeout(),
        runner_context.reporter(),
        runner_context.scenario_name(),
        ctx.agent_id(),
    )
    .context("Failed to create a client for the backend")?;
    log::debug!("Agent {} will send requests to {}", ctx.agent_id(), client.base_url());

    ctx.get_mut().client = Some(client);
    Ok(())
}

/// The credential for the current iteration.
///
/// Partitioned runs get the entry assigned to this iteration, other runs draw one at random.
pub fn credential_for_iteration(ctx: &CheckinAgent) -> anyhow::Result<CredentialRecord> {
    let credentials = ctx.runner_context().get().credentials()?;
    let record = match ctx.iteration().catalog_index() {
        Some(index) => credentials
            .get(index)
            .with_context(|| format!("No credential at index {index}"))?,
        None => credentials
            .sample(&mut rand::thread_rng())
            .context("Credentials catalog is empty")?,
    };

    Ok(record.clone())
}

/// A team drawn at random from the teams catalog.
pub fn sample_team(ctx: &CheckinAgent) -> anyhow::Result<TeamDescriptor> {
    let teams = ctx.runner_context().get().teams()?;
    let team = teams
        .sample(&mut rand::thread_rng())
        .context("Teams catalog is empty")?;

    Ok(team.clone())
}

/// The token to act as `record`, or a skipped iteration if the catalog has none for it.
pub fn require_token(record: &CredentialRecord) -> anyhow::Result<Token> {
    match &record.token {
        Some(token) => Ok(token.clone()),
        None => {
            log::error!("Credential {} has no token", record.username);
            Err(IterationSkipped::new(format!("no token for {}", record.username)).into())
        }
    }
}

/// Run one client call on the shared runtime, blocking this agent until it completes or the
/// iteration is cancelled.
fn run_step<T, F, Fut>(ctx: &CheckinAgent, step: F) -> anyhow::Result<T>
where
    F: FnOnce(CheckinClient) -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let client = ctx.get().client()?.clone();
    ctx.execute_in_place(step(client))
}

pub fn register(ctx: &CheckinAgent, record: &CredentialRecord) -> anyhow::Result<Token> {
    let username = record.username.clone();
    let name = record.name.clone().unwrap_or_else(|| username.clone());
    let password = record
        .password
        .clone()
        .with_context(|| format!("Credential {username} has no password"))?;

    run_step(ctx, |client| async move {
        let registration = Registration {
            username: &username,
            name: &name,
            password: &password,
        };
        Ok(client.register(&registration).await?)
    })
}

pub fn login(ctx: &CheckinAgent, record: &CredentialRecord) -> anyhow::Result<Login> {
    let username = record.username.clone();
    let password = record
        .password
        .clone()
        .with_context(|| format!("Credential {username} has no password"))?;

    run_step(ctx, |client| async move {
        Ok(client.login(&username, &password).await?)
    })
}

pub fn create_team(ctx: &CheckinAgent, token: &Token, team_name: &str) -> anyhow::Result<TeamId> {
    let token = token.clone();
    let team_name = team_name.to_string();

    run_step(ctx, |client| async move {
        Ok(client.create_team(&token, &team_name).await?)
    })
}

pub fn join_team(ctx: &CheckinAgent, token: &Token, team_id: TeamId) -> anyhow::Result<()> {
    let token = token.clone();

    run_step(ctx, |client| async move {
        Ok(client.join_team(&token, team_id).await?)
    })
}

pub fn team_details(
    ctx: &CheckinAgent,
    token: &Token,
    team_id: TeamId,
) -> anyhow::Result<Vec<TeamMember>> {
    let token = token.clone();

    run_step(ctx, |client| async move {
        Ok(client.team_details(&token, team_id).await?)
    })
}

/// Check in to `team_id` as the holder of `token`, posting the configured URL.
pub fn checkin(ctx: &CheckinAgent, token: &Token, team_id: TeamId) -> anyhow::Result<()> {
    let token = token.clone();
    let post_url = ctx.runner_context().get().post_url().to_string();

    run_step(ctx, |client| async move {
        Ok(client.checkin(&token, team_id, &post_url).await?)
    })
}
