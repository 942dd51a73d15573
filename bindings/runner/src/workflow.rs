//! Agent behaviours for the check-in scenarios.
//!
//! Each behaviour is one iteration: an ordered list of steps where every step uses what the
//! previous one returned. A step that fails ends the iteration, the error is returned to the
//! runner which records the iteration as aborted.
//!
//! Pauses between steps are named think times:
//! - `after_register`
//! - `after_create`
//! - `after_join`
//! - `between_checkins`
//! - `after_iteration`

use crate::catalog::LoginResult;
use crate::common::{
    checkin, create_team, credential_for_iteration, join_team, login, register, require_token,
    sample_team, team_details, CheckinAgent,
};
use checkin_client_instrumented::prelude::{TeamId, TeamMember, Token};
use stampede_runner::prelude::{
    CheckOutcome, HookResult, IterationSkipped, RampedDownError, ShutdownSignalError,
};

/// The check recorded when a roster member has no usable credential.
pub const MEMBER_RESOLVED_CHECK: &str = "member credential resolved";

/// Register the user for this iteration.
pub fn register_behaviour(ctx: &mut CheckinAgent) -> HookResult {
    let record = credential_for_iteration(ctx)?;
    register(ctx, &record)?;

    ctx.think("after_register")
}

/// Log in as the user for this iteration and keep the token.
///
/// Pair this with [crate::prelude::write_login_results] to save the tokens at the end of the run.
pub fn login_behaviour(ctx: &mut CheckinAgent) -> HookResult {
    let record = credential_for_iteration(ctx)?;
    let login = login(ctx, &record)?;
    log::trace!("Logged in as {} ({:?})", record.username, login.user_id);

    ctx.runner_context().get().record_login(LoginResult {
        username: record.username,
        user_id: login.user_id,
        token: login.token,
    });

    ctx.think("after_iteration")
}

/// Register a new user, create their team and check in to it.
pub fn register_then_act(ctx: &mut CheckinAgent) -> HookResult {
    let record = credential_for_iteration(ctx)?;

    let token = register(ctx, &record)?;
    ctx.think("after_register")?;

    create_and_checkin(ctx, &token, &record.team_name())
}

/// Create a team as an already registered user and check in to it.
///
/// Users without a token in the catalog are skipped.
pub fn create_team_then_checkin(ctx: &mut CheckinAgent) -> HookResult {
    let record = credential_for_iteration(ctx)?;
    let token = require_token(&record)?;

    create_and_checkin(ctx, &token, &record.team_name())
}

fn create_and_checkin(ctx: &mut CheckinAgent, token: &Token, team_name: &str) -> HookResult {
    let team_id = create_team(ctx, token, team_name)?;
    ctx.think("after_create")?;

    checkin(ctx, token, team_id)?;
    ctx.think("after_iteration")
}

/// Join a random team as a random user, then check in once for every member of the team.
///
/// Each member checks in with their own token, looked up by username in the credentials
/// catalog. A member who cannot be found is recorded as a failed check and skipped. A member
/// whose check-in fails does not stop the others.
pub fn join_then_fan_out(ctx: &mut CheckinAgent) -> HookResult {
    let actor = credential_for_iteration(ctx)?;
    let token = require_token(&actor)?;

    let team = sample_team(ctx)?;
    let Some(team_id) = team.team_id else {
        log::error!("Team {} has no team_id", team.team_name);
        return Err(IterationSkipped::new(format!("no team_id for {}", team.team_name)).into());
    };

    join_team(ctx, &token, team_id)?;
    ctx.think("after_join")?;

    let members = team_details(ctx, &token, team_id)?;
    log::debug!(
        "Agent {} checking in {} members of team {}",
        ctx.agent_id(),
        members.len(),
        team_id
    );

    for member in &members {
        checkin_member(ctx, member, team_id)?;
        ctx.think("between_checkins")?;
    }

    ctx.think("after_iteration")
}

/// Check in as one roster member. Only a stop signal or a cancelled iteration is returned as an
/// error.
fn checkin_member(ctx: &CheckinAgent, member: &TeamMember, team_id: TeamId) -> HookResult {
    let runner_context = ctx.runner_context();
    let token = runner_context
        .get()
        .credentials()?
        .by_label(&member.username)
        .and_then(|record| record.token.clone());

    let Some(token) = token else {
        log::error!(
            "[{}] No credential for member {} of team {}",
            runner_context.scenario_name(),
            member.username,
            team_id
        );
        runner_context.reporter().add_check(
            runner_context.scenario_name(),
            "checkin",
            CheckOutcome::failed(MEMBER_RESOLVED_CHECK),
        );
        return Ok(());
    };

    match checkin(ctx, &token, team_id) {
        Ok(()) => Ok(()),
        Err(e) if e.is::<ShutdownSignalError>() || e.is::<RampedDownError>() => Err(e),
        Err(e) => {
            log::error!(
                "[{}] Check-in failed for member {} of team {}: {:?}",
                runner_context.scenario_name(),
                member.username,
                team_id,
                e
            );
            Ok(())
        }
    }
}
