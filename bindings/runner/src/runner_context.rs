use crate::catalog::{CredentialCatalog, LoginResult, TeamCatalog};
use anyhow::Context;
use parking_lot::Mutex;
use std::sync::Arc;
use stampede_runner::prelude::UserValuesConstraint;

/// The value sent as `post_url` with every check-in, unless `CHECKIN_POST_URL` is set.
pub const DEFAULT_POST_URL: &str = "http://aaa.com";

#[derive(Debug)]
pub struct CheckinRunnerContext {
    pub(crate) credentials: Option<Arc<CredentialCatalog>>,
    pub(crate) teams: Option<Arc<TeamCatalog>>,
    post_url: String,
    login_results: Mutex<Vec<LoginResult>>,
}

impl Default for CheckinRunnerContext {
    fn default() -> Self {
        Self {
            credentials: None,
            teams: None,
            post_url: std::env::var("CHECKIN_POST_URL")
                .unwrap_or_else(|_| DEFAULT_POST_URL.to_string()),
            login_results: Mutex::new(Vec::new()),
        }
    }
}

impl UserValuesConstraint for CheckinRunnerContext {}

impl CheckinRunnerContext {
    /// The credentials catalog, available after [crate::prelude::load_credentials] has run in the setup hook.
    pub fn credentials(&self) -> anyhow::Result<&Arc<CredentialCatalog>> {
        self.credentials
            .as_ref()
            .context("Credentials are not loaded, call 'load_credentials' in the scenario 'setup'")
    }

    /// The teams catalog, available after [crate::prelude::load_teams] has run in the setup hook.
    pub fn teams(&self) -> anyhow::Result<&Arc<TeamCatalog>> {
        self.teams
            .as_ref()
            .context("Teams are not loaded, call 'load_teams' in the scenario 'setup'")
    }

    pub fn post_url(&self) -> &str {
        &self.post_url
    }

    pub(crate) fn record_login(&self, result: LoginResult) {
        self.login_results.lock().push(result);
    }

    /// The logins recorded so far, sorted by username.
    pub fn login_results(&self) -> Vec<LoginResult> {
        let mut results = self.login_results.lock().clone();
        results.sort_by(|a, b| a.username.cmp(&b.username));
        results
    }
}
