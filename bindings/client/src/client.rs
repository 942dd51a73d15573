use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use reqwest::redirect::Policy;
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use serde_json::json;
use stampede_instruments::{Reporter, StepRecord};
use url::Url;

use crate::check::{Checks, StepResponse};
use crate::error::StepError;
use crate::types::{Login, Registration, TeamId, TeamMember, Token};

/// An HTTP client for the team check-in backend that records every request it makes.
///
/// Each step sends exactly one request. The request is timed, its response is checked, and a
/// [StepRecord] is handed to the [Reporter] before the result is returned. There are no retries
/// and redirects are not followed.
///
/// Create one client per worker. The underlying connection pool is not shared between workers.
#[derive(Debug, Clone)]
pub struct CheckinClient {
    http: reqwest::Client,
    base_url: Url,
    reporter: Arc<Reporter>,
    scenario: String,
    agent: String,
}

impl CheckinClient {
    pub fn new(
        base_url: &str,
        request_timeout: Duration,
        reporter: Arc<Reporter>,
        scenario: impl Into<String>,
        agent: impl Into<String>,
    ) -> anyhow::Result<Self> {
        let mut base_url =
            Url::parse(base_url).with_context(|| format!("Invalid backend URL: {base_url}"))?;
        // Paths are joined onto the base, so it must end with a slash to keep a prefix like `/api`.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .redirect(Policy::none())
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url,
            reporter,
            scenario: scenario.into(),
            agent: agent.into(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `POST /register`, returning the token issued for the new user.
    pub async fn register(&self, registration: &Registration<'_>) -> Result<Token, StepError> {
        const STEP: &str = "register";
        let request = self.http.post(self.endpoint(STEP, "register")?).json(registration);
        let checks = Checks::new()
            .status("is status 201", 201)
            .is_true("is success true", "/success")
            .any_present("has token", &["/data/access_token"]);

        let response = self.exchange(STEP, 201, request, &checks).await?;
        extract(STEP, &response, "/data/access_token")
    }

    /// `POST /token` with form-encoded credentials.
    pub async fn login(&self, username: &str, password: &str) -> Result<Login, StepError> {
        const STEP: &str = "login";
        let request = self.http.post(self.endpoint(STEP, "token")?).form(&[
            ("username", username),
            ("password", password),
            ("grant_type", "password"),
        ]);
        let checks = Checks::new()
            .status("is status 200", 200)
            .any_present("has token", &["/data/access_token", "/access_token"]);

        let response = self.exchange(STEP, 200, request, &checks).await?;
        let token = extract(STEP, &response, "/data/access_token")
            .or_else(|_| extract(STEP, &response, "/access_token"))?;
        let user_id = response
            .pointer("/data/user/user_id")
            .and_then(|v| v.as_u64());

        Ok(Login { token, user_id })
    }

    /// `POST /teams`, returning the identifier of the created team.
    pub async fn create_team(&self, token: &Token, team_name: &str) -> Result<TeamId, StepError> {
        const STEP: &str = "create_team";
        let request = self
            .http
            .post(self.endpoint(STEP, "teams")?)
            .bearer_auth(token.as_str())
            .json(&json!({ "team_name": team_name }));
        let checks = Checks::new()
            .status("is status 201", 201)
            .is_true("team created", "/success")
            .any_present("has team_id", &["/data/team_id"]);

        let response = self.exchange(STEP, 201, request, &checks).await?;
        extract(STEP, &response, "/data/team_id")
    }

    /// `POST /teams/{team_id}/join` for the holder of `token`.
    pub async fn join_team(&self, token: &Token, team_id: TeamId) -> Result<(), StepError> {
        const STEP: &str = "join_team";
        let request = self
            .http
            .post(self.endpoint(STEP, &format!("teams/{team_id}/join"))?)
            .bearer_auth(token.as_str())
            .json(&json!({}));
        let checks = Checks::new()
            .status("join status is 200", 200)
            .is_true("join success", "/success");

        self.exchange(STEP, 200, request, &checks).await?;
        Ok(())
    }

    /// `GET /teams/{team_id}`, returning the roster.
    pub async fn team_details(
        &self,
        token: &Token,
        team_id: TeamId,
    ) -> Result<Vec<TeamMember>, StepError> {
        const STEP: &str = "team_details";
        let request = self
            .http
            .get(self.endpoint(STEP, &format!("teams/{team_id}"))?)
            .bearer_auth(token.as_str());
        let checks = Checks::new()
            .status("team details fetched", 200)
            .is_array("team members retrieved", "/data/members");

        let response = self.exchange(STEP, 200, request, &checks).await?;
        extract(STEP, &response, "/data/members")
    }

    /// `POST /checkin` for the holder of `token`.
    pub async fn checkin(
        &self,
        token: &Token,
        team_id: TeamId,
        post_url: &str,
    ) -> Result<(), StepError> {
        const STEP: &str = "checkin";
        let request = self
            .http
            .post(self.endpoint(STEP, "checkin")?)
            .bearer_auth(token.as_str())
            .json(&json!({ "team_id": team_id, "post_url": post_url }));
        let checks = Checks::new()
            .status("is status 200", 200)
            .is_true("checkin success", "/success");

        self.exchange(STEP, 200, request, &checks).await?;
        Ok(())
    }

    fn endpoint(&self, step: &'static str, path: &str) -> Result<Url, StepError> {
        self.base_url.join(path).map_err(|e| StepError::Unusable {
            step,
            reason: format!("cannot build URL for {path}: {e}"),
        })
    }

    /// Send one request, judge the response and record the outcome.
    async fn exchange(
        &self,
        step: &'static str,
        expected_status: u16,
        request: RequestBuilder,
        checks: &Checks,
    ) -> Result<StepResponse, StepError> {
        let record = StepRecord::new(self.scenario.as_str(), step, self.agent.as_str());

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                self.reporter
                    .add_step(record.finish(None, expected_status, Vec::new()));
                return Err(StepError::from_send(step, e));
            }
        };

        let status = response.status().as_u16();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                self.reporter
                    .add_step(record.finish(Some(status), expected_status, Vec::new()));
                return Err(StepError::from_send(step, e));
            }
        };

        let response = StepResponse::new(status, body);
        let record = record.finish(Some(status), expected_status, checks.evaluate(&response));
        let failed_checks = record
            .failed_checks()
            .map(|c| c.name.clone())
            .collect::<Vec<_>>();
        let is_error = record.is_error;
        self.reporter.add_step(record);

        if is_error || !failed_checks.is_empty() {
            log::debug!(
                "[{}] {} {} rejected with status {}",
                self.scenario,
                self.agent,
                step,
                status
            );
            return Err(StepError::Rejected {
                step,
                status,
                failed_checks,
                snippet: response.snippet(),
            });
        }

        Ok(response)
    }
}

/// Deserialize the value at `pointer`, which the checks have already found.
fn extract<T: DeserializeOwned>(
    step: &'static str,
    response: &StepResponse,
    pointer: &str,
) -> Result<T, StepError> {
    let value = response
        .pointer(pointer)
        .cloned()
        .ok_or_else(|| StepError::Unusable {
            step,
            reason: format!("missing {pointer}"),
        })?;

    serde_json::from_value(value).map_err(|e| StepError::Unusable {
        step,
        reason: format!("unexpected value at {pointer}: {e}"),
    })
}
