use std::sync::Arc;
use std::time::Duration;

use axum::extract::Form;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use checkin_client_instrumented::prelude::{CheckinClient, Registration, StepError, TeamId, Token};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use stampede_instruments::{MetricFilter, ReportConfig, Reporter};

async fn register() -> impl IntoResponse {
    (
        StatusCode::CREATED,
        Json(json!({"success": true, "message": "ok", "data": {"access_token": "tok-1"}})),
    )
}

async fn login(Form(form): Form<Vec<(String, String)>>) -> impl IntoResponse {
    let password_ok = form.iter().any(|(k, v)| k == "password" && v == "pw");
    if password_ok {
        (
            StatusCode::OK,
            Json(json!({"success": true, "data": {"access_token": "tok-2", "user": {"user_id": 9}}})),
        )
    } else {
        (StatusCode::UNAUTHORIZED, Json(json!({"success": false})))
    }
}

async fn create_team() -> impl IntoResponse {
    (
        StatusCode::CREATED,
        Json(json!({"success": true, "data": {"team_id": 17}})),
    )
}

async fn join_redirects() -> impl IntoResponse {
    (StatusCode::TEMPORARY_REDIRECT, [(header::LOCATION, "/api/elsewhere")])
}

async fn slow_checkin() -> Json<Value> {
    tokio::time::sleep(Duration::from_secs(5)).await;
    Json(json!({"success": true}))
}

async fn start_stub() -> String {
    let api = Router::new()
        .route("/register", post(register))
        .route("/token", post(login))
        .route("/teams", post(create_team))
        .route("/teams/:id/join", post(join_redirects))
        .route("/teams/:id", get(|| async { Json(json!({"success": true, "data": {}})) }))
        .route("/checkin", post(slow_checkin));
    let app = Router::new().nest("/api", api);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}/api", listener.local_addr().unwrap());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    base_url
}

fn client(base_url: &str, reporter: Arc<Reporter>) -> CheckinClient {
    CheckinClient::new(
        base_url,
        Duration::from_millis(300),
        reporter,
        "client_steps",
        "agent-0",
    )
    .unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn steps_resolve_under_the_base_path() {
    let base_url = start_stub().await;
    let reporter = Arc::new(ReportConfig::default().init());
    let client = client(&base_url, reporter.clone());

    let token = client
        .register(&Registration {
            username: "user1",
            name: "User One",
            password: "pw",
        })
        .await
        .unwrap();
    assert_eq!(Token::from("tok-1"), token);

    let login = client.login("user1", "pw").await.unwrap();
    assert_eq!(Token::from("tok-2"), login.token);
    assert_eq!(Some(9), login.user_id);

    let team_id = client.create_team(&token, "team-a").await.unwrap();
    assert_eq!(TeamId(17), team_id);

    let metrics = reporter.snapshot();
    assert_eq!(3, metrics.request_count(&MetricFilter::All));
    assert_eq!(0, metrics.failed_request_count(&MetricFilter::All));
}

#[tokio::test(flavor = "multi_thread")]
async fn rejected_login_is_recorded_as_a_failure() {
    let base_url = start_stub().await;
    let reporter = Arc::new(ReportConfig::default().init());
    let client = client(&base_url, reporter.clone());

    let err = client.login("user1", "wrong").await.unwrap_err();

    assert_eq!(Some(401), err.status());
    assert_eq!(1, reporter.snapshot().failed_request_count(&MetricFilter::All));
}

#[tokio::test(flavor = "multi_thread")]
async fn redirects_are_not_followed() {
    let base_url = start_stub().await;
    let reporter = Arc::new(ReportConfig::default().init());
    let client = client(&base_url, reporter.clone());

    let err = client
        .join_team(&Token::from("tok-1"), TeamId(17))
        .await
        .unwrap_err();

    assert_eq!(Some(307), err.status());
    assert_eq!("join_team", err.step());
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_roster_is_a_failed_check() {
    let base_url = start_stub().await;
    let reporter = Arc::new(ReportConfig::default().init());
    let client = client(&base_url, reporter.clone());

    let err = client
        .team_details(&Token::from("tok-1"), TeamId(17))
        .await
        .unwrap_err();

    match err {
        StepError::Rejected { failed_checks, .. } => {
            assert_eq!(vec!["team members retrieved".to_string()], failed_checks)
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn slow_response_times_out() {
    let base_url = start_stub().await;
    let reporter = Arc::new(ReportConfig::default().init());
    let client = client(&base_url, reporter.clone());

    let err = client
        .checkin(&Token::from("tok-1"), TeamId(17), "http://aaa.com")
        .await
        .unwrap_err();

    assert!(matches!(err, StepError::Timeout { step: "checkin" }));
    let metrics = reporter.snapshot();
    let checkin = metrics.step("client_steps", "checkin").unwrap();
    assert_eq!(1, checkin.invocations);
    assert_eq!(1, checkin.failures);
}
