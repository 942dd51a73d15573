use axum::extract::{Form, Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use checkin_stampede_runner::prelude::{
    connect_client, create_team_then_checkin, join_then_fan_out, load_credentials, load_teams,
    login_behaviour, partition_credentials, register_then_act, write_login_results,
    CheckinAgentContext, CheckinRunnerContext, CredentialCatalog, HookResult, ReporterOpt,
    RunReport, RunnerContext, ScenarioDefinitionBuilder, StampedeScenarioCli, Token, run,
};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use stampede_instruments::MetricFilter;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// An in-process stand-in for the check-in backend.
#[derive(Default)]
struct Stub {
    fail_create_team: bool,
    roster: Vec<String>,
    next_team_id: AtomicU64,
    checkins: Mutex<Vec<(String, u64)>>,
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::to_string)
}

async fn register(Json(body): Json<Value>) -> Response {
    let username = body["username"].as_str().unwrap_or_default();
    (
        StatusCode::CREATED,
        Json(json!({"success": true, "data": {"access_token": format!("tok-{username}")}})),
    )
        .into_response()
}

/// Users log in with the password `pw`, their id is the number in their username.
async fn token(Form(form): Form<HashMap<String, String>>) -> Response {
    let username = form.get("username").cloned().unwrap_or_default();
    if form.get("password").map(String::as_str) != Some("pw") {
        return (StatusCode::UNAUTHORIZED, Json(json!({"success": false}))).into_response();
    }

    let user_id = username.trim_start_matches("user").parse::<u64>().ok();
    Json(json!({
        "success": true,
        "data": {"access_token": format!("tok-{username}"), "user": {"user_id": user_id}}
    }))
    .into_response()
}

async fn create_team(State(stub): State<Arc<Stub>>) -> Response {
    if stub.fail_create_team {
        return (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response();
    }

    let team_id = stub.next_team_id.fetch_add(1, Ordering::SeqCst) + 1;
    (
        StatusCode::CREATED,
        Json(json!({"success": true, "data": {"team_id": team_id}})),
    )
        .into_response()
}

async fn join_team() -> Json<Value> {
    Json(json!({"success": true}))
}

async fn team_details(State(stub): State<Arc<Stub>>, Path(team_id): Path<u64>) -> Json<Value> {
    let members = stub
        .roster
        .iter()
        .map(|username| json!({"username": username}))
        .collect::<Vec<_>>();
    Json(json!({"success": true, "data": {"team_id": team_id, "members": members}}))
}

async fn checkin(
    State(stub): State<Arc<Stub>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let Some(token) = bearer(&headers) else {
        return (StatusCode::UNAUTHORIZED, Json(json!({"success": false}))).into_response();
    };

    let team_id = body["team_id"].as_u64().unwrap_or_default();
    stub.checkins.lock().push((token, team_id));
    Json(json!({"success": true})).into_response()
}

/// Serve the stub on its own runtime, returning its base URL.
fn start_stub(stub: Arc<Stub>) -> String {
    let app = Router::new()
        .route("/register", post(register))
        .route("/token", post(token))
        .route("/teams", post(create_team))
        .route("/teams/:id/join", post(join_team))
        .route("/teams/:id", get(team_details))
        .route("/checkin", post(checkin))
        .with_state(stub);

    let (tx, rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async move {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            tx.send(listener.local_addr().unwrap()).unwrap();
            let _ = axum::serve(listener, app).await;
        });
    });

    format!("http://{}", rx.recv().unwrap())
}

fn write_data(dir: &tempfile::TempDir, name: &str, content: Value) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content.to_string()).unwrap();
    path
}

fn cli(connection_string: String, data: Vec<(String, PathBuf)>) -> StampedeScenarioCli {
    StampedeScenarioCli {
        connection_string: Some(connection_string),
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
        data,
        request_timeout: None,
        no_progress: true,
        reporter: ReporterOpt::Noop,
        run_id: None,
        summary_file: None,
    }
}

fn new_users(count: usize) -> Value {
    (0..count)
        .map(|i| json!({"username": format!("user{i:04}"), "password": "pw", "name": format!("User {i}")}))
        .collect()
}

fn run_register_then_act(stub: Arc<Stub>, threshold: Vec<String>) -> RunReport {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = tempfile::tempdir().unwrap();
    let credentials = write_data(&dir, "users.json", new_users(6));

    let mut cfg = cli(
        start_stub(stub),
        vec![("credentials".to_string(), credentials)],
    );
    cfg.agents = Some(2);
    cfg.threshold = threshold;

    let scenario = ScenarioDefinitionBuilder::<CheckinRunnerContext, CheckinAgentContext>::new(
        "register_create_team",
        cfg,
    )
    .use_setup(load_credentials)
    .use_iteration_plan(partition_credentials)
    .use_agent_setup(connect_client)
    .use_agent_behaviour(register_then_act);

    run(scenario).unwrap()
}

#[test]
fn every_new_user_registers_creates_a_team_and_checks_in() {
    let stub = Arc::new(Stub::default());

    let report = run_register_then_act(stub.clone(), vec![]);

    let metrics = &report.metrics;
    for step in ["register", "create_team", "checkin"] {
        let stats = metrics.step("register_create_team", step).unwrap();
        assert_eq!((6, 0), (stats.invocations, stats.failures), "{step}");
    }
    assert_eq!((6, 0, 0), metrics.iteration_counts(&MetricFilter::All));
    assert_eq!(2, report.worker_end_count);
    assert!(report.passed());

    let mut tokens = stub
        .checkins
        .lock()
        .iter()
        .map(|(token, _)| token.clone())
        .collect::<Vec<_>>();
    tokens.sort();
    let expected = (0..6).map(|i| format!("tok-user{i:04}")).collect::<Vec<_>>();
    assert_eq!(expected, tokens);
}

#[test]
fn failed_team_creation_stops_each_iteration() {
    let stub = Arc::new(Stub {
        fail_create_team: true,
        ..Default::default()
    });

    let report = run_register_then_act(
        stub.clone(),
        vec![
            "http_req_failed:rate<0.01".to_string(),
            "checks:rate>0.5".to_string(),
        ],
    );

    let metrics = &report.metrics;
    let register = metrics.step("register_create_team", "register").unwrap();
    assert_eq!((6, 0), (register.invocations, register.failures));
    let create_team = metrics.step("register_create_team", "create_team").unwrap();
    assert_eq!((6, 6), (create_team.invocations, create_team.failures));
    assert!(metrics.step("register_create_team", "checkin").is_none());
    assert!(stub.checkins.lock().is_empty());
    assert_eq!((0, 6, 0), metrics.iteration_counts(&MetricFilter::All));

    // Half of all requests failed, and every create_team check failed.
    let results = report.thresholds.results();
    assert_eq!(Some(0.5), results[0].observed);
    assert!(!results[0].passed);
    assert!(!report.passed());
}

#[test]
fn users_without_a_token_are_skipped() {
    let _ = env_logger::builder().is_test(true).try_init();
    let stub = Arc::new(Stub::default());
    let dir = tempfile::tempdir().unwrap();
    let credentials = write_data(
        &dir,
        "users.json",
        json!([
            {"username": "alice", "token": "tok-alice", "team_name": "Red"},
            {"username": "bob"},
            {"username": "carol", "token": "tok-carol"}
        ]),
    );

    let mut cfg = cli(
        start_stub(stub.clone()),
        vec![("credentials".to_string(), credentials)],
    );
    cfg.agents = Some(2);
    let scenario = ScenarioDefinitionBuilder::<CheckinRunnerContext, CheckinAgentContext>::new(
        "create_team_checkin",
        cfg,
    )
    .use_setup(load_credentials)
    .use_iteration_plan(partition_credentials)
    .use_agent_setup(connect_client)
    .use_agent_behaviour(create_team_then_checkin);

    let report = run(scenario).unwrap();

    assert_eq!((2, 0, 1), report.metrics.iteration_counts(&MetricFilter::All));
    let mut tokens = stub
        .checkins
        .lock()
        .iter()
        .map(|(token, _)| token.clone())
        .collect::<Vec<_>>();
    tokens.sort();
    assert_eq!(vec!["tok-alice".to_string(), "tok-carol".to_string()], tokens);
}

fn load_catalogs(ctx: &mut RunnerContext<CheckinRunnerContext>) -> HookResult {
    load_credentials(ctx)?;
    load_teams(ctx)
}

#[test]
fn fan_out_checks_in_every_resolvable_member_with_their_own_token() {
    let _ = env_logger::builder().is_test(true).try_init();
    let stub = Arc::new(Stub {
        roster: vec!["m1".to_string(), "ghost".to_string(), "m2".to_string()],
        ..Default::default()
    });
    let dir = tempfile::tempdir().unwrap();
    let credentials = write_data(
        &dir,
        "users.json",
        json!([
            {"username": "m1", "token": "tok-m1"},
            {"username": "m2", "token": "tok-m2"}
        ]),
    );
    let teams = write_data(&dir, "teams.json", json!([{"team_name": "Red", "team_id": 5}]));

    let mut cfg = cli(
        start_stub(stub.clone()),
        vec![
            ("credentials".to_string(), credentials),
            ("teams".to_string(), teams),
        ],
    );
    cfg.agents = Some(1);
    cfg.iterations = Some(1);
    let scenario = ScenarioDefinitionBuilder::<CheckinRunnerContext, CheckinAgentContext>::new(
        "join_and_checkin",
        cfg,
    )
    .use_setup(load_catalogs)
    .use_agent_setup(connect_client)
    .use_agent_behaviour(join_then_fan_out);

    let report = run(scenario).unwrap();

    assert_eq!(
        vec![("tok-m1".to_string(), 5), ("tok-m2".to_string(), 5)],
        *stub.checkins.lock()
    );

    let metrics = &report.metrics;
    assert_eq!(1, metrics.step("join_and_checkin", "join_team").unwrap().invocations);
    assert_eq!(1, metrics.step("join_and_checkin", "team_details").unwrap().invocations);
    let checkin = metrics.step("join_and_checkin", "checkin").unwrap();
    assert_eq!((2, 0), (checkin.invocations, checkin.failures));
    // The member with no credential is a failed check against the checkin step.
    assert_eq!(1, checkin.checks_failed);
    assert_eq!((1, 0, 0), metrics.iteration_counts(&MetricFilter::All));
}

#[test]
fn successful_logins_are_written_out_sorted_by_username() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = tempfile::tempdir().unwrap();
    let credentials = write_data(
        &dir,
        "users.json",
        json!([
            {"username": "user0003", "password": "pw"},
            {"username": "user0001", "password": "pw"},
            {"username": "user0002", "password": "wrong"}
        ]),
    );
    let login_results = dir.path().join("login_results.json");

    let mut cfg = cli(
        start_stub(Arc::new(Stub::default())),
        vec![
            ("credentials".to_string(), credentials),
            ("login_results".to_string(), login_results.clone()),
        ],
    );
    cfg.agents = Some(2);
    let scenario = ScenarioDefinitionBuilder::<CheckinRunnerContext, CheckinAgentContext>::new(
        "user_login",
        cfg,
    )
    .use_setup(load_credentials)
    .use_iteration_plan(partition_credentials)
    .use_agent_setup(connect_client)
    .use_agent_behaviour(login_behaviour)
    .use_teardown(write_login_results);

    let report = run(scenario).unwrap();

    assert_eq!((2, 1, 0), report.metrics.iteration_counts(&MetricFilter::All));

    let written: Value =
        serde_json::from_str(&std::fs::read_to_string(&login_results).unwrap()).unwrap();
    assert_eq!(
        json!([
            {"username": "user0001", "user_id": 1, "token": "tok-user0001"},
            {"username": "user0003", "user_id": 3, "token": "tok-user0003"}
        ]),
        written
    );

    // The output is a credentials catalog for the scenarios that act as existing users.
    let catalog = CredentialCatalog::load(&login_results).unwrap();
    assert_eq!(
        Some(Token::from("tok-user0003")),
        catalog.by_label("user0003").unwrap().token
    );
}
