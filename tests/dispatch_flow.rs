//! End-to-end dispatch protocol tests driven through the router.
//!
//! Covers the full runner lifecycle (dequeue, claim, report, read
//! back), the authorization gate on both identity kinds, and the bulk
//! fan-out behavior.

use axum::body::Body;
use axum::http::header::{CONTENT_TYPE, COOKIE, SET_COOKIE};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use testdeck::api::auth::{password_digest, ALL_ROLES, RUNNER_HEADER};
use testdeck::api::state::AppState;
use testdeck::config::Config;
use testdeck::model::{RoleEntry, UserInput};
use testdeck::session::SessionStore;
use testdeck::storage::{open_pool, UserStore};

const RUNNER_SECRET: &str = "runner-secret";
const ADMIN_EMAIL: &str = "admin@example.test";
const ADMIN_PASSWORD: &str = "hunter2";

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

struct TestApp {
    router: Router,
    _dir: tempfile::TempDir,
}

fn test_app() -> TestApp {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("testdeck.db");
    let pool = open_pool(path.to_str().unwrap()).unwrap();

    let mut config = Config::default();
    config.auth.runner_secret = RUNNER_SECRET.to_string();

    // Seed an admin the way the CLI bootstrap does.
    let digest = password_digest(ADMIN_EMAIL, ADMIN_PASSWORD, &config.auth.password_salt);
    UserStore::new(pool.clone())
        .create(
            1,
            &UserInput {
                name: "Admin".to_string(),
                email: ADMIN_EMAIL.to_string(),
                password: None,
                roles: ALL_ROLES
                    .iter()
                    .map(|role| RoleEntry {
                        role: role.to_string(),
                    })
                    .collect(),
            },
            &digest,
        )
        .unwrap();

    let sessions = Arc::new(SessionStore::new(config.auth.session_ttl_minutes));
    let state = AppState::new(pool, sessions, &config);
    TestApp {
        router: testdeck::api::router(state, None),
        _dir: dir,
    }
}

async fn call(app: &Router, request: Request<Body>) -> (StatusCode, Option<String>, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let set_cookie = response
        .headers()
        .get(SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, set_cookie, body)
}

fn request(method: Method, path: &str) -> axum::http::request::Builder {
    Request::builder().method(method).uri(path)
}

fn with_json(builder: axum::http::request::Builder, body: Value) -> Request<Body> {
    builder
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn empty(builder: axum::http::request::Builder) -> Request<Body> {
    builder.body(Body::empty()).unwrap()
}

/// Log in as the seeded admin and return the session cookie pair.
async fn login(app: &Router) -> String {
    let (status, set_cookie, body) = call(
        app,
        with_json(
            request(Method::POST, "/login"),
            json!({ "username": ADMIN_EMAIL, "password": ADMIN_PASSWORD }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "authenticated");
    set_cookie
        .expect("login sets a cookie")
        .split(';')
        .next()
        .unwrap()
        .to_string()
}

async fn create_test(app: &Router, cookie: &str, name: &str) -> String {
    let (status, _, body) = call(
        app,
        with_json(
            request(Method::POST, "/test").header(COOKIE, cookie),
            json!({
                "name": name,
                "purpose": "smoke",
                "browser": "firefox",
                "urlDomain": "example.test",
                "urlPath": "/login",
                "steps": [
                    { "description": "open login page", "command": "open", "target": "/login" },
                    { "description": "submit form", "command": "click", "target": "#submit" }
                ]
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["uid"].as_str().unwrap().to_string()
}

async fn submit_run(app: &Router, cookie: &str, test_uid: &str) -> String {
    let (status, _, body) = call(
        app,
        with_json(
            request(Method::POST, &format!("/test/{test_uid}/run")).header(COOKIE, cookie),
            json!({ "browser": "firefox", "urlDomain": "example.test" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "new");
    body["uid"].as_str().unwrap().to_string()
}

// ---------------------------------------------------------------------------
// Authorization gate
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_dispatch_endpoints_reject_missing_credentials() {
    let app = test_app();

    let (status, _, _) = call(&app.router, empty(request(Method::GET, "/run/next"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, _) = call(
        &app.router,
        with_json(
            request(Method::PATCH, "/run/some-uid"),
            json!({ "status": "started", "start": "2026-01-01T00:00:00Z" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, _) = call(
        &app.router,
        with_json(
            request(Method::PUT, "/run/some-uid"),
            json!({ "status": "passed" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_dispatch_endpoints_reject_wrong_secret() {
    let app = test_app();
    let (status, _, _) = call(
        &app.router,
        empty(request(Method::GET, "/run/next").header(RUNNER_HEADER, "wrong")),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_runner_secret_opens_every_dispatch_endpoint() {
    let app = test_app();

    let (status, _, body) = call(
        &app.router,
        empty(request(Method::GET, "/run/next").header(RUNNER_HEADER, RUNNER_SECRET)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({}));

    let (status, _, body) = call(
        &app.router,
        with_json(
            request(Method::PATCH, "/run/unknown").header(RUNNER_HEADER, RUNNER_SECRET),
            json!({ "status": "started", "start": "2026-01-01T00:00:00Z" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["error"], "Run not found.");

    let (status, _, body) = call(
        &app.router,
        with_json(
            request(Method::PUT, "/run/unknown").header(RUNNER_HEADER, RUNNER_SECRET),
            json!({ "status": "passed" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["error"], "Run not found.");
}

#[tokio::test]
async fn test_interactive_endpoints_reject_anonymous_and_allow_session() {
    let app = test_app();

    let (status, _, _) = call(&app.router, empty(request(Method::GET, "/run"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let cookie = login(&app.router).await;
    let (status, _, body) = call(
        &app.router,
        empty(request(Method::GET, "/run").header(COOKIE, cookie.as_str())),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

// ---------------------------------------------------------------------------
// Dispatch protocol
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_empty_queue_returns_empty_object() {
    let app = test_app();
    let (status, _, body) = call(
        &app.router,
        empty(request(Method::GET, "/run/next").header(RUNNER_HEADER, RUNNER_SECRET)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({}));
}

#[tokio::test]
async fn test_full_runner_lifecycle() {
    let app = test_app();
    let cookie = login(&app.router).await;
    let test_uid = create_test(&app.router, &cookie, "Login flow").await;
    let run_uid = submit_run(&app.router, &cookie, &test_uid).await;

    // Dequeue: payload carries the run and the step script.
    let (status, _, payload) = call(
        &app.router,
        empty(request(Method::GET, "/run/next").header(RUNNER_HEADER, RUNNER_SECRET)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["uid"], run_uid.as_str());
    assert_eq!(payload["status"], "new");
    assert_eq!(payload["urlPath"], "/login");
    assert_eq!(payload["steps"].as_array().unwrap().len(), 2);
    assert_eq!(payload["steps"][0]["command"], "open");

    // Dequeue alone must not claim.
    let (_, _, again) = call(
        &app.router,
        empty(request(Method::GET, "/run/next").header(RUNNER_HEADER, RUNNER_SECRET)),
    )
    .await;
    assert_eq!(again["uid"], run_uid.as_str());

    // Claim.
    let (status, _, body) = call(
        &app.router,
        with_json(
            request(Method::PATCH, &format!("/run/{run_uid}"))
                .header(RUNNER_HEADER, RUNNER_SECRET),
            json!({ "status": "started", "start": "2026-01-05T08:30:00Z" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Run started.");

    // A second claim loses.
    let (status, _, body) = call(
        &app.router,
        with_json(
            request(Method::PATCH, &format!("/run/{run_uid}"))
                .header(RUNNER_HEADER, RUNNER_SECRET),
            json!({ "status": "started", "start": "2026-01-05T08:30:01Z" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["error"], "Run already started.");

    // The queue is drained.
    let (_, _, body) = call(
        &app.router,
        empty(request(Method::GET, "/run/next").header(RUNNER_HEADER, RUNNER_SECRET)),
    )
    .await;
    assert_eq!(body, json!({}));

    // Report three step outcomes.
    let (status, _, reported) = call(
        &app.router,
        with_json(
            request(Method::PUT, &format!("/run/{run_uid}"))
                .header(RUNNER_HEADER, RUNNER_SECRET),
            json!({
                "status": "passed",
                "end": "2026-01-05T08:31:00Z",
                "steps": [
                    { "description": "open login page", "outcome": "pass" },
                    { "description": "submit form", "outcome": "pass", "detail": "200 OK" },
                    { "description": "assert greeting", "outcome": "pass" }
                ]
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reported["status"], "passed");
    assert_eq!(reported["steps"].as_array().unwrap().len(), 3);

    // Read back through the interactive surface: exact round trip.
    let (status, _, detail) = call(
        &app.router,
        empty(request(Method::GET, &format!("/run/{run_uid}")).header(COOKIE, cookie.as_str())),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["status"], "passed");
    assert_eq!(detail["end"], "2026-01-05T08:31:00+00:00");
    assert_eq!(detail["start"], "2026-01-05T08:30:00+00:00");
    assert_eq!(detail["test_name"], "Login flow");
    let steps = detail["steps"].as_array().unwrap();
    assert_eq!(steps.len(), 3);
    assert_eq!(steps[0]["position"], 1);
    assert_eq!(steps[1]["detail"], "200 OK");
    assert_eq!(steps[2]["position"], 3);
}

#[tokio::test]
async fn test_claim_against_unknown_uid_mutates_nothing() {
    let app = test_app();
    let cookie = login(&app.router).await;
    let test_uid = create_test(&app.router, &cookie, "Login flow").await;
    let run_uid = submit_run(&app.router, &cookie, &test_uid).await;

    let (status, _, body) = call(
        &app.router,
        with_json(
            request(Method::PATCH, "/run/unknown").header(RUNNER_HEADER, RUNNER_SECRET),
            json!({ "status": "started", "start": "2026-01-01T00:00:00Z" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["error"], "Run not found.");

    // The pending run is untouched.
    let (_, _, detail) = call(
        &app.router,
        empty(request(Method::GET, &format!("/run/{run_uid}")).header(COOKIE, cookie.as_str())),
    )
    .await;
    assert_eq!(detail["status"], "new");
}

#[tokio::test]
async fn test_claim_with_non_started_status_is_rejected() {
    let app = test_app();
    let cookie = login(&app.router).await;
    let test_uid = create_test(&app.router, &cookie, "Login flow").await;
    let run_uid = submit_run(&app.router, &cookie, &test_uid).await;

    let (status, _, _) = call(
        &app.router,
        with_json(
            request(Method::PATCH, &format!("/run/{run_uid}"))
                .header(RUNNER_HEADER, RUNNER_SECRET),
            json!({ "status": "passed", "start": "2026-01-01T00:00:00Z" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_report_with_non_terminal_status_is_rejected() {
    let app = test_app();
    let cookie = login(&app.router).await;
    let test_uid = create_test(&app.router, &cookie, "Login flow").await;
    let run_uid = submit_run(&app.router, &cookie, &test_uid).await;

    let (status, _, _) = call(
        &app.router,
        with_json(
            request(Method::PUT, &format!("/run/{run_uid}"))
                .header(RUNNER_HEADER, RUNNER_SECRET),
            json!({ "status": "started" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ---------------------------------------------------------------------------
// Run submission
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_single_run_for_unknown_test_is_an_error_body() {
    let app = test_app();
    let cookie = login(&app.router).await;

    let (status, _, body) = call(
        &app.router,
        with_json(
            request(Method::POST, "/test/unknown/run").header(COOKIE, cookie.as_str()),
            json!({ "browser": "firefox", "urlDomain": "example.test" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["error"], "Test not found.");
}

#[tokio::test]
async fn test_bulk_submission_creates_one_run_per_tuple() {
    let app = test_app();
    let cookie = login(&app.router).await;
    let t1 = create_test(&app.router, &cookie, "Login flow").await;
    let t2 = create_test(&app.router, &cookie, "Checkout flow").await;

    let (status, _, collection) = call(
        &app.router,
        with_json(
            request(Method::POST, "/collection").header(COOKIE, cookie.as_str()),
            json!({
                "name": "Nightly",
                "description": "overnight set",
                "tests": [
                    { "test": t1, "browser": "firefox", "urlDomain": "example.test" },
                    { "test": t2, "browser": "chromium", "urlDomain": "example.test" }
                ]
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let collection_uid = collection["uid"].as_str().unwrap();

    let (status, _, created) = call(
        &app.router,
        empty(
            request(Method::POST, &format!("/collection/{collection_uid}/run"))
                .header(COOKIE, cookie.as_str()),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let created = created.as_array().unwrap();
    assert_eq!(created.len(), 2);
    for run in created {
        assert_eq!(run["status"], "new");
    }
}

#[tokio::test]
async fn test_bulk_submission_keeps_prior_runs_on_mid_sequence_failure() {
    let app = test_app();
    let cookie = login(&app.router).await;
    let t1 = create_test(&app.router, &cookie, "Login flow").await;
    let t2 = create_test(&app.router, &cookie, "Checkout flow").await;

    // Middle tuple references a test that will not resolve.
    let (_, _, collection) = call(
        &app.router,
        with_json(
            request(Method::POST, "/collection").header(COOKIE, cookie.as_str()),
            json!({
                "name": "Nightly",
                "tests": [
                    { "test": t1, "browser": "firefox", "urlDomain": "example.test" },
                    { "test": "gone", "browser": "firefox", "urlDomain": "example.test" },
                    { "test": t2, "browser": "firefox", "urlDomain": "example.test" }
                ]
            }),
        ),
    )
    .await;
    let collection_uid = collection["uid"].as_str().unwrap();

    let (status, _, body) = call(
        &app.router,
        empty(
            request(Method::POST, &format!("/collection/{collection_uid}/run"))
                .header(COOKIE, cookie.as_str()),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["error"], "Test not found.");

    // The run created before the failure is not rolled back.
    let (_, _, runs) = call(
        &app.router,
        empty(request(Method::GET, "/run").header(COOKIE, cookie.as_str())),
    )
    .await;
    let runs = runs.as_array().unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0]["test"], t1.as_str());
    assert_eq!(runs[0]["status"], "new");
}

// ---------------------------------------------------------------------------
// Interactive browse and delete
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_delete_run_reports_row_count() {
    let app = test_app();
    let cookie = login(&app.router).await;
    let test_uid = create_test(&app.router, &cookie, "Login flow").await;
    let run_uid = submit_run(&app.router, &cookie, &test_uid).await;

    let (status, _, body) = call(
        &app.router,
        empty(
            request(Method::DELETE, &format!("/run/{run_uid}")).header(COOKIE, cookie.as_str()),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["numberOfDeletedRows"], 1);

    let (_, _, body) = call(
        &app.router,
        empty(request(Method::GET, &format!("/run/{run_uid}")).header(COOKIE, cookie.as_str())),
    )
    .await;
    assert_eq!(body["error"], "Run not found.");
}

#[tokio::test]
async fn test_test_listing_carries_latest_run() {
    let app = test_app();
    let cookie = login(&app.router).await;
    let test_uid = create_test(&app.router, &cookie, "Login flow").await;
    let run_uid = submit_run(&app.router, &cookie, &test_uid).await;

    let (status, _, tests) = call(
        &app.router,
        empty(request(Method::GET, "/test").header(COOKIE, cookie.as_str())),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let tests = tests.as_array().unwrap();
    assert_eq!(tests.len(), 1);
    assert_eq!(tests[0]["stepCount"], 2);
    assert_eq!(tests[0]["run_uid"], run_uid.as_str());
    assert_eq!(tests[0]["run_status"], "new");
}
