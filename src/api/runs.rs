//! Run handlers: the runner-facing dispatch surface and the
//! interactive browse/submit/delete surface.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use tracing::warn;

use crate::api::auth::{require_org, PERM_RUNNER};
use crate::api::error::ApiError;
use crate::api::state::AppState;
use crate::dispatch::{ClaimOutcome, ReportOutcome};
use crate::model::{ClaimRequest, RunReport, RunRequest, RunStatus};

// ---------------------------------------------------------------------------
// Dispatch surface (runner credential)
// ---------------------------------------------------------------------------

/// `GET /run/next` -- dequeue one pending run with its step script.
/// Empty object when the queue is empty. Never mutates.
pub async fn next(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    state.auth.authorize(&headers, PERM_RUNNER).await?;
    match state.dispatcher.next_pending()? {
        Some(payload) => Ok(Json(payload).into_response()),
        None => Ok(Json(json!({})).into_response()),
    }
}

/// `PATCH /run/{uid}` -- claim a dequeued run.
pub async fn claim(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(uid): Path<String>,
    Json(body): Json<ClaimRequest>,
) -> Result<Response, ApiError> {
    state.auth.authorize(&headers, PERM_RUNNER).await?;
    if body.status != RunStatus::Started {
        return Err(ApiError::Validation(format!(
            "a claim must set status 'started', got '{}'",
            body.status
        )));
    }
    match state.dispatcher.claim(&uid, body.start)? {
        ClaimOutcome::Started => Ok(Json(json!({ "message": "Run started." })).into_response()),
        ClaimOutcome::AlreadyStarted => {
            Ok(Json(json!({ "error": "Run already started." })).into_response())
        }
        ClaimOutcome::NotFound => Ok(Json(json!({ "error": "Run not found." })).into_response()),
    }
}

/// `PUT /run/{uid}` -- record a runner's result graph.
pub async fn report(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(uid): Path<String>,
    Json(body): Json<RunReport>,
) -> Result<Response, ApiError> {
    state.auth.authorize(&headers, PERM_RUNNER).await?;
    match state.dispatcher.report(&uid, &body)? {
        ReportOutcome::Updated(detail) => Ok(Json(detail).into_response()),
        ReportOutcome::Rejected(reason) => Err(ApiError::Validation(reason)),
        ReportOutcome::NotFound => Ok(Json(json!({ "error": "Run not found." })).into_response()),
    }
}

// ---------------------------------------------------------------------------
// Interactive surface
// ---------------------------------------------------------------------------

pub async fn list(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let caller = state.auth.authorize(&headers, "run_read").await?;
    let org = require_org(&caller)?;
    Ok(Json(state.runs.list(org)?).into_response())
}

pub async fn get_one(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(uid): Path<String>,
) -> Result<Response, ApiError> {
    let caller = state.auth.authorize(&headers, "run_read").await?;
    let org = require_org(&caller)?;
    match state.runs.get(org, &uid)? {
        Some(detail) => Ok(Json(detail).into_response()),
        None => Ok(Json(json!({ "error": "Run not found." })).into_response()),
    }
}

pub async fn remove(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(uid): Path<String>,
) -> Result<Response, ApiError> {
    let caller = state.auth.authorize(&headers, "run_delete").await?;
    let org = require_org(&caller)?;
    let deleted = state.runs.delete(org, &uid)?;
    Ok(Json(json!({ "numberOfDeletedRows": deleted })).into_response())
}

/// `POST /test/{uid}/run` -- request one execution of a test.
pub async fn run_test(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(uid): Path<String>,
    Json(body): Json<RunRequest>,
) -> Result<Response, ApiError> {
    let caller = state.auth.authorize(&headers, "test_run").await?;
    let org = require_org(&caller)?;

    if !state.tests.exists(org, &uid)? {
        return Ok(Json(json!({ "error": "Test not found." })).into_response());
    }
    let run = state.runs.create(org, &uid, &body.browser, &body.url_domain)?;
    Ok(Json(run).into_response())
}

/// `POST /collection/{uid}/run` -- fan a collection out into one run
/// per (test, browser, urlDomain) tuple.
///
/// Each insertion is its own unit: a failure partway through stops the
/// loop but keeps the runs already created.
pub async fn run_collection(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(uid): Path<String>,
) -> Result<Response, ApiError> {
    let caller = state.auth.authorize(&headers, "collection_run").await?;
    let org = require_org(&caller)?;

    let Some(tuples) = state.collections.tuples(org, &uid)? else {
        return Ok(Json(json!({ "error": "Collection not found." })).into_response());
    };

    let mut output = Vec::with_capacity(tuples.len());
    for (test, browser, url_domain) in tuples {
        if !state.tests.exists(org, &test)? {
            warn!(
                collection = uid.as_str(),
                test = test.as_str(),
                created = output.len(),
                "bulk run submission stopped at unresolvable test"
            );
            return Ok(Json(json!({ "error": "Test not found." })).into_response());
        }
        output.push(state.runs.create(org, &test, &browser, &url_domain)?);
    }
    Ok(Json(output).into_response())
}
