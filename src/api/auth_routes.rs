//! Session bootstrap: login, logout, session probe, password change.
//!
//! These endpoints sit in front of the authorization gate -- they are
//! what establishes the session the gate later checks. Outcomes are
//! status-in-body (`{status: ...}`) with HTTP 200, the shape the UI
//! branches on.

use axum::extract::State;
use axum::http::header::SET_COOKIE;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::api::auth::{password_digest, session_token, verify_password, SESSION_COOKIE};
use crate::api::error::ApiError;
use crate::api::state::AppState;
use crate::session::{Session, SessionUser};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct PasswordChangeRequest {
    pub old: String,
    pub new: String,
}

pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    if body.username.is_empty() || body.password.is_empty() {
        return Ok(Json(json!({ "status": "failed" })).into_response());
    }
    if state.auth.session(&headers).await.is_some() {
        return Ok(Json(json!({ "status": "already logged on" })).into_response());
    }

    let Some(user) = state.users.find_by_email(&body.username)? else {
        return Ok(Json(json!({ "status": "bad_credentials" })).into_response());
    };
    if !verify_password(
        &user.email,
        &body.password,
        &state.password_salt,
        &user.password_digest,
    ) {
        return Ok(Json(json!({ "status": "bad_credentials" })).into_response());
    }

    let session_user = SessionUser {
        uid: user.uid,
        name: user.name,
        email: user.email,
    };
    let roles = user.roles;
    let session = Session::new(session_user.clone(), user.organization, roles.clone());
    let token = state.sessions.insert(session).await;

    let cookie = format!("{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax");
    Ok((
        [(SET_COOKIE, cookie)],
        Json(json!({
            "status": "authenticated",
            "user": session_user,
            "roles": roles,
        })),
    )
        .into_response())
}

pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(token) = session_token(&headers) {
        state.sessions.remove(&token).await;
    }
    let cookie = format!("{SESSION_COOKIE}=; Path=/; HttpOnly; Max-Age=0");
    (
        [(SET_COOKIE, cookie)],
        Json(json!({ "status": "not_authenticated" })),
    )
        .into_response()
}

pub async fn authenticated(State(state): State<AppState>, headers: HeaderMap) -> Json<serde_json::Value> {
    match state.auth.session(&headers).await {
        Some(session) => Json(json!({
            "status": "authenticated",
            "user": session.user,
            "roles": session.roles,
        })),
        None => Json(json!({ "status": "not_authenticated" })),
    }
}

/// Lets the logged-in user, and only them, change their own password.
pub async fn change_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<PasswordChangeRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Some(session) = state.auth.session(&headers).await else {
        return Ok(Json(json!({ "status": "not_authenticated" })));
    };

    let Some(user) = state.users.find_auth(&session.user.uid)? else {
        return Ok(Json(json!({ "status": "not_authenticated" })));
    };
    if !verify_password(&user.email, &body.old, &state.password_salt, &user.password_digest) {
        return Ok(Json(json!({ "error": "Old password does not match." })));
    }

    let digest = password_digest(&user.email, &body.new, &state.password_salt);
    state.users.set_password(&user.uid, &digest)?;
    info!(user = user.email.as_str(), "password changed");
    Ok(Json(json!({ "message": "Password changed." })))
}
