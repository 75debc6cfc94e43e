//! User administration handlers.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

use crate::api::auth::{password_digest, require_org};
use crate::api::error::ApiError;
use crate::api::state::AppState;
use crate::model::UserInput;

pub async fn list(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let caller = state.auth.authorize(&headers, "user_read").await?;
    let org = require_org(&caller)?;
    Ok(Json(state.users.list(org)?).into_response())
}

pub async fn get_one(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(uid): Path<String>,
) -> Result<Response, ApiError> {
    let caller = state.auth.authorize(&headers, "user_read").await?;
    let org = require_org(&caller)?;
    match state.users.get(org, &uid)? {
        Some(user) => Ok(Json(user).into_response()),
        None => Ok(Json(json!({ "error": "User not found." })).into_response()),
    }
}

pub async fn create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<UserInput>,
) -> Result<Response, ApiError> {
    let caller = state.auth.authorize(&headers, "user_add").await?;
    let org = require_org(&caller)?;

    let Some(password) = input.password.as_deref() else {
        return Err(ApiError::Validation(
            "a new user requires a password".to_string(),
        ));
    };
    let digest = password_digest(&input.email, password, &state.password_salt);
    let user = state.users.create(org, &input, &digest)?;
    Ok(Json(user).into_response())
}

pub async fn update(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(uid): Path<String>,
    Json(input): Json<UserInput>,
) -> Result<Response, ApiError> {
    let caller = state.auth.authorize(&headers, "user_update").await?;
    let org = require_org(&caller)?;

    let digest = input
        .password
        .as_deref()
        .map(|password| password_digest(&input.email, password, &state.password_salt));
    match state.users.update(org, &uid, &input, digest.as_deref())? {
        Some(user) => Ok(Json(user).into_response()),
        None => Ok(Json(json!({ "error": "User not found." })).into_response()),
    }
}

pub async fn remove(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(uid): Path<String>,
) -> Result<Response, ApiError> {
    let caller = state.auth.authorize(&headers, "user_delete").await?;
    let org = require_org(&caller)?;
    let deleted = state.users.delete(org, &uid)?;
    Ok(Json(json!({ "numberOfDeletedRows": deleted })).into_response())
}
