//! Collection handlers.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

use crate::api::auth::require_org;
use crate::api::error::ApiError;
use crate::api::state::AppState;
use crate::model::CollectionInput;

pub async fn list(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let caller = state.auth.authorize(&headers, "collection_read").await?;
    let org = require_org(&caller)?;
    Ok(Json(state.collections.list(org)?).into_response())
}

pub async fn get_one(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(uid): Path<String>,
) -> Result<Response, ApiError> {
    let caller = state.auth.authorize(&headers, "collection_read").await?;
    let org = require_org(&caller)?;
    match state.collections.get(org, &uid)? {
        Some(collection) => Ok(Json(collection).into_response()),
        None => Ok(Json(json!({ "error": "Collection not found." })).into_response()),
    }
}

pub async fn create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<CollectionInput>,
) -> Result<Response, ApiError> {
    let caller = state.auth.authorize(&headers, "collection_add").await?;
    let org = require_org(&caller)?;
    let collection = state.collections.create(org, &input)?;
    Ok(Json(collection).into_response())
}

pub async fn update(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(uid): Path<String>,
    Json(input): Json<CollectionInput>,
) -> Result<Response, ApiError> {
    let caller = state.auth.authorize(&headers, "collection_update").await?;
    let org = require_org(&caller)?;
    match state.collections.update(org, &uid, &input)? {
        Some(collection) => Ok(Json(collection).into_response()),
        None => Ok(Json(json!({ "error": "Collection not found." })).into_response()),
    }
}

pub async fn remove(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(uid): Path<String>,
) -> Result<Response, ApiError> {
    let caller = state.auth.authorize(&headers, "collection_delete").await?;
    let org = require_org(&caller)?;
    let deleted = state.collections.delete(org, &uid)?;
    Ok(Json(json!({ "numberOfDeletedRows": deleted })).into_response())
}
