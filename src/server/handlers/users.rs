//! `/users` service: registration, login, logout and self lookup

use crate::auth::{self, TOKEN_HEADER};
use crate::core::error::ServiceError;
use crate::server::{AppState, Identity};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde_json::Value;

use super::json_body;

pub async fn register(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ServiceError> {
    let body = json_body(body)?;
    let record = body.as_object().ok_or_else(ServiceError::request)?;
    Ok(Json(state.auth.register(record)?))
}

pub async fn login(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ServiceError> {
    let body = json_body(body)?;
    let record = body.as_object().ok_or_else(ServiceError::request)?;
    Ok(Json(state.auth.login(record)?))
}

/// GET `/users/logout` — closes the session; deliberately bodiless so
/// clients can distinguish it from a JSON response
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, ServiceError> {
    let token = headers
        .get(TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    state.auth.logout(token)?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET `/users/me` — the authenticated user's own profile
pub async fn me(identity: Identity) -> Result<Json<Value>, ServiceError> {
    match identity.user {
        Some(user) => Ok(Json(auth::sanitize(user))),
        None => Err(ServiceError::authorization()),
    }
}
