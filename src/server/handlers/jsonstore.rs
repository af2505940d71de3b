//! `/jsonstore` service: raw nested CRUD, no auth, no rules
//!
//! Paths map directly onto the JSON tree. A missing path is not an error:
//! reads answer 204 with no body, deletes answer a JSON `null`.

use crate::core::error::ServiceError;
use crate::server::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::Value;

use super::json_body;

fn tokens(path: &str) -> Vec<&str> {
    path.split('/').filter(|t| !t.is_empty()).collect()
}

fn found_or_empty(value: Option<Value>) -> Response {
    match value {
        Some(value) => Json(value).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

pub async fn get_path(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Response, ServiceError> {
    Ok(found_or_empty(state.jsonstore.get(&tokens(&path))?))
}

pub async fn create(
    State(state): State<AppState>,
    Path(path): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ServiceError> {
    let body = json_body(body)?;
    Ok(Json(state.jsonstore.insert(&tokens(&path), &body)?))
}

pub async fn replace(
    State(state): State<AppState>,
    Path(path): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ServiceError> {
    let body = json_body(body)?;
    Ok(found_or_empty(
        state.jsonstore.replace(&tokens(&path), &body)?,
    ))
}

pub async fn merge(
    State(state): State<AppState>,
    Path(path): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ServiceError> {
    let body = json_body(body)?;
    Ok(found_or_empty(state.jsonstore.merge(&tokens(&path), &body)?))
}

pub async fn remove(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Json<Value>, ServiceError> {
    let removed = state.jsonstore.remove(&tokens(&path))?;
    Ok(Json(removed.unwrap_or(Value::Null)))
}
