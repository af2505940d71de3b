//! `/util` service: runtime flag control
//!
//! The only flag clients use is `throttle`, but the store is generic:
//! POST `/util` copies every body field in as a flag, GET `/util/{flag}`
//! reads one back.

use crate::core::error::ServiceError;
use crate::rules::expr::truthy;
use crate::server::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::Value;

use super::json_body;

pub async fn get_flag(
    State(state): State<AppState>,
    Path(flag): Path<String>,
) -> Result<Response, ServiceError> {
    let flags = state.util.read()?;
    Ok(match flags.get(&flag) {
        Some(value) => Json(*value).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    })
}

pub async fn set_flags(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<StatusCode, ServiceError> {
    let body = json_body(body)?;
    let fields = body.as_object().ok_or_else(ServiceError::request)?;

    let mut flags = state.util.write()?;
    for (name, value) in fields {
        flags.insert(name.clone(), truthy(value));
    }
    Ok(StatusCode::NO_CONTENT)
}
