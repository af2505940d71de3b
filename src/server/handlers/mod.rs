//! HTTP handlers, one module per service

pub mod data;
pub mod jsonstore;
pub mod users;
pub mod util;

use crate::core::error::ServiceError;
use axum::extract::rejection::JsonRejection;
use axum::Json;
use serde_json::Value;

/// Unwrap a JSON body extraction, mapping rejections into the error envelope
pub(crate) fn json_body(body: Result<Json<Value>, JsonRejection>) -> Result<Value, ServiceError> {
    match body {
        Ok(Json(value)) => Ok(value),
        Err(_) => Err(ServiceError::request()),
    }
}
