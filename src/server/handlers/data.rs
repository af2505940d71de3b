//! `/data` service: rule-checked CRUD over the open collection store
//!
//! Every operation resolves the requester identity first, runs the access
//! rules against the affected record, and only then touches storage. Reads
//! run the full query pipeline before the rule check so property stripping
//! applies to exactly what leaves the server.

use crate::core::error::ServiceError;
use crate::core::record::{Record, ID, OWNER_ID};
use crate::query::{self, QueryOutcome, QueryParams};
use crate::rules::Action;
use crate::server::{AppState, Identity};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::Json;
use serde_json::Value;

use super::json_body;

/// GET `/data` — names of the open collections
pub async fn list_collections(
    State(state): State<AppState>,
) -> Result<Json<Vec<String>>, ServiceError> {
    Ok(Json(state.storage.collection_names()?))
}

/// GET `/data/{collection}` — query pipeline over a collection
pub async fn get_collection(
    State(state): State<AppState>,
    identity: Identity,
    Path(collection): Path<String>,
    Query(params): Query<QueryParams>,
) -> Result<Json<Value>, ServiceError> {
    let records = match params.parsed_filter()? {
        Some(filter) => query::filter_collection(&state.storage, &collection, &filter),
        None => state.storage.get_all(&collection),
    }
    .map_err(hide_detail)?;

    let mut payload = match params
        .apply(records, &state.storage, &state.protected)
        .map_err(hide_detail)?
    {
        QueryOutcome::Count(count) => Value::from(count),
        QueryOutcome::Records(records) => Value::Array(records),
    };

    state.rules.can_access(
        Action::Read,
        &collection,
        identity.user.as_ref(),
        identity.is_admin,
        Some(&mut payload),
        None,
    )?;
    Ok(Json(payload))
}

/// GET `/data/{collection}/{id}` — single record, with `select`/`load`
pub async fn get_record(
    State(state): State<AppState>,
    identity: Identity,
    Path((collection, id)): Path<(String, String)>,
    Query(params): Query<QueryParams>,
) -> Result<Json<Value>, ServiceError> {
    let record = state.storage.get(&collection, &id).map_err(hide_detail)?;
    let mut record = params
        .apply_single(record, &state.storage, &state.protected)
        .map_err(hide_detail)?;

    state.rules.can_access(
        Action::Read,
        &collection,
        identity.user.as_ref(),
        identity.is_admin,
        Some(&mut record),
        None,
    )?;
    Ok(Json(record))
}

/// POST `/data/{collection}` — create, stamping the requester as owner
pub async fn create(
    State(state): State<AppState>,
    identity: Identity,
    Path(collection): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ServiceError> {
    let mut body = json_body(body)?;

    state.rules.can_access(
        Action::Create,
        &collection,
        identity.user.as_ref(),
        identity.is_admin,
        None,
        Some(&mut body),
    )?;

    let mut record = into_record(body)?;
    if let Some(owner_id) = identity.user.as_ref().and_then(|user| user.get(ID)) {
        record.insert(OWNER_ID.to_string(), owner_id.clone());
    }
    Ok(Json(state.storage.add(&collection, &record)?))
}

/// PUT `/data/{collection}/{id}` — replace an existing record
pub async fn replace(
    State(state): State<AppState>,
    identity: Identity,
    Path((collection, id)): Path<(String, String)>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ServiceError> {
    let mut body = json_body(body)?;
    let mut existing = state.storage.get(&collection, &id).map_err(hide_detail)?;

    state.rules.can_access(
        Action::Update,
        &collection,
        identity.user.as_ref(),
        identity.is_admin,
        Some(&mut existing),
        Some(&mut body),
    )?;

    let record = into_record(body)?;
    Ok(Json(state.storage.set(&collection, &id, &record)?))
}

/// PATCH `/data/{collection}/{id}` — shallow-merge onto an existing record
pub async fn merge(
    State(state): State<AppState>,
    identity: Identity,
    Path((collection, id)): Path<(String, String)>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ServiceError> {
    let mut body = json_body(body)?;
    let mut existing = state.storage.get(&collection, &id).map_err(hide_detail)?;

    state.rules.can_access(
        Action::Update,
        &collection,
        identity.user.as_ref(),
        identity.is_admin,
        Some(&mut existing),
        Some(&mut body),
    )?;

    let record = into_record(body)?;
    Ok(Json(state.storage.merge(&collection, &id, &record)?))
}

/// DELETE `/data/{collection}/{id}` — remove, returning the deletion marker
pub async fn remove(
    State(state): State<AppState>,
    identity: Identity,
    Path((collection, id)): Path<(String, String)>,
) -> Result<Json<Value>, ServiceError> {
    let mut existing = state.storage.get(&collection, &id).map_err(hide_detail)?;

    state.rules.can_access(
        Action::Delete,
        &collection,
        identity.user.as_ref(),
        identity.is_admin,
        Some(&mut existing),
        None,
    )?;
    Ok(Json(state.storage.delete(&collection, &id)?))
}

// Consumers get the generic 404; the specific message stays in the log
fn hide_detail(err: ServiceError) -> ServiceError {
    match err {
        ServiceError::NotFound(detail) => {
            tracing::debug!(detail = %detail, "lookup failed");
            ServiceError::not_found()
        }
        other => other,
    }
}

fn into_record(body: Value) -> Result<Record, ServiceError> {
    match body {
        Value::Object(record) => Ok(record),
        _ => Err(ServiceError::request()),
    }
}
