//! Query processor
//!
//! Transforms a result set already fetched from storage, driven by
//! query-string parameters, applied in this fixed order:
//! `where` → `sortBy` → `offset` → `pageSize` → `distinct` → `count`
//! (short-circuits) → `select` → `load`.

pub mod where_clause;

use crate::core::error::ServiceError;
use crate::storage::Storage;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::cmp::Ordering;

pub use where_clause::WhereFilter;

/// Raw query-string parameters for `/data/<collection>`
///
/// Numeric parameters stay as strings so present-but-malformed values keep
/// the reference server's lenient defaults (`offset` → 0, `pageSize` → 10).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct QueryParams {
    #[serde(rename = "where")]
    pub where_clause: Option<String>,
    #[serde(rename = "sortBy")]
    pub sort_by: Option<String>,
    pub offset: Option<String>,
    #[serde(rename = "pageSize")]
    pub page_size: Option<String>,
    pub distinct: Option<String>,
    pub count: Option<String>,
    pub select: Option<String>,
    pub load: Option<String>,
}

/// Result of running the pipeline over a list
pub enum QueryOutcome {
    Records(Vec<Value>),
    Count(usize),
}

impl QueryParams {
    pub fn parsed_filter(&self) -> Result<Option<WhereFilter>, ServiceError> {
        self.where_clause
            .as_deref()
            .map(WhereFilter::parse)
            .transpose()
    }

    /// Run the full pipeline over a fetched result set
    pub fn apply(
        &self,
        mut records: Vec<Value>,
        storage: &Storage,
        protected: &Storage,
    ) -> Result<QueryOutcome, ServiceError> {
        if let Some(sort_by) = &self.sort_by {
            sort_records(&mut records, sort_by);
        }

        if let Some(offset) = &self.offset {
            let skip: usize = offset.trim().parse().unwrap_or(0);
            records = records.into_iter().skip(skip).collect();
        }
        if let Some(page_size) = &self.page_size {
            // A present-but-malformed pageSize still truncates to 10
            let take: usize = page_size.trim().parse().unwrap_or(10);
            records.truncate(take);
        }

        if let Some(distinct) = &self.distinct {
            records = distinct_records(records, distinct);
        }

        if self.count.is_some() {
            return Ok(QueryOutcome::Count(records.len()));
        }

        if let Some(select) = &self.select {
            records = records.iter().map(|r| project(r, select)).collect();
        }

        if let Some(load) = &self.load {
            for record in &mut records {
                load_relations(record, load, storage, protected)?;
            }
        }

        Ok(QueryOutcome::Records(records))
    }

    /// Apply the per-record stages (`select`, `load`) to a single record
    pub fn apply_single(
        &self,
        mut record: Value,
        storage: &Storage,
        protected: &Storage,
    ) -> Result<Value, ServiceError> {
        if let Some(select) = &self.select {
            record = project(&record, select);
        }
        if let Some(load) = &self.load {
            load_relations(&mut record, load, storage, protected)?;
        }
        Ok(record)
    }
}

/// Comma-separated `<field>[ desc]` terms, left-to-right priority.
///
/// Priority is achieved by stable-sorting from the lowest-priority term to
/// the highest. Any non-empty second token means descending; trailing junk
/// in a term is ignored rather than rejected.
fn sort_records(records: &mut [Value], sort_by: &str) {
    let terms: Vec<(String, bool)> = sort_by
        .split(',')
        .filter(|t| !t.is_empty())
        .map(|term| {
            let mut words = term.split_whitespace();
            let field = words.next().unwrap_or("").to_string();
            let descending = words.next().is_some();
            (field, descending)
        })
        .collect();

    for (field, descending) in terms.iter().rev() {
        records.sort_by(|a, b| {
            let ordering = compare_fields(a.get(field.as_str()), b.get(field.as_str()));
            if *descending {
                ordering.reverse()
            } else {
                ordering
            }
        });
    }
}

fn compare_fields(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        _ => sort_key(a).cmp(&sort_key(b)),
    }
}

fn sort_key(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

/// De-duplicate on the concatenation of the named fields, keeping first
/// occurrence order
fn distinct_records(records: Vec<Value>, distinct: &str) -> Vec<Value> {
    let fields: Vec<&str> = distinct.split(',').filter(|f| !f.is_empty()).collect();
    let mut seen = indexmap::IndexSet::new();
    let mut result = Vec::new();
    for record in records {
        let key = fields
            .iter()
            .map(|f| sort_key(record.get(*f)))
            .collect::<Vec<_>>()
            .join("::");
        if seen.insert(key) {
            result.push(record);
        }
    }
    result
}

/// Project the listed fields onto a new record
fn project(record: &Value, select: &str) -> Value {
    let mut projected = Map::new();
    for field in select.split(',').filter(|f| !f.is_empty()) {
        projected.insert(
            field.to_string(),
            record.get(field).cloned().unwrap_or(Value::Null),
        );
    }
    Value::Object(projected)
}

/// Replace each `prop=idField:collection` spec with the related record
///
/// Relations into `users` resolve against the protected store and have the
/// password hash stripped before leaving the server.
fn load_relations(
    record: &mut Value,
    load: &str,
    storage: &Storage,
    protected: &Storage,
) -> Result<(), ServiceError> {
    for spec in load.split(',').filter(|s| !s.is_empty()) {
        let (prop, relation) = spec
            .split_once('=')
            .ok_or_else(ServiceError::request)?;
        let (id_field, collection) = relation
            .split_once(':')
            .ok_or_else(ServiceError::request)?;
        tracing::debug!(prop, id_field, collection, "loading related records");

        let source = if collection == "users" {
            protected
        } else {
            storage
        };
        let seek_id = record
            .get(id_field)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let mut related = source.get(collection, &seek_id)?;
        if let Some(object) = related.as_object_mut() {
            object.remove("hashedPassword");
        }
        if let Some(object) = record.as_object_mut() {
            object.insert(prop.to_string(), related);
        }
    }
    Ok(())
}

/// Fetch-and-filter entry point used by the data service
pub fn filter_collection(
    storage: &Storage,
    collection: &str,
    filter: &WhereFilter,
) -> Result<Vec<Value>, ServiceError> {
    let all = storage.get_all(collection)?;
    Ok(all
        .into_iter()
        .filter(|value| value.as_object().map(|r| filter.matches(r)).unwrap_or(false))
        .collect())
}
