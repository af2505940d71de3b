//! Raw JSON tree store backing the unauthenticated `/jsonstore` service
//!
//! A single nested JSON object navigated by path tokens. No audit fields,
//! no rules, no collection semantics beyond what the tree shape implies;
//! inserted entries get a generated `_id` and nothing else.

use crate::core::error::ServiceError;
use crate::core::record::ID;
use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

/// Shared nested JSON tree
#[derive(Clone, Default)]
pub struct JsonStore {
    root: Arc<RwLock<Map<String, Value>>>,
}

impl JsonStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed(seed: Map<String, Value>) -> Self {
        Self {
            root: Arc::new(RwLock::new(seed)),
        }
    }

    /// Load every `*.json` file of a directory as a top-level branch named
    /// after the file
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let mut root = Map::new();
        for entry in std::fs::read_dir(dir).with_context(|| format!("reading {dir:?}"))? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let name = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();
            let content =
                std::fs::read_to_string(&path).with_context(|| format!("reading {path:?}"))?;
            let value: Value =
                serde_json::from_str(&content).with_context(|| format!("parsing {path:?}"))?;
            root.insert(name, value);
        }
        Ok(Self::from_seed(root))
    }

    /// Value at a path, or `None` when any token is missing
    pub fn get(&self, path: &[&str]) -> Result<Option<Value>, ServiceError> {
        let root = self.root.read()?;
        let mut current: Option<&Value> = None;
        for token in path {
            current = match current {
                None => root.get(*token),
                Some(value) => value.get(*token),
            };
            if current.is_none() {
                return Ok(None);
            }
        }
        Ok(current.cloned())
    }

    /// Insert a new `_id`-stamped entry under a path, creating intermediate
    /// objects as needed
    pub fn insert(&self, path: &[&str], body: &Value) -> Result<Value, ServiceError> {
        let object = body
            .as_object()
            .ok_or_else(ServiceError::request)?
            .clone();

        let mut root = self.root.write()?;
        let mut current = &mut *root;
        for token in path {
            let slot = current
                .entry(token.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            current = match slot.as_object_mut() {
                Some(object) => object,
                None => return Err(ServiceError::request()),
            };
        }

        let id = Uuid::new_v4().to_string();
        let mut entry = object;
        entry.insert(ID.to_string(), Value::String(id.clone()));
        current.insert(id, Value::Object(entry.clone()));
        Ok(Value::Object(entry))
    }

    /// Replace the value at a path; `None` when the path does not exist
    pub fn replace(&self, path: &[&str], body: &Value) -> Result<Option<Value>, ServiceError> {
        let (parents, last) = split_last(path)?;
        let mut root = self.root.write()?;
        let Some(parent) = navigate_mut(&mut root, parents) else {
            return Ok(None);
        };
        if !parent.contains_key(*last) {
            return Ok(None);
        }
        parent.insert(last.to_string(), body.clone());
        Ok(Some(body.clone()))
    }

    /// Shallow-merge an object onto the value at a path
    pub fn merge(&self, path: &[&str], body: &Value) -> Result<Option<Value>, ServiceError> {
        let (parents, last) = split_last(path)?;
        let mut root = self.root.write()?;
        let Some(parent) = navigate_mut(&mut root, parents) else {
            return Ok(None);
        };
        let Some(target) = parent.get_mut(*last).and_then(Value::as_object_mut) else {
            return Ok(None);
        };
        if let Some(patch) = body.as_object() {
            for (key, value) in patch {
                target.insert(key.clone(), value.clone());
            }
        }
        Ok(Some(Value::Object(target.clone())))
    }

    /// Remove and return the value at a path
    pub fn remove(&self, path: &[&str]) -> Result<Option<Value>, ServiceError> {
        let (parents, last) = split_last(path)?;
        let mut root = self.root.write()?;
        let Some(parent) = navigate_mut(&mut root, parents) else {
            return Ok(None);
        };
        Ok(parent.remove(*last))
    }
}

fn split_last<'a>(path: &'a [&'a str]) -> Result<(&'a [&'a str], &'a &'a str), ServiceError> {
    match path.split_last() {
        Some((last, parents)) => Ok((parents, last)),
        None => Err(ServiceError::request()),
    }
}

fn navigate_mut<'a>(
    root: &'a mut Map<String, Value>,
    path: &[&str],
) -> Option<&'a mut Map<String, Value>> {
    let mut current = root;
    for token in path {
        current = current.get_mut(*token)?.as_object_mut()?;
    }
    Some(current)
}
