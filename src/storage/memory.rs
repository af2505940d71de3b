//! In-memory storage engine
//!
//! Named collections of JSON records behind an `RwLock`. Collections keep
//! insertion order, identifiers are collision-checked UUIDs, and every read
//! returns an owned copy so callers can mutate results freely.
//!
//! Mutations are atomic under the lock; there is no cross-request transaction
//! concept and no rollback. State lives for the process lifetime only.

use crate::core::error::ServiceError;
use crate::core::record::{self, Record};
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::sync::{Arc, RwLock};
use uuid::Uuid;

type Collections = IndexMap<String, IndexMap<String, Record>>;

/// In-memory collection store
#[derive(Clone, Default)]
pub struct Storage {
    collections: Arc<RwLock<Collections>>,
}

impl Storage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-populated from a seed payload
    /// (collection name → record id → record)
    pub fn from_seed(seed: &Map<String, Value>) -> Self {
        let mut collections = Collections::new();
        for (name, records) in seed {
            let mut collection = IndexMap::new();
            if let Some(records) = records.as_object() {
                for (id, value) in records {
                    if let Some(object) = value.as_object() {
                        collection.insert(id.clone(), object.clone());
                    }
                }
            }
            collections.insert(name.clone(), collection);
        }
        Self {
            collections: Arc::new(RwLock::new(collections)),
        }
    }

    /// Names of all known collections, in creation order
    pub fn collection_names(&self) -> Result<Vec<String>, ServiceError> {
        let collections = self.collections.read()?;
        Ok(collections.keys().cloned().collect())
    }

    /// All records of a collection, each with `_id` populated
    pub fn get_all(&self, collection: &str) -> Result<Vec<Value>, ServiceError> {
        let collections = self.collections.read()?;
        let target = collections.get(collection).ok_or_else(|| {
            ServiceError::NotFound(format!("Collection does not exist: {collection}"))
        })?;
        Ok(target
            .iter()
            .map(|(id, entry)| record::with_id(entry.clone(), id))
            .collect())
    }

    /// Single record by id, with `_id` populated
    pub fn get(&self, collection: &str, id: &str) -> Result<Value, ServiceError> {
        let collections = self.collections.read()?;
        let target = collections.get(collection).ok_or_else(|| {
            ServiceError::NotFound(format!("Collection does not exist: {collection}"))
        })?;
        let entry = target
            .get(id)
            .ok_or_else(|| ServiceError::NotFound(format!("Entry does not exist: {id}")))?;
        Ok(record::with_id(entry.clone(), id))
    }

    /// Insert a record with a freshly generated id
    ///
    /// Client-supplied system fields are stripped, except `_ownerId` which the
    /// caller is allowed to stamp. Creates the collection lazily.
    pub fn add(&self, collection: &str, data: &Record) -> Result<Value, ServiceError> {
        let mut entry = Record::new();
        if let Some(owner) = data.get(record::OWNER_ID) {
            entry.insert(record::OWNER_ID.to_string(), owner.clone());
        }
        record::assign_clean(&mut entry, data);
        entry.insert(record::CREATED_ON.to_string(), record::now_millis().into());

        let mut collections = self.collections.write()?;
        let target = collections.entry(collection.to_string()).or_default();
        let mut id = Uuid::new_v4().to_string();
        while target.contains_key(&id) {
            id = Uuid::new_v4().to_string();
        }
        target.insert(id.clone(), entry.clone());
        Ok(record::with_id(entry, &id))
    }

    /// Replace a record wholesale, preserving its audit fields
    pub fn set(&self, collection: &str, id: &str, data: &Record) -> Result<Value, ServiceError> {
        let mut collections = self.collections.write()?;
        let target = collections.get_mut(collection).ok_or_else(|| {
            ServiceError::NotFound(format!("Collection does not exist: {collection}"))
        })?;
        let existing = target
            .get(id)
            .ok_or_else(|| ServiceError::NotFound(format!("Entry does not exist: {id}")))?
            .clone();

        let mut entry = data.clone();
        record::assign_system(&mut entry, &existing);
        entry.insert(record::UPDATED_ON.to_string(), record::now_millis().into());
        target.insert(id.to_string(), entry.clone());
        Ok(record::with_id(entry, id))
    }

    /// Shallow-merge a partial payload onto a record
    pub fn merge(&self, collection: &str, id: &str, data: &Record) -> Result<Value, ServiceError> {
        let mut collections = self.collections.write()?;
        let target = collections.get_mut(collection).ok_or_else(|| {
            ServiceError::NotFound(format!("Collection does not exist: {collection}"))
        })?;
        let mut entry = target
            .get(id)
            .ok_or_else(|| ServiceError::NotFound(format!("Entry does not exist: {id}")))?
            .clone();

        record::assign_clean(&mut entry, data);
        entry.insert(record::UPDATED_ON.to_string(), record::now_millis().into());
        target.insert(id.to_string(), entry.clone());
        Ok(record::with_id(entry, id))
    }

    /// Remove a record; returns the deletion timestamp marker
    pub fn delete(&self, collection: &str, id: &str) -> Result<Value, ServiceError> {
        let mut collections = self.collections.write()?;
        let target = collections.get_mut(collection).ok_or_else(|| {
            ServiceError::NotFound(format!("Collection does not exist: {collection}"))
        })?;
        if target.shift_remove(id).is_none() {
            return Err(ServiceError::NotFound(format!("Entry does not exist: {id}")));
        }
        let mut marker = Record::new();
        marker.insert(record::DELETED_ON.to_string(), record::now_millis().into());
        Ok(Value::Object(marker))
    }

    /// Match records against a probe object
    ///
    /// Each probe field must equal the stored field; string pairs compare
    /// case-insensitively. Returns all matches, possibly none.
    pub fn query(&self, collection: &str, probe: &Record) -> Result<Vec<Value>, ServiceError> {
        let collections = self.collections.read()?;
        let target = collections.get(collection).ok_or_else(|| {
            ServiceError::NotFound(format!("Collection does not exist: {collection}"))
        })?;

        let matches = target
            .iter()
            .filter(|(_, entry)| {
                probe.iter().all(|(prop, wanted)| match entry.get(prop) {
                    Some(Value::String(have)) => wanted
                        .as_str()
                        .map(|w| w.to_lowercase() == have.to_lowercase())
                        .unwrap_or(false),
                    Some(have) => have == wanted,
                    None => false,
                })
            })
            .map(|(id, entry)| record::with_id(entry.clone(), id))
            .collect();
        Ok(matches)
    }
}
