//! Record helpers: system audit fields and copy semantics
//!
//! Records are plain JSON objects. The storage engine owns four system
//! fields; clients can never set them directly:
//!
//! - `_id`: string identifier, unique within its collection
//! - `_createdOn`: millisecond timestamp, set once on creation
//! - `_updatedOn`: millisecond timestamp, set on replace/merge
//! - `_ownerId`: identifier of the creating user (owned collections only)

use serde_json::{Map, Value};

pub const ID: &str = "_id";
pub const CREATED_ON: &str = "_createdOn";
pub const UPDATED_ON: &str = "_updatedOn";
pub const OWNER_ID: &str = "_ownerId";
pub const DELETED_ON: &str = "_deletedOn";

pub const SYSTEM_FIELDS: [&str; 4] = [ID, CREATED_ON, UPDATED_ON, OWNER_ID];

/// A record as stored: a JSON object map
pub type Record = Map<String, Value>;

/// Current server time in milliseconds
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Copy all non-system fields of `source` onto `target`
///
/// The write path for `add` and `merge`: client-supplied system fields are
/// discarded so they cannot overwrite audit state.
pub fn assign_clean(target: &mut Record, source: &Record) {
    for (key, value) in source {
        if !SYSTEM_FIELDS.contains(&key.as_str()) {
            target.insert(key.clone(), value.clone());
        }
    }
}

/// Copy the system fields present on `existing` onto `target`
///
/// The write path for `set`: the replacement payload keeps the original
/// `_id`, `_createdOn` and `_ownerId` regardless of what the client sent.
pub fn assign_system(target: &mut Record, existing: &Record) {
    for field in SYSTEM_FIELDS {
        if let Some(value) = existing.get(field) {
            target.insert(field.to_string(), value.clone());
        }
    }
}

/// Record with its `_id` stamped, as returned to callers
pub fn with_id(mut record: Record, id: &str) -> Value {
    record.insert(ID.to_string(), Value::String(id.to_string()));
    Value::Object(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(value: Value) -> Record {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn assign_clean_drops_system_fields() {
        let mut target = Record::new();
        let source = obj(json!({
            "_id": "x", "_createdOn": 1, "_updatedOn": 2, "_ownerId": "o",
            "name": "Lasagna", "likes": 3
        }));
        assign_clean(&mut target, &source);
        assert_eq!(target.len(), 2);
        assert_eq!(target["name"], "Lasagna");
        assert_eq!(target["likes"], 3);
    }

    #[test]
    fn assign_system_preserves_audit_state() {
        let mut target = obj(json!({"name": "replacement"}));
        let existing = obj(json!({"_id": "a", "_createdOn": 10, "_ownerId": "u", "old": true}));
        assign_system(&mut target, &existing);
        assert_eq!(target["_id"], "a");
        assert_eq!(target["_createdOn"], 10);
        assert_eq!(target["_ownerId"], "u");
        assert!(!target.contains_key("old"));
    }
}
