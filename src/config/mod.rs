//! Server settings loading and management
//!
//! Settings are a single JSON document: seed data for the open store,
//! protected data (users, sessions), the access rule table and the identity
//! field used for registration. Every section is optional; the embedded
//! defaults give a small seeded practice dataset.

use crate::auth;
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{json, Map, Value};

/// Complete configuration for a server instance
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    /// Field that identifies an account on register/login
    pub identity: Option<String>,

    /// Initial open collections (collection → id → record)
    pub seed_data: Map<String, Value>,

    /// Initial protected collections, notably `users` and `sessions`
    pub protected_data: Map<String, Value>,

    /// Access rule table (collection → rules)
    pub rules: Map<String, Value>,
}

impl Settings {
    /// Load settings from a JSON file
    pub fn from_json_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading settings file {path}"))?;
        Self::from_json_str(&content)
    }

    /// Load settings from a JSON string
    pub fn from_json_str(content: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(content).context("parsing settings")?;
        Ok(settings)
    }

    pub fn identity(&self) -> &str {
        self.identity.as_deref().unwrap_or("email")
    }

    /// The embedded practice dataset: two accounts (password `123456`),
    /// a recipes collection owned by the first, and a locked-down users rule.
    pub fn default_settings() -> Self {
        let peter = "35c62d76-8152-4626-8712-eeb96381bea8";
        let john = "847ec027-f659-4086-8032-5173e2f9c93a";
        let password_hash = auth::hash("123456");

        let protected_data = json!({
            "users": {
                peter: {
                    "email": "peter@abv.bg",
                    "username": "Peter",
                    "hashedPassword": password_hash
                },
                john: {
                    "email": "john@abv.bg",
                    "username": "John",
                    "hashedPassword": password_hash
                }
            },
            "sessions": {}
        });

        let seed_data = json!({
            "recipes": {
                "3987279d-0ad4-4afb-8ca9-5b256ae3b298": {
                    "_ownerId": peter,
                    "name": "Easy Lasagna",
                    "img": "assets/lasagna.jpg",
                    "ingredients": ["1 tbsp Ingredient 1", "2 cups Ingredient 2"],
                    "steps": ["Prepare ingredients", "Mix ingredients", "Cook until done"],
                    "_createdOn": 1613551279012i64
                },
                "8f414b4f-ab39-4d36-bedb-2ad69da9c830": {
                    "_ownerId": peter,
                    "name": "Grilled Duck Fillet",
                    "img": "assets/roast.jpg",
                    "ingredients": ["500g Duck fillet", "2 tbsp Olive oil"],
                    "steps": ["Prepare ingredients", "Cook until done"],
                    "_createdOn": 1613551344360i64
                }
            }
        });

        let rules = json!({
            "users": {
                ".create": false,
                ".read": ["Owner"],
                ".update": false,
                ".delete": false
            }
        });

        Self {
            identity: Some("email".to_string()),
            seed_data: into_object(seed_data),
            protected_data: into_object(protected_data),
            rules: into_object(rules),
        }
    }
}

fn into_object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(object) => object,
        _ => Map::new(),
    }
}
