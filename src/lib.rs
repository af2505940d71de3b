//! # mockbase
//!
//! An in-memory REST mock server for front-end practice projects.
//!
//! ## Features
//!
//! - **Generic CRUD**: any JSON collection under `/data/{collection}`, no
//!   schema required
//! - **Query mini-language**: `where`, `sortBy`, `offset`, `pageSize`,
//!   `distinct`, `count`, `select` and relation `load` as query parameters
//! - **Access rules**: per-collection, per-record and per-property rules
//!   with `Guest`/`User`/`Owner` roles and safe boolean expressions
//! - **Accounts**: register/login/logout with session tokens in the
//!   `X-Authorization` header, plus an `X-Admin` override
//! - **Raw store**: `/jsonstore` nested tree CRUD without authentication
//! - **Nothing persists**: state lives for the process lifetime only
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use mockbase::config::Settings;
//! use mockbase::server::{self, AppState};
//!
//! let settings = Settings::default_settings();
//! let state = AppState::from_settings(&settings)?;
//! server::serve(state, "127.0.0.1:3030").await?;
//! ```

pub mod auth;
pub mod config;
pub mod core;
pub mod query;
pub mod rules;
pub mod server;
pub mod storage;

/// Re-exports of commonly used types
pub mod prelude {
    pub use crate::auth::AuthService;
    pub use crate::config::Settings;
    pub use crate::core::error::ServiceError;
    pub use crate::core::record::Record;
    pub use crate::query::{QueryOutcome, QueryParams, WhereFilter};
    pub use crate::rules::{Action, Role, RuleSet};
    pub use crate::server::{build_router, AppState, Identity};
    pub use crate::storage::{JsonStore, Storage};

    pub use anyhow::Result;
    pub use serde_json::{json, Value};
}
