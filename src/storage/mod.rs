//! Storage backends
//!
//! Everything is in-memory; state never survives a restart. Two collection
//! stores run side by side (open data and a protected instance holding users
//! and sessions), plus a raw JSON tree for the unauthenticated store.

pub mod memory;
pub mod tree;

pub use memory::Storage;
pub use tree::JsonStore;
