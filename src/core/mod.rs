//! Core building blocks shared by every service

pub mod error;
pub mod record;

pub use error::ServiceError;
pub use record::Record;
