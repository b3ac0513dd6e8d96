//! Storage layer
//!
//! SQLite-backed durable store with WAL journaling, tenant-scoped entity
//! CRUD, a tokenized full-text mirror, and versioned forward migrations.

pub mod migrations;
pub(crate) mod sqlite;

pub use migrations::SCHEMA_VERSION;
pub use sqlite::{Store, StoreError};

/// Storage result type
pub type Result<T> = std::result::Result<T, StoreError>;
