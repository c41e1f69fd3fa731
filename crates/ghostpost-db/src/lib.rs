//! Database layer for GhostPost
//!
//! This crate provides:
//! - `SQLite` persistence via `sqlmodel`
//! - Connection pooling
//! - Idempotent schema creation
//! - The query layer every other crate calls
//!
//! # Timestamp Convention
//!
//! All timestamps are stored as `i64` (microseconds since Unix epoch).
//! Helper functions convert to/from `chrono` types for display.

#![forbid(unsafe_code)]

pub mod error;
pub mod models;
pub mod pool;
pub mod queries;
pub mod schema;
pub mod timestamps;

pub use error::{DbError, DbResult};
pub use models::*;
pub use pool::{DbPool, DbPoolConfig};
pub use timestamps::{micros_to_iso, micros_to_naive, naive_to_micros, now_micros};

/// The connection type used by this crate's pool and queries.
pub type DbConn = sqlmodel_sqlite::SqliteConnection;
