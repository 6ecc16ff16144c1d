//! Identity Database: SurrealDB connection management, migrations and
//! repository implementations.
//!
//! This crate provides:
//! - Connection management ([`DbManager`], [`DbConfig`])
//! - Schema initialization and migrations ([`run_migrations`])
//! - Repositories for users, signing keys and refresh sessions
//! - The cluster-wide lease lock guarding key rotation
//!   ([`repository::SurrealLeaseLock`])
//! - Error types ([`DbError`])

mod connection;
mod error;
pub mod repository;
mod schema;

pub use connection::{DEFAULT_OPERATION_TIMEOUT, DbConfig, DbManager};
pub use error::DbError;
pub use schema::{latest_version, run_migrations};
