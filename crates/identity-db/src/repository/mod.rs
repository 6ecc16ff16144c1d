//! SurrealDB repository implementations.

mod lease;
mod refresh_session;
mod signing_key;
mod user;

use std::time::Duration;

use tracing::warn;

pub use lease::SurrealLeaseLock;
pub use refresh_session::SurrealRefreshSessionRepository;
pub use signing_key::SurrealSigningKeyRepository;
pub use user::SurrealUserRepository;

use crate::error::DbError;

/// Transaction conflicts mean a concurrent writer touched the same row
/// first.
pub(crate) fn is_write_conflict(err: &surrealdb::Error) -> bool {
    err.to_string().to_lowercase().contains("conflict")
}

/// Run one repository call under `limit`.
pub(crate) async fn with_deadline<T>(
    operation: &'static str,
    limit: Duration,
    call: impl Future<Output = Result<T, DbError>>,
) -> Result<T, DbError> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => {
            warn!(operation, limit_ms = limit.as_millis() as u64, "storage call timed out");
            Err(DbError::Timeout {
                operation: operation.into(),
            })
        }
    }
}
