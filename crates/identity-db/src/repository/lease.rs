//! SurrealDB-backed [`LeaseLock`].
//!
//! One `lease` record per lock key. A lease is held by whoever wrote
//! the record last and stays valid until `expires_at`; an expired lease
//! can be taken over by any owner.

use std::time::Duration;

use chrono::Utc;
use identity_core::error::{IdentityError, IdentityResult};
use identity_core::repository::LeaseLock;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::debug;
use uuid::Uuid;

use super::{is_write_conflict, with_deadline};
use crate::connection::DEFAULT_OPERATION_TIMEOUT;
use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct LeaseRow {
    owner: String,
}

/// Lease lock identified by `key` and held on behalf of `owner`.
#[derive(Clone)]
pub struct SurrealLeaseLock<C: Connection> {
    db: Surreal<C>,
    key: String,
    owner: String,
    lease: chrono::Duration,
    timeout: Duration,
}

impl<C: Connection> SurrealLeaseLock<C> {
    /// Lock for `key` owned by this process.
    pub fn new(db: Surreal<C>, key: impl Into<String>, lease: Duration) -> Self {
        Self::with_owner(db, key, default_owner(), lease)
    }

    pub fn with_owner(
        db: Surreal<C>,
        key: impl Into<String>,
        owner: impl Into<String>,
        lease: Duration,
    ) -> Self {
        Self {
            db,
            key: key.into(),
            owner: owner.into(),
            lease: chrono::Duration::from_std(lease).unwrap_or(chrono::Duration::MAX),
            timeout: DEFAULT_OPERATION_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }
}

/// `hostname/pid/random`, unique per process start.
fn default_owner() -> String {
    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".into());
    format!(
        "{host}/{}/{}",
        std::process::id(),
        Uuid::new_v4().simple()
    )
}

impl<C: Connection> LeaseLock for SurrealLeaseLock<C> {
    async fn try_acquire(&self) -> IdentityResult<bool> {
        with_deadline("lease.try_acquire", self.timeout, async move {
            let now = Utc::now();
            let expires_at = now + self.lease;

            // Renew our own lease or take over an expired one.
            let renewed = self
                .db
                .query(
                    "UPDATE type::record('lease', $key) \
                     SET owner = $owner, expires_at = $expires_at \
                     WHERE owner = $owner OR expires_at < $now",
                )
                .bind(("key", self.key.clone()))
                .bind(("owner", self.owner.clone()))
                .bind(("expires_at", expires_at))
                .bind(("now", now))
                .await
                .and_then(|response| response.check());
            let mut renewed = match renewed {
                Ok(response) => response,
                Err(e) if is_write_conflict(&e) => {
                    debug!(key = %self.key, "lease renewal lost a write conflict");
                    return Ok(false);
                }
                Err(e) => return Err(DbError::from_statement(e, "lease")),
            };
            let rows: Vec<LeaseRow> = renewed.take(0)?;
            if !rows.is_empty() {
                return Ok(true);
            }

            let created = self
                .db
                .query(
                    "CREATE type::record('lease', $key) \
                     SET owner = $owner, expires_at = $expires_at",
                )
                .bind(("key", self.key.clone()))
                .bind(("owner", self.owner.clone()))
                .bind(("expires_at", expires_at))
                .await
                .and_then(|response| response.check());

            match created {
                Ok(_) => Ok(true),
                Err(e) if is_write_conflict(&e) => {
                    debug!(key = %self.key, "lease creation lost a write conflict");
                    Ok(false)
                }
                Err(e) => match DbError::from_statement(e, "lease") {
                    DbError::Duplicate { .. } => {
                        debug!(key = %self.key, "lease held by another owner");
                        Ok(false)
                    }
                    other => Err(other),
                },
            }
        })
        .await
        .map_err(IdentityError::from)
    }

    async fn release(&self) -> IdentityResult<()> {
        with_deadline("lease.release", self.timeout, async move {
            self.db
                .query("DELETE type::record('lease', $key) WHERE owner = $owner")
                .bind(("key", self.key.clone()))
                .bind(("owner", self.owner.clone()))
                .await?
                .check()
                .map_err(|e| DbError::from_statement(e, "lease"))?;
            Ok(())
        })
        .await
        .map_err(Into::into)
    }
}
