//! SurrealDB implementation of [`RefreshSessionRepository`].
//!
//! Rotation and revocation are single conditional `UPDATE` statements,
//! so concurrent callers are serialised by the store.

use std::time::Duration;

use chrono::{DateTime, Utc};
use identity_core::error::IdentityResult;
use identity_core::models::refresh_session::{CreateRefreshSession, RefreshSession};
use identity_core::repository::RefreshSessionRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::debug;
use uuid::Uuid;

use super::{is_write_conflict, with_deadline};
use crate::connection::DEFAULT_OPERATION_TIMEOUT;
use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct RefreshSessionRow {
    session_id: String,
    user_id: String,
    refresh_secret_hash: String,
    user_agent: Option<String>,
    client_address: Option<String>,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    revoked_at: Option<DateTime<Utc>>,
}

#[derive(Debug, SurrealValue)]
struct RefreshSessionRowWithId {
    record_id: String,
    session_id: String,
    user_id: String,
    refresh_secret_hash: String,
    user_agent: Option<String>,
    client_address: Option<String>,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    revoked_at: Option<DateTime<Utc>>,
}

fn row_to_session(row: RefreshSessionRow, id: Uuid) -> Result<RefreshSession, DbError> {
    let user_id =
        Uuid::parse_str(&row.user_id).map_err(|e| DbError::decode("refresh_session", e))?;
    Ok(RefreshSession {
        id,
        session_id: row.session_id,
        user_id,
        refresh_secret_hash: row.refresh_secret_hash,
        user_agent: row.user_agent,
        client_address: row.client_address,
        created_at: row.created_at,
        expires_at: row.expires_at,
        revoked_at: row.revoked_at,
    })
}

impl RefreshSessionRowWithId {
    fn try_into_session(self) -> Result<RefreshSession, DbError> {
        let id =
            Uuid::parse_str(&self.record_id).map_err(|e| DbError::decode("refresh_session", e))?;
        row_to_session(
            RefreshSessionRow {
                session_id: self.session_id,
                user_id: self.user_id,
                refresh_secret_hash: self.refresh_secret_hash,
                user_agent: self.user_agent,
                client_address: self.client_address,
                created_at: self.created_at,
                expires_at: self.expires_at,
                revoked_at: self.revoked_at,
            },
            id,
        )
    }
}

/// SurrealDB implementation of the refresh session repository.
#[derive(Clone)]
pub struct SurrealRefreshSessionRepository<C: Connection> {
    db: Surreal<C>,
    timeout: Duration,
}

impl<C: Connection> SurrealRefreshSessionRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self::with_timeout(db, DEFAULT_OPERATION_TIMEOUT)
    }

    pub fn with_timeout(db: Surreal<C>, timeout: Duration) -> Self {
        Self { db, timeout }
    }
}

impl<C: Connection> RefreshSessionRepository for SurrealRefreshSessionRepository<C> {
    async fn create(&self, input: CreateRefreshSession) -> IdentityResult<RefreshSession> {
        with_deadline("refresh_session.create", self.timeout, async move {
            let id = Uuid::new_v4();
            let id_str = id.to_string();

            let result = self
                .db
                .query(
                    "CREATE type::record('refresh_session', $id) SET \
                     session_id = $session_id, \
                     user_id = $user_id, \
                     refresh_secret_hash = $refresh_secret_hash, \
                     user_agent = $user_agent, \
                     client_address = $client_address, \
                     created_at = $created_at, \
                     expires_at = $expires_at, \
                     revoked_at = NONE",
                )
                .bind(("id", id_str.clone()))
                .bind(("session_id", input.session_id))
                .bind(("user_id", input.user_id.to_string()))
                .bind(("refresh_secret_hash", input.refresh_secret_hash))
                .bind(("user_agent", input.user_agent))
                .bind(("client_address", input.client_address))
                .bind(("created_at", input.created_at))
                .bind(("expires_at", input.expires_at))
                .await?;

            let mut result = result
                .check()
                .map_err(|e| DbError::from_statement(e, "refresh_session"))?;

            let rows: Vec<RefreshSessionRow> = result.take(0)?;
            let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
                entity: "refresh_session".into(),
                id: id_str,
            })?;

            row_to_session(row, id)
        })
        .await
        .map_err(Into::into)
    }

    async fn get_by_session_id(&self, session_id: &str) -> IdentityResult<RefreshSession> {
        let session_id = session_id.to_owned();
        with_deadline("refresh_session.get_by_session_id", self.timeout, async move {
            let mut result = self
                .db
                .query(
                    "SELECT meta::id(id) AS record_id, * FROM refresh_session \
                     WHERE session_id = $session_id",
                )
                .bind(("session_id", session_id.clone()))
                .await?;

            let rows: Vec<RefreshSessionRowWithId> = result.take(0)?;
            let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
                entity: "refresh_session".into(),
                id: session_id,
            })?;

            row.try_into_session()
        })
        .await
        .map_err(Into::into)
    }

    async fn rotate(
        &self,
        session_id: &str,
        expected_hash: &str,
        new_hash: &str,
        new_expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> IdentityResult<bool> {
        let session_id = session_id.to_owned();
        let expected_hash = expected_hash.to_owned();
        let new_hash = new_hash.to_owned();

        with_deadline("refresh_session.rotate", self.timeout, async move {
            let response = self
                .db
                .query(
                    "UPDATE refresh_session SET \
                     refresh_secret_hash = $new_hash, \
                     expires_at = $expires_at \
                     WHERE session_id = $session_id \
                     AND refresh_secret_hash = $expected_hash \
                     AND revoked_at = NONE \
                     AND expires_at >= $now",
                )
                .bind(("session_id", session_id.clone()))
                .bind(("expected_hash", expected_hash))
                .bind(("new_hash", new_hash))
                .bind(("expires_at", new_expires_at))
                .bind(("now", now))
                .await
                .and_then(|response| response.check());

            let mut result = match response {
                Ok(result) => result,
                Err(e) if is_write_conflict(&e) => {
                    debug!(session_id = %session_id, "refresh rotation lost a write conflict");
                    return Ok(false);
                }
                Err(e) => return Err(DbError::from_statement(e, "refresh_session")),
            };

            let rows: Vec<RefreshSessionRow> = result.take(0)?;
            Ok(!rows.is_empty())
        })
        .await
        .map_err(Into::into)
    }

    async fn revoke(&self, session_id: &str, when: DateTime<Utc>) -> IdentityResult<()> {
        let session_id = session_id.to_owned();
        with_deadline("refresh_session.revoke", self.timeout, async move {
            // Revoking twice keeps the first timestamp.
            let result = self
                .db
                .query(
                    "UPDATE refresh_session SET revoked_at = $when \
                     WHERE session_id = $session_id AND revoked_at = NONE; \
                     SELECT session_id FROM refresh_session \
                     WHERE session_id = $session_id",
                )
                .bind(("session_id", session_id.clone()))
                .bind(("when", when))
                .await?;

            let mut result = result
                .check()
                .map_err(|e| DbError::from_statement(e, "refresh_session"))?;

            let existing: Vec<SessionIdRow> = result.take(1)?;
            if existing.is_empty() {
                return Err(DbError::NotFound {
                    entity: "refresh_session".into(),
                    id: session_id,
                });
            }
            Ok(())
        })
        .await
        .map_err(Into::into)
    }

    async fn revoke_user_sessions(&self, user_id: Uuid, when: DateTime<Utc>) -> IdentityResult<u64> {
        with_deadline("refresh_session.revoke_user_sessions", self.timeout, async move {
            let result = self
                .db
                .query(
                    "UPDATE refresh_session SET revoked_at = $when \
                     WHERE user_id = $user_id AND revoked_at = NONE",
                )
                .bind(("user_id", user_id.to_string()))
                .bind(("when", when))
                .await?;

            let mut result = result
                .check()
                .map_err(|e| DbError::from_statement(e, "refresh_session"))?;

            let rows: Vec<SessionIdRow> = result.take(0)?;
            Ok(rows.len() as u64)
        })
        .await
        .map_err(Into::into)
    }

    async fn cleanup_expired(&self, now: DateTime<Utc>) -> IdentityResult<u64> {
        with_deadline("refresh_session.cleanup_expired", self.timeout, async move {
            let result = self
                .db
                .query("DELETE refresh_session WHERE expires_at < $now RETURN BEFORE")
                .bind(("now", now))
                .await?;

            let mut result = result
                .check()
                .map_err(|e| DbError::from_statement(e, "refresh_session"))?;

            let rows: Vec<SessionIdRow> = result.take(0)?;
            Ok(rows.len() as u64)
        })
        .await
        .map_err(Into::into)
    }
}

#[derive(Debug, SurrealValue)]
struct SessionIdRow {
    #[allow(dead_code)]
    session_id: String,
}
