//! SurrealDB implementation of [`SigningKeyRepository`].

use std::time::Duration;

use chrono::{DateTime, Utc};
use identity_core::error::{IdentityError, IdentityResult};
use identity_core::models::signing_key::{CreateSigningKey, SigningKey, SigningKeyStatus};
use identity_core::repository::SigningKeyRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::with_deadline;
use crate::connection::DEFAULT_OPERATION_TIMEOUT;
use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct SigningKeyRow {
    kid: String,
    algorithm: String,
    usage: String,
    private_key_pem: String,
    public_key_pem: String,
    status: String,
    created_at: DateTime<Utc>,
    rotated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, SurrealValue)]
struct SigningKeyRowWithId {
    record_id: String,
    kid: String,
    algorithm: String,
    usage: String,
    private_key_pem: String,
    public_key_pem: String,
    status: String,
    created_at: DateTime<Utc>,
    rotated_at: Option<DateTime<Utc>>,
}

impl SigningKeyRow {
    fn into_signing_key(self, id: Uuid) -> Result<SigningKey, DbError> {
        Ok(SigningKey {
            id,
            kid: self.kid,
            algorithm: self.algorithm,
            usage: self.usage,
            private_key_pem: self.private_key_pem,
            public_key_pem: self.public_key_pem,
            status: parse_status(&self.status)?,
            created_at: self.created_at,
            rotated_at: self.rotated_at,
        })
    }
}

impl SigningKeyRowWithId {
    fn try_into_signing_key(self) -> Result<SigningKey, DbError> {
        let id =
            Uuid::parse_str(&self.record_id).map_err(|e| DbError::decode("signing_key", e))?;
        Ok(SigningKey {
            id,
            kid: self.kid,
            algorithm: self.algorithm,
            usage: self.usage,
            private_key_pem: self.private_key_pem,
            public_key_pem: self.public_key_pem,
            status: parse_status(&self.status)?,
            created_at: self.created_at,
            rotated_at: self.rotated_at,
        })
    }
}

fn parse_status(s: &str) -> Result<SigningKeyStatus, DbError> {
    s.parse().map_err(|e| DbError::decode("signing_key", e))
}

/// SurrealDB implementation of the signing key repository.
#[derive(Clone)]
pub struct SurrealSigningKeyRepository<C: Connection> {
    db: Surreal<C>,
    timeout: Duration,
}

impl<C: Connection> SurrealSigningKeyRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self::with_timeout(db, DEFAULT_OPERATION_TIMEOUT)
    }

    pub fn with_timeout(db: Surreal<C>, timeout: Duration) -> Self {
        Self { db, timeout }
    }
}

impl<C: Connection> SigningKeyRepository for SurrealSigningKeyRepository<C> {
    async fn create(&self, input: CreateSigningKey) -> IdentityResult<SigningKey> {
        with_deadline("signing_key.create", self.timeout, async move {
            let id = Uuid::new_v4();
            let id_str = id.to_string();

            let result = self
                .db
                .query(
                    "CREATE type::record('signing_key', $id) SET \
                     kid = $kid, algorithm = $algorithm, usage = $usage, \
                     private_key_pem = $private_key_pem, \
                     public_key_pem = $public_key_pem, \
                     status = $status, created_at = $created_at, \
                     rotated_at = NONE",
                )
                .bind(("id", id_str.clone()))
                .bind(("kid", input.kid))
                .bind(("algorithm", input.algorithm))
                .bind(("usage", input.usage))
                .bind(("private_key_pem", input.private_key_pem))
                .bind(("public_key_pem", input.public_key_pem))
                .bind(("status", SigningKeyStatus::Active.as_str()))
                .bind(("created_at", input.created_at))
                .await?;

            let mut result = result
                .check()
                .map_err(|e| DbError::from_statement(e, "signing_key"))?;

            let rows: Vec<SigningKeyRow> = result.take(0)?;
            let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
                entity: "signing_key".into(),
                id: id_str,
            })?;

            row.into_signing_key(id)
        })
        .await
        .map_err(Into::into)
    }

    async fn find_active(&self) -> IdentityResult<Option<SigningKey>> {
        with_deadline("signing_key.find_active", self.timeout, async move {
            let mut result = self
                .db
                .query(
                    "SELECT meta::id(id) AS record_id, * FROM signing_key \
                     WHERE status = 'active' \
                     ORDER BY created_at DESC LIMIT 1",
                )
                .await?;

            let rows: Vec<SigningKeyRowWithId> = result.take(0)?;
            rows.into_iter()
                .next()
                .map(SigningKeyRowWithId::try_into_signing_key)
                .transpose()
        })
        .await
        .map_err(Into::into)
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: SigningKeyStatus,
        rotated_at: Option<DateTime<Utc>>,
    ) -> IdentityResult<()> {
        let Some(from) = status.predecessor() else {
            return Err(IdentityError::validation(format!(
                "signing key cannot move to {status}"
            )));
        };

        with_deadline("signing_key.update_status", self.timeout, async move {
            let id_str = id.to_string();
            let sql = if rotated_at.is_some() {
                "UPDATE type::record('signing_key', $id) \
                 SET status = $status, rotated_at = $rotated_at \
                 WHERE status = $from"
            } else {
                "UPDATE type::record('signing_key', $id) \
                 SET status = $status WHERE status = $from"
            };

            let result = self
                .db
                .query(sql)
                .bind(("id", id_str.clone()))
                .bind(("status", status.as_str()))
                .bind(("from", from.as_str()))
                .bind(("rotated_at", rotated_at))
                .await?;

            let mut result = result
                .check()
                .map_err(|e| DbError::from_statement(e, "signing_key"))?;

            let rows: Vec<SigningKeyRow> = result.take(0)?;
            if rows.is_empty() {
                return Err(DbError::NotFound {
                    entity: "signing_key".into(),
                    id: format!("{id_str} in status {from}"),
                });
            }
            Ok(())
        })
        .await
        .map_err(Into::into)
    }

    async fn revoke_retiring_before(&self, cutoff: DateTime<Utc>) -> IdentityResult<u64> {
        with_deadline("signing_key.revoke_retiring_before", self.timeout, async move {
            let result = self
                .db
                .query(
                    "UPDATE signing_key SET status = 'revoked' \
                     WHERE status = 'retiring' \
                     AND rotated_at != NONE AND rotated_at < $cutoff",
                )
                .bind(("cutoff", cutoff))
                .await?;

            let mut result = result
                .check()
                .map_err(|e| DbError::from_statement(e, "signing_key"))?;

            let rows: Vec<SigningKeyRow> = result.take(0)?;
            Ok(rows.len() as u64)
        })
        .await
        .map_err(Into::into)
    }

    async fn list_verifiable(&self) -> IdentityResult<Vec<SigningKey>> {
        with_deadline("signing_key.list_verifiable", self.timeout, async move {
            let mut result = self
                .db
                .query(
                    "SELECT meta::id(id) AS record_id, * FROM signing_key \
                     WHERE status IN ['active', 'retiring'] \
                     ORDER BY created_at DESC",
                )
                .await?;

            let rows: Vec<SigningKeyRowWithId> = result.take(0)?;
            rows.into_iter()
                .map(SigningKeyRowWithId::try_into_signing_key)
                .collect()
        })
        .await
        .map_err(Into::into)
    }
}
