//! SurrealDB implementation of [`UserRepository`].

use std::time::Duration;

use chrono::{DateTime, Utc};
use identity_core::error::IdentityResult;
use identity_core::models::user::{CreateUser, User};
use identity_core::repository::UserRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::with_deadline;
use crate::connection::DEFAULT_OPERATION_TIMEOUT;
use crate::error::DbError;

/// DB-side row struct for queries where the UUID is already known.
#[derive(Debug, SurrealValue)]
struct UserRow {
    name: String,
    email: String,
    password_hash: String,
    roles: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// DB-side row struct that includes the record ID via `meta::id(id)`.
#[derive(Debug, SurrealValue)]
struct UserRowWithId {
    record_id: String,
    name: String,
    email: String,
    password_hash: String,
    roles: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl UserRow {
    fn into_user(self, id: Uuid) -> User {
        User {
            id,
            name: self.name,
            email: self.email,
            password_hash: self.password_hash,
            roles: self.roles,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

impl UserRowWithId {
    fn try_into_user(self) -> Result<User, DbError> {
        let id = Uuid::parse_str(&self.record_id).map_err(|e| DbError::decode("user", e))?;
        Ok(User {
            id,
            name: self.name,
            email: self.email,
            password_hash: self.password_hash,
            roles: self.roles,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// SurrealDB implementation of the User repository.
///
/// Emails are stored exactly as given; callers normalise them first.
#[derive(Clone)]
pub struct SurrealUserRepository<C: Connection> {
    db: Surreal<C>,
    timeout: Duration,
}

impl<C: Connection> SurrealUserRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self::with_timeout(db, DEFAULT_OPERATION_TIMEOUT)
    }

    pub fn with_timeout(db: Surreal<C>, timeout: Duration) -> Self {
        Self { db, timeout }
    }
}

impl<C: Connection> UserRepository for SurrealUserRepository<C> {
    async fn create(&self, input: CreateUser) -> IdentityResult<User> {
        with_deadline("user.create", self.timeout, async move {
            let id = Uuid::new_v4();
            let id_str = id.to_string();

            let result = self
                .db
                .query(
                    "CREATE type::record('user', $id) SET \
                     name = $name, email = $email, \
                     password_hash = $password_hash, \
                     roles = $roles",
                )
                .bind(("id", id_str.clone()))
                .bind(("name", input.name))
                .bind(("email", input.email))
                .bind(("password_hash", input.password_hash))
                .bind(("roles", input.roles))
                .await?;

            let mut result = result
                .check()
                .map_err(|e| DbError::from_statement(e, "user"))?;

            let rows: Vec<UserRow> = result.take(0)?;
            let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
                entity: "user".into(),
                id: id_str,
            })?;

            Ok(row.into_user(id))
        })
        .await
        .map_err(Into::into)
    }

    async fn get_by_id(&self, id: Uuid) -> IdentityResult<User> {
        with_deadline("user.get_by_id", self.timeout, async move {
            let id_str = id.to_string();
            let mut result = self
                .db
                .query("SELECT * FROM type::record('user', $id)")
                .bind(("id", id_str.clone()))
                .await?;

            let rows: Vec<UserRow> = result.take(0)?;
            let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
                entity: "user".into(),
                id: id_str,
            })?;

            Ok(row.into_user(id))
        })
        .await
        .map_err(Into::into)
    }

    async fn get_by_email(&self, email: &str) -> IdentityResult<User> {
        let email = email.to_owned();
        with_deadline("user.get_by_email", self.timeout, async move {
            let mut result = self
                .db
                .query("SELECT meta::id(id) AS record_id, * FROM user WHERE email = $email")
                .bind(("email", email.clone()))
                .await?;

            let rows: Vec<UserRowWithId> = result.take(0)?;
            let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
                entity: "user".into(),
                id: format!("email={email}"),
            })?;

            row.try_into_user()
        })
        .await
        .map_err(Into::into)
    }
}
