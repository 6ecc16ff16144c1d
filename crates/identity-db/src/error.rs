//! Database-specific error types and conversions.

use identity_core::error::IdentityError;

/// Database-layer error type.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SurrealDB error: {0}")]
    Surreal(#[from] surrealdb::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Record not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Duplicate {entity}")]
    Duplicate { entity: String },

    #[error("Operation `{operation}` exceeded its deadline")]
    Timeout { operation: String },

    #[error("Malformed {entity} row: {message}")]
    Decode { entity: String, message: String },
}

impl DbError {
    /// Classify a statement failure reported by `Response::check`.
    ///
    /// Unique index violations and record-id collisions become
    /// [`DbError::Duplicate`].
    pub(crate) fn from_statement(err: surrealdb::Error, entity: &str) -> Self {
        let message = err.to_string();
        if message.contains("already contains") || message.contains("already exists") {
            Self::Duplicate {
                entity: entity.into(),
            }
        } else {
            Self::Query(message)
        }
    }

    pub(crate) fn decode(entity: &str, message: impl std::fmt::Display) -> Self {
        Self::Decode {
            entity: entity.into(),
            message: message.to_string(),
        }
    }
}

impl From<DbError> for IdentityError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => IdentityError::NotFound { entity, id },
            DbError::Duplicate { entity } => IdentityError::AlreadyExists { entity },
            DbError::Timeout { operation } => IdentityError::Timeout { operation },
            other => IdentityError::Database(other.to_string()),
        }
    }
}
