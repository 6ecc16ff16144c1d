//! Error types for the identity service.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Entity already exists: {entity}")]
    AlreadyExists { entity: String },

    #[error("Authentication failed: {reason}")]
    AuthenticationFailed { reason: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Storage operation `{operation}` timed out")]
    Timeout { operation: String },

    #[error("Cryptography error: {0}")]
    Crypto(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type IdentityResult<T> = Result<T, IdentityError>;

/// The caller-facing failure classes.
///
/// Every [`IdentityError`] collapses onto exactly one kind. Transport
/// layers map kinds onto status codes and never look at the variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    Unauthenticated,
    AlreadyExists,
    Internal,
}

impl IdentityError {
    pub fn not_found(entity: &str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn unauthenticated(reason: impl Into<String>) -> Self {
        Self::AuthenticationFailed {
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Self::AuthenticationFailed { .. } => ErrorKind::Unauthenticated,
            Self::Validation { .. } => ErrorKind::InvalidInput,
            Self::Database(_) | Self::Timeout { .. } | Self::Crypto(_) | Self::Internal(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Message that is safe to hand to an external caller.
    ///
    /// Authentication failures all read the same regardless of cause,
    /// and internal failures never expose the underlying error text.
    pub fn public_message(&self) -> String {
        match self {
            Self::NotFound { entity, .. } => format!("{entity} not found"),
            Self::AlreadyExists { entity } => format!("{entity} already exists"),
            Self::AuthenticationFailed { .. } => "authentication failed".into(),
            Self::Validation { message } => message.clone(),
            Self::Database(_) | Self::Timeout { .. } | Self::Crypto(_) | Self::Internal(_) => {
                "internal error".into()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_variant_maps_to_a_kind() {
        let cases = [
            (IdentityError::not_found("session", "abc"), ErrorKind::NotFound),
            (
                IdentityError::AlreadyExists {
                    entity: "user".into(),
                },
                ErrorKind::AlreadyExists,
            ),
            (
                IdentityError::unauthenticated("bad password"),
                ErrorKind::Unauthenticated,
            ),
            (IdentityError::validation("email required"), ErrorKind::InvalidInput),
            (IdentityError::Database("boom".into()), ErrorKind::Internal),
            (
                IdentityError::Timeout {
                    operation: "find".into(),
                },
                ErrorKind::Internal,
            ),
            (IdentityError::Crypto("bad key".into()), ErrorKind::Internal),
            (IdentityError::Internal("x".into()), ErrorKind::Internal),
        ];

        for (err, kind) in cases {
            assert_eq!(err.kind(), kind, "{err:?}");
        }
    }

    #[test]
    fn authentication_failures_are_indistinguishable() {
        let expired = IdentityError::unauthenticated("refresh session expired");
        let replayed = IdentityError::unauthenticated("refresh secret mismatch");
        assert_eq!(expired.public_message(), replayed.public_message());
    }

    #[test]
    fn internal_errors_do_not_leak_details() {
        let err = IdentityError::Database("connection refused at 10.0.0.7:8000".into());
        assert_eq!(err.public_message(), "internal error");
    }

    #[test]
    fn duplicate_email_is_disclosed() {
        let err = IdentityError::AlreadyExists {
            entity: "email".into(),
        };
        assert_eq!(err.public_message(), "email already exists");
    }
}
