//! Authentication error types.

use identity_core::error::IdentityError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("refresh token format invalid")]
    RefreshTokenMalformed,

    #[error("refresh token rejected")]
    RefreshTokenRejected,

    #[error("token has expired")]
    TokenExpired,

    #[error("invalid token: {0}")]
    TokenInvalid(String),

    #[error("no published key for kid {0}")]
    UnknownKeyId(String),

    #[error("cryptography error: {0}")]
    Crypto(String),
}

impl From<AuthError> for IdentityError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials | AuthError::RefreshTokenRejected => {
                IdentityError::AuthenticationFailed {
                    reason: err.to_string(),
                }
            }
            AuthError::TokenExpired | AuthError::TokenInvalid(_) | AuthError::UnknownKeyId(_) => {
                IdentityError::AuthenticationFailed {
                    reason: err.to_string(),
                }
            }
            AuthError::RefreshTokenMalformed => IdentityError::Validation {
                message: err.to_string(),
            },
            AuthError::Crypto(msg) => IdentityError::Crypto(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use identity_core::ErrorKind;

    use super::*;

    #[test]
    fn malformed_refresh_token_is_invalid_input() {
        let err: IdentityError = AuthError::RefreshTokenMalformed.into();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn rejected_credentials_are_unauthenticated() {
        for err in [AuthError::InvalidCredentials, AuthError::RefreshTokenRejected] {
            let err: IdentityError = err.into();
            assert_eq!(err.kind(), ErrorKind::Unauthenticated);
        }
    }

    #[test]
    fn crypto_failures_are_internal() {
        let err: IdentityError = AuthError::Crypto("bad pem".into()).into();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }
}
