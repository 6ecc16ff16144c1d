//! RS256 access token issuance/verification and the opaque refresh
//! token format.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use identity_core::models::jwk::JwkSet;
use identity_core::models::signing_key::SigningKey;
use identity_core::models::user::User;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::AuthError;

/// Number of random bytes in a refresh secret.
pub const REFRESH_SECRET_LEN: usize = 32;

const REFRESH_TOKEN_SEPARATOR: char = '.';

/// JWT claims embedded in every access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Subject: user ID (UUID string).
    pub sub: String,
    /// Issuer.
    pub iss: String,
    /// Audience.
    pub aud: String,
    /// Issued-at (Unix timestamp).
    pub iat: i64,
    /// Expiration (Unix timestamp).
    pub exp: i64,
    pub roles: Vec<String>,
}

/// A signed access token and its lifetime.
#[derive(Debug, Clone)]
pub struct IssuedAccessToken {
    pub token: String,
    /// Lifetime in seconds.
    pub expires_in: u64,
}

/// Sign an access token for `user` with `signer`, embedding its `kid`.
pub fn issue_access_token(
    user: &User,
    signer: &SigningKey,
    config: &AuthConfig,
    now: DateTime<Utc>,
) -> Result<IssuedAccessToken, AuthError> {
    let iat = now.timestamp();
    let claims = AccessTokenClaims {
        sub: user.id.to_string(),
        iss: config.jwt_issuer.clone(),
        aud: config.jwt_audience.clone(),
        iat,
        exp: iat + config.access_token_lifetime().num_seconds(),
        roles: user.roles.clone(),
    };

    let key = EncodingKey::from_rsa_pem(signer.private_key_pem.as_bytes())
        .map_err(|e| AuthError::Crypto(format!("bad private key {}: {e}", signer.kid)))?;

    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(signer.kid.clone());

    let token = jsonwebtoken::encode(&header, &claims, &key)
        .map_err(|e| AuthError::Crypto(format!("JWT encode: {e}")))?;

    Ok(IssuedAccessToken {
        token,
        expires_in: config.access_token_lifetime().num_seconds().unsigned_abs(),
    })
}

/// Verify an access token against a published key set.
///
/// The verification key is chosen by the header `kid`; signature,
/// issuer, audience and expiry are all checked.
pub fn verify_access_token(
    token: &str,
    jwks: &JwkSet,
    config: &AuthConfig,
) -> Result<AccessTokenClaims, AuthError> {
    let header =
        jsonwebtoken::decode_header(token).map_err(|e| AuthError::TokenInvalid(e.to_string()))?;
    if header.alg != Algorithm::RS256 {
        return Err(AuthError::TokenInvalid(format!(
            "unexpected algorithm {:?}",
            header.alg
        )));
    }
    let kid = header
        .kid
        .ok_or_else(|| AuthError::TokenInvalid("missing kid".into()))?;
    let jwk = jwks
        .find(&kid)
        .ok_or_else(|| AuthError::UnknownKeyId(kid.clone()))?;

    let key = DecodingKey::from_rsa_components(&jwk.n, &jwk.e)
        .map_err(|e| AuthError::Crypto(format!("bad JWK {kid}: {e}")))?;

    let mut validation = Validation::new(Algorithm::RS256);
    validation.set_issuer(&[&config.jwt_issuer]);
    validation.set_audience(&[&config.jwt_audience]);
    validation.set_required_spec_claims(&["sub", "exp", "iat", "iss", "aud"]);

    jsonwebtoken::decode::<AccessTokenClaims>(token, &key, &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::TokenInvalid(e.to_string()),
        })
}

/// Opaque refresh token: `<session_id>.<base64url(secret)>`.
///
/// A bearer secret; only [`RefreshToken::secret_hash`] is ever stored.
#[derive(Clone, PartialEq, Eq)]
pub struct RefreshToken {
    session_id: String,
    secret: String,
}

impl RefreshToken {
    /// Mint a token for a brand new session.
    pub fn new_session() -> Self {
        Self::for_session(Uuid::new_v4().to_string())
    }

    /// Mint a fresh secret for an existing session.
    pub fn for_session(session_id: impl Into<String>) -> Self {
        let mut rng = rand::rng();
        let bytes: [u8; REFRESH_SECRET_LEN] = rand::Rng::random(&mut rng);
        Self {
            session_id: session_id.into(),
            secret: URL_SAFE_NO_PAD.encode(bytes),
        }
    }

    /// Split a presented token. Anything other than exactly two
    /// non-empty dot-separated parts is malformed.
    pub fn parse(raw: &str) -> Result<Self, AuthError> {
        let mut parts = raw.split(REFRESH_TOKEN_SEPARATOR);
        match (parts.next(), parts.next(), parts.next()) {
            (Some(session_id), Some(secret), None)
                if !session_id.is_empty() && !secret.is_empty() =>
            {
                Ok(Self {
                    session_id: session_id.to_owned(),
                    secret: secret.to_owned(),
                })
            }
            _ => Err(AuthError::RefreshTokenMalformed),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn secret_hash(&self) -> String {
        hash_refresh_secret(&self.secret)
    }
}

impl fmt::Display for RefreshToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{REFRESH_TOKEN_SEPARATOR}{}",
            self.session_id, self.secret
        )
    }
}

impl fmt::Debug for RefreshToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshToken")
            .field("session_id", &self.session_id)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// SHA-256 of a refresh secret, base64url-encoded without padding.
pub fn hash_refresh_secret(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Constant-time comparison of two stored hashes.
pub fn hashes_match(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
