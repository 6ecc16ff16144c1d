//! Signing key domain model and its status state machine.
//!
//! ```text
//! active ──► retiring ──► revoked
//! ```
//!
//! Status only moves forward. `rotated_at` is stamped once, on the
//! `active → retiring` edge. Signer selection is "newest active row",
//! so two active rows may coexist briefly while a rotation is in
//! flight.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// JWS algorithm used for every key this service generates.
pub const SIGNING_ALGORITHM: &str = "RS256";

/// JWK `use` value for signature keys.
pub const SIGNING_KEY_USE: &str = "sig";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SigningKeyStatus {
    Active,
    Retiring,
    Revoked,
}

impl SigningKeyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Retiring => "retiring",
            Self::Revoked => "revoked",
        }
    }

    /// The only status a key may hold immediately before entering `self`.
    pub fn predecessor(&self) -> Option<Self> {
        match self {
            Self::Active => None,
            Self::Retiring => Some(Self::Active),
            Self::Revoked => Some(Self::Retiring),
        }
    }

    pub fn can_transition_to(&self, next: Self) -> bool {
        next.predecessor() == Some(*self)
    }

    /// Whether tokens signed by a key in this status must still verify.
    pub fn is_verifiable(&self) -> bool {
        matches!(self, Self::Active | Self::Retiring)
    }
}

impl fmt::Display for SigningKeyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SigningKeyStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "retiring" => Ok(Self::Retiring),
            "revoked" => Ok(Self::Revoked),
            other => Err(format!("unknown signing key status: {other}")),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct SigningKey {
    pub id: Uuid,
    /// Opaque key id, unique and immutable; embedded in token headers.
    pub kid: String,
    pub algorithm: String,
    pub usage: String,
    /// PKCS#1 PEM. Never leaves the service.
    #[serde(skip_serializing)]
    pub private_key_pem: String,
    /// SPKI PEM.
    pub public_key_pem: String,
    pub status: SigningKeyStatus,
    pub created_at: DateTime<Utc>,
    pub rotated_at: Option<DateTime<Utc>>,
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("id", &self.id)
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .field("usage", &self.usage)
            .field("private_key_pem", &"<redacted>")
            .field("status", &self.status)
            .field("created_at", &self.created_at)
            .field("rotated_at", &self.rotated_at)
            .finish()
    }
}

/// Freshly generated key material, inserted with status `active`.
#[derive(Clone)]
pub struct CreateSigningKey {
    pub kid: String,
    pub algorithm: String,
    pub usage: String,
    pub private_key_pem: String,
    pub public_key_pem: String,
    pub created_at: DateTime<Utc>,
}

impl fmt::Debug for CreateSigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreateSigningKey")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}
