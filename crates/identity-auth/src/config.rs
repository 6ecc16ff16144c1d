//! Authentication configuration.

use chrono::Duration;
use identity_core::error::{IdentityError, IdentityResult};

/// Upper bound for every configured duration (ten years).
pub const MAX_DURATION_SECS: u64 = 10 * 365 * 24 * 3600;

/// Seconds to a chrono duration, saturating at [`MAX_DURATION_SECS`].
fn bounded_seconds(secs: u64) -> Duration {
    i64::try_from(secs.min(MAX_DURATION_SECS))
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::zero())
}

/// Configuration for the authentication service.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Access token lifetime in seconds (default: 900 = 15 minutes).
    pub access_token_lifetime_secs: u64,
    /// Refresh session lifetime in seconds (default: 2_592_000 = 30 days).
    pub refresh_token_lifetime_secs: u64,
    /// JWT issuer (`iss` claim).
    pub jwt_issuer: String,
    /// JWT audience (`aud` claim).
    pub jwt_audience: String,
    /// Optional pepper prepended to passwords before Argon2id derivation.
    pub pepper: Option<String>,
    /// Revoke every session of a user when a stale refresh secret is
    /// presented for one of them (default: false).
    pub revoke_sessions_on_replay: bool,
    /// Signing key rotation schedule.
    pub rotation: KeyRotationConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            access_token_lifetime_secs: 900,
            refresh_token_lifetime_secs: 2_592_000,
            jwt_issuer: "identity".into(),
            jwt_audience: "identity".into(),
            pepper: None,
            revoke_sessions_on_replay: false,
            rotation: KeyRotationConfig::default(),
        }
    }
}

impl AuthConfig {
    pub fn access_token_lifetime(&self) -> Duration {
        bounded_seconds(self.access_token_lifetime_secs)
    }

    pub fn refresh_token_lifetime(&self) -> Duration {
        bounded_seconds(self.refresh_token_lifetime_secs)
    }

    /// Reject configurations under which a token could outlive the
    /// verifiability of the key that signed it.
    pub fn validate(&self) -> IdentityResult<()> {
        if self.access_token_lifetime_secs == 0 || self.refresh_token_lifetime_secs == 0 {
            return Err(IdentityError::validation("token lifetimes must be non-zero"));
        }
        if self.jwt_issuer.trim().is_empty() || self.jwt_audience.trim().is_empty() {
            return Err(IdentityError::validation(
                "jwt issuer and audience are required",
            ));
        }
        let bounded = [
            ("access token lifetime", self.access_token_lifetime_secs),
            ("refresh token lifetime", self.refresh_token_lifetime_secs),
            ("rotation interval", self.rotation.rotation_interval_secs),
            ("retire_after", self.rotation.retire_after_secs),
            ("lease", self.rotation.lease_secs),
            ("tick interval", self.rotation.tick_interval_secs),
        ];
        if let Some((name, secs)) = bounded.iter().find(|(_, secs)| *secs > MAX_DURATION_SECS) {
            return Err(IdentityError::validation(format!(
                "{name} ({secs}s) exceeds the maximum of {MAX_DURATION_SECS}s"
            )));
        }
        if self.rotation.retire_after_secs <= self.access_token_lifetime_secs {
            return Err(IdentityError::validation(format!(
                "retire_after ({}s) must exceed the access token lifetime ({}s)",
                self.rotation.retire_after_secs, self.access_token_lifetime_secs
            )));
        }
        if self.rotation.rotation_interval_secs == 0
            || self.rotation.lease_secs == 0
            || self.rotation.tick_interval_secs == 0
        {
            return Err(IdentityError::validation(
                "rotation interval, lease and tick interval must be non-zero",
            ));
        }
        Ok(())
    }
}

/// Schedule for the background signing-key rotation tick.
#[derive(Debug, Clone)]
pub struct KeyRotationConfig {
    /// Lease lock key shared by every replica.
    pub lock_key: String,
    /// Lease duration in seconds (default: 30).
    pub lease_secs: u64,
    /// Age at which the current signer is replaced (default: 168 h).
    pub rotation_interval_secs: u64,
    /// Time a retiring key stays published before revocation (default: 1 h).
    pub retire_after_secs: u64,
    /// How often each replica attempts a tick (default: 60 s).
    pub tick_interval_secs: u64,
}

impl Default for KeyRotationConfig {
    fn default() -> Self {
        Self {
            lock_key: "identity:auth-key-rotation".into(),
            lease_secs: 30,
            rotation_interval_secs: 168 * 3600,
            retire_after_secs: 3600,
            tick_interval_secs: 60,
        }
    }
}

impl KeyRotationConfig {
    pub fn rotation_interval(&self) -> Duration {
        bounded_seconds(self.rotation_interval_secs)
    }

    pub fn retire_after(&self) -> Duration {
        bounded_seconds(self.retire_after_secs)
    }

    pub fn lease(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.lease_secs)
    }

    pub fn tick_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.tick_interval_secs)
    }
}
