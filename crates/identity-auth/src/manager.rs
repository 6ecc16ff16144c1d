//! Signing key lifecycle: bootstrap, rotation, retirement and JWKS
//! publication.
//!
//! The manager performs read-check-then-write sequences and does no
//! locking of its own. Scheduled ticks must run under the cluster-wide
//! lease (see [`crate::rotation`]).

use chrono::{DateTime, Duration, Utc};
use identity_core::error::{IdentityError, IdentityResult};
use identity_core::models::jwk::JwkSet;
use identity_core::models::signing_key::{CreateSigningKey, SigningKey, SigningKeyStatus};
use identity_core::repository::SigningKeyRepository;
use tracing::{debug, info, warn};

use crate::config::KeyRotationConfig;
use crate::keys;

/// A completed signer replacement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rotation {
    pub old_kid: String,
    pub new_kid: String,
}

/// What a single rotation tick changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// `kid` of the key synthesised because no signer existed.
    pub bootstrapped: Option<String>,
    /// Stale `active` rows left behind by an interrupted rotation that
    /// were moved to `retiring`.
    pub reconciled: u64,
    pub rotated: Option<Rotation>,
    /// Retiring keys revoked by the sweep.
    pub revoked: u64,
}

pub struct AuthKeyManager<K: SigningKeyRepository> {
    keys: K,
    rotation_interval: Duration,
    retire_after: Duration,
}

impl<K: SigningKeyRepository> AuthKeyManager<K> {
    pub fn new(keys: K, config: &KeyRotationConfig) -> Self {
        Self {
            keys,
            rotation_interval: config.rotation_interval(),
            retire_after: config.retire_after(),
        }
    }

    pub fn repository(&self) -> &K {
        &self.keys
    }

    /// Return the current signer, synthesising one if none exists.
    pub async fn ensure_active_key(&self) -> IdentityResult<SigningKey> {
        self.ensure_signer_at(Utc::now()).await.map(|(key, _)| key)
    }

    /// The key new access tokens are signed with.
    pub async fn current_signer(&self) -> IdentityResult<SigningKey> {
        self.ensure_active_key().await
    }

    /// Public keys of every `active` or `retiring` key, in no
    /// particular order.
    pub async fn jwks(&self) -> IdentityResult<JwkSet> {
        let keys = self
            .keys
            .list_verifiable()
            .await?
            .into_iter()
            .filter(|k| k.status.is_verifiable())
            .map(|k| keys::public_jwk(&k))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(JwkSet { keys })
    }

    /// One rotation tick evaluated at `now`.
    ///
    /// Steps run in order and the first failure aborts the rest. Each
    /// step leaves the store valid on its own, so an aborted tick is
    /// finished by the next one.
    pub async fn tick_at(&self, now: DateTime<Utc>) -> IdentityResult<TickReport> {
        let (_, bootstrapped) = self.ensure_signer_at(now).await?;
        let mut report = TickReport {
            bootstrapped,
            ..Default::default()
        };

        report.reconciled = self.reconcile_stale_signers(now).await?;
        report.rotated = self.rotate_if_due(now).await?;
        report.revoked = self.revoke_retired(now).await?;
        Ok(report)
    }

    /// Replace the current signer if it is at least one rotation
    /// interval old.
    ///
    /// The successor is inserted before the predecessor is retired, so
    /// there is never a moment without a signer.
    pub async fn rotate_if_due(&self, now: DateTime<Utc>) -> IdentityResult<Option<Rotation>> {
        let current = self
            .keys
            .find_active()
            .await?
            .ok_or_else(|| IdentityError::not_found("signing_key", "active"))?;

        if now - current.created_at < self.rotation_interval {
            debug!(kid = %current.kid, "signing key rotation not due");
            return Ok(None);
        }

        let successor = self.keys.create(generate(now).await?).await?;
        self.keys
            .update_status(current.id, SigningKeyStatus::Retiring, Some(now))
            .await?;

        info!(
            new_kid = %successor.kid,
            old_kid = %current.kid,
            "rotated signing key"
        );

        Ok(Some(Rotation {
            old_kid: current.kid,
            new_kid: successor.kid,
        }))
    }

    /// Revoke retiring keys whose grace period has elapsed.
    pub async fn revoke_retired(&self, now: DateTime<Utc>) -> IdentityResult<u64> {
        let count = self.keys.revoke_retiring_before(now - self.retire_after).await?;
        if count > 0 {
            info!(count, "revoked retiring signing keys");
        }
        Ok(count)
    }

    async fn ensure_signer_at(
        &self,
        now: DateTime<Utc>,
    ) -> IdentityResult<(SigningKey, Option<String>)> {
        if let Some(key) = self.keys.find_active().await? {
            return Ok((key, None));
        }

        let key = self.keys.create(generate(now).await?).await?;
        info!(kid = %key.kid, "bootstrapped signing key");
        let kid = key.kid.clone();
        Ok((key, Some(kid)))
    }

    /// Retire every `active` key except the newest one.
    async fn reconcile_stale_signers(&self, now: DateTime<Utc>) -> IdentityResult<u64> {
        let mut active: Vec<SigningKey> = self
            .keys
            .list_verifiable()
            .await?
            .into_iter()
            .filter(|k| k.status == SigningKeyStatus::Active)
            .collect();
        if active.len() <= 1 {
            return Ok(0);
        }

        active.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let mut retired = 0;
        for stale in active.into_iter().skip(1) {
            match self
                .keys
                .update_status(stale.id, SigningKeyStatus::Retiring, Some(now))
                .await
            {
                Ok(()) => {
                    warn!(kid = %stale.kid, "retired stale active signing key");
                    retired += 1;
                }
                // Another writer already moved it on.
                Err(IdentityError::NotFound { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(retired)
    }
}

async fn generate(now: DateTime<Utc>) -> IdentityResult<CreateSigningKey> {
    tokio::task::spawn_blocking(move || keys::generate_signing_key(now))
        .await
        .map_err(|e| IdentityError::Internal(format!("key generation task: {e}")))?
        .map_err(Into::into)
}
