//! Repository trait definitions for data access abstraction.
//!
//! All operations are async and re-read authoritative state; callers
//! never cache rows across requests. Implementations bound every call
//! by their configured operation timeout.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::IdentityResult;
use crate::models::{
    refresh_session::{CreateRefreshSession, RefreshSession},
    signing_key::{CreateSigningKey, SigningKey, SigningKeyStatus},
    user::{CreateUser, User},
};

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

pub trait UserRepository: Send + Sync {
    /// Fails with `AlreadyExists` when the email is taken.
    fn create(&self, input: CreateUser) -> impl Future<Output = IdentityResult<User>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = IdentityResult<User>> + Send;
    fn get_by_email(&self, email: &str) -> impl Future<Output = IdentityResult<User>> + Send;
}

// ---------------------------------------------------------------------------
// Signing keys
// ---------------------------------------------------------------------------

pub trait SigningKeyRepository: Send + Sync {
    /// Insert a new key with status `active`.
    fn create(
        &self,
        input: CreateSigningKey,
    ) -> impl Future<Output = IdentityResult<SigningKey>> + Send;

    /// The current signer: the `active` key with the newest `created_at`.
    fn find_active(&self) -> impl Future<Output = IdentityResult<Option<SigningKey>>> + Send;

    /// Move a key one step forward.
    ///
    /// The write is conditioned on the key currently holding
    /// `status.predecessor()`; a key in any other state yields
    /// `NotFound`. `rotated_at` is written only when `Some`.
    fn update_status(
        &self,
        id: Uuid,
        status: SigningKeyStatus,
        rotated_at: Option<DateTime<Utc>>,
    ) -> impl Future<Output = IdentityResult<()>> + Send;

    /// Revoke every `retiring` key whose `rotated_at` is before `cutoff`.
    /// Returns the number of keys revoked.
    fn revoke_retiring_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> impl Future<Output = IdentityResult<u64>> + Send;

    /// Keys whose public half must be published (`active` or `retiring`).
    fn list_verifiable(&self) -> impl Future<Output = IdentityResult<Vec<SigningKey>>> + Send;
}

// ---------------------------------------------------------------------------
// Refresh sessions
// ---------------------------------------------------------------------------

pub trait RefreshSessionRepository: Send + Sync {
    fn create(
        &self,
        input: CreateRefreshSession,
    ) -> impl Future<Output = IdentityResult<RefreshSession>> + Send;

    fn get_by_session_id(
        &self,
        session_id: &str,
    ) -> impl Future<Output = IdentityResult<RefreshSession>> + Send;

    /// Atomically replace the secret hash and expiry.
    ///
    /// Applies only if the stored hash still equals `expected_hash` and
    /// the session is unrevoked and unexpired at `now`. Returns `false`
    /// when the condition did not hold, which means a concurrent
    /// rotation or revocation won.
    fn rotate(
        &self,
        session_id: &str,
        expected_hash: &str,
        new_hash: &str,
        new_expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> impl Future<Output = IdentityResult<bool>> + Send;

    /// Stamp `revoked_at`. Unknown sessions yield `NotFound`.
    fn revoke(
        &self,
        session_id: &str,
        when: DateTime<Utc>,
    ) -> impl Future<Output = IdentityResult<()>> + Send;

    /// Revoke every live session of a user. Returns how many were revoked.
    fn revoke_user_sessions(
        &self,
        user_id: Uuid,
        when: DateTime<Utc>,
    ) -> impl Future<Output = IdentityResult<u64>> + Send;

    /// Delete sessions that expired before `now`; storage-level backstop.
    fn cleanup_expired(&self, now: DateTime<Utc>) -> impl Future<Output = IdentityResult<u64>> + Send;
}

// ---------------------------------------------------------------------------
// Distributed lease lock
// ---------------------------------------------------------------------------

/// Time-bounded mutual exclusion shared by every replica.
///
/// A held lease expires on its own if the holder stops renewing it, so
/// a crashed replica can never wedge the protected work.
pub trait LeaseLock: Send + Sync {
    /// Acquire or renew the lease. `Ok(false)` means another owner holds it.
    fn try_acquire(&self) -> impl Future<Output = IdentityResult<bool>> + Send;

    /// Give the lease up early. A no-op if this owner does not hold it.
    fn release(&self) -> impl Future<Output = IdentityResult<()>> + Send;
}
