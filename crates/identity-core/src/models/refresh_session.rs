//! Refresh session domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Server-side record of one login.
///
/// `session_id` is stable for the lifetime of the login; the secret
/// hash is replaced on every rotation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshSession {
    pub id: Uuid,
    pub session_id: String,
    pub user_id: Uuid,
    #[serde(skip_serializing)]
    pub refresh_secret_hash: String,
    pub user_agent: Option<String>,
    pub client_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl RefreshSession {
    /// A session can mint tokens only while unrevoked and unexpired.
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && now <= self.expires_at
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRefreshSession {
    pub session_id: String,
    pub user_id: Uuid,
    pub refresh_secret_hash: String,
    pub user_agent: Option<String>,
    pub client_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}
