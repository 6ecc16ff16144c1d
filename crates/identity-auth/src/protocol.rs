//! Access token issuance and the rotate-on-use refresh session
//! protocol.
//!
//! There is no in-process locking. Two refreshes racing on the same
//! session are resolved by the store's conditional rotate: the first
//! write wins and the loser's secret no longer matches.

use std::sync::Arc;

use chrono::Utc;
use identity_core::error::{IdentityError, IdentityResult};
use identity_core::models::refresh_session::CreateRefreshSession;
use identity_core::models::user::User;
use identity_core::repository::{RefreshSessionRepository, SigningKeyRepository, UserRepository};
use tracing::{debug, warn};

use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::manager::AuthKeyManager;
use crate::token::{self, IssuedAccessToken, RefreshToken};

/// Per-request client details recorded on a new session.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub user_agent: Option<String>,
    pub client_address: Option<String>,
}

/// Access token plus the refresh token that replaces the presented one.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: u64,
}

pub struct TokenProtocol<U, S, K>
where
    U: UserRepository,
    S: RefreshSessionRepository,
    K: SigningKeyRepository,
{
    users: U,
    sessions: S,
    keys: Arc<AuthKeyManager<K>>,
    config: AuthConfig,
}

impl<U, S, K> TokenProtocol<U, S, K>
where
    U: UserRepository,
    S: RefreshSessionRepository,
    K: SigningKeyRepository,
{
    pub fn new(users: U, sessions: S, keys: Arc<AuthKeyManager<K>>, config: AuthConfig) -> Self {
        Self {
            users,
            sessions,
            keys,
            config,
        }
    }

    /// Sign an access token with the current signer.
    pub async fn issue_access_token(&self, user: &User) -> IdentityResult<IssuedAccessToken> {
        let signer = self.keys.current_signer().await?;
        Ok(token::issue_access_token(
            user,
            &signer,
            &self.config,
            Utc::now(),
        )?)
    }

    /// Open a new refresh session and return its composed token.
    pub async fn issue_refresh_session(
        &self,
        user: &User,
        client: ClientInfo,
    ) -> IdentityResult<String> {
        let refresh = RefreshToken::new_session();
        let now = Utc::now();

        self.sessions
            .create(CreateRefreshSession {
                session_id: refresh.session_id().to_owned(),
                user_id: user.id,
                refresh_secret_hash: refresh.secret_hash(),
                user_agent: client.user_agent,
                client_address: client.client_address,
                created_at: now,
                expires_at: now + self.config.refresh_token_lifetime(),
            })
            .await?;

        Ok(refresh.to_string())
    }

    /// Exchange a refresh token for a new access token and a new
    /// refresh token on the same session.
    ///
    /// Revoked, expired, stale and lost-race tokens all fail with the
    /// same `AuthenticationFailed` error.
    pub async fn refresh(&self, raw: &str) -> IdentityResult<TokenPair> {
        let presented = RefreshToken::parse(raw)?;
        let session = self
            .sessions
            .get_by_session_id(presented.session_id())
            .await?;

        let now = Utc::now();
        if !session.is_usable_at(now) {
            debug!(session_id = %session.session_id, "refresh rejected: session revoked or expired");
            return Err(AuthError::RefreshTokenRejected.into());
        }

        let presented_hash = presented.secret_hash();
        if !token::hashes_match(&presented_hash, &session.refresh_secret_hash) {
            warn!(session_id = %session.session_id, "refresh rejected: secret mismatch");
            if self.config.revoke_sessions_on_replay {
                let revoked = self
                    .sessions
                    .revoke_user_sessions(session.user_id, now)
                    .await?;
                warn!(
                    user_id = %session.user_id,
                    count = revoked,
                    "revoked user sessions after refresh secret replay"
                );
            }
            return Err(AuthError::RefreshTokenRejected.into());
        }

        let user = match self.users.get_by_id(session.user_id).await {
            Ok(user) => user,
            Err(IdentityError::NotFound { .. }) => {
                return Err(AuthError::RefreshTokenRejected.into());
            }
            Err(e) => return Err(e),
        };

        let access = self.issue_access_token(&user).await?;

        let next = RefreshToken::for_session(session.session_id.clone());
        let rotated = self
            .sessions
            .rotate(
                &session.session_id,
                &presented_hash,
                &next.secret_hash(),
                now + self.config.refresh_token_lifetime(),
                now,
            )
            .await?;
        if !rotated {
            debug!(session_id = %session.session_id, "refresh rejected: lost rotation race");
            return Err(AuthError::RefreshTokenRejected.into());
        }

        Ok(TokenPair {
            access_token: access.token,
            refresh_token: next.to_string(),
            expires_in: access.expires_in,
        })
    }

    /// Revoke the session a refresh token belongs to.
    pub async fn revoke(&self, raw: &str) -> IdentityResult<()> {
        let presented = RefreshToken::parse(raw)?;
        self.sessions
            .revoke(presented.session_id(), Utc::now())
            .await
    }
}
