//! Authentication service: register, login, refresh, logout and JWKS
//! orchestration.

use std::sync::Arc;

use identity_core::error::{IdentityError, IdentityResult};
use identity_core::models::jwk::JwkSet;
use identity_core::models::user::{CreateUser, DEFAULT_ROLE, User, normalize_email};
use identity_core::repository::{RefreshSessionRepository, SigningKeyRepository, UserRepository};

use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::manager::AuthKeyManager;
use crate::password::{CredentialHasher, DECOY_HASH};
use crate::protocol::{ClientInfo, TokenPair, TokenProtocol};

/// Input for the registration flow.
pub struct RegisterInput {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Input for the login flow.
pub struct LoginInput {
    pub email: String,
    pub password: String,
    pub client: ClientInfo,
}

/// Successful login result.
#[derive(Debug)]
pub struct LoginOutput {
    /// Signed RS256 access token.
    pub access_token: String,
    /// Opaque refresh token (return to client, never stored raw).
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: u64,
    pub user: User,
}

/// Authentication service.
///
/// Generic over repository implementations so that the auth layer
/// has no dependency on the database crate.
pub struct IdentityAuthService<U, S, K>
where
    U: UserRepository + Clone,
    S: RefreshSessionRepository,
    K: SigningKeyRepository,
{
    users: U,
    hasher: CredentialHasher,
    keys: Arc<AuthKeyManager<K>>,
    protocol: TokenProtocol<U, S, K>,
}

impl<U, S, K> IdentityAuthService<U, S, K>
where
    U: UserRepository + Clone,
    S: RefreshSessionRepository,
    K: SigningKeyRepository,
{
    pub fn new(users: U, sessions: S, keys: K, config: AuthConfig) -> Self {
        let manager = Arc::new(AuthKeyManager::new(keys, &config.rotation));
        Self::with_key_manager(users, sessions, manager, config)
    }

    /// Build around a key manager that is shared with a rotation worker.
    pub fn with_key_manager(
        users: U,
        sessions: S,
        keys: Arc<AuthKeyManager<K>>,
        config: AuthConfig,
    ) -> Self {
        Self {
            hasher: CredentialHasher::new(config.pepper.clone()),
            protocol: TokenProtocol::new(users.clone(), sessions, keys.clone(), config),
            users,
            keys,
        }
    }

    pub fn key_manager(&self) -> &Arc<AuthKeyManager<K>> {
        &self.keys
    }

    /// Create a user with a hashed password and the default role.
    pub async fn register(&self, input: RegisterInput) -> IdentityResult<User> {
        let email = normalize_email(&input.email);
        if email.is_empty() || input.password.trim().is_empty() {
            return Err(IdentityError::validation("email and password are required"));
        }

        let password_hash = self.hash_password(input.password).await?;
        self.users
            .create(CreateUser {
                name: input.name.trim().to_owned(),
                email,
                password_hash,
                roles: vec![DEFAULT_ROLE.to_owned()],
            })
            .await
    }

    /// Verify credentials and open a new session.
    ///
    /// Unknown email and wrong password are indistinguishable.
    pub async fn login(&self, input: LoginInput) -> IdentityResult<LoginOutput> {
        let email = normalize_email(&input.email);
        if email.is_empty() || input.password.trim().is_empty() {
            return Err(IdentityError::validation("email and password are required"));
        }

        let user = match self.users.get_by_email(&email).await {
            Ok(user) => user,
            Err(IdentityError::NotFound { .. }) => {
                // Pay for a derivation anyway so the miss is not observable.
                self.verify_password(input.password, DECOY_HASH.to_owned())
                    .await?;
                return Err(AuthError::InvalidCredentials.into());
            }
            Err(e) => return Err(e),
        };

        if !self.verify_password(input.password, user.password_hash.clone()).await? {
            return Err(AuthError::InvalidCredentials.into());
        }

        let access = self.protocol.issue_access_token(&user).await?;
        let refresh_token = self
            .protocol
            .issue_refresh_session(&user, input.client)
            .await?;

        Ok(LoginOutput {
            access_token: access.token,
            refresh_token,
            expires_in: access.expires_in,
            user,
        })
    }

    /// Rotate a refresh token into a new token pair.
    pub async fn refresh(&self, refresh_token: &str) -> IdentityResult<TokenPair> {
        if refresh_token.trim().is_empty() {
            return Err(IdentityError::validation("refresh token is required"));
        }
        self.protocol.refresh(refresh_token).await
    }

    /// Revoke the session behind a refresh token.
    pub async fn logout(&self, refresh_token: &str) -> IdentityResult<()> {
        if refresh_token.trim().is_empty() {
            return Err(IdentityError::validation("refresh token is required"));
        }
        self.protocol.revoke(refresh_token).await
    }

    pub async fn get_jwks(&self) -> IdentityResult<JwkSet> {
        self.keys.jwks().await
    }

    /// Make sure a signer exists, e.g. before the first JWKS read.
    pub async fn ensure_active_key(&self) -> IdentityResult<()> {
        self.keys.ensure_active_key().await.map(|_| ())
    }

    async fn hash_password(&self, password: String) -> IdentityResult<String> {
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| IdentityError::Internal(format!("password hash task: {e}")))?
            .map_err(Into::into)
    }

    async fn verify_password(&self, password: String, encoded: String) -> IdentityResult<bool> {
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || hasher.verify(&password, &encoded))
            .await
            .map_err(|e| IdentityError::Internal(format!("password verify task: {e}")))
    }
}
