//! Process configuration loaded from `IDENTITY_*` environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use identity_auth::{AuthConfig, KeyRotationConfig};
use identity_db::DbConfig;

/// Everything the process needs at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub db: DbConfig,
    pub auth: AuthConfig,
    /// How often expired refresh sessions are deleted.
    pub session_cleanup_interval: Duration,
}

impl ServerConfig {
    /// Load settings from the environment, falling back to defaults.
    pub fn from_env() -> anyhow::Result<Self> {
        let db_defaults = DbConfig::default();
        let auth_defaults = AuthConfig::default();
        let rotation_defaults = KeyRotationConfig::default();

        let db = DbConfig {
            url: string_var("IDENTITY_DB_URL", db_defaults.url),
            namespace: string_var("IDENTITY_DB_NAMESPACE", db_defaults.namespace),
            database: string_var("IDENTITY_DB_DATABASE", db_defaults.database),
            username: string_var("IDENTITY_DB_USERNAME", db_defaults.username),
            password: string_var("IDENTITY_DB_PASSWORD", db_defaults.password),
            operation_timeout: Duration::from_millis(parse_var(
                "IDENTITY_DB_TIMEOUT_MS",
                db_defaults.operation_timeout.as_millis() as u64,
            )?),
        };

        let rotation = KeyRotationConfig {
            lock_key: string_var("IDENTITY_KEY_ROTATION_LOCK_KEY", rotation_defaults.lock_key),
            lease_secs: parse_var("IDENTITY_KEY_ROTATION_LEASE_SECS", rotation_defaults.lease_secs)?,
            rotation_interval_secs: parse_var(
                "IDENTITY_KEY_ROTATION_INTERVAL_SECS",
                rotation_defaults.rotation_interval_secs,
            )?,
            retire_after_secs: parse_var(
                "IDENTITY_KEY_RETIRE_AFTER_SECS",
                rotation_defaults.retire_after_secs,
            )?,
            tick_interval_secs: parse_var(
                "IDENTITY_KEY_ROTATION_TICK_SECS",
                rotation_defaults.tick_interval_secs,
            )?,
        };

        let auth = AuthConfig {
            access_token_lifetime_secs: parse_var(
                "IDENTITY_ACCESS_TOKEN_TTL_SECS",
                auth_defaults.access_token_lifetime_secs,
            )?,
            refresh_token_lifetime_secs: parse_var(
                "IDENTITY_REFRESH_TOKEN_TTL_SECS",
                auth_defaults.refresh_token_lifetime_secs,
            )?,
            jwt_issuer: string_var("IDENTITY_JWT_ISSUER", auth_defaults.jwt_issuer),
            jwt_audience: string_var("IDENTITY_JWT_AUDIENCE", auth_defaults.jwt_audience),
            pepper: env::var("IDENTITY_PASSWORD_PEPPER")
                .ok()
                .filter(|p| !p.is_empty()),
            revoke_sessions_on_replay: parse_var(
                "IDENTITY_REVOKE_SESSIONS_ON_REPLAY",
                auth_defaults.revoke_sessions_on_replay,
            )?,
            rotation,
        };

        Ok(Self {
            db,
            auth,
            session_cleanup_interval: Duration::from_secs(parse_var(
                "IDENTITY_SESSION_CLEANUP_SECS",
                3600,
            )?),
        })
    }
}

fn string_var(key: &str, default: String) -> String {
    env::var(key).unwrap_or(default)
}

fn parse_var<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {key}: {raw:?}")),
        Err(_) => Ok(default),
    }
}
