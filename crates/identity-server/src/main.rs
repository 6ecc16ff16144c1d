//! Identity Server: process entry point.
//!
//! Wires storage, the authentication service and the background loops
//! (signing-key rotation and expired-session cleanup), then runs until
//! interrupted.

mod config;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use identity_auth::{AuthKeyManager, IdentityAuthService, KeyRotationWorker};
use identity_core::repository::RefreshSessionRepository;
use identity_db::DbManager;
use identity_db::repository::{
    SurrealLeaseLock, SurrealRefreshSessionRepository, SurrealSigningKeyRepository,
    SurrealUserRepository,
};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("identity=info")),
        )
        .json()
        .init();

    info!("Starting identity server...");

    let config = ServerConfig::from_env()?;
    config.auth.validate()?;

    let db = DbManager::connect(&config.db).await?;
    identity_db::run_migrations(db.client()).await?;

    let client = db.client().clone();
    let timeout = db.operation_timeout();
    let sessions = SurrealRefreshSessionRepository::with_timeout(client.clone(), timeout);
    let keys = Arc::new(AuthKeyManager::new(
        SurrealSigningKeyRepository::with_timeout(client.clone(), timeout),
        &config.auth.rotation,
    ));

    let service = IdentityAuthService::with_key_manager(
        SurrealUserRepository::with_timeout(client.clone(), timeout),
        sessions.clone(),
        keys.clone(),
        config.auth.clone(),
    );
    service.ensure_active_key().await?;
    let jwks = service.get_jwks().await?;
    info!(published_keys = jwks.keys.len(), "signing keys ready");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let lock = SurrealLeaseLock::new(
        client,
        config.auth.rotation.lock_key.clone(),
        config.auth.rotation.lease(),
    )
    .with_timeout(timeout);
    info!(owner = %lock.owner(), key = %lock.key(), "rotation lease configured");
    let worker = KeyRotationWorker::new(keys, lock, &config.auth.rotation);
    let rotation = tokio::spawn(worker.run(shutdown_signal(shutdown_rx.clone())));

    let cleanup = tokio::spawn(sweep_expired_sessions(
        sessions,
        config.session_cleanup_interval,
        shutdown_rx,
    ));

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    let _ = shutdown_tx.send(true);

    rotation.await?;
    cleanup.await?;

    info!("Identity server stopped.");
    Ok(())
}

async fn shutdown_signal(mut rx: watch::Receiver<bool>) {
    // A dropped sender also counts as shutdown.
    let _ = rx.changed().await;
}

/// Delete expired refresh sessions on a fixed interval.
async fn sweep_expired_sessions<S: RefreshSessionRepository>(
    sessions: S,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = interval.tick() => {
                match sessions.cleanup_expired(Utc::now()).await {
                    Ok(0) => debug!("no expired refresh sessions"),
                    Ok(count) => info!(count, "deleted expired refresh sessions"),
                    Err(e) => warn!(error = %e, "refresh session cleanup failed"),
                }
            }
        }
    }
}
