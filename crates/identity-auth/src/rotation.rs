//! Background signing-key rotation loop.
//!
//! Every replica runs a worker; the lease lock makes sure at most one
//! of them executes a tick at any moment.

use std::sync::Arc;

use chrono::Utc;
use identity_core::repository::{LeaseLock, SigningKeyRepository};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::KeyRotationConfig;
use crate::manager::{AuthKeyManager, TickReport};

pub struct KeyRotationWorker<K: SigningKeyRepository, L: LeaseLock> {
    manager: Arc<AuthKeyManager<K>>,
    lock: L,
    tick_interval: std::time::Duration,
}

impl<K: SigningKeyRepository, L: LeaseLock> KeyRotationWorker<K, L> {
    pub fn new(manager: Arc<AuthKeyManager<K>>, lock: L, config: &KeyRotationConfig) -> Self {
        Self {
            manager,
            lock,
            tick_interval: config.tick_interval(),
        }
    }

    /// Run one tick if the lease can be taken.
    ///
    /// Failures are logged and swallowed; the next scheduled tick
    /// retries. Returns `None` when the tick did not run or failed.
    pub async fn tick(&self) -> Option<TickReport> {
        match self.lock.try_acquire().await {
            Ok(true) => {}
            Ok(false) => {
                debug!("auth key rotation: lease held elsewhere");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "auth key rotation: lock acquire failed");
                return None;
            }
        }

        match self.manager.tick_at(Utc::now()).await {
            Ok(report) => Some(report),
            Err(e) => {
                error!(error = %e, "auth key rotation: tick failed");
                None
            }
        }
    }

    /// Tick on a fixed interval until `shutdown` resolves, then give
    /// the lease back.
    pub async fn run(self, shutdown: impl Future<Output = ()>) {
        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(every = ?self.tick_interval, "auth key rotation worker started");
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = interval.tick() => {
                    self.tick().await;
                }
            }
        }

        if let Err(e) = self.lock.release().await {
            warn!(error = %e, "auth key rotation: lease release failed");
        }
        info!("auth key rotation worker stopped");
    }
}
