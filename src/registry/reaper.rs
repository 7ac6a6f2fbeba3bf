//! Periodic cancellation of abandoned operations.

use crate::registry::registry::OperationRegistry;

use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Background task that sweeps the registry on a fixed interval.
///
/// Stops when [`IdleReaper::shutdown`] is called or the reaper is dropped.
#[derive(Debug)]
pub struct IdleReaper {
    shutdown: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl IdleReaper {
    /// Spawns the reaper on the current runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn spawn(registry: Arc<OperationRegistry>) -> Self {
        let period = registry.config().sweep_interval;
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            tracing::info!(?period, "Idle reaper started");
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        tracing::info!("Idle reaper shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        let reaped = registry.sweep().await;
                        if !reaped.is_empty() {
                            tracing::info!(count = reaped.len(), "Reaped idle operations");
                        }
                    }
                }
            }
        });

        Self {
            shutdown,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Returns `true` while the sweep loop is running.
    pub fn is_running(&self) -> bool {
        !self.shutdown.is_cancelled()
    }

    /// Stops the sweep loop and waits for it to exit.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let handle = self.handle.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Idle reaper task ended abnormally");
            }
        }
    }
}

impl Drop for IdleReaper {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{OperationKind, OperationMetadata, UserSession};
    use crate::registry::RegistryConfig;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_reaper_cancels_idle_operation_without_caller() {
        let registry = Arc::new(OperationRegistry::new(RegistryConfig::default()));
        let user = UserSession::new("alice").unwrap();
        let handle = registry
            .open(&user, OperationKind::Scan, OperationMetadata::new())
            .unwrap();

        let reaper = IdleReaper::spawn(registry.clone());

        tokio::time::sleep(Duration::from_secs(14 * 60)).await;
        assert!(registry.contains(&handle.id));

        tokio::time::sleep(Duration::from_secs(3 * 60)).await;
        assert!(!registry.contains(&handle.id));
        assert!(handle.is_cancelled());

        reaper.shutdown().await;
        assert!(!reaper.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_active_operation_survives_sweeps() {
        let registry = Arc::new(OperationRegistry::new(RegistryConfig::default()));
        let user = UserSession::new("alice").unwrap();
        let handle = registry
            .open(&user, OperationKind::Download, OperationMetadata::new())
            .unwrap();
        let reaper = IdleReaper::spawn(registry.clone());

        for _ in 0..10 {
            tokio::time::sleep(Duration::from_secs(5 * 60)).await;
            registry
                .touch(&handle.id, "download_progress", serde_json::json!({"percent": 50}))
                .unwrap();
        }

        assert!(registry.contains(&handle.id));
        reaper.shutdown().await;
    }
}
