//! Mock engine adapter for testing.
//!
//! The mock can be configured to return any outcome, to fail, to panic, or
//! to take a while, without requiring a real scanning engine.

use crate::core::{EngineAdapter, EngineError, EngineOutcome, OutcomeKind, ScanTarget};

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A mock engine adapter for testing purposes.
///
/// # Examples
///
/// ```rust
/// use scanquorum::adapters::MockAdapter;
/// use std::time::Duration;
///
/// // An engine that reports every file as clean
/// let adapter = MockAdapter::clean().with_name("clamav");
///
/// // An engine that reports a detection after a delay
/// let adapter = MockAdapter::infected("Eicar-Test-Signature")
///     .with_name("cloudmersive")
///     .with_latency(Duration::from_millis(100));
///
/// // An engine whose calls fail
/// let adapter = MockAdapter::clean().with_error("connection refused");
/// ```
#[derive(Debug)]
pub struct MockAdapter {
    /// Name of this adapter instance.
    name: String,
    /// Outcome kind returned by every successful call.
    kind: OutcomeKind,
    /// Failure reason or signature attached to the outcome.
    reason: String,
    /// Simulated latency for scans.
    latency: Option<Duration>,
    /// Error message returned instead of an outcome.
    error: Option<String>,
    /// Whether scans panic.
    panics: bool,
    /// Reported file size limit.
    max_file_size: Option<u64>,
    /// Counter for scan calls that reached the adapter.
    scan_count: AtomicU64,
    /// Whether to fail health checks.
    unhealthy: RwLock<bool>,
}

impl MockAdapter {
    /// Creates a mock adapter that returns the given outcome.
    pub fn new(kind: OutcomeKind, reason: impl Into<String>) -> Self {
        Self {
            name: "mock".to_string(),
            kind,
            reason: reason.into(),
            latency: None,
            error: None,
            panics: false,
            max_file_size: None,
            scan_count: AtomicU64::new(0),
            unhealthy: RwLock::new(false),
        }
    }

    /// Creates a mock adapter that always reports clean.
    pub fn clean() -> Self {
        Self::new(OutcomeKind::Clean, "")
    }

    /// Creates a mock adapter that always reports a detection.
    pub fn infected(signature: impl Into<String>) -> Self {
        Self::new(OutcomeKind::Infected, signature)
    }

    /// Creates a mock adapter that always times out.
    pub fn timed_out() -> Self {
        Self::new(OutcomeKind::TimedOut, "scan did not complete in time")
    }

    /// Creates a mock adapter that always rejects the file.
    pub fn rejected() -> Self {
        Self::new(OutcomeKind::Rejected, "service rejected this file")
    }

    /// Sets the name of this adapter.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the simulated latency for scans.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Makes every scan return an error with this message.
    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error = Some(message.into());
        self
    }

    /// Makes every scan panic.
    pub fn with_panic(mut self) -> Self {
        self.panics = true;
        self
    }

    /// Sets the reported file size limit.
    pub fn with_max_file_size(mut self, size: u64) -> Self {
        self.max_file_size = Some(size);
        self
    }

    /// Starts the adapter in an unhealthy state.
    pub fn unhealthy(self) -> Self {
        self.set_healthy(false);
        self
    }

    /// Returns the number of scans that reached the adapter.
    pub fn scan_count(&self) -> u64 {
        self.scan_count.load(Ordering::Relaxed)
    }

    /// Sets the health status.
    pub fn set_healthy(&self, healthy: bool) {
        *self.unhealthy.write().unwrap_or_else(|p| p.into_inner()) = !healthy;
    }
}

impl Default for MockAdapter {
    fn default() -> Self {
        Self::clean()
    }
}

#[async_trait]
impl EngineAdapter for MockAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn scan(
        &self,
        _target: &ScanTarget,
        cancel: &CancellationToken,
    ) -> Result<EngineOutcome, EngineError> {
        self.scan_count.fetch_add(1, Ordering::Relaxed);

        if let Some(latency) = self.latency {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(EngineOutcome::cancelled(&self.name)),
                _ = tokio::time::sleep(latency) => {}
            }
        }

        if self.panics {
            panic!("mock adapter '{}' panicked", self.name);
        }

        if let Some(message) = &self.error {
            return Err(EngineError::unavailable(&self.name, message.clone()));
        }

        Ok(EngineOutcome::new(&self.name, self.kind, self.reason.clone()))
    }

    async fn health_check(&self) -> Result<(), EngineError> {
        if *self.unhealthy.read().unwrap_or_else(|p| p.into_inner()) {
            return Err(EngineError::unavailable(
                &self.name,
                "mock adapter is unhealthy",
            ));
        }
        Ok(())
    }

    fn max_file_size(&self) -> Option<u64> {
        self.max_file_size
    }
}
