//! The engine adapter contract.

use crate::core::error::EngineError;
use crate::core::input::ScanTarget;
use crate::core::types::EngineOutcome;

use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// The contract every malware-scanning engine implements.
///
/// # Implementation Notes
///
/// - Check `cancel` before starting and react to it at every await point:
///   kill the subprocess, drop the request. The dispatcher also races the
///   call against the token, so a dropped future must release its resources.
/// - Ordinary failures (network errors, non-2xx responses, rejected or
///   oversized files, timeouts) are returned as outcomes (`Unknown`,
///   `Rejected`, `TimedOut`), not as `Err`.
/// - Polling adapters bound their own retry count and interval and resolve
///   to `TimedOut` once the budget is spent.
///
/// # Example Implementation
///
/// ```rust,ignore
/// use scanquorum::core::{EngineAdapter, EngineError, EngineOutcome, ScanTarget};
/// use async_trait::async_trait;
/// use tokio_util::sync::CancellationToken;
///
/// #[derive(Debug)]
/// struct AlwaysClean;
///
/// #[async_trait]
/// impl EngineAdapter for AlwaysClean {
///     fn name(&self) -> &str {
///         "always-clean"
///     }
///
///     async fn scan(
///         &self,
///         _target: &ScanTarget,
///         cancel: &CancellationToken,
///     ) -> Result<EngineOutcome, EngineError> {
///         if cancel.is_cancelled() {
///             return Ok(EngineOutcome::cancelled(self.name()));
///         }
///         Ok(EngineOutcome::clean(self.name()))
///     }
/// }
/// ```
#[async_trait]
pub trait EngineAdapter: Send + Sync + Debug {
    /// Stable identifier of the engine, e.g. `"clamav"`.
    fn name(&self) -> &str;

    /// Scans the target, honoring `cancel`.
    async fn scan(
        &self,
        target: &ScanTarget,
        cancel: &CancellationToken,
    ) -> Result<EngineOutcome, EngineError>;

    /// Lightweight reachability check that needs no file.
    async fn health_check(&self) -> Result<(), EngineError> {
        Ok(())
    }

    /// Largest file the engine accepts, if it has a limit.
    fn max_file_size(&self) -> Option<u64> {
        None
    }
}

/// An arc-wrapped adapter for shared ownership.
pub type ArcAdapter = Arc<dyn EngineAdapter>;
