//! Per-user registry of cancellable operations.
//!
//! - [`config`] - Idle limits, sweep interval and global-stop cooldown
//! - [`operation`] - Handles, summaries and stop reports
//! - [`registry`] - The store and its cancellation paths
//! - [`reaper`] - The periodic idle sweep

pub mod config;
pub mod operation;
pub mod reaper;
#[allow(clippy::module_inception)]
pub mod registry;

pub use config::RegistryConfig;
pub use operation::{CancelReason, OperationHandle, OperationSummary, StatusSnapshot, StopReport};
pub use reaper::IdleReaper;
pub use registry::OperationRegistry;
