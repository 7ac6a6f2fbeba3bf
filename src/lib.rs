//! # Scanquorum
//!
//! Weighted multi-engine malware verdicts with per-user, cancellable scan
//! operations.
//!
//! ## Overview
//!
//! Scanquorum sends one file to several independent malware-scanning engines
//! at once and turns their answers into a single verdict, while tracking
//! every in-flight scan so it can be cancelled:
//!
//! - Fan a file out to every engine concurrently and wait for all of them
//! - Redistribute the weight of engines that fail during an attempt
//! - Compute a weighted score and a `Safe`/`Suspicious`/`Malicious`/`Unknown`
//!   verdict, forcing `Unknown` when two or more engines give no answer
//! - Cancel one operation, every operation of one user, or everything
//! - Reap operations whose callers disappeared
//! - Push progress events to a per-user activity feed
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use scanquorum::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = ConsensusEngine::builder()
//!         .add_engine(MockAdapter::clean().with_name("bytescale"), 34.0)
//!         .add_engine(MockAdapter::clean().with_name("cloudmersive"), 37.0)
//!         .add_engine(MockAdapter::clean().with_name("clamav"), 29.0)
//!         .build()?;
//!
//!     let service = ScanService::builder().with_engine(engine).build()?;
//!     service.start_reaper();
//!
//!     let user = UserSession::new("session-1234")?;
//!     let response = service
//!         .scan_file(&user, ScanTarget::from_path("/tmp/upload.bin"), ScanOptions::new())
//!         .await?;
//!
//!     println!(
//!         "{} ({:.2})",
//!         response.report.verdict.category, response.report.verdict.weighted_score
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `clamscan` - ClamAV adapter driving the `clamscan` CLI
//! - `cloudmersive` - Cloudmersive REST API adapter
//! - `bytescale` - Bytescale upload-and-poll adapter
//!
//! All three are enabled by default. The mock adapter is always available.
//!
//! ## Architecture
//!
//! - **Core**: Outcomes, identifiers, the adapter trait, and errors
//! - **Allocation**: Engine weights, reallocation, fan-out and verdict
//! - **Registry**: Per-user operations, cancellation and the idle reaper
//! - **Activity**: Best-effort per-user progress feeds
//! - **Adapters**: Individual engine implementations
//! - **Service**: The glue a request handler calls
//! - **Audit**: Structured logging on the `scanquorum::audit` target

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod activity;
pub mod adapters;
pub mod allocation;
pub mod audit;
pub mod core;
pub mod registry;
pub mod service;

// Re-export commonly used types at the crate root
pub use crate::core::{
    EngineAdapter, EngineError, EngineOutcome, OperationId, OperationKind, OperationMetadata,
    OperationStatus, OutcomeKind, RegistryError, ScanTarget, UserSession,
};

pub use crate::activity::{ActivityChannel, ActivityEvent, BroadcastActivity};
pub use crate::allocation::{ConsensusEngine, ConsensusReport, Verdict, VerdictCategory};
pub use crate::registry::{IdleReaper, OperationRegistry, RegistryConfig};
pub use crate::service::{ScanOptions, ScanResponse, ScanService};

/// Prelude module for convenient imports.
///
/// ```rust
/// use scanquorum::prelude::*;
/// ```
pub mod prelude {
    pub use crate::activity::{ActivityChannel, ActivityEvent, BroadcastActivity, NoopActivity};
    pub use crate::adapters::MockAdapter;
    pub use crate::allocation::{
        Allocation, Availability, ConsensusEngine, ConsensusReport, EngineConfig, EnginePool,
        EnginePoolConfig, Verdict, VerdictCategory,
    };
    pub use crate::core::{
        ConfigError, EngineAdapter, EngineError, EngineOutcome, OperationId, OperationKind,
        OperationMetadata, OperationStatus, OutcomeKind, RegistryError, ScanTarget, UserSession,
    };
    pub use crate::registry::{
        IdleReaper, OperationHandle, OperationRegistry, OperationSummary, RegistryConfig,
        StatusSnapshot, StopReport,
    };
    pub use crate::service::{ScanOptions, ScanResponse, ScanService};
}
