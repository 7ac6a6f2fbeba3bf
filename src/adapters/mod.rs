//! Engine adapter implementations.
//!
//! This module contains implementations of the `EngineAdapter` trait for
//! the malware-scanning engines the consensus pool talks to.
//!
//! ## Available Adapters
//!
//! - [`mock`] - A configurable adapter for testing
//! - [`clamscan`] - ClamAV via the `clamscan` CLI (requires `clamscan` feature)
//! - [`cloudmersive`] - Cloudmersive REST API (requires `cloudmersive` feature)
//! - [`bytescale`] - Bytescale upload-and-poll API (requires `bytescale` feature)
//!
//! ## Implementing a Custom Adapter
//!
//! ```rust,ignore
//! use scanquorum::core::{EngineAdapter, EngineError, EngineOutcome, ScanTarget};
//! use async_trait::async_trait;
//! use tokio_util::sync::CancellationToken;
//!
//! #[derive(Debug)]
//! pub struct MyEngine;
//!
//! #[async_trait]
//! impl EngineAdapter for MyEngine {
//!     fn name(&self) -> &str {
//!         "my-engine"
//!     }
//!
//!     async fn scan(
//!         &self,
//!         target: &ScanTarget,
//!         cancel: &CancellationToken,
//!     ) -> Result<EngineOutcome, EngineError> {
//!         todo!()
//!     }
//! }
//! ```

pub mod mock;

#[cfg(feature = "clamscan")]
pub mod clamscan;

#[cfg(feature = "cloudmersive")]
pub mod cloudmersive;

#[cfg(feature = "bytescale")]
pub mod bytescale;

// Re-exports
pub use mock::MockAdapter;

#[cfg(feature = "clamscan")]
pub use clamscan::{ClamscanAdapter, ClamscanConfig};

#[cfg(feature = "cloudmersive")]
pub use cloudmersive::{CloudmersiveAdapter, CloudmersiveConfig};

#[cfg(feature = "bytescale")]
pub use bytescale::{BytescaleAdapter, BytescaleConfig};
