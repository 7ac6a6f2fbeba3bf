//! Core types and traits for the scanquorum library.
//!
//! - [`types`] - Engine outcomes, sessions, operation ids and metadata
//! - [`traits`] - The `EngineAdapter` contract
//! - [`error`] - Structured error types
//! - [`input`] - The file handed to engines
//! - [`serde_util`] - Serde helpers shared by config and summaries

pub mod error;
pub mod input;
pub mod serde_util;
pub mod traits;
pub mod types;

pub use error::{
    ConfigError, ConfigResult, EngineError, EngineResult, RegistryError, RegistryResult,
};
pub use input::ScanTarget;
pub use traits::{ArcAdapter, EngineAdapter};
pub use types::{
    EngineOutcome, OperationId, OperationKind, OperationMetadata, OperationStatus, OutcomeKind,
    UserSession,
};
