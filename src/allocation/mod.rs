//! Weighted consensus across malware-scanning engines.
//!
//! - [`weights`] - Nominal weights and per-attempt reallocation
//! - [`verdict`] - Score and category from outcomes
//! - [`engine`] - Concurrent fan-out to adapters
//! - [`report`] - The result of one attempt

pub mod engine;
pub mod report;
pub mod verdict;
pub mod weights;

pub use engine::{ConsensusEngine, ConsensusEngineBuilder, DispatchObserver, NoopObserver};
pub use report::ConsensusReport;
pub use verdict::{Verdict, VerdictCategory, NULL_LIMIT, SAFE_THRESHOLD, SUSPICIOUS_THRESHOLD};
pub use weights::{Allocation, Availability, EngineConfig, EnginePool, EnginePoolConfig};
