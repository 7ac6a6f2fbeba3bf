//! The result of one consensus scan attempt.

use crate::allocation::verdict::Verdict;
use crate::allocation::weights::Allocation;
use crate::core::serde_util::duration_ms;
use crate::core::types::{EngineOutcome, OutcomeKind};

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Everything produced by one attempt: per-engine outcomes, the weights in
/// force, and the verdict.
#[derive(Debug, Clone, Serialize)]
pub struct ConsensusReport {
    /// Unique identifier for this report.
    pub id: String,

    /// One outcome per pool engine, in pool order.
    pub outcomes: Vec<EngineOutcome>,

    /// Effective weights after in-attempt failures, used for the verdict.
    pub allocation: Allocation,

    /// Engines that were unavailable by the end of the attempt.
    pub unavailable: Vec<String>,

    /// The consensus verdict.
    pub verdict: Verdict,

    /// When the attempt started.
    pub started_at: DateTime<Utc>,

    /// When the attempt completed.
    pub completed_at: DateTime<Utc>,

    /// Wall-clock duration of the fan-out.
    #[serde(with = "duration_ms")]
    pub duration: Duration,
}

impl ConsensusReport {
    /// Returns `true` when more than one engine gave a usable answer.
    pub fn coverage_sufficient(&self) -> bool {
        self.verdict.valid_result_count > 1
    }

    /// Human-readable explanation when coverage is insufficient.
    pub fn coverage_error(&self) -> Option<&'static str> {
        if self.coverage_sufficient() {
            None
        } else {
            Some("Insufficient scan coverage - too few antivirus engines responded")
        }
    }

    /// Returns `true` if any engine observed the cancellation.
    pub fn was_cancelled(&self) -> bool {
        self.outcomes
            .iter()
            .any(|o| o.kind == OutcomeKind::Cancelled)
    }

    /// Looks up the outcome of one engine.
    pub fn outcome(&self, engine: &str) -> Option<&EngineOutcome> {
        self.outcomes.iter().find(|o| o.engine == engine)
    }

    /// Allocation rounded to one decimal, for display.
    pub fn allocation_report(&self) -> BTreeMap<String, f64> {
        self.allocation.rounded()
    }
}
