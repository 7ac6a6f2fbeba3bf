//! Weighted-consensus verdict computation.

use crate::allocation::weights::Allocation;
use crate::core::types::{EngineOutcome, OutcomeKind};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Score at or above which a result can be `Safe`.
pub const SAFE_THRESHOLD: f64 = 80.0;

/// Score at or above which a result can be `Suspicious`.
pub const SUSPICIOUS_THRESHOLD: f64 = 50.0;

/// Number of scoreless engines that voids confidence in the result.
pub const NULL_LIMIT: usize = 2;

/// The consensus category.
///
/// `Unknown` means "we could not tell" and is kept distinct from
/// `Malicious` so downstream consumers do not treat it as a detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictCategory {
    /// Engines agree the file is clean.
    Safe,
    /// Mostly clean with some dissent.
    Suspicious,
    /// Detections outweigh clean results.
    Malicious,
    /// Not enough usable engine results.
    Unknown,
}

impl fmt::Display for VerdictCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Safe => "safe",
            Self::Suspicious => "suspicious",
            Self::Malicious => "malicious",
            Self::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

/// The single judgment derived from all outcomes of one attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    /// Weighted score from 0 to 100, two-decimal precision.
    pub weighted_score: f64,
    /// Verdict category.
    pub category: VerdictCategory,
    /// Outcomes that resolved to `Clean` or `Infected`.
    pub valid_result_count: usize,
    /// Outcomes that resolved to `Infected`.
    pub malicious_count: usize,
    /// Outcomes without a score.
    pub null_count: usize,
}

impl Verdict {
    /// Computes the verdict from outcomes and the effective weights in force.
    ///
    /// Two or more scoreless outcomes force a score of 0 and `Unknown`,
    /// whatever the remaining engines said.
    pub fn compute(outcomes: &[EngineOutcome], allocation: &Allocation) -> Self {
        let total = allocation.total();

        let mut valid_result_count = 0usize;
        let mut malicious_count = 0usize;
        let mut null_count = 0usize;
        let mut scored = Vec::with_capacity(outcomes.len());

        for outcome in outcomes {
            match outcome.score() {
                Some(score) => {
                    valid_result_count += 1;
                    if outcome.kind == OutcomeKind::Infected {
                        malicious_count += 1;
                    }
                    let weight = if total > 0.0 {
                        allocation.weight(&outcome.engine) / total
                    } else {
                        0.0
                    };
                    scored.push((score, weight));
                }
                None => null_count += 1,
            }
        }

        let weighted_score = if null_count >= NULL_LIMIT {
            0.0
        } else {
            let (sum, used) = scored
                .iter()
                .filter(|(_, weight)| *weight > 0.0)
                .fold((0.0, 0.0), |(sum, used), (score, weight)| {
                    (sum + score * weight, used + weight)
                });
            if used > 0.0 {
                sum / used * 100.0
            } else {
                0.0
            }
        };

        let category = categorize(
            weighted_score,
            valid_result_count,
            malicious_count,
            null_count,
        );

        Self {
            weighted_score: round2(weighted_score),
            category,
            valid_result_count,
            malicious_count,
            null_count,
        }
    }

    /// Returns `true` when two or more engines gave no usable answer.
    pub fn is_degraded(&self) -> bool {
        self.null_count >= NULL_LIMIT
    }

    /// Returns `true` when the verdict is anything but `Unknown`.
    pub fn is_conclusive(&self) -> bool {
        self.category != VerdictCategory::Unknown
    }
}

fn categorize(
    score: f64,
    valid_result_count: usize,
    malicious_count: usize,
    null_count: usize,
) -> VerdictCategory {
    if valid_result_count <= 1 || null_count >= NULL_LIMIT {
        return VerdictCategory::Unknown;
    }

    let dissent_limit = valid_result_count as i64 - 1;
    let malicious = malicious_count as i64;

    if score >= SAFE_THRESHOLD && malicious < dissent_limit {
        VerdictCategory::Safe
    } else if score >= SUSPICIOUS_THRESHOLD && malicious <= dissent_limit {
        VerdictCategory::Suspicious
    } else {
        VerdictCategory::Malicious
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation::weights::{Availability, EngineConfig, EnginePool};

    const ENGINES: [&str; 3] = ["bytescale", "cloudmersive", "clamav"];

    fn pool() -> EnginePool {
        EnginePool::new(vec![
            EngineConfig::new("bytescale", 34.0),
            EngineConfig::new("cloudmersive", 37.0),
            EngineConfig::new("clamav", 29.0),
        ])
        .unwrap()
    }

    fn outcomes(kinds: [OutcomeKind; 3]) -> Vec<EngineOutcome> {
        ENGINES
            .iter()
            .zip(kinds)
            .map(|(engine, kind)| EngineOutcome::new(*engine, kind, ""))
            .collect()
    }

    fn verdict_for(kinds: [OutcomeKind; 3]) -> Verdict {
        Verdict::compute(
            &outcomes(kinds),
            &pool().allocate(&Availability::all_available()),
        )
    }

    use OutcomeKind::{Cancelled, Clean, Infected, Rejected, Skipped, TimedOut, Unknown};

    #[test]
    fn test_all_clean_is_safe() {
        let verdict = verdict_for([Clean, Clean, Clean]);
        assert_eq!(verdict.weighted_score, 100.0);
        assert_eq!(verdict.category, VerdictCategory::Safe);
        assert_eq!(verdict.valid_result_count, 3);
        assert_eq!(verdict.malicious_count, 0);
    }

    #[test]
    fn test_all_infected_is_malicious() {
        let verdict = verdict_for([Infected, Infected, Infected]);
        assert_eq!(verdict.weighted_score, 0.0);
        assert_eq!(verdict.category, VerdictCategory::Malicious);
        assert_eq!(verdict.malicious_count, 3);
    }

    #[test]
    fn test_single_dissent_among_three() {
        // clamav (29) infected: score = 71, malicious 1 < 2 but score < 80.
        let verdict = verdict_for([Clean, Clean, Infected]);
        assert_eq!(verdict.weighted_score, 71.0);
        assert_eq!(verdict.category, VerdictCategory::Suspicious);
    }

    #[test]
    fn test_two_valid_one_infected_boundary() {
        // Two valid results, one malicious: 1 < 1 fails, 1 <= 1 holds.
        let allocation = pool().allocate(&Availability::with_unavailable(["clamav"]));
        let outs = vec![
            EngineOutcome::clean("bytescale"),
            EngineOutcome::infected("cloudmersive", "Eicar"),
            EngineOutcome::skipped("clamav", "inactive"),
        ];
        let verdict = Verdict::compute(&outs, &allocation);
        assert_eq!(verdict.valid_result_count, 2);
        assert_eq!(verdict.null_count, 1);
        assert_eq!(verdict.weighted_score, 47.89);
        assert_eq!(verdict.category, VerdictCategory::Malicious);

        let outs = vec![
            EngineOutcome::infected("bytescale", "Eicar"),
            EngineOutcome::clean("cloudmersive"),
            EngineOutcome::skipped("clamav", "inactive"),
        ];
        let verdict = Verdict::compute(&outs, &allocation);
        assert_eq!(verdict.weighted_score, 52.11);
        assert_eq!(verdict.category, VerdictCategory::Suspicious);
    }

    #[test]
    fn test_two_valid_both_clean_is_safe() {
        let allocation = pool().allocate(&Availability::with_unavailable(["bytescale"]));
        let outs = vec![
            EngineOutcome::unknown("bytescale", "upload failed"),
            EngineOutcome::clean("cloudmersive"),
            EngineOutcome::clean("clamav"),
        ];
        let verdict = Verdict::compute(&outs, &allocation);
        assert_eq!(verdict.weighted_score, 100.0);
        assert_eq!(verdict.category, VerdictCategory::Safe);
    }

    #[test]
    fn test_conservative_null_rule_for_all_combinations() {
        let nulls = [Unknown, Skipped, Cancelled, TimedOut, Rejected];
        let valids = [Clean, Infected];

        for a in nulls {
            for b in nulls {
                for c in valids.iter().copied().chain(nulls) {
                    for order in [[a, b, c], [a, c, b], [c, a, b]] {
                        let verdict = verdict_for(order);
                        assert_eq!(verdict.weighted_score, 0.0, "{order:?}");
                        assert_eq!(verdict.category, VerdictCategory::Unknown, "{order:?}");
                        assert!(verdict.is_degraded());
                    }
                }
            }
        }
    }

    #[test]
    fn test_two_down_lone_infected_is_unknown() {
        let availability = Availability::with_unavailable(["bytescale", "cloudmersive"]);
        let allocation = pool().allocate(&availability);
        assert_eq!(allocation.weight("clamav"), 100.0);

        let outs = vec![
            EngineOutcome::skipped("bytescale", "unavailable"),
            EngineOutcome::skipped("cloudmersive", "unavailable"),
            EngineOutcome::infected("clamav", "Win.Test.EICAR_HDB-1"),
        ];
        let verdict = Verdict::compute(&outs, &allocation);
        assert_eq!(verdict.weighted_score, 0.0);
        assert_eq!(verdict.category, VerdictCategory::Unknown);
        assert!(!verdict.is_conclusive());
    }

    #[test]
    fn test_outcome_outside_pool_counts_but_does_not_weigh() {
        let allocation = pool().allocate(&Availability::all_available());
        let outs = vec![
            EngineOutcome::clean("bytescale"),
            EngineOutcome::infected("virustotal", "Trojan"),
        ];
        let verdict = Verdict::compute(&outs, &allocation);
        assert_eq!(verdict.valid_result_count, 2);
        assert_eq!(verdict.malicious_count, 1);
        assert_eq!(verdict.weighted_score, 100.0);
        assert_eq!(verdict.category, VerdictCategory::Suspicious);
    }

    #[test]
    fn test_no_outcomes_is_unknown() {
        let verdict = Verdict::compute(&[], &pool().allocate(&Availability::all_available()));
        assert_eq!(verdict.weighted_score, 0.0);
        assert_eq!(verdict.category, VerdictCategory::Unknown);
    }
}
