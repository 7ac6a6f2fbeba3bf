//! Nominal engine weights and per-attempt reallocation.

use crate::core::error::{ConfigError, ConfigResult};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Tolerance when checking that nominal weights add up to 100.
const WEIGHT_SUM_TOLERANCE: f64 = 0.01;

/// An engine's name and fixed nominal weight (percentage).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Engine name; must match the adapter's `name()`.
    pub name: String,
    /// Nominal weight in percent.
    pub weight: f64,
}

impl EngineConfig {
    /// Creates a new engine config.
    pub fn new(name: impl Into<String>, weight: f64) -> Self {
        Self {
            name: name.into(),
            weight,
        }
    }
}

/// Deserializable engine pool settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnginePoolConfig {
    /// Engines and their nominal weights.
    pub engines: Vec<EngineConfig>,
}

impl Default for EnginePoolConfig {
    fn default() -> Self {
        Self {
            engines: vec![
                EngineConfig::new("bytescale", 34.0),
                EngineConfig::new("cloudmersive", 37.0),
                EngineConfig::new("clamav", 29.0),
            ],
        }
    }
}

impl EnginePoolConfig {
    /// Validates the settings into a pool.
    pub fn build(&self) -> ConfigResult<EnginePool> {
        EnginePool::new(self.engines.clone())
    }
}

/// A validated, immutable set of engines with nominal weights summing to 100.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnginePool {
    engines: Vec<EngineConfig>,
}

impl EnginePool {
    /// Validates and builds a pool.
    ///
    /// Names must be non-empty and unique, weights finite and non-negative,
    /// and the total within 0.01 of 100.
    pub fn new(engines: Vec<EngineConfig>) -> ConfigResult<Self> {
        if engines.is_empty() {
            return Err(ConfigError::EmptyPool);
        }

        let mut seen = BTreeSet::new();
        for engine in &engines {
            if engine.name.trim().is_empty() {
                return Err(ConfigError::EmptyName);
            }
            if !seen.insert(engine.name.as_str()) {
                return Err(ConfigError::DuplicateEngine {
                    name: engine.name.clone(),
                });
            }
            if !engine.weight.is_finite() || engine.weight < 0.0 {
                return Err(ConfigError::InvalidWeight {
                    name: engine.name.clone(),
                    weight: engine.weight,
                });
            }
        }

        let total: f64 = engines.iter().map(|e| e.weight).sum();
        if (total - 100.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(ConfigError::WeightSum { total });
        }

        Ok(Self { engines })
    }

    /// Returns the configured engines in declaration order.
    pub fn engines(&self) -> &[EngineConfig] {
        &self.engines
    }

    /// Returns the nominal weight of an engine.
    pub fn nominal(&self, name: &str) -> Option<f64> {
        self.engines
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.weight)
    }

    /// Returns `true` if the pool has an engine with this name.
    pub fn contains(&self, name: &str) -> bool {
        self.nominal(name).is_some()
    }

    /// Number of engines in the pool.
    pub fn len(&self) -> usize {
        self.engines.len()
    }

    /// Always `false`; a validated pool has at least one engine.
    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }

    /// Computes effective weights for one attempt.
    ///
    /// Unavailable engines drop to 0 and their nominal weight is spread over
    /// the available engines in proportion to their own nominal weight. With
    /// nothing unavailable, or everything unavailable, nominal weights are
    /// returned unchanged.
    pub fn allocate(&self, availability: &Availability) -> Allocation {
        let unavailable: Vec<&EngineConfig> = self
            .engines
            .iter()
            .filter(|e| !availability.is_available(&e.name))
            .collect();

        if unavailable.is_empty() {
            return Allocation::from_configs(&self.engines);
        }

        if unavailable.len() == self.engines.len() {
            tracing::error!(
                engines = self.engines.len(),
                "All engines are unavailable, keeping nominal allocation"
            );
            return Allocation::from_configs(&self.engines);
        }

        let redistribute: f64 = unavailable.iter().map(|e| e.weight).sum();
        let available_total: f64 = self
            .engines
            .iter()
            .filter(|e| availability.is_available(&e.name))
            .map(|e| e.weight)
            .sum();

        let weights = self
            .engines
            .iter()
            .map(|e| {
                let effective = if !availability.is_available(&e.name) {
                    0.0
                } else if available_total > 0.0 {
                    e.weight + redistribute * (e.weight / available_total)
                } else {
                    e.weight
                };
                (e.name.clone(), effective)
            })
            .collect();

        Allocation { weights }
    }
}

/// Attempt-local record of which engines are unavailable.
///
/// Each scan attempt owns its own value, so a failure seen by one user's
/// attempt never changes the weights of another concurrent attempt, and the
/// next attempt starts with every engine available again.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Availability {
    unavailable: BTreeSet<String>,
}

impl Availability {
    /// Every engine available.
    pub fn all_available() -> Self {
        Self::default()
    }

    /// Starts with the given engines marked unavailable.
    pub fn with_unavailable<I, S>(engines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            unavailable: engines.into_iter().map(Into::into).collect(),
        }
    }

    /// Marks an engine unavailable. Returns `true` if it was available before.
    pub fn mark_unavailable(&mut self, engine: impl Into<String>) -> bool {
        self.unavailable.insert(engine.into())
    }

    /// Returns `true` if the engine is available.
    pub fn is_available(&self, engine: &str) -> bool {
        !self.unavailable.contains(engine)
    }

    /// Names of unavailable engines, sorted.
    pub fn unavailable(&self) -> impl Iterator<Item = &str> {
        self.unavailable.iter().map(String::as_str)
    }

    /// Returns `true` if every engine is available.
    pub fn is_clear(&self) -> bool {
        self.unavailable.is_empty()
    }
}

/// Effective weights for one attempt, in pool order.
#[derive(Debug, Clone, PartialEq)]
pub struct Allocation {
    weights: Vec<(String, f64)>,
}

impl Allocation {
    fn from_configs(engines: &[EngineConfig]) -> Self {
        Self {
            weights: engines.iter().map(|e| (e.name.clone(), e.weight)).collect(),
        }
    }

    /// Effective weight of an engine; 0 for engines outside the pool.
    pub fn weight(&self, engine: &str) -> f64 {
        self.weights
            .iter()
            .find(|(name, _)| name == engine)
            .map(|(_, w)| *w)
            .unwrap_or(0.0)
    }

    /// Sum of all effective weights.
    pub fn total(&self) -> f64 {
        self.weights.iter().map(|(_, w)| *w).sum()
    }

    /// Iterates `(engine, weight)` pairs in pool order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.weights.iter().map(|(name, w)| (name.as_str(), *w))
    }

    /// Weights rounded to one decimal, for display.
    pub fn rounded(&self) -> BTreeMap<String, f64> {
        self.weights
            .iter()
            .map(|(name, w)| (name.clone(), (w * 10.0).round() / 10.0))
            .collect()
    }
}

impl Serialize for Allocation {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.weights.len()))?;
        for (name, weight) in &self.weights {
            map.serialize_entry(name, weight)?;
        }
        map.end()
    }
}
