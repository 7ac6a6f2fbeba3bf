//! Core types used throughout the scanquorum library.
//!
//! This module defines engine outcomes, the identifiers that scope
//! operations to users, and the metadata carried by each operation.

use crate::core::error::RegistryError;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

/// The categorical result one engine produced for one scan attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    /// The engine found nothing.
    Clean,
    /// The engine reported a detection.
    Infected,
    /// The engine failed or answered ambiguously.
    Unknown,
    /// The engine was not invoked because its effective weight was zero.
    Skipped,
    /// The attempt was cancelled while this engine was pending.
    Cancelled,
    /// The engine exhausted its own retry or time budget.
    TimedOut,
    /// The engine refused the file (type, content or size).
    Rejected,
}

impl OutcomeKind {
    /// Maps the outcome to its verdict score: `Clean` is 1, `Infected` is 0,
    /// everything else carries no score.
    pub fn score(&self) -> Option<f64> {
        match self {
            Self::Clean => Some(1.0),
            Self::Infected => Some(0.0),
            _ => None,
        }
    }

    /// Returns `true` for outcomes that resolved to `Clean` or `Infected`.
    pub fn is_valid(&self) -> bool {
        self.score().is_some()
    }

    /// Returns `true` for outcomes that mark the engine unavailable for the
    /// rest of the attempt.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Unknown | Self::TimedOut | Self::Rejected)
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Clean => "clean",
            Self::Infected => "infected",
            Self::Unknown => "unknown",
            Self::Skipped => "skipped",
            Self::Cancelled => "cancelled",
            Self::TimedOut => "timed_out",
            Self::Rejected => "rejected",
        };
        f.write_str(label)
    }
}

/// One engine's outcome for one scan attempt. Never mutated once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineOutcome {
    /// Engine that produced the outcome.
    pub engine: String,
    /// Outcome category.
    pub kind: OutcomeKind,
    /// Why the engine did not produce a clean verdict; empty on success.
    pub failure_reason: String,
}

impl EngineOutcome {
    /// Creates an outcome with an explicit reason.
    pub fn new(engine: impl Into<String>, kind: OutcomeKind, reason: impl Into<String>) -> Self {
        Self {
            engine: engine.into(),
            kind,
            failure_reason: reason.into(),
        }
    }

    /// A clean outcome.
    pub fn clean(engine: impl Into<String>) -> Self {
        Self::new(engine, OutcomeKind::Clean, "")
    }

    /// An infected outcome.
    pub fn infected(engine: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(engine, OutcomeKind::Infected, reason)
    }

    /// An unknown outcome.
    pub fn unknown(engine: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(engine, OutcomeKind::Unknown, reason)
    }

    /// A skipped outcome.
    pub fn skipped(engine: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(engine, OutcomeKind::Skipped, reason)
    }

    /// A cancelled outcome.
    pub fn cancelled(engine: impl Into<String>) -> Self {
        Self::new(engine, OutcomeKind::Cancelled, "scan was cancelled by user")
    }

    /// A timed-out outcome.
    pub fn timed_out(engine: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(engine, OutcomeKind::TimedOut, reason)
    }

    /// A rejected outcome.
    pub fn rejected(engine: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(engine, OutcomeKind::Rejected, reason)
    }

    /// Returns the verdict score of this outcome.
    pub fn score(&self) -> Option<f64> {
        self.kind.score()
    }
}

/// Opaque caller-supplied identity that scopes visibility and cancellation.
///
/// The library does not authenticate it; it only guarantees that operations
/// of one session are never touched through another.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserSession(String);

impl UserSession {
    /// Wraps a session id, rejecting blank ids.
    pub fn new(id: impl Into<String>) -> Result<Self, RegistryError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(RegistryError::MissingSession);
        }
        Ok(Self(id))
    }

    /// Returns the raw session id.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns a short prefix suitable for log lines.
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(8) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl fmt::Display for UserSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The kind of work an operation tracks. Each kind has its own idle limit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// A multi-engine file scan.
    #[default]
    Scan,
    /// A chat exchange that may lead to a scan.
    Chat,
    /// A download feeding a later scan.
    Download,
}

impl OperationKind {
    /// Prefix used in generated operation ids.
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Scan => "scan",
            Self::Chat => "chat",
            Self::Download => "download",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Opaque unique identifier of an operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(String);

impl OperationId {
    /// Generates a fresh id for an operation of the given kind.
    pub fn generate(kind: OperationKind) -> Self {
        Self(format!("{}_{}", kind.prefix(), Uuid::new_v4().simple()))
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OperationId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for OperationId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Lifecycle status of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    /// The operation is in flight.
    Running,
    /// The operation was cancelled by a caller, a bulk stop, or the reaper.
    Cancelled,
    /// The operation finished and was retired by its caller.
    Completed,
}

/// Metadata attached to an operation when it is opened.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationMetadata {
    /// Original filename, if known.
    pub filename: Option<String>,

    /// Temporary file removed when the operation is cancelled.
    pub temp_path: Option<PathBuf>,

    /// Additional custom metadata as key-value pairs.
    #[serde(default)]
    pub extra: HashMap<String, String>,
}

impl OperationMetadata {
    /// Creates empty metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the original filename.
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Sets the temp file path.
    pub fn with_temp_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.temp_path = Some(path.into());
        self
    }

    /// Adds a custom metadata entry.
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}
