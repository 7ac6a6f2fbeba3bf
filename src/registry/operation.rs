//! Tracked operations and the summaries handed to callers.

use crate::core::serde_util::duration_ms;
use crate::core::{OperationId, OperationKind, OperationMetadata, OperationStatus, UserSession};

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// One tracked, cancellable unit of work bound to a user session.
///
/// Owned by the registry; callers only ever see the [`OperationHandle`]
/// and [`OperationSummary`] views.
#[derive(Debug)]
pub(crate) struct ScanOperation {
    pub(crate) id: OperationId,
    pub(crate) user: UserSession,
    pub(crate) kind: OperationKind,
    pub(crate) status: OperationStatus,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) started: Instant,
    pub(crate) last_activity: Instant,
    pub(crate) token: CancellationToken,
    pub(crate) metadata: OperationMetadata,
}

impl ScanOperation {
    pub(crate) fn new(user: UserSession, kind: OperationKind, metadata: OperationMetadata) -> Self {
        let now = Instant::now();
        Self {
            id: OperationId::generate(kind),
            user,
            kind,
            status: OperationStatus::Running,
            created_at: Utc::now(),
            started: now,
            last_activity: now,
            token: CancellationToken::new(),
            metadata,
        }
    }

    pub(crate) fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity)
    }

    pub(crate) fn handle(&self) -> OperationHandle {
        OperationHandle {
            id: self.id.clone(),
            user: self.user.clone(),
            kind: self.kind,
            token: self.token.clone(),
        }
    }

    pub(crate) fn summary(&self, now: Instant) -> OperationSummary {
        OperationSummary {
            id: self.id.clone(),
            user: self.user.clone(),
            kind: self.kind,
            status: self.status,
            created_at: self.created_at,
            duration: now.saturating_duration_since(self.started),
            idle: self.idle_for(now),
            metadata: self.metadata.clone(),
        }
    }
}

/// What the caller gets back from `open`.
#[derive(Debug, Clone)]
pub struct OperationHandle {
    /// Operation id.
    pub id: OperationId,
    /// Owning user.
    pub user: UserSession,
    /// Operation kind.
    pub kind: OperationKind,
    /// Cancellation token shared with the engines.
    pub token: CancellationToken,
}

impl OperationHandle {
    /// Returns `true` once the operation has been cancelled by any path.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// A read-only view of an operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationSummary {
    /// Operation id.
    pub id: OperationId,
    /// Owning user.
    pub user: UserSession,
    /// Operation kind.
    pub kind: OperationKind,
    /// Lifecycle status.
    pub status: OperationStatus,
    /// When the operation was opened.
    pub created_at: DateTime<Utc>,
    /// Time since the operation was opened.
    #[serde(with = "duration_ms")]
    pub duration: Duration,
    /// Time since the last activity.
    #[serde(with = "duration_ms")]
    pub idle: Duration,
    /// Metadata given at open.
    pub metadata: OperationMetadata,
}

/// Result of a bulk stop.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StopReport {
    /// Number of operations stopped.
    pub count: usize,
    /// Ids of the operations stopped.
    pub ids: Vec<OperationId>,
}

impl StopReport {
    pub(crate) fn from_ids(ids: Vec<OperationId>) -> Self {
        Self {
            count: ids.len(),
            ids,
        }
    }
}

/// Registry status as seen by one caller.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    /// Open operations in scope.
    pub operations: Vec<OperationSummary>,
    /// Whether new operations are currently refused.
    pub global_stop: bool,
    /// Users with open operations; only reported for the global view.
    pub user_count: Option<usize>,
}

/// Why an operation was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// A caller stopped this operation.
    Requested,
    /// The owning user stopped all of their operations.
    UserStop,
    /// Every operation was stopped.
    GlobalStop,
    /// The idle reaper found it abandoned.
    Idle,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Requested => "requested",
            Self::UserStop => "user_stop",
            Self::GlobalStop => "global_stop",
            Self::Idle => "idle",
        };
        f.write_str(label)
    }
}
