//! The operation registry.

use crate::activity::{sanitize, ActivityChannel, ActivityEvent, NoopActivity};
use crate::core::{
    OperationId, OperationKind, OperationMetadata, OperationStatus, RegistryError, RegistryResult,
    UserSession,
};
use crate::registry::config::RegistryConfig;
use crate::registry::operation::{
    CancelReason, OperationHandle, OperationSummary, ScanOperation, StatusSnapshot, StopReport,
};

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::time::Instant;

/// The authoritative store plus its derived per-user index.
///
/// Only `insert` and `remove` touch both maps, so they cannot drift.
#[derive(Debug, Default)]
struct RegistryState {
    operations: HashMap<OperationId, ScanOperation>,
    by_user: HashMap<UserSession, HashSet<OperationId>>,
    stopping_until: Option<Instant>,
}

impl RegistryState {
    fn insert(&mut self, operation: ScanOperation) {
        self.by_user
            .entry(operation.user.clone())
            .or_default()
            .insert(operation.id.clone());
        self.operations.insert(operation.id.clone(), operation);
    }

    fn remove(&mut self, id: &OperationId) -> Option<ScanOperation> {
        let operation = self.operations.remove(id)?;
        if let Some(ids) = self.by_user.get_mut(&operation.user) {
            ids.remove(id);
            if ids.is_empty() {
                self.by_user.remove(&operation.user);
            }
        }
        Some(operation)
    }

    fn ids_for(&self, user: &UserSession) -> Vec<OperationId> {
        self.by_user
            .get(user)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Remaining cooldown, clearing the flag once it has passed.
    fn stopping_for(&mut self, now: Instant) -> Option<std::time::Duration> {
        match self.stopping_until {
            Some(until) if until > now => Some(until - now),
            Some(_) => {
                self.stopping_until = None;
                tracing::info!("Global stop cooldown elapsed, accepting new operations");
                None
            }
            None => None,
        }
    }
}

/// Tracks every in-flight operation and its owner.
///
/// All state sits behind one lock that is never held across an await.
/// Cancellation paths remove the operation first and clean up afterwards,
/// so a second cancel of the same id always finds nothing.
pub struct OperationRegistry {
    config: RegistryConfig,
    state: Mutex<RegistryState>,
    activity: Arc<dyn ActivityChannel>,
}

impl std::fmt::Debug for OperationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationRegistry")
            .field("config", &self.config)
            .field("operation_count", &self.len())
            .field("activity", &self.activity)
            .finish()
    }
}

impl Default for OperationRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

impl OperationRegistry {
    /// Creates a registry that drops activity events.
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            state: Mutex::new(RegistryState::default()),
            activity: Arc::new(NoopActivity),
        }
    }

    /// Sets the activity channel events are pushed to.
    pub fn with_activity(mut self, activity: Arc<dyn ActivityChannel>) -> Self {
        self.activity = activity;
        self
    }

    /// Returns the configuration.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    fn state(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Registers a new operation for `user`.
    ///
    /// Fails with [`RegistryError::SystemStopping`] while a global-stop
    /// cooldown is in force.
    pub fn open(
        &self,
        user: &UserSession,
        kind: OperationKind,
        metadata: OperationMetadata,
    ) -> RegistryResult<OperationHandle> {
        let operation = ScanOperation::new(user.clone(), kind, metadata);
        let handle = operation.handle();

        {
            let mut state = self.state();
            if let Some(retry_after) = state.stopping_for(Instant::now()) {
                tracing::warn!(
                    user = %user.short(),
                    ?retry_after,
                    "Operation refused during global stop"
                );
                return Err(RegistryError::SystemStopping { retry_after });
            }
            crate::audit::emit_operation_opened(&handle);
            state.insert(operation);
        }

        Ok(handle)
    }

    /// Refreshes an operation's activity time and forwards an event to its
    /// owner. The payload is sanitized first.
    pub fn touch(
        &self,
        id: &OperationId,
        activity_type: &str,
        data: serde_json::Value,
    ) -> RegistryResult<()> {
        let user = {
            let mut state = self.state();
            let operation = state
                .operations
                .get_mut(id)
                .ok_or_else(|| RegistryError::NotFound { id: id.to_string() })?;
            operation.last_activity = Instant::now();
            operation.user.clone()
        };

        let delivered = self.activity.push(
            &user,
            ActivityEvent::activity(id.clone(), activity_type, sanitize(data)),
        );
        tracing::trace!(operation_id = %id, activity_type, delivered, "Activity reported");
        Ok(())
    }

    /// Cancels one operation. A second call for the same id returns
    /// [`RegistryError::NotFound`].
    pub async fn cancel(&self, id: &OperationId) -> RegistryResult<OperationSummary> {
        let operation = self
            .state()
            .remove(id)
            .ok_or_else(|| RegistryError::NotFound { id: id.to_string() })?;
        Ok(self.finish_cancel(operation, CancelReason::Requested).await)
    }

    /// Cancels every operation of one user, leaving all others untouched.
    pub async fn cancel_user(&self, user: &UserSession) -> StopReport {
        let operations: Vec<ScanOperation> = {
            let mut state = self.state();
            let ids = state.ids_for(user);
            let removed: Vec<ScanOperation> =
                ids.iter().filter_map(|id| state.remove(id)).collect();
            removed
        };

        let ids = self.finish_all(operations, CancelReason::UserStop).await;
        tracing::info!(user = %user.short(), count = ids.len(), "Stopped all operations for user");
        StopReport::from_ids(ids)
    }

    /// Cancels every operation and refuses new ones for the configured
    /// cooldown.
    pub async fn cancel_all(&self) -> StopReport {
        let operations: Vec<ScanOperation> = {
            let mut state = self.state();
            state.stopping_until = Some(Instant::now() + self.config.global_stop_cooldown);
            state.by_user.clear();
            state.operations.drain().map(|(_, op)| op).collect()
        };

        let ids = self.finish_all(operations, CancelReason::GlobalStop).await;
        let report = StopReport::from_ids(ids);
        crate::audit::emit_global_stop(&report, self.config.global_stop_cooldown);
        report
    }

    /// Retires a finished operation. Its temp file is left in place.
    pub fn complete(&self, id: &OperationId) -> RegistryResult<OperationSummary> {
        let mut operation = self
            .state()
            .remove(id)
            .ok_or_else(|| RegistryError::NotFound { id: id.to_string() })?;
        operation.status = OperationStatus::Completed;

        let summary = operation.summary(Instant::now());
        crate::audit::emit_operation_completed(&summary);
        Ok(summary)
    }

    /// Cancels every operation idle longer than its kind's limit.
    pub async fn sweep(&self) -> Vec<OperationId> {
        let now = Instant::now();
        let expired: Vec<ScanOperation> = {
            let mut state = self.state();
            let ids: Vec<OperationId> = state
                .operations
                .values()
                .filter(|op| op.idle_for(now) > self.config.idle_timeout(op.kind))
                .map(|op| op.id.clone())
                .collect();
            let removed: Vec<ScanOperation> =
                ids.iter().filter_map(|id| state.remove(id)).collect();
            removed
        };

        if expired.is_empty() {
            return Vec::new();
        }
        self.finish_all(expired, CancelReason::Idle).await
    }

    /// Summaries of open operations, for one user or for everyone.
    pub fn list(&self, user: Option<&UserSession>) -> Vec<OperationSummary> {
        let now = Instant::now();
        let state = self.state();
        let mut summaries: Vec<OperationSummary> = match user {
            Some(user) => state
                .by_user
                .get(user)
                .into_iter()
                .flatten()
                .filter_map(|id| state.operations.get(id))
                .map(|op| op.summary(now))
                .collect(),
            None => state.operations.values().map(|op| op.summary(now)).collect(),
        };
        summaries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        summaries
    }

    /// Summary of one operation.
    pub fn get(&self, id: &OperationId) -> Option<OperationSummary> {
        self.state()
            .operations
            .get(id)
            .map(|op| op.summary(Instant::now()))
    }

    /// Status for one user, or the global view with the user count.
    pub fn status(&self, user: Option<&UserSession>) -> StatusSnapshot {
        let operations = self.list(user);
        let mut state = self.state();
        let global_stop = state.stopping_for(Instant::now()).is_some();
        let user_count = match user {
            Some(_) => None,
            None => Some(state.by_user.len()),
        };
        StatusSnapshot {
            operations,
            global_stop,
            user_count,
        }
    }

    /// Returns `true` while new operations are refused.
    pub fn is_global_stop(&self) -> bool {
        self.state().stopping_for(Instant::now()).is_some()
    }

    /// Returns `true` if the operation is open.
    pub fn contains(&self, id: &OperationId) -> bool {
        self.state().operations.contains_key(id)
    }

    /// Returns `true` if the user has an index entry.
    pub fn has_user(&self, user: &UserSession) -> bool {
        self.state().by_user.contains_key(user)
    }

    /// Number of open operations.
    pub fn len(&self) -> usize {
        self.state().operations.len()
    }

    /// Returns `true` if nothing is open.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of users with open operations.
    pub fn user_count(&self) -> usize {
        self.state().by_user.len()
    }

    /// Pushes an event to a user without touching any operation.
    pub(crate) fn notify(&self, user: &UserSession, event: ActivityEvent) -> bool {
        self.activity.push(user, event)
    }

    async fn finish_all(
        &self,
        operations: Vec<ScanOperation>,
        reason: CancelReason,
    ) -> Vec<OperationId> {
        let mut ids = Vec::with_capacity(operations.len());
        for operation in operations {
            ids.push(self.finish_cancel(operation, reason).await.id);
        }
        ids
    }

    /// Signals, cleans up and reports an operation already removed from
    /// the store.
    async fn finish_cancel(
        &self,
        mut operation: ScanOperation,
        reason: CancelReason,
    ) -> OperationSummary {
        operation.token.cancel();
        operation.status = OperationStatus::Cancelled;

        if let Some(path) = &operation.metadata.temp_path {
            match tokio::fs::remove_file(path).await {
                Ok(()) => tracing::debug!(path = %path.display(), "Temp file removed"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to remove temp file")
                }
            }
        }

        let summary = operation.summary(Instant::now());
        crate::audit::emit_operation_cancelled(&summary, reason);

        self.activity.push(
            &operation.user,
            ActivityEvent::activity(
                operation.id.clone(),
                format!("{}_cancelled", operation.kind),
                serde_json::json!({ "status": reason.to_string() }),
            ),
        );
        summary
    }
}
