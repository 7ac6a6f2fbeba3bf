//! High-level scan service.
//!
//! [`ScanService`] ties the operation registry, the consensus engine and the
//! activity feed together: it opens an operation per scan, validates the
//! file, fans out to every engine while reporting progress, and retires or
//! cancels the operation at the end.

use crate::activity::{ActivityChannel, NoopActivity};
use crate::allocation::{Availability, ConsensusEngine, ConsensusReport, DispatchObserver};
use crate::core::{
    ConfigError, ConfigResult, EngineError, EngineOutcome, OperationId, OperationKind,
    OperationMetadata, RegistryError, RegistryResult, ScanTarget, UserSession,
};
use crate::registry::{
    IdleReaper, OperationHandle, OperationRegistry, OperationSummary, RegistryConfig,
    StatusSnapshot, StopReport,
};

use serde::Serialize;
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

/// Per-attempt options for a scan.
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// Engines left out of this attempt only.
    pub disabled_engines: BTreeSet<String>,
    /// Metadata recorded on the operation.
    pub metadata: OperationMetadata,
}

impl ScanOptions {
    /// Creates default options: every engine enabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Leaves an engine out of this attempt.
    pub fn disable_engine(mut self, engine: impl Into<String>) -> Self {
        self.disabled_engines.insert(engine.into());
        self
    }

    /// Sets the operation metadata.
    pub fn with_metadata(mut self, metadata: OperationMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// The outcome of a completed scan.
#[derive(Debug, Clone, Serialize)]
pub struct ScanResponse {
    /// Operation the scan ran under.
    pub operation_id: OperationId,
    /// Engine outcomes, weights and verdict.
    pub report: ConsensusReport,
    /// Set when too few engines answered.
    pub coverage_error: Option<&'static str>,
}

/// Builder for creating a `ScanService`.
#[derive(Default)]
pub struct ScanServiceBuilder {
    registry_config: RegistryConfig,
    engine: Option<ConsensusEngine>,
    activity: Option<Arc<dyn ActivityChannel>>,
}

impl ScanServiceBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the registry configuration.
    pub fn with_registry_config(mut self, config: RegistryConfig) -> Self {
        self.registry_config = config;
        self
    }

    /// Sets the consensus engine.
    pub fn with_engine(mut self, engine: ConsensusEngine) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Sets the activity channel.
    pub fn with_activity(mut self, activity: Arc<dyn ActivityChannel>) -> Self {
        self.activity = Some(activity);
        self
    }

    /// Builds the service.
    pub fn build(self) -> ConfigResult<ScanService> {
        let engine = self.engine.ok_or(ConfigError::NoEngines)?;
        let activity = self.activity.unwrap_or_else(|| Arc::new(NoopActivity));
        let registry = OperationRegistry::new(self.registry_config).with_activity(activity);

        Ok(ScanService {
            registry: Arc::new(registry),
            engine: Arc::new(engine),
            reaper: Mutex::new(None),
        })
    }
}

impl std::fmt::Debug for ScanServiceBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanServiceBuilder")
            .field("registry_config", &self.registry_config)
            .field("engine", &self.engine)
            .finish()
    }
}

/// Multi-engine scanning with per-user cancellable operations.
///
/// # Example
///
/// ```rust,ignore
/// use scanquorum::prelude::*;
///
/// let engine = ConsensusEngine::builder()
///     .add_engine(MockAdapter::clean().with_name("bytescale"), 34.0)
///     .add_engine(MockAdapter::clean().with_name("cloudmersive"), 37.0)
///     .add_engine(MockAdapter::clean().with_name("clamav"), 29.0)
///     .build()?;
///
/// let service = ScanService::builder().with_engine(engine).build()?;
/// let user = UserSession::new("session-1")?;
/// let response = service.scan_file(&user, "/tmp/upload.bin".into(), ScanOptions::new()).await?;
/// println!("{}", response.report.verdict.category);
/// ```
#[derive(Debug)]
pub struct ScanService {
    registry: Arc<OperationRegistry>,
    engine: Arc<ConsensusEngine>,
    reaper: Mutex<Option<IdleReaper>>,
}

impl ScanService {
    /// Creates a new builder.
    pub fn builder() -> ScanServiceBuilder {
        ScanServiceBuilder::new()
    }

    /// Returns the operation registry.
    pub fn registry(&self) -> &Arc<OperationRegistry> {
        &self.registry
    }

    /// Returns the consensus engine.
    pub fn engine(&self) -> &Arc<ConsensusEngine> {
        &self.engine
    }

    /// Opens a scan operation without running it.
    ///
    /// Use with [`ScanService::run_scan`] when the caller needs the
    /// operation id before the scan finishes.
    pub fn open_scan(
        &self,
        user: &UserSession,
        target: &ScanTarget,
        mut metadata: OperationMetadata,
    ) -> RegistryResult<OperationHandle> {
        if metadata.filename.is_none() {
            metadata.filename = target.filename().map(str::to_string);
        }
        self.registry.open(user, OperationKind::Scan, metadata)
    }

    /// Opens an operation and runs a full scan under it.
    pub async fn scan_file(
        &self,
        user: &UserSession,
        target: ScanTarget,
        options: ScanOptions,
    ) -> RegistryResult<ScanResponse> {
        let handle = self.open_scan(user, &target, options.metadata.clone())?;
        self.run_scan(&handle, &target, &options).await
    }

    /// Runs a scan under an already open operation.
    ///
    /// The operation is completed on success. On cancellation, oversize or
    /// an unreadable file it is cancelled, which removes its temp file.
    pub async fn run_scan(
        &self,
        handle: &OperationHandle,
        target: &ScanTarget,
        options: &ScanOptions,
    ) -> RegistryResult<ScanResponse> {
        let id = &handle.id;
        let max = self.registry.config().max_file_size;

        self.report(id, "file_validation_start", json!({ "filename": target.filename() }));

        let size = match target.size().await {
            Ok(size) => size,
            Err(e) => {
                self.abandon(id).await;
                return Err(RegistryError::Io(e));
            }
        };
        if size > max {
            tracing::warn!(operation_id = %id, size, max, "File too large");
            self.abandon(id).await;
            return Err(RegistryError::FileTooLarge { size, max });
        }
        self.report(
            id,
            "file_validation_complete",
            json!({ "size": size, "status": "valid" }),
        );

        if handle.is_cancelled() {
            self.abandon(id).await;
            return Err(RegistryError::Cancelled { id: id.to_string() });
        }

        for engine in &options.disabled_engines {
            if !self.engine.pool().contains(engine) {
                tracing::warn!(engine = %engine, "Disabled engine is not in the pool");
            }
        }
        let availability = Availability::with_unavailable(options.disabled_engines.iter().cloned());

        self.report(id, "multi_engine_scan_start", serde_json::Value::Null);
        let observer = RegistryObserver {
            registry: &self.registry,
            id,
        };
        let report = self
            .engine
            .run(target, &handle.token, availability, &observer)
            .await;

        if handle.is_cancelled() {
            self.abandon(id).await;
            tracing::info!(operation_id = %id, "Scan cancelled");
            return Err(RegistryError::Cancelled { id: id.to_string() });
        }

        self.report(
            id,
            "all_scans_complete",
            json!({ "status": report.verdict.category.to_string() }),
        );
        // A concurrent stop may have removed it already.
        if let Err(e) = self.registry.complete(id) {
            tracing::debug!(operation_id = %id, error = %e, "Operation already retired");
        }

        Ok(ScanResponse {
            operation_id: id.clone(),
            coverage_error: report.coverage_error(),
            report,
        })
    }

    /// Stops one operation.
    pub async fn stop(&self, id: &OperationId) -> RegistryResult<OperationSummary> {
        self.registry.cancel(id).await
    }

    /// Stops every operation of one user.
    pub async fn stop_user(&self, user: &UserSession) -> StopReport {
        self.registry.cancel_user(user).await
    }

    /// Stops every operation of every user and starts the cooldown.
    pub async fn stop_all(&self) -> StopReport {
        self.registry.cancel_all().await
    }

    /// Status for one user, or the global view.
    pub fn status(&self, user: Option<&UserSession>) -> StatusSnapshot {
        self.registry.status(user)
    }

    /// Summary of one operation.
    pub fn operation(&self, id: &OperationId) -> Option<OperationSummary> {
        self.registry.get(id)
    }

    /// Records caller-reported progress on an operation.
    pub fn report_activity(
        &self,
        id: &OperationId,
        activity_type: &str,
        data: serde_json::Value,
    ) -> RegistryResult<()> {
        self.registry.touch(id, activity_type, data)
    }

    /// Runs every engine's health check.
    pub async fn health(&self) -> Vec<(String, Result<(), EngineError>)> {
        self.engine.health().await
    }

    /// Starts the idle reaper. Does nothing if it is already running.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn start_reaper(&self) {
        let mut reaper = self.reaper.lock().unwrap_or_else(|p| p.into_inner());
        if reaper.is_none() {
            *reaper = Some(IdleReaper::spawn(self.registry.clone()));
        }
    }

    /// Stops the idle reaper and waits for it to exit.
    pub async fn stop_reaper(&self) {
        let reaper = self.reaper.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(reaper) = reaper {
            reaper.shutdown().await;
        }
    }

    fn report(&self, id: &OperationId, activity_type: &str, data: serde_json::Value) {
        if let Err(e) = self.registry.touch(id, activity_type, data) {
            tracing::debug!(operation_id = %id, activity_type, error = %e, "Activity dropped");
        }
    }

    async fn abandon(&self, id: &OperationId) {
        match self.registry.cancel(id).await {
            Ok(_) | Err(RegistryError::NotFound { .. }) => {}
            Err(e) => tracing::warn!(operation_id = %id, error = %e, "Failed to cancel operation"),
        }
    }
}

/// Reports per-engine progress as activity on the owning operation.
struct RegistryObserver<'a> {
    registry: &'a OperationRegistry,
    id: &'a OperationId,
}

impl RegistryObserver<'_> {
    fn report(&self, activity_type: &str, data: serde_json::Value) {
        if let Err(e) = self.registry.touch(self.id, activity_type, data) {
            tracing::debug!(operation_id = %self.id, activity_type, error = %e, "Activity dropped");
        }
    }
}

impl DispatchObserver for RegistryObserver<'_> {
    fn engine_started(&self, engine: &str) {
        self.report(
            &format!("{engine}_scan_start"),
            json!({ "engine": engine, "status": "starting" }),
        );
    }

    fn engine_finished(&self, outcome: &EngineOutcome) {
        self.report(
            &format!("{}_scan_complete", outcome.engine),
            json!({
                "engine": outcome.engine,
                "result": outcome.kind.to_string(),
                "status": "completed",
            }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::{ActivityEvent, BroadcastActivity};
    use crate::adapters::MockAdapter;
    use crate::allocation::VerdictCategory;
    use crate::core::OutcomeKind;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    fn engine() -> ConsensusEngine {
        ConsensusEngine::builder()
            .add_engine(MockAdapter::clean().with_name("bytescale"), 34.0)
            .add_engine(MockAdapter::clean().with_name("cloudmersive"), 37.0)
            .add_engine(MockAdapter::clean().with_name("clamav"), 29.0)
            .build()
            .unwrap()
    }

    fn upload() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"harmless test content").unwrap();
        file
    }

    #[tokio::test]
    async fn test_scan_file_completes_operation() {
        let service = ScanService::builder().with_engine(engine()).build().unwrap();
        let user = UserSession::new("alice").unwrap();
        let file = upload();

        let response = service
            .scan_file(&user, ScanTarget::from_path(file.path()), ScanOptions::new())
            .await
            .unwrap();

        assert_eq!(response.report.verdict.category, VerdictCategory::Safe);
        assert!(response.coverage_error.is_none());
        assert!(service.operation(&response.operation_id).is_none());
        assert!(service.status(Some(&user)).operations.is_empty());
        assert!(file.path().exists());
    }

    #[tokio::test]
    async fn test_scan_emits_progress_activities() {
        let activity = Arc::new(BroadcastActivity::new());
        let service = ScanService::builder()
            .with_engine(engine())
            .with_activity(activity.clone())
            .build()
            .unwrap();
        let user = UserSession::new("alice").unwrap();
        let mut rx = activity.subscribe(&user);
        let file = upload();

        service
            .scan_file(&user, ScanTarget::from_path(file.path()), ScanOptions::new())
            .await
            .unwrap();

        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let ActivityEvent::Activity { activity_type, .. } = event {
                kinds.push(activity_type);
            }
        }

        assert_eq!(kinds.first().map(String::as_str), Some("file_validation_start"));
        assert_eq!(kinds.last().map(String::as_str), Some("all_scans_complete"));
        for expected in [
            "file_validation_complete",
            "multi_engine_scan_start",
            "clamav_scan_start",
            "clamav_scan_complete",
            "bytescale_scan_complete",
        ] {
            assert!(kinds.iter().any(|k| k == expected), "missing {expected}");
        }
    }

    #[tokio::test]
    async fn test_disabled_engine_is_skipped_for_one_attempt() {
        let service = ScanService::builder().with_engine(engine()).build().unwrap();
        let user = UserSession::new("alice").unwrap();
        let file = upload();

        let response = service
            .scan_file(
                &user,
                ScanTarget::from_path(file.path()),
                ScanOptions::new().disable_engine("bytescale"),
            )
            .await
            .unwrap();
        let bytescale = response.report.outcome("bytescale").unwrap();
        assert_eq!(bytescale.kind, OutcomeKind::Skipped);
        assert_eq!(response.report.allocation.weight("bytescale"), 0.0);

        let response = service
            .scan_file(&user, ScanTarget::from_path(file.path()), ScanOptions::new())
            .await
            .unwrap();
        assert_eq!(
            response.report.outcome("bytescale").unwrap().kind,
            OutcomeKind::Clean
        );
    }

    #[tokio::test]
    async fn test_oversized_file_is_refused_and_cleaned_up() {
        let service = ScanService::builder()
            .with_engine(engine())
            .with_registry_config(RegistryConfig::new().with_max_file_size(4))
            .build()
            .unwrap();
        let user = UserSession::new("alice").unwrap();
        let file = upload().into_temp_path();

        let result = service
            .scan_file(
                &user,
                ScanTarget::from_path(file.to_path_buf()),
                ScanOptions::new()
                    .with_metadata(OperationMetadata::new().with_temp_path(file.to_path_buf())),
            )
            .await;

        assert!(matches!(result, Err(RegistryError::FileTooLarge { max: 4, .. })));
        assert!(!file.exists());
        assert!(service.registry().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_scan_returns_cancelled() {
        let engine = ConsensusEngine::builder()
            .add_engine(
                MockAdapter::clean()
                    .with_name("slow")
                    .with_latency(Duration::from_secs(600)),
                100.0,
            )
            .build()
            .unwrap();
        let service = Arc::new(ScanService::builder().with_engine(engine).build().unwrap());
        let user = UserSession::new("alice").unwrap();
        let file = upload();
        let target = ScanTarget::from_path(file.path());

        let handle = service
            .open_scan(&user, &target, OperationMetadata::new())
            .unwrap();
        let runner = {
            let service = service.clone();
            let handle = handle.clone();
            tokio::spawn(async move {
                service
                    .run_scan(&handle, &target, &ScanOptions::new())
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        service.stop(&handle.id).await.unwrap();

        let result = runner.await.unwrap();
        assert!(matches!(result, Err(RegistryError::Cancelled { .. })));
        assert!(service.registry().is_empty());
    }

    #[tokio::test]
    async fn test_token_cancelled_before_dispatch_retires_operation() {
        let scanner = Arc::new(MockAdapter::clean().with_name("clamav"));
        let engine = ConsensusEngine::builder()
            .add_arc_engine(scanner.clone(), 100.0)
            .build()
            .unwrap();
        let service = ScanService::builder().with_engine(engine).build().unwrap();
        let user = UserSession::new("alice").unwrap();
        let file = upload().into_temp_path();
        let target = ScanTarget::from_path(file.to_path_buf());

        let handle = service
            .open_scan(
                &user,
                &target,
                OperationMetadata::new().with_temp_path(file.to_path_buf()),
            )
            .unwrap();
        handle.token.cancel();

        let result = service.run_scan(&handle, &target, &ScanOptions::new()).await;

        assert!(matches!(result, Err(RegistryError::Cancelled { .. })));
        assert!(service.operation(&handle.id).is_none());
        assert!(!file.exists());
        assert_eq!(scanner.scan_count(), 0);
    }

    #[tokio::test]
    async fn test_observer_tolerates_retired_operation() {
        let registry = OperationRegistry::default();
        let user = UserSession::new("alice").unwrap();
        let handle = registry
            .open(&user, OperationKind::Scan, OperationMetadata::new())
            .unwrap();
        registry.complete(&handle.id).unwrap();

        let observer = RegistryObserver {
            registry: &registry,
            id: &handle.id,
        };
        observer.engine_started("clamav");
        observer.engine_finished(&EngineOutcome::clean("clamav"));

        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_builder_requires_engine() {
        assert!(matches!(
            ScanService::builder().build(),
            Err(ConfigError::NoEngines)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaper_lifecycle() {
        let service = ScanService::builder().with_engine(engine()).build().unwrap();
        service.start_reaper();
        service.start_reaper();
        service.stop_reaper().await;
        service.stop_reaper().await;
    }
}
