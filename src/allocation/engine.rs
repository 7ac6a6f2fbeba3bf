//! The consensus engine: concurrent fan-out to adapters and verdict.

use crate::allocation::report::ConsensusReport;
use crate::allocation::verdict::Verdict;
use crate::allocation::weights::{Availability, EngineConfig, EnginePool, EnginePoolConfig};
use crate::core::{
    ArcAdapter, ConfigError, ConfigResult, EngineAdapter, EngineError, EngineOutcome, ScanTarget,
};

use chrono::Utc;
use futures::future::join_all;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Receives per-engine progress during a fan-out.
pub trait DispatchObserver: Send + Sync {
    /// Called just before an adapter is invoked.
    fn engine_started(&self, _engine: &str) {}

    /// Called once an engine's outcome is settled.
    fn engine_finished(&self, _outcome: &EngineOutcome) {}
}

/// Observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl DispatchObserver for NoopObserver {}

/// Builder for creating a `ConsensusEngine`.
#[derive(Default)]
pub struct ConsensusEngineBuilder {
    engines: Vec<(ArcAdapter, f64)>,
}

impl ConsensusEngineBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an adapter with its nominal weight in percent.
    pub fn add_engine<A: EngineAdapter + 'static>(mut self, adapter: A, weight: f64) -> Self {
        self.engines.push((Arc::new(adapter), weight));
        self
    }

    /// Adds an adapter already wrapped in an `Arc`.
    pub fn add_arc_engine(mut self, adapter: ArcAdapter, weight: f64) -> Self {
        self.engines.push((adapter, weight));
        self
    }

    /// Validates the pool and builds the engine.
    pub fn build(self) -> ConfigResult<ConsensusEngine> {
        if self.engines.is_empty() {
            return Err(ConfigError::EmptyPool);
        }

        let configs = self
            .engines
            .iter()
            .map(|(adapter, weight)| EngineConfig::new(adapter.name(), *weight))
            .collect();
        let pool = EnginePool::new(configs)?;
        let adapters = self.engines.into_iter().map(|(adapter, _)| adapter).collect();

        Ok(ConsensusEngine { pool, adapters })
    }
}

impl std::fmt::Debug for ConsensusEngineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsensusEngineBuilder")
            .field("engine_count", &self.engines.len())
            .finish()
    }
}

/// Owns the engine pool and turns one file into one verdict.
///
/// The engine holds no mutable state. Availability lives in the
/// [`Availability`] value each attempt owns, so concurrent attempts from
/// different users never see each other's failures.
pub struct ConsensusEngine {
    pool: EnginePool,
    adapters: Vec<ArcAdapter>,
}

impl ConsensusEngine {
    /// Creates a new builder.
    pub fn builder() -> ConsensusEngineBuilder {
        ConsensusEngineBuilder::new()
    }

    /// Builds an engine from pool settings, matching adapters by name.
    ///
    /// Adapters with no configured weight are ignored.
    pub fn from_config(
        config: &EnginePoolConfig,
        adapters: Vec<ArcAdapter>,
    ) -> ConfigResult<Self> {
        let pool = config.build()?;
        let mut ordered = Vec::with_capacity(pool.len());
        for engine in pool.engines() {
            let adapter = adapters
                .iter()
                .find(|a| a.name() == engine.name)
                .cloned()
                .ok_or_else(|| ConfigError::MissingAdapter {
                    name: engine.name.clone(),
                })?;
            ordered.push(adapter);
        }
        for adapter in &adapters {
            if !pool.contains(adapter.name()) {
                tracing::warn!(
                    engine = adapter.name(),
                    "Adapter has no configured weight, ignoring"
                );
            }
        }

        Ok(Self {
            pool,
            adapters: ordered,
        })
    }

    /// Returns the validated engine pool.
    pub fn pool(&self) -> &EnginePool {
        &self.pool
    }

    /// Returns the registered adapters in pool order.
    pub fn adapters(&self) -> &[ArcAdapter] {
        &self.adapters
    }

    /// Runs one scan attempt.
    ///
    /// Engines already unavailable in `availability` contribute `Skipped`
    /// without being invoked; the rest run concurrently with `cancel`. The
    /// call waits for every engine to settle, marks the ones that failed as
    /// unavailable, reallocates, and computes the verdict. It never fails:
    /// adapter errors and panics become `Unknown` outcomes.
    pub async fn run(
        &self,
        target: &ScanTarget,
        cancel: &CancellationToken,
        mut availability: Availability,
        observer: &dyn DispatchObserver,
    ) -> ConsensusReport {
        let started_at = Utc::now();
        let start = std::time::Instant::now();

        let dispatch_allocation = self.pool.allocate(&availability);
        tracing::info!(
            filename = ?target.filename(),
            allocation = ?dispatch_allocation.rounded(),
            "Dispatching engines"
        );

        let tasks = self.adapters.iter().map(|adapter| {
            let weight = dispatch_allocation.weight(adapter.name());
            async move {
                let outcome = if weight > 0.0 {
                    observer.engine_started(adapter.name());
                    dispatch_one(adapter, target, cancel).await
                } else {
                    EngineOutcome::skipped(adapter.name(), "engine inactive for this attempt")
                };
                observer.engine_finished(&outcome);
                outcome
            }
        });

        let outcomes = join_all(tasks).await;

        for outcome in &outcomes {
            if outcome.kind.is_failure() && availability.mark_unavailable(outcome.engine.clone()) {
                tracing::warn!(
                    engine = %outcome.engine,
                    outcome = %outcome.kind,
                    reason = %outcome.failure_reason,
                    "Engine marked unavailable for this attempt"
                );
            }
        }

        let allocation = self.pool.allocate(&availability);
        let verdict = Verdict::compute(&outcomes, &allocation);

        let report = ConsensusReport {
            id: Uuid::new_v4().to_string(),
            outcomes,
            allocation,
            unavailable: availability.unavailable().map(str::to_string).collect(),
            verdict,
            started_at,
            completed_at: Utc::now(),
            duration: start.elapsed(),
        };

        crate::audit::emit_verdict(&report);
        report
    }

    /// Runs every adapter's health check concurrently.
    pub async fn health(&self) -> Vec<(String, Result<(), EngineError>)> {
        let checks = self.adapters.iter().map(|adapter| async move {
            (adapter.name().to_string(), adapter.health_check().await)
        });
        join_all(checks).await
    }
}

impl std::fmt::Debug for ConsensusEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsensusEngine")
            .field("pool", &self.pool)
            .finish()
    }
}

/// Invokes one adapter, converting every way it can go wrong into an outcome.
async fn dispatch_one(
    adapter: &ArcAdapter,
    target: &ScanTarget,
    cancel: &CancellationToken,
) -> EngineOutcome {
    let engine = adapter.name();

    if cancel.is_cancelled() {
        return EngineOutcome::cancelled(engine);
    }

    let call = AssertUnwindSafe(adapter.scan(target, cancel)).catch_unwind();

    // Dropping the adapter future on cancel aborts requests and kills
    // processes spawned with kill_on_drop.
    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            tracing::info!(engine, "Engine call aborted by cancellation");
            return EngineOutcome::cancelled(engine);
        }
        result = call => result,
    };

    match result {
        Ok(_) if cancel.is_cancelled() => EngineOutcome::cancelled(engine),
        Ok(Ok(mut outcome)) => {
            outcome.engine = engine.to_string();
            outcome
        }
        Ok(Err(EngineError::Cancelled)) => EngineOutcome::cancelled(engine),
        Ok(Err(e)) => {
            tracing::warn!(engine, error = %e, "Engine failed, continuing with others");
            EngineOutcome::unknown(engine, format!("engine error: {e}"))
        }
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!(engine, panic = %message, "Engine adapter panicked");
            EngineOutcome::unknown(engine, format!("engine panicked: {message}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MockAdapter;
    use crate::allocation::verdict::VerdictCategory;
    use crate::core::OutcomeKind;
    use std::sync::Mutex;
    use std::time::Duration;

    fn target() -> ScanTarget {
        ScanTarget::from_path("/tmp/scanquorum-test.bin")
    }

    fn three_engines(
        bytescale: MockAdapter,
        cloudmersive: MockAdapter,
        clamav: MockAdapter,
    ) -> ConsensusEngine {
        ConsensusEngine::builder()
            .add_engine(bytescale.with_name("bytescale"), 34.0)
            .add_engine(cloudmersive.with_name("cloudmersive"), 37.0)
            .add_engine(clamav.with_name("clamav"), 29.0)
            .build()
            .unwrap()
    }

    #[derive(Default)]
    struct Recorder {
        started: Mutex<Vec<String>>,
        finished: Mutex<Vec<EngineOutcome>>,
    }

    impl DispatchObserver for Recorder {
        fn engine_started(&self, engine: &str) {
            self.started.lock().unwrap().push(engine.to_string());
        }

        fn engine_finished(&self, outcome: &EngineOutcome) {
            self.finished.lock().unwrap().push(outcome.clone());
        }
    }

    #[tokio::test]
    async fn test_all_clean_is_safe() {
        let engine = three_engines(
            MockAdapter::clean(),
            MockAdapter::clean(),
            MockAdapter::clean(),
        );
        let report = engine
            .run(
                &target(),
                &CancellationToken::new(),
                Availability::all_available(),
                &NoopObserver,
            )
            .await;

        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(report.verdict.category, VerdictCategory::Safe);
        assert_eq!(report.verdict.weighted_score, 100.0);
        assert!(report.unavailable.is_empty());
        assert!(report.coverage_sufficient());
    }

    #[tokio::test]
    async fn test_failing_engine_becomes_unknown_and_reallocates() {
        let clamav = MockAdapter::clean().with_error("clamscan not installed");
        let engine = three_engines(MockAdapter::clean(), MockAdapter::clean(), clamav);

        let report = engine
            .run(
                &target(),
                &CancellationToken::new(),
                Availability::all_available(),
                &NoopObserver,
            )
            .await;

        let clamav = report.outcome("clamav").unwrap();
        assert_eq!(clamav.kind, OutcomeKind::Unknown);
        assert!(clamav.failure_reason.contains("clamscan not installed"));
        assert_eq!(report.unavailable, vec!["clamav".to_string()]);
        assert_eq!(report.allocation.weight("clamav"), 0.0);
        assert!((report.allocation.weight("bytescale") - 47.89).abs() < 0.01);
        assert_eq!(report.verdict.category, VerdictCategory::Safe);
    }

    #[tokio::test]
    async fn test_panicking_engine_does_not_abort_others() {
        let engine = three_engines(
            MockAdapter::clean(),
            MockAdapter::clean().with_panic(),
            MockAdapter::infected("Eicar"),
        );

        let report = engine
            .run(
                &target(),
                &CancellationToken::new(),
                Availability::all_available(),
                &NoopObserver,
            )
            .await;

        assert_eq!(
            report.outcome("cloudmersive").unwrap().kind,
            OutcomeKind::Unknown
        );
        assert_eq!(report.outcome("bytescale").unwrap().kind, OutcomeKind::Clean);
        assert_eq!(report.outcome("clamav").unwrap().kind, OutcomeKind::Infected);
        assert_eq!(report.verdict.valid_result_count, 2);
    }

    #[tokio::test]
    async fn test_pre_unavailable_engines_are_skipped_without_invocation() {
        let bytescale = Arc::new(MockAdapter::clean().with_name("bytescale"));
        let cloudmersive = Arc::new(MockAdapter::clean().with_name("cloudmersive"));
        let clamav = Arc::new(MockAdapter::infected("Eicar").with_name("clamav"));

        let engine = ConsensusEngine::builder()
            .add_arc_engine(bytescale.clone(), 34.0)
            .add_arc_engine(cloudmersive.clone(), 37.0)
            .add_arc_engine(clamav.clone(), 29.0)
            .build()
            .unwrap();

        let recorder = Recorder::default();
        let report = engine
            .run(
                &target(),
                &CancellationToken::new(),
                Availability::with_unavailable(["bytescale", "cloudmersive"]),
                &recorder,
            )
            .await;

        assert_eq!(bytescale.scan_count(), 0);
        assert_eq!(cloudmersive.scan_count(), 0);
        assert_eq!(clamav.scan_count(), 1);
        assert_eq!(report.outcome("bytescale").unwrap().kind, OutcomeKind::Skipped);
        assert_eq!(report.verdict.category, VerdictCategory::Unknown);
        assert_eq!(report.verdict.weighted_score, 0.0);
        assert_eq!(*recorder.started.lock().unwrap(), vec!["clamav".to_string()]);
        assert_eq!(recorder.finished.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_availability_does_not_leak_between_attempts() {
        let clamav = Arc::new(MockAdapter::clean().with_name("clamav").with_error("down"));
        let engine = ConsensusEngine::builder()
            .add_engine(MockAdapter::clean().with_name("bytescale"), 34.0)
            .add_engine(MockAdapter::clean().with_name("cloudmersive"), 37.0)
            .add_arc_engine(clamav.clone(), 29.0)
            .build()
            .unwrap();
        let cancel = CancellationToken::new();

        let first = engine
            .run(&target(), &cancel, Availability::all_available(), &NoopObserver)
            .await;
        let second = engine
            .run(&target(), &cancel, Availability::all_available(), &NoopObserver)
            .await;

        assert_eq!(first.unavailable, vec!["clamav".to_string()]);
        assert_eq!(second.unavailable, vec!["clamav".to_string()]);
        // The failing engine is retried on the next attempt.
        assert_eq!(clamav.scan_count(), 2);
    }

    #[tokio::test]
    async fn test_already_cancelled_token_skips_invocation() {
        let slow = Arc::new(MockAdapter::clean().with_name("clamav"));
        let engine = ConsensusEngine::builder()
            .add_engine(MockAdapter::clean().with_name("bytescale"), 50.0)
            .add_arc_engine(slow.clone(), 50.0)
            .build()
            .unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = engine
            .run(&target(), &cancel, Availability::all_available(), &NoopObserver)
            .await;

        assert!(report.was_cancelled());
        assert!(report
            .outcomes
            .iter()
            .all(|o| o.kind == OutcomeKind::Cancelled));
        assert_eq!(slow.scan_count(), 0);
        assert_eq!(report.verdict.category, VerdictCategory::Unknown);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_mid_flight_resolves_promptly() {
        let engine = ConsensusEngine::builder()
            .add_engine(
                MockAdapter::clean()
                    .with_name("slow")
                    .with_latency(Duration::from_secs(3600)),
                100.0,
            )
            .build()
            .unwrap();

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let started = tokio::time::Instant::now();
        let report = engine
            .run(&target(), &cancel, Availability::all_available(), &NoopObserver)
            .await;

        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(report.outcomes[0].kind, OutcomeKind::Cancelled);
        assert!(report.unavailable.is_empty());
    }

    #[tokio::test]
    async fn test_builder_rejects_bad_pool() {
        assert!(matches!(
            ConsensusEngine::builder().build(),
            Err(ConfigError::EmptyPool)
        ));
        assert!(matches!(
            ConsensusEngine::builder()
                .add_engine(MockAdapter::clean().with_name("a"), 40.0)
                .build(),
            Err(ConfigError::WeightSum { .. })
        ));
    }

    #[test]
    fn test_from_config_orders_adapters_by_pool() {
        let adapters: Vec<ArcAdapter> = vec![
            Arc::new(MockAdapter::clean().with_name("clamav")),
            Arc::new(MockAdapter::clean().with_name("cloudmersive")),
            Arc::new(MockAdapter::clean().with_name("bytescale")),
        ];
        let engine = ConsensusEngine::from_config(&EnginePoolConfig::default(), adapters).unwrap();
        let names: Vec<&str> = engine.adapters().iter().map(|a| a.name()).collect();
        assert_eq!(names, vec!["bytescale", "cloudmersive", "clamav"]);

        let missing = ConsensusEngine::from_config(
            &EnginePoolConfig::default(),
            vec![Arc::new(MockAdapter::clean().with_name("clamav")) as ArcAdapter],
        );
        assert!(matches!(missing, Err(ConfigError::MissingAdapter { .. })));
    }

    #[tokio::test]
    async fn test_health_reports_each_engine() {
        let engine = ConsensusEngine::builder()
            .add_engine(MockAdapter::clean().with_name("a"), 50.0)
            .add_engine(MockAdapter::clean().with_name("b").unhealthy(), 50.0)
            .build()
            .unwrap();

        let health = engine.health().await;
        assert!(health[0].1.is_ok());
        assert!(health[1].1.is_err());
    }
}
