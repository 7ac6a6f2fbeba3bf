//! Audit event types and emission functions.

use crate::allocation::ConsensusReport;
use crate::registry::{CancelReason, OperationHandle, OperationSummary, StopReport};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Base trait for audit events.
pub trait AuditEvent: Serialize {
    /// Returns the event type name.
    fn event_type(&self) -> &'static str;

    /// Returns the timestamp of the event.
    fn timestamp(&self) -> DateTime<Utc>;
}

/// Audit event for a verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerdictAuditEvent {
    /// Timestamp of the event.
    pub timestamp: DateTime<Utc>,

    /// Report ID.
    pub report_id: String,

    /// Verdict category.
    pub category: String,

    /// Weighted score, 0 to 100.
    pub weighted_score: f64,

    /// Engines that gave a usable answer.
    pub valid_result_count: usize,

    /// Engines that reported a detection.
    pub malicious_count: usize,

    /// Engines without a score.
    pub null_count: usize,

    /// Engines unavailable by the end of the attempt.
    pub unavailable: Vec<String>,

    /// Per-engine outcome summaries.
    pub engines: Vec<EngineSummary>,

    /// Fan-out duration in milliseconds.
    pub duration_ms: u64,
}

/// Summary of one engine's outcome for audit logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSummary {
    /// Engine name.
    pub engine: String,
    /// Outcome kind.
    pub outcome: String,
    /// Signature or failure reason.
    pub reason: String,
}

impl From<&ConsensusReport> for VerdictAuditEvent {
    fn from(report: &ConsensusReport) -> Self {
        Self {
            timestamp: report.completed_at,
            report_id: report.id.clone(),
            category: report.verdict.category.to_string(),
            weighted_score: report.verdict.weighted_score,
            valid_result_count: report.verdict.valid_result_count,
            malicious_count: report.verdict.malicious_count,
            null_count: report.verdict.null_count,
            unavailable: report.unavailable.clone(),
            engines: report
                .outcomes
                .iter()
                .map(|o| EngineSummary {
                    engine: o.engine.clone(),
                    outcome: o.kind.to_string(),
                    reason: o.failure_reason.clone(),
                })
                .collect(),
            duration_ms: report.duration.as_millis() as u64,
        }
    }
}

impl AuditEvent for VerdictAuditEvent {
    fn event_type(&self) -> &'static str {
        "verdict"
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Emits an audit event for an opened operation.
pub fn emit_operation_opened(handle: &OperationHandle) {
    tracing::info!(
        target: "scanquorum::audit",
        event_type = "operation_opened",
        operation_id = %handle.id,
        user = %handle.user.short(),
        kind = %handle.kind,
        "Operation opened"
    );
}

/// Emits an audit event for a cancelled operation.
pub fn emit_operation_cancelled(summary: &OperationSummary, reason: CancelReason) {
    tracing::info!(
        target: "scanquorum::audit",
        event_type = "operation_cancelled",
        operation_id = %summary.id,
        user = %summary.user.short(),
        kind = %summary.kind,
        reason = %reason,
        duration_ms = summary.duration.as_millis() as u64,
        idle_ms = summary.idle.as_millis() as u64,
        filename = ?summary.metadata.filename,
        "Operation cancelled"
    );
}

/// Emits an audit event for a completed operation.
pub fn emit_operation_completed(summary: &OperationSummary) {
    tracing::info!(
        target: "scanquorum::audit",
        event_type = "operation_completed",
        operation_id = %summary.id,
        user = %summary.user.short(),
        kind = %summary.kind,
        duration_ms = summary.duration.as_millis() as u64,
        filename = ?summary.metadata.filename,
        "Operation completed"
    );
}

/// Emits an audit event for a global stop.
pub fn emit_global_stop(report: &StopReport, cooldown: Duration) {
    tracing::warn!(
        target: "scanquorum::audit",
        event_type = "global_stop",
        count = report.count,
        cooldown_ms = cooldown.as_millis() as u64,
        "All operations stopped"
    );
}

/// Emits an audit event for a verdict. Degraded verdicts are logged as
/// warnings.
pub fn emit_verdict(report: &ConsensusReport) {
    let event = VerdictAuditEvent::from(report);

    if report.verdict.is_degraded() {
        tracing::warn!(
            target: "scanquorum::audit",
            event_type = event.event_type(),
            report_id = %event.report_id,
            category = %event.category,
            weighted_score = event.weighted_score,
            null_count = event.null_count,
            unavailable = ?event.unavailable,
            engines = ?event.engines,
            "Degraded-confidence verdict"
        );
    } else {
        tracing::info!(
            target: "scanquorum::audit",
            event_type = event.event_type(),
            report_id = %event.report_id,
            category = %event.category,
            weighted_score = event.weighted_score,
            valid_result_count = event.valid_result_count,
            malicious_count = event.malicious_count,
            unavailable = ?event.unavailable,
            engines = ?event.engines,
            duration_ms = event.duration_ms,
            "Verdict computed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation::{Availability, EngineConfig, EnginePool, Verdict};
    use crate::core::EngineOutcome;

    #[test]
    fn test_verdict_event_from_report() {
        let pool = EnginePool::new(vec![
            EngineConfig::new("clamav", 50.0),
            EngineConfig::new("cloudmersive", 50.0),
        ])
        .unwrap();
        let allocation = pool.allocate(&Availability::all_available());
        let outcomes = vec![
            EngineOutcome::clean("clamav"),
            EngineOutcome::infected("cloudmersive", "EICAR-Test-File"),
        ];
        let verdict = Verdict::compute(&outcomes, &allocation);
        let now = Utc::now();
        let report = ConsensusReport {
            id: "report-1".to_string(),
            outcomes,
            allocation,
            unavailable: vec![],
            verdict,
            started_at: now,
            completed_at: now,
            duration: Duration::from_millis(42),
        };

        let event = VerdictAuditEvent::from(&report);
        assert_eq!(event.event_type(), "verdict");
        assert_eq!(event.category, "suspicious");
        assert_eq!(event.weighted_score, 50.0);
        assert_eq!(event.engines.len(), 2);
        assert_eq!(event.engines[1].reason, "EICAR-Test-File");
        assert_eq!(event.duration_ms, 42);
    }
}
