//! Structured audit logging.
//!
//! This module emits structured audit events on the `scanquorum::audit`
//! tracing target: operation lifecycle, global stops and verdicts. Any
//! tracing subscriber (JSON file, OpenTelemetry, etc.) can capture them.

mod events;

pub use events::{
    emit_global_stop, emit_operation_cancelled, emit_operation_completed, emit_operation_opened,
    emit_verdict, AuditEvent, EngineSummary, VerdictAuditEvent,
};
