//! Events pushed to a user's activity feed.

use crate::core::OperationId;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One event on a user's activity feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActivityEvent {
    /// Sent once when a subscriber attaches.
    Connected {
        /// Greeting text.
        message: String,
        /// When the subscription was made.
        timestamp: DateTime<Utc>,
    },
    /// Progress of one operation.
    Activity {
        /// Operation the event belongs to.
        operation_id: OperationId,
        /// What happened, e.g. `clamav_scan_start`.
        activity_type: String,
        /// Sanitized payload.
        data: serde_json::Value,
        /// When the event was produced.
        timestamp: DateTime<Utc>,
    },
}

impl ActivityEvent {
    /// Creates the greeting sent to new subscribers.
    pub fn connected() -> Self {
        Self::Connected {
            message: "Activity stream connected".to_string(),
            timestamp: Utc::now(),
        }
    }

    /// Creates an activity event stamped with the current time.
    pub fn activity(
        operation_id: OperationId,
        activity_type: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self::Activity {
            operation_id,
            activity_type: activity_type.into(),
            data,
            timestamp: Utc::now(),
        }
    }

    /// Returns the activity type, or `"connected"` for the greeting.
    pub fn kind(&self) -> &str {
        match self {
            Self::Connected { .. } => "connected",
            Self::Activity { activity_type, .. } => activity_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activity_event_wire_shape() {
        let event = ActivityEvent::activity(
            OperationId::from("scan_abc"),
            "clamav_scan_start",
            serde_json::json!({"engine": "clamav"}),
        );
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "activity");
        assert_eq!(json["operation_id"], "scan_abc");
        assert_eq!(json["activity_type"], "clamav_scan_start");
        assert_eq!(json["data"]["engine"], "clamav");
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn test_connected_kind() {
        let event = ActivityEvent::connected();
        assert_eq!(event.kind(), "connected");
        assert_eq!(serde_json::to_value(&event).unwrap()["type"], "connected");
    }
}
