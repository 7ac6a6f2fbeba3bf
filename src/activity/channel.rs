//! Per-user activity fan-out.

use crate::activity::event::ActivityEvent;
use crate::core::UserSession;

use dashmap::DashMap;
use std::fmt;
use tokio::sync::broadcast;

/// Default buffered events per user before slow receivers lag.
pub const DEFAULT_CAPACITY: usize = 256;

/// Where the registry reports operation progress.
///
/// Delivery is best-effort: no acknowledgement, no replay on reconnect.
pub trait ActivityChannel: Send + Sync + fmt::Debug {
    /// Pushes an event to one user. Returns `true` if someone received it.
    fn push(&self, user: &UserSession, event: ActivityEvent) -> bool;
}

/// Channel that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopActivity;

impl ActivityChannel for NoopActivity {
    fn push(&self, _user: &UserSession, _event: ActivityEvent) -> bool {
        false
    }
}

/// In-process fan-out with one broadcast channel per user.
pub struct BroadcastActivity {
    senders: DashMap<UserSession, broadcast::Sender<ActivityEvent>>,
    capacity: usize,
}

impl fmt::Debug for BroadcastActivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BroadcastActivity")
            .field("user_count", &self.senders.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl BroadcastActivity {
    /// Creates a fan-out with the default per-user capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates a fan-out buffering `capacity` events per user.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            senders: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Subscribes to one user's feed. The new receiver gets a `connected`
    /// event first.
    pub fn subscribe(&self, user: &UserSession) -> broadcast::Receiver<ActivityEvent> {
        let sender = self
            .senders
            .entry(user.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone();
        let receiver = sender.subscribe();
        let _ = sender.send(ActivityEvent::connected());

        tracing::debug!(user = %user.short(), "Activity subscriber attached");
        receiver
    }

    /// Drops the user's channel; current receivers see it close.
    pub fn disconnect(&self, user: &UserSession) -> bool {
        self.senders.remove(user).is_some()
    }

    /// Number of live receivers for a user.
    pub fn subscriber_count(&self, user: &UserSession) -> usize {
        self.senders
            .get(user)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }

    /// Number of users with a channel.
    pub fn user_count(&self) -> usize {
        self.senders.len()
    }
}

impl Default for BroadcastActivity {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityChannel for BroadcastActivity {
    fn push(&self, user: &UserSession, event: ActivityEvent) -> bool {
        let delivered = match self.senders.get(user) {
            Some(sender) => sender.send(event).is_ok(),
            None => return false,
        };

        if !delivered {
            self.senders.remove_if(user, |_, tx| tx.receiver_count() == 0);
            tracing::debug!(user = %user.short(), "No activity subscribers, channel dropped");
        }
        delivered
    }
}
