//! Best-effort per-user activity feeds.
//!
//! - [`event`] - The events a feed carries
//! - [`channel`] - The `ActivityChannel` contract and an in-process fan-out
//! - [`sanitize`] - Payload filtering applied before an event is pushed

pub mod channel;
pub mod event;
pub mod sanitize;

pub use channel::{ActivityChannel, BroadcastActivity, NoopActivity};
pub use event::ActivityEvent;
pub use sanitize::sanitize;
