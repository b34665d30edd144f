//! # Lifecycle events emitted by the controller.
//!
//! The [`EventKind`] enum classifies events in three groups:
//! - **Registry events**: a task was admitted or superseded
//! - **Lifecycle events**: a registered task started, completed, failed or was cancelled
//! - **Delivery events**: an observer or subscriber misbehaved
//!
//! The [`Event`] struct carries the metadata: timestamp, identity, task serial
//! number and a reason.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases
//! monotonically. Use it to restore order when events arrive out of order.
//!
//! ## Example
//! ```rust
//! use taskchain::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::TaskFailed)
//!     .with_task("profile")
//!     .with_uid(7)
//!     .with_reason("timeout");
//!
//! assert_eq!(ev.kind, EventKind::TaskFailed);
//! assert_eq!(ev.task.as_deref(), Some("profile"));
//! assert_eq!(ev.uid, Some(7));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of controller events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Registry ===
    /// A task was registered under its identity and submitted.
    ///
    /// Sets: `task`, `uid`.
    TaskAdmitted,

    /// A registered task was cancelled because a new task took its identity.
    ///
    /// Sets: `task`, `uid` (of the superseded task).
    TaskSuperseded,

    // === Lifecycle ===
    /// A registered task is about to run its body.
    ///
    /// Sets: `task`, `uid`.
    TaskStarting,

    /// A registered task delivered a value.
    ///
    /// Sets: `task`, `uid`.
    TaskCompleted,

    /// A registered task delivered an error.
    ///
    /// Sets: `task`, `uid`, `reason` (error message).
    TaskFailed,

    /// A registered task was cancelled.
    ///
    /// Sets: `task`, `uid`.
    TaskCancelled,

    // === Delivery ===
    /// An observer callback panicked; other observers were still notified.
    ///
    /// Sets: `task`, `uid`, `reason` (panic message).
    ObserverPanicked,

    /// A subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets: `task` (subscriber name), `reason`.
    SubscriberOverflow,

    /// A subscriber panicked while processing an event.
    ///
    /// Sets: `task` (subscriber name), `reason` (panic message).
    SubscriberPanicked,
}

/// Controller event with optional metadata.
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,
    /// Task identity (or subscriber name for delivery events).
    pub task: Option<Arc<str>>,
    /// Serial number of the task instance.
    pub uid: Option<u64>,
    /// Human-readable reason (error, panic, overflow details).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates an event of the given kind with the current time and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            task: None,
            uid: None,
            reason: None,
        }
    }

    /// Attaches a task identity.
    #[inline]
    pub fn with_task(mut self, task: impl Into<Arc<str>>) -> Self {
        self.task = Some(task.into());
        self
    }

    /// Attaches a task serial number.
    #[inline]
    pub fn with_uid(mut self, uid: u64) -> Self {
        self.uid = Some(uid);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_task(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_task(subscriber)
            .with_reason(info)
    }

    #[inline]
    pub fn is_subscriber_overflow(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberOverflow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_increases() {
        let a = Event::new(EventKind::TaskAdmitted);
        let b = Event::new(EventKind::TaskStarting);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn overflow_event_names_subscriber() {
        let ev = Event::subscriber_overflow("audit", "full");
        assert!(ev.is_subscriber_overflow());
        assert_eq!(ev.task.as_deref(), Some("audit"));
        assert_eq!(ev.reason.as_deref(), Some("subscriber=audit reason=full"));
    }
}
