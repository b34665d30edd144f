//! # Simple logging subscriber for debugging and demos.
//!
//! [`LogWriter`] prints events to stdout in a human-readable format.
//!
//! ## Output format
//! ```text
//! [admitted] task=profile uid=12
//! [superseded] task=profile uid=12
//! [starting] task=profile uid=13
//! [failed] task=profile uid=13 err="error: timeout"
//! [completed] task=profile uid=13
//! [cancelled] task=profile uid=13
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Stdout logging subscriber (feature `logging`).
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn label(kind: EventKind) -> &'static str {
    match kind {
        EventKind::TaskAdmitted => "admitted",
        EventKind::TaskSuperseded => "superseded",
        EventKind::TaskStarting => "starting",
        EventKind::TaskCompleted => "completed",
        EventKind::TaskFailed => "failed",
        EventKind::TaskCancelled => "cancelled",
        EventKind::ObserverPanicked => "observer-panicked",
        EventKind::SubscriberOverflow => "subscriber-overflow",
        EventKind::SubscriberPanicked => "subscriber-panicked",
    }
}

fn render(e: &Event) -> String {
    let task = e.task.as_deref().unwrap_or("-");
    let mut line = format!("[{}] task={task}", label(e.kind));
    if let Some(uid) = e.uid {
        line.push_str(&format!(" uid={uid}"));
    }
    if let Some(reason) = &e.reason {
        line.push_str(&format!(" err={reason:?}"));
    }
    line
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        println!("{}", render(e));
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_carry_metadata() {
        let ev = Event::new(EventKind::TaskFailed)
            .with_task("profile")
            .with_uid(3)
            .with_reason("boom");
        assert_eq!(render(&ev), "[failed] task=profile uid=3 err=\"boom\"");

        let bare = Event::new(EventKind::TaskCancelled);
        assert_eq!(render(&bare), "[cancelled] task=-");
    }
}
