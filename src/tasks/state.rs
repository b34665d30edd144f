//! # Task lifecycle state.
//!
//! ```text
//!   Ready ──start()──► Executing ──result delivered──► Finished
//!     │                    │                              ▲
//!     └────cancel()────────┴──────────────────────────────┘
//! ```
//!
//! Transitions only ever move right; `Finished` is terminal. Cancellation is a
//! separate flag on the task, not a fourth state.

use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    /// Created, not started.
    Ready,
    /// Body is running.
    Executing,
    /// Terminal: result delivered, or cancelled.
    Finished,
}

const READY: u8 = 0;
const EXECUTING: u8 = 1;
const FINISHED: u8 = 2;

impl TaskState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            READY => TaskState::Ready,
            EXECUTING => TaskState::Executing,
            _ => TaskState::Finished,
        }
    }

    /// Returns a short stable label for logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskState::Ready => "ready",
            TaskState::Executing => "executing",
            TaskState::Finished => "finished",
        }
    }
}

/// Lock-free, monotonic state cell.
#[derive(Debug)]
pub(crate) struct AtomicState(AtomicU8);

impl AtomicState {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(READY))
    }

    pub(crate) fn load(&self) -> TaskState {
        TaskState::from_raw(self.0.load(Ordering::Acquire))
    }

    /// `Ready → Executing`. Returns `false` if the task already left `Ready`.
    pub(crate) fn try_begin(&self) -> bool {
        self.0
            .compare_exchange(READY, EXECUTING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Moves to `Finished` from any state and returns the previous one.
    pub(crate) fn finish(&self) -> TaskState {
        TaskState::from_raw(self.0.swap(FINISHED, Ordering::AcqRel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_ready_and_begins_once() {
        let state = AtomicState::new();
        assert_eq!(state.load(), TaskState::Ready);
        assert!(state.try_begin());
        assert_eq!(state.load(), TaskState::Executing);
        assert!(!state.try_begin());
    }

    #[test]
    fn finished_is_terminal() {
        let state = AtomicState::new();
        assert_eq!(state.finish(), TaskState::Ready);
        assert!(!state.try_begin(), "cannot go back from finished");
        assert_eq!(state.finish(), TaskState::Finished);
        assert_eq!(state.load().as_label(), "finished");
    }
}
