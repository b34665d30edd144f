//! # Per-identity observers.
//!
//! An observer registers for one or more identities and hears about every
//! task the controller runs under them:
//!
//! ```text
//! execute(task "feed")
//!   ├─► on_will_run(task)          body about to start
//!   ├─► on_completed(task, result) result delivered (never after a cancel)
//!   └─► on_cancelled(task)         cancelled, superseded or controller dropped
//! ```
//!
//! The controller holds observers weakly; dropping the last `Arc` unregisters
//! an observer implicitly.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::TaskResult;
use crate::tasks::TaskHandle;

static OBSERVER_SEQ: AtomicU64 = AtomicU64::new(1);

/// Key of an observer within an identity.
///
/// Registering a second observer with the same id under the same identity
/// replaces the first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

impl ObserverId {
    /// Wraps a caller-chosen id.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Allocates a process-unique id.
    pub fn next() -> Self {
        Self(OBSERVER_SEQ.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw value.
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Receiver of lifecycle notifications for tasks of some identities.
///
/// Callbacks run synchronously on the thread that drove the transition; keep
/// them short. A panicking callback is reported as
/// [`EventKind::ObserverPanicked`](crate::EventKind::ObserverPanicked) and does not affect
/// other observers.
///
/// # Example
/// ```
/// use taskchain::{Observe, ObserverId, TaskHandle, TaskResult};
///
/// struct Printer(ObserverId);
///
/// impl Observe<String> for Printer {
///     fn observer_id(&self) -> ObserverId {
///         self.0
///     }
///
///     fn on_completed(&self, task: &TaskHandle, result: &TaskResult<String>) {
///         println!("{:?} -> {:?}", task.id(), result);
///     }
/// }
/// ```
pub trait Observe<V>: Send + Sync + 'static {
    /// Key under which the observer is registered.
    fn observer_id(&self) -> ObserverId;

    /// The task is about to run its body.
    fn on_will_run(&self, _task: &TaskHandle) {}

    /// The task delivered its result.
    fn on_completed(&self, task: &TaskHandle, result: &TaskResult<V>);

    /// The task was cancelled.
    fn on_cancelled(&self, _task: &TaskHandle) {}
}
