//! # Shared task core and its cloneable [`TaskHandle`].
//!
//! A [`Task`](crate::Task) is consumed when it runs; everything that must stay
//! reachable afterwards (state, cancellation, identity, progress) lives in a
//! reference-counted core. [`TaskHandle`] is the public face of that core.
//!
//! ## Cancellation protocol
//! ```text
//! cancel():
//!   outcome PENDING → CANCELLED   (CAS; loses to a delivered result)
//!   ├─► cancel every tracked operation (chain upstream / active sub-tasks)
//!   ├─► run on_cancel hook (once)
//!   ├─► token.cancel()            (drops the in-flight body at its next await)
//!   ├─► state → Finished
//!   └─► controller cancel hook    (if the task is registered)
//!
//! delivery (after the body settles):
//!   outcome PENDING → DELIVERED   (CAS; loses to cancel → result dropped)
//! ```
//!
//! Both sides race on one atomic, so a result is either delivered or the task
//! is cancelled, never both.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio_util::sync::CancellationToken;

use crate::sync::lock;
use crate::tasks::state::{AtomicState, TaskState};

/// Global counter for task serial numbers.
static TASK_SEQ: AtomicU64 = AtomicU64::new(1);

const PENDING: u8 = 0;
const DELIVERED: u8 = 1;
const CANCELLED: u8 = 2;

pub(crate) type CancelFn = Box<dyn FnOnce() + Send>;
pub(crate) type Update = Arc<dyn Any + Send + Sync>;

/// Receives cancellation of a registered task.
pub(crate) trait CancelHook: Send + Sync {
    fn task_cancelled(&self, task: &TaskHandle);
}

pub(crate) struct TaskCore {
    uid: u64,
    id: Mutex<Option<Arc<str>>>,
    state: AtomicState,
    outcome: AtomicU8,
    token: CancellationToken,
    on_cancel: Mutex<Option<CancelFn>>,
    /// Operations cancelled together with this task.
    tracked: Mutex<Vec<TaskHandle>>,
    hook: Mutex<Option<Weak<dyn CancelHook>>>,
    update: Mutex<Option<Update>>,
}

/// Cloneable handle to a task's lifecycle.
///
/// Stays valid after the task itself was consumed by execution. Handles of the
/// same task compare equal.
#[derive(Clone)]
pub struct TaskHandle(Arc<TaskCore>);

impl TaskHandle {
    pub(crate) fn new() -> Self {
        Self(Arc::new(TaskCore {
            uid: TASK_SEQ.fetch_add(1, Ordering::Relaxed),
            id: Mutex::new(None),
            state: AtomicState::new(),
            outcome: AtomicU8::new(PENDING),
            token: CancellationToken::new(),
            on_cancel: Mutex::new(None),
            tracked: Mutex::new(Vec::new()),
            hook: Mutex::new(None),
            update: Mutex::new(None),
        }))
    }

    /// Process-unique serial number of the task.
    pub fn uid(&self) -> u64 {
        self.0.uid
    }

    /// Logical identity used by the controller, if any.
    pub fn id(&self) -> Option<Arc<str>> {
        lock(&self.0.id).clone()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TaskState {
        self.0.state.load()
    }

    /// `true` while the task has not started and was not cancelled.
    pub fn is_ready(&self) -> bool {
        !self.is_cancelled() && self.state() == TaskState::Ready
    }

    /// `true` while the body runs.
    pub fn is_executing(&self) -> bool {
        self.state() == TaskState::Executing
    }

    /// `true` once the task delivered its result or was cancelled.
    pub fn is_finished(&self) -> bool {
        self.state() == TaskState::Finished
    }

    /// `true` once [`cancel`](Self::cancel) took effect. Never reverts.
    pub fn is_cancelled(&self) -> bool {
        self.0.outcome.load(Ordering::Acquire) == CANCELLED
    }

    /// Completes when the task is cancelled.
    pub async fn cancelled(&self) {
        self.0.token.cancelled().await
    }

    /// Requests cancellation.
    ///
    /// Cascades to every tracked operation first, then runs the task's
    /// `on_cancel` hook and moves it to [`TaskState::Finished`]. Returns
    /// `false` (and does nothing) if the task was already cancelled or
    /// already delivered its result.
    ///
    /// [`is_cancelled`](Self::is_cancelled) turns `true` before the cascade,
    /// so a node never delivers the cancellation of its upstream as a result.
    pub fn cancel(&self) -> bool {
        let claimed = self
            .0
            .outcome
            .compare_exchange(PENDING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if !claimed {
            return false;
        }

        let tracked = std::mem::take(&mut *lock(&self.0.tracked));
        for op in &tracked {
            op.cancel();
        }

        let hook = lock(&self.0.on_cancel).take();
        if let Some(hook) = hook {
            hook();
        }

        self.0.token.cancel();
        self.0.state.finish();

        let listener = lock(&self.0.hook).as_ref().and_then(Weak::upgrade);
        if let Some(listener) = listener {
            listener.task_cancelled(self);
        }
        true
    }

    /// Latest in-flight update published by the body.
    pub fn update(&self) -> Option<Arc<dyn Any + Send + Sync>> {
        lock(&self.0.update).clone()
    }

    /// Latest update, if it is of type `T`.
    pub fn update_as<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.update().and_then(|u| u.downcast::<T>().ok())
    }

    // ---- crate-internal lifecycle ----

    pub(crate) fn set_id(&self, id: Arc<str>) {
        *lock(&self.0.id) = Some(id);
    }

    pub(crate) fn set_on_cancel(&self, hook: CancelFn) {
        *lock(&self.0.on_cancel) = Some(hook);
    }

    /// Installs the cancel listener. Returns `false` without installing it
    /// if the task was already cancelled; the listener is then never called.
    pub(crate) fn set_cancel_hook(&self, hook: Weak<dyn CancelHook>) -> bool {
        let mut slot = lock(&self.0.hook);
        if self.is_cancelled() {
            return false;
        }
        *slot = Some(hook);
        true
    }

    pub(crate) fn publish_update(&self, update: Update) {
        *lock(&self.0.update) = Some(update);
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.0.token
    }

    /// Starts the task. A cancelled task goes straight to `Finished` and
    /// `false` is returned; the body must not run.
    pub(crate) fn begin(&self) -> bool {
        if self.is_cancelled() {
            self.0.state.finish();
            return false;
        }
        self.0.state.try_begin()
    }

    /// Claims the right to deliver a result. Loses to cancellation.
    pub(crate) fn claim_delivery(&self) -> bool {
        let claimed = self
            .0
            .outcome
            .compare_exchange(PENDING, DELIVERED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if claimed {
            self.0.state.finish();
        }
        claimed
    }

    /// Replaces the set of operations this task cancels along with itself.
    ///
    /// If the task is already cancelled the operations are cancelled right
    /// away instead of being stored.
    pub(crate) fn track(&self, ops: Vec<TaskHandle>) {
        let orphaned = {
            let mut tracked = lock(&self.0.tracked);
            if self.is_cancelled() {
                Some(ops)
            } else {
                *tracked = ops;
                None
            }
        };
        for op in orphaned.into_iter().flatten() {
            op.cancel();
        }
    }

    #[cfg(test)]
    pub(crate) fn tracked_len(&self) -> usize {
        lock(&self.0.tracked).len()
    }
}

impl PartialEq for TaskHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for TaskHandle {}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("uid", &self.uid())
            .field("id", &self.id())
            .field("state", &self.state())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_hook(handle: &TaskHandle, hits: &Arc<AtomicUsize>) {
        let hits = Arc::clone(hits);
        handle.set_on_cancel(Box::new(move || {
            hits.fetch_add(1, Ordering::SeqCst);
        }));
    }

    #[test]
    fn cancel_is_idempotent() {
        let handle = TaskHandle::new();
        let hits = Arc::new(AtomicUsize::new(0));
        counting_hook(&handle, &hits);

        assert!(handle.is_ready());
        assert!(handle.cancel());
        assert!(!handle.cancel());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(handle.is_cancelled());
        assert!(handle.is_finished());
        assert!(!handle.is_ready());
        assert!(handle.token().is_cancelled());
    }

    struct Listener(AtomicUsize);

    impl CancelHook for Listener {
        fn task_cancelled(&self, _task: &TaskHandle) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn cancel_listener_is_refused_after_cancel() {
        let listener = Arc::new(Listener(AtomicUsize::new(0)));
        let weak: Weak<dyn CancelHook> = Arc::downgrade(&listener) as Weak<Listener>;

        let live = TaskHandle::new();
        assert!(live.set_cancel_hook(weak.clone()));
        assert!(live.cancel());
        assert_eq!(listener.0.load(Ordering::SeqCst), 1);

        let dead = TaskHandle::new();
        dead.cancel();
        assert!(!dead.set_cancel_hook(weak));
        assert_eq!(listener.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cancelled_task_never_begins() {
        let handle = TaskHandle::new();
        handle.cancel();
        assert!(!handle.begin());
        assert_eq!(handle.state(), TaskState::Finished);
    }

    #[test]
    fn delivery_and_cancel_are_exclusive() {
        let delivered = TaskHandle::new();
        assert!(delivered.begin());
        assert!(delivered.claim_delivery());
        assert!(!delivered.cancel(), "cancel after delivery is a no-op");
        assert!(!delivered.is_cancelled());

        let cancelled = TaskHandle::new();
        assert!(cancelled.begin());
        assert!(cancelled.cancel());
        assert!(!cancelled.claim_delivery());
    }

    #[test]
    fn cancel_cascades_to_tracked_operations() {
        let root = TaskHandle::new();
        let up1 = TaskHandle::new();
        let up2 = TaskHandle::new();
        let hits = Arc::new(AtomicUsize::new(0));
        counting_hook(&up1, &hits);
        counting_hook(&up2, &hits);

        root.track(vec![up1.clone(), up2.clone()]);
        assert_eq!(root.tracked_len(), 2);
        root.cancel();

        assert!(up1.is_cancelled() && up2.is_cancelled());
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(root.tracked_len(), 0);
    }

    #[test]
    fn tracking_after_cancel_cancels_immediately() {
        let root = TaskHandle::new();
        root.cancel();
        let late = TaskHandle::new();
        root.track(vec![late.clone()]);
        assert!(late.is_cancelled());
        assert_eq!(root.tracked_len(), 0);
    }

    #[test]
    fn updates_are_typed_on_read() {
        let handle = TaskHandle::new();
        assert!(handle.update().is_none());
        handle.publish_update(Arc::new(42_u32));
        assert_eq!(handle.update_as::<u32>().as_deref(), Some(&42));
        assert!(handle.update_as::<String>().is_none());
    }

    #[test]
    fn handles_compare_by_task() {
        let a = TaskHandle::new();
        let b = TaskHandle::new();
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
        assert!(b.uid() > a.uid());
    }
}
