//! Execution context handed to a task body, and the one-shot [`Completer`]
//! used by callback-style bodies.

use std::any::Any;
use std::sync::Arc;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::chain::Placement;
use crate::error::{TaskError, TaskResult};
use crate::executor::{Dispatcher, Executor};
use crate::tasks::handle::TaskHandle;

/// What a running body can see of its own task.
#[derive(Clone)]
pub struct TaskContext {
    handle: TaskHandle,
    executor: Arc<dyn Executor>,
    dispatcher: Arc<dyn Dispatcher>,
    /// Recovery placement forced by an enclosing in-place step.
    recovery: Option<Placement>,
}

impl TaskContext {
    pub(crate) fn new(
        handle: TaskHandle,
        executor: Arc<dyn Executor>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Self {
        Self {
            handle,
            executor,
            dispatcher,
            recovery: None,
        }
    }

    /// Forces recovery inside this body to `placement`; `None` keeps the
    /// current setting.
    pub(crate) fn with_recovery(mut self, placement: Option<Placement>) -> Self {
        if placement.is_some() {
            self.recovery = placement;
        }
        self
    }

    pub(crate) fn recovery(&self) -> Option<Placement> {
        self.recovery
    }

    /// Handle of the running task.
    pub fn handle(&self) -> &TaskHandle {
        &self.handle
    }

    /// `true` once the task was cancelled.
    ///
    /// Long-running bodies should check this between steps; the result of a
    /// cancelled task is dropped regardless.
    pub fn is_cancelled(&self) -> bool {
        self.handle.is_cancelled()
    }

    /// Token cancelled together with the task, for `select!`-style bodies.
    pub fn token(&self) -> CancellationToken {
        self.handle.token().clone()
    }

    /// Publishes an in-flight update (progress, partial data).
    ///
    /// Only the latest update is kept; readers poll it through
    /// [`TaskHandle::update`] or the controller.
    pub fn publish_update<T: Any + Send + Sync>(&self, update: T) {
        self.handle.publish_update(Arc::new(update));
    }

    /// Executor this task was submitted to.
    pub fn executor(&self) -> &Arc<dyn Executor> {
        &self.executor
    }

    /// Dispatcher used for affinity-thread continuations.
    pub fn dispatcher(&self) -> &Arc<dyn Dispatcher> {
        &self.dispatcher
    }
}

/// Single-use completion sink for callback-style bodies.
///
/// Consuming `self` makes a second report impossible; dropping it without
/// reporting settles the task with [`TaskError::Abandoned`].
#[derive(Debug)]
pub struct Completer<V> {
    tx: oneshot::Sender<TaskResult<V>>,
}

impl<V> Completer<V> {
    pub(crate) fn channel() -> (Self, oneshot::Receiver<TaskResult<V>>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    /// Reports the task's result.
    pub fn complete(self, result: TaskResult<V>) {
        // The receiver is gone only if the task was cancelled.
        let _ = self.tx.send(result);
    }

    /// Reports success.
    pub fn succeed(self, value: V) {
        self.complete(Ok(value));
    }

    /// Reports failure.
    pub fn fail(self, error: TaskError) {
        self.complete(Err(error));
    }
}
