//! # The task: a deferred unit of work with at-most-once completion.
//!
//! A [`Task<V>`] bundles an asynchronous body with the lifecycle described in
//! [`handle`](super::handle). Tasks are consumed when they run; keep a
//! [`TaskHandle`] to observe or cancel them afterwards.
//!
//! ## Execution flow
//! ```text
//! drive():
//!   handle.begin()            cancelled? ─► Finished, nothing else happens
//!   hook.will_run()           (controller-registered tasks only)
//!   select! {
//!     token.cancelled()       ─► body future dropped, result never delivered
//!     body(ctx)               ─► panic caught → TaskError::Panicked
//!   }
//!   handle.claim_delivery()   lost to cancel? ─► result dropped
//!   hook.completed(&result)
//!   completion(result)        (exactly once)
//! ```
//!
//! ## Entry points
//! - [`Task::execute`] / [`Task::execute_on`]: submit to an executor with a completion sink
//! - [`Task::submit`]: submit, ignore the result
//! - [`Task::run`]: drive inline on the current async task
//! - [`Task::wait`]: block a non-runtime thread until the result is known

use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::chain::ChainShared;
use crate::error::{TaskError, TaskResult, panic_message};
use crate::executor::{Dispatcher, Executor, default_dispatcher, default_executor};
use crate::tasks::context::{Completer, TaskContext};
use crate::tasks::handle::{CancelHook, TaskHandle};
use crate::tasks::state::TaskState;

pub(crate) type Body<V> = Box<dyn FnOnce(TaskContext) -> BoxFuture<'static, TaskResult<V>> + Send>;

/// Lifecycle receiver of a registered task (the controller).
pub(crate) trait LifecycleHook<V>: CancelHook {
    fn task_will_run(&self, task: &TaskHandle);
    fn task_completed(&self, task: &TaskHandle, result: &TaskResult<V>);
}

/// Deferred asynchronous work producing a `V`.
///
/// # Example
/// ```
/// use taskchain::{Task, TaskError};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let doubled = Task::success(5)
///     .then(|v| Ok(Task::success(v * 2)))
///     .catch(|err: &TaskError| eprintln!("never called: {err}"));
///
/// assert_eq!(doubled.run().await.ok(), Some(10));
/// # }
/// ```
pub struct Task<V> {
    pub(crate) handle: TaskHandle,
    pub(crate) body: Body<V>,
    pub(crate) chain: Option<Arc<ChainShared>>,
    pub(crate) hook: Option<Weak<dyn LifecycleHook<V>>>,
    pub(crate) executor: Option<Arc<dyn Executor>>,
    pub(crate) dispatcher: Option<Arc<dyn Dispatcher>>,
}

impl<V: Send + 'static> Task<V> {
    /// Creates a task from an async body.
    pub fn new<F, Fut>(body: F) -> Self
    where
        F: FnOnce(TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = TaskResult<V>> + Send + 'static,
    {
        Self::from_body(Box::new(move |ctx| body(ctx).boxed()))
    }

    pub(crate) fn from_body(body: Body<V>) -> Self {
        Self {
            handle: TaskHandle::new(),
            body,
            chain: None,
            hook: None,
            executor: None,
            dispatcher: None,
        }
    }

    /// Creates a task whose body reports through a one-shot [`Completer`].
    ///
    /// The body may hand the completer to another thread or callback API.
    pub fn from_callback<F>(body: F) -> Self
    where
        F: FnOnce(TaskContext, Completer<V>) + Send + 'static,
    {
        Self::new(move |ctx| {
            let (completer, rx) = Completer::channel();
            body(ctx, completer);
            async move { rx.await.unwrap_or(Err(TaskError::Abandoned)) }
        })
    }

    /// Creates a task from a synchronous fallible closure.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: FnOnce() -> TaskResult<V> + Send + 'static,
    {
        Self::new(move |_ctx| async move { f() })
    }

    /// Task that succeeds with `value`.
    pub fn success(value: V) -> Self {
        Self::new(move |_ctx| async move { Ok(value) })
    }

    /// Task that fails with `error`.
    pub fn failure(error: TaskError) -> Self {
        Self::new(move |_ctx| async move { Err(error) })
    }

    /// Task with no behavior; running it fails with [`TaskError::NotImplemented`].
    pub fn not_implemented() -> Self {
        Self::failure(TaskError::NotImplemented)
    }

    /// Runs a fallible `block` on `value`, then reports `value`.
    pub fn passing<F>(value: V, block: F) -> Self
    where
        F: FnOnce(&V) -> TaskResult<()> + Send + 'static,
    {
        Self::new(move |_ctx| async move { block(&value).map(|()| value) })
    }

    /// Hands `error` to `block`, then reports it.
    pub fn passing_error<F>(error: TaskError, block: F) -> Self
    where
        F: FnOnce(&TaskError) + Send + 'static,
    {
        Self::new(move |_ctx| async move {
            block(&error);
            Err(error)
        })
    }

    /// Dispatches `block(value)` to the affinity thread and reports `value`
    /// without waiting for the block to run.
    pub fn passing_on_affinity<F>(value: V, block: F) -> Self
    where
        V: Clone,
        F: FnOnce(V) + Send + 'static,
    {
        Self::new(move |ctx| {
            let copy = value.clone();
            ctx.dispatcher().dispatch(Box::new(move || block(copy)));
            async move { Ok(value) }
        })
    }

    /// Like [`passing_on_affinity`](Self::passing_on_affinity), dispatched after `delay`.
    pub fn passing_on_affinity_after<F>(value: V, delay: Duration, block: F) -> Self
    where
        V: Clone,
        F: FnOnce(V) + Send + 'static,
    {
        Self::new(move |ctx| {
            let copy = value.clone();
            ctx.dispatcher()
                .dispatch_after(delay, Box::new(move || block(copy)));
            async move { Ok(value) }
        })
    }

    /// Dispatches `block(&error)` to the affinity thread and reports `error`.
    pub fn passing_error_on_affinity<F>(error: TaskError, block: F) -> Self
    where
        F: FnOnce(&TaskError) + Send + 'static,
    {
        Self::new(move |ctx| {
            let copy = error.clone();
            ctx.dispatcher().dispatch(Box::new(move || block(&copy)));
            async move { Err(error) }
        })
    }

    // ---- configuration ----

    /// Sets the logical identity used by the controller.
    pub fn with_id(self, id: impl Into<Arc<str>>) -> Self {
        self.handle.set_id(id.into());
        self
    }

    /// Installs a hook run synchronously when the task is cancelled.
    ///
    /// A second call replaces the first hook.
    pub fn on_cancel<F>(self, hook: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.handle.set_on_cancel(Box::new(hook));
        self
    }

    /// Overrides the executor for this task (and tasks chained from it).
    pub fn with_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Overrides the affinity dispatcher for this task (and tasks chained from it).
    pub fn with_dispatcher(mut self, dispatcher: Arc<dyn Dispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    // ---- inspection ----

    /// Returns a handle that outlives the task.
    pub fn handle(&self) -> TaskHandle {
        self.handle.clone()
    }

    /// Logical identity, if set.
    pub fn id(&self) -> Option<Arc<str>> {
        self.handle.id()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TaskState {
        self.handle.state()
    }

    /// `true` if the task is ready to start.
    pub fn is_ready(&self) -> bool {
        self.handle.is_ready()
    }

    /// `true` once cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.handle.is_cancelled()
    }

    /// Cancels the task; see [`TaskHandle::cancel`].
    pub fn cancel(&self) -> bool {
        self.handle.cancel()
    }

    // ---- execution ----

    /// Submits the task to its executor; `completion` receives the result
    /// at most once, and never if the task is cancelled first.
    pub fn execute<F>(self, completion: F) -> TaskHandle
    where
        F: FnOnce(TaskResult<V>) + Send + 'static,
    {
        let executor = self.executor.clone().unwrap_or_else(default_executor);
        self.execute_on(&executor, completion)
    }

    /// Submits the task to `executor`; see [`execute`](Self::execute).
    pub fn execute_on<F>(mut self, executor: &Arc<dyn Executor>, completion: F) -> TaskHandle
    where
        F: FnOnce(TaskResult<V>) + Send + 'static,
    {
        let handle = self.handle();
        self.executor = Some(Arc::clone(executor));
        executor.submit(Box::pin(async move {
            if let Some(result) = self.drive().await {
                completion(result);
            }
        }));
        handle
    }

    /// Submits the task and discards its result.
    pub fn submit(self) -> TaskHandle {
        self.execute(|_| {})
    }

    /// Drives the task inline and returns its result.
    ///
    /// A cancelled task yields [`TaskError::Canceled`] here; completion sinks
    /// and observers are still never told.
    pub async fn run(self) -> TaskResult<V> {
        self.drive().await.unwrap_or(Err(TaskError::Canceled))
    }

    /// Submits the task and blocks the current thread until it settles.
    ///
    /// Must not be called from inside an async runtime worker.
    pub fn wait(self) -> TaskResult<V> {
        let (tx, rx) = std::sync::mpsc::channel();
        self.execute(move |result| {
            let _ = tx.send(result);
        });
        rx.recv().unwrap_or(Err(TaskError::Canceled))
    }

    /// Runs the lifecycle. `None` means the task was cancelled and nothing
    /// may be delivered.
    pub(crate) async fn drive(self) -> Option<TaskResult<V>> {
        let Task {
            handle,
            body,
            hook,
            executor,
            dispatcher,
            ..
        } = self;

        if !handle.begin() {
            return None;
        }
        if let Some(hook) = hook.as_ref().and_then(Weak::upgrade) {
            hook.task_will_run(&handle);
        }

        let ctx = TaskContext::new(
            handle.clone(),
            executor.unwrap_or_else(default_executor),
            dispatcher.unwrap_or_else(default_dispatcher),
        );
        let running = std::panic::AssertUnwindSafe(async move { body(ctx).await }).catch_unwind();

        let settled = tokio::select! {
            biased;
            _ = handle.token().cancelled() => None,
            outcome = running => Some(outcome.unwrap_or_else(|payload| {
                Err(TaskError::Panicked { message: panic_message(payload) })
            })),
        };

        let result = settled?;
        if !handle.claim_delivery() {
            return None;
        }
        if let Some(hook) = hook.as_ref().and_then(Weak::upgrade) {
            hook.task_completed(&handle, &result);
        }
        Some(result)
    }

    /// Fills in executor and dispatcher from a parent context.
    pub(crate) fn inherit(mut self, ctx: &TaskContext) -> Self {
        if self.executor.is_none() {
            self.executor = Some(Arc::clone(ctx.executor()));
        }
        if self.dispatcher.is_none() {
            self.dispatcher = Some(Arc::clone(ctx.dispatcher()));
        }
        self
    }
}

impl<V: Send + 'static> Default for Task<V> {
    fn default() -> Self {
        Self::not_implemented()
    }
}

impl<V> std::fmt::Debug for Task<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("handle", &self.handle)
            .field("chained", &self.chain.is_some())
            .finish()
    }
}

impl TaskError {
    /// Turns the error into a task that fails with it.
    pub fn into_task<V: Send + 'static>(self) -> Task<V> {
        Task::failure(self)
    }
}

/// Submits every task to its own executor, returning their handles.
pub fn execute_all<V: Send + 'static>(tasks: Vec<Task<V>>) -> Vec<TaskHandle> {
    tasks.into_iter().map(Task::submit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn success_and_failure_run_inline() {
        assert_eq!(Task::success(3).run().await.ok(), Some(3));

        let err = Task::<u8>::failure(TaskError::fail("nope")).run().await;
        assert!(matches!(err, Err(TaskError::Fail { .. })));
    }

    #[tokio::test]
    async fn default_task_is_not_implemented() {
        let res = Task::<()>::default().run().await;
        assert!(matches!(res, Err(TaskError::NotImplemented)));
    }

    #[tokio::test]
    async fn cancelled_before_start_never_runs_body() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let task = Task::new(move |_ctx| async move {
            flag.store(true, Ordering::SeqCst);
            Ok(1)
        });
        let handle = task.handle();
        assert!(task.is_ready());
        handle.cancel();
        assert!(!task.is_ready());

        assert!(task.drive().await.is_none());
        assert!(!ran.load(Ordering::SeqCst));
        assert_eq!(handle.state(), TaskState::Finished);
    }

    #[tokio::test]
    async fn cancelled_mid_flight_drops_result() {
        let (started_tx, started_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let delivered = Arc::new(AtomicUsize::new(0));

        let task = Task::new(move |_ctx| async move {
            let _ = started_tx.send(());
            let _ = release_rx.await;
            Ok(5)
        });
        let count = Arc::clone(&delivered);
        let handle = task.execute(move |_| {
            count.fetch_add(1, Ordering::SeqCst);
        });

        started_rx.await.expect("body started");
        assert!(handle.is_executing());
        handle.cancel();
        let _ = release_tx.send(());

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(delivered.load(Ordering::SeqCst), 0);
        assert!(handle.is_finished());
    }

    #[tokio::test]
    async fn completion_fires_once_with_result() {
        let (tx, rx) = oneshot::channel();
        let handle = Task::success("ok").execute(move |res| {
            let _ = tx.send(res);
        });
        let res = rx.await.expect("completion ran");
        assert_eq!(res.ok(), Some("ok"));
        assert!(handle.is_finished());
        assert!(!handle.is_cancelled());
    }

    #[tokio::test]
    async fn callback_body_reports_through_completer() {
        let task = Task::from_callback(|_ctx, done: Completer<u32>| {
            std::thread::spawn(move || done.succeed(9));
        });
        assert_eq!(task.run().await.ok(), Some(9));
    }

    #[tokio::test]
    async fn dropped_completer_abandons() {
        let task = Task::<u32>::from_callback(|_ctx, done| drop(done));
        assert!(matches!(task.run().await, Err(TaskError::Abandoned)));
    }

    #[tokio::test]
    async fn panicking_body_becomes_error() {
        let task = Task::<u8>::new(|_ctx| async move { panic!("kaboom") });
        match task.run().await {
            Err(TaskError::Panicked { message }) => assert_eq!(message, "kaboom"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn body_publishes_updates() {
        let task = Task::new(|ctx: TaskContext| async move {
            ctx.publish_update(50_u8);
            Ok(())
        });
        let handle = task.handle();
        task.run().await.expect("ok");
        assert_eq!(handle.update_as::<u8>().as_deref(), Some(&50));
    }

    #[tokio::test]
    async fn on_cancel_hook_runs_once() {
        let hits = Arc::new(AtomicUsize::new(0));
        let count = Arc::clone(&hits);
        let task = Task::success(1).on_cancel(move || {
            count.fetch_add(1, Ordering::SeqCst);
        });
        assert!(task.cancel());
        assert!(!task.cancel());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn passing_blocks_report_their_input() {
        let seen = Arc::new(AtomicUsize::new(0));
        let s = Arc::clone(&seen);
        let ok = Task::passing(4_usize, move |v| {
            s.store(*v, Ordering::SeqCst);
            Ok(())
        });
        assert_eq!(ok.run().await.ok(), Some(4));
        assert_eq!(seen.load(Ordering::SeqCst), 4);

        let failed = Task::passing(1, |_| Err(TaskError::fail("bad")));
        assert!(failed.run().await.is_err());

        let observed = Arc::new(AtomicBool::new(false));
        let o = Arc::clone(&observed);
        let res = Task::<()>::passing_error(TaskError::Canceled, move |_| {
            o.store(true, Ordering::SeqCst)
        })
        .run()
        .await;
        assert!(matches!(res, Err(TaskError::Canceled)));
        assert!(observed.load(Ordering::SeqCst));
    }

    #[test]
    fn wait_blocks_outside_runtime() {
        let res = Task::from_fn(|| Ok(11)).wait();
        assert_eq!(res.ok(), Some(11));
    }

    #[tokio::test]
    async fn execute_all_submits_every_task() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let tasks = (0..3)
            .map(|i| {
                let tx = tx.clone();
                Task::from_fn(move || {
                    let _ = tx.send(i);
                    Ok(())
                })
            })
            .collect();
        let handles = execute_all(tasks);
        assert_eq!(handles.len(), 3);

        let mut seen = Vec::new();
        for _ in 0..3 {
            seen.push(rx.recv().await.expect("task ran"));
        }
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn identity_round_trips() {
        let task = Task::success(()).with_id("profile");
        assert_eq!(task.id().as_deref(), Some("profile"));
        assert_eq!(task.state(), TaskState::Ready);
    }
}
