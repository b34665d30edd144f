//! # Combinators: tasks built out of other tasks.
//!
//! Every combinator returns a new [`Task`] (a *chain node*) whose body runs the
//! upstream task, then a step. All nodes of one chain share a single recovery
//! slot, so a [`catch`](Task::catch) attached at the end covers every step.
//!
//! ```text
//! a.then(f).map(g).catch(h)
//!
//!   node2 (map g) ── tracks ──► node1 (then f) ── tracks ──► a
//!      │                           │
//!      └────── ChainShared { recovery: h } ◄──┘
//! ```
//!
//! ## Failure routing
//! - A failure *originating* at a step (upstream task outside the chain, a
//!   produced task, a failing producer/transform/consumer, a fan-out
//!   sub-task) goes to the recovery handler: a recovery task runs the handler
//!   and the node still reports the original error.
//! - A failure arriving from an upstream node of the *same* chain was already
//!   handled there and is only propagated.
//!
//! The handler therefore runs once per failure, however deep the chain.
//!
//! ## Cancellation
//! A node tracks the operation it currently waits on (upstream, produced
//! task, recovery task, or every fan-out sub-task). Cancelling the node
//! cascades to them first.

mod affinity;
mod fan_out;
mod sequence;

use std::future::Future;
use std::sync::{Arc, Mutex};

use futures::FutureExt;

use crate::error::{TaskError, TaskResult};
use crate::sync::lock;
use crate::tasks::{Body, Task, TaskContext};

pub use fan_out::join_all;

/// Recovery handler stored on a chain.
pub(crate) type Handler = Arc<dyn Fn(&TaskError) + Send + Sync>;

/// Where a recovery handler runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Placement {
    /// On the executor running the chain.
    Worker,
    /// Dispatched to the affinity thread; not awaited.
    Affinity,
}

#[derive(Clone)]
struct Recovery {
    handler: Handler,
    placement: Placement,
}

/// State shared by every node of one chain.
#[derive(Default)]
pub(crate) struct ChainShared {
    recovery: Mutex<Option<Recovery>>,
}

impl ChainShared {
    /// Installs the handler; a later call overwrites it.
    pub(crate) fn set_handler(&self, handler: Handler, placement: Placement) {
        *lock(&self.recovery) = Some(Recovery { handler, placement });
    }

    fn recovery(&self) -> Option<Recovery> {
        lock(&self.recovery).clone()
    }
}

/// A running chain step: the node's context plus its chain.
pub(crate) struct Link {
    ctx: TaskContext,
    chain: Arc<ChainShared>,
    placement: Option<Placement>,
}

impl Link {
    pub(crate) fn ctx(&self) -> &TaskContext {
        &self.ctx
    }

    pub(crate) fn has_handler(&self) -> bool {
        lock(&self.chain.recovery).is_some()
    }

    fn owns<T>(&self, task: &Task<T>) -> bool {
        task.chain
            .as_ref()
            .is_some_and(|chain| Arc::ptr_eq(chain, &self.chain))
    }

    /// Runs `task` as the node's tracked operation.
    pub(crate) async fn run<T: Send + 'static>(&self, task: Task<T>) -> TaskResult<T> {
        self.ctx.handle().track(vec![task.handle()]);
        task.inherit(&self.ctx)
            .drive()
            .await
            .unwrap_or(Err(TaskError::Canceled))
    }

    /// Runs `task` and recovers its failure unless it belongs to this chain.
    pub(crate) async fn follow<T: Send + 'static>(&self, task: Task<T>) -> TaskResult<T> {
        let own = self.owns(&task);
        match self.run(task).await {
            Err(e) if !own => Err(self.recover(e).await),
            other => other,
        }
    }

    /// Runs the recovery handler (if any) for `error` and hands it back.
    pub(crate) async fn recover(&self, error: TaskError) -> TaskError {
        let Some(Recovery { handler, placement }) = self.chain.recovery() else {
            return error;
        };
        let placement = self.placement.or(self.ctx.recovery()).unwrap_or(placement);
        let step = match placement {
            Placement::Worker => {
                Task::<()>::passing_error(error.clone(), move |e: &TaskError| handler(e))
            }
            Placement::Affinity => {
                Task::<()>::passing_error_on_affinity(error.clone(), move |e: &TaskError| {
                    handler(e)
                })
            }
        };
        // The recovery task reports the error it was given.
        let _ = self.run(step).await;
        error
    }
}

/// Wraps `upstream` in a new node of its chain (or of a fresh chain).
///
/// `placement` overrides where upstream failures are recovered.
pub(crate) fn extend<V, W, F, Fut>(upstream: Task<V>, placement: Option<Placement>, step: F) -> Task<W>
where
    V: Send + 'static,
    W: Send + 'static,
    F: FnOnce(Link, V) -> Fut + Send + 'static,
    Fut: Future<Output = TaskResult<W>> + Send + 'static,
{
    let chain = upstream.chain.clone().unwrap_or_default();
    let executor = upstream.executor.clone();
    let dispatcher = upstream.dispatcher.clone();
    let id = upstream.id();
    let upstream_handle = upstream.handle();

    let shared = Arc::clone(&chain);
    let body: Body<W> = Box::new(move |ctx| {
        let link = Link {
            ctx,
            chain: shared,
            placement,
        };
        async move {
            let value = link.follow(upstream).await?;
            step(link, value).await
        }
        .boxed()
    });

    let mut node = Task::from_body(body);
    node.chain = Some(chain);
    node.executor = executor;
    node.dispatcher = dispatcher;
    if let Some(id) = id {
        node.handle.set_id(id);
    }
    node.handle.track(vec![upstream_handle]);
    node
}

/// Appends `step` to the current node in place when `task` is already a
/// chain node, keeping its handle; otherwise behaves like [`extend`].
pub(crate) fn amend<V, F, Fut>(task: Task<V>, placement: Option<Placement>, step: F) -> Task<V>
where
    V: Send + 'static,
    F: FnOnce(Link, V) -> Fut + Send + 'static,
    Fut: Future<Output = TaskResult<V>> + Send + 'static,
{
    let Some(chain) = task.chain.clone() else {
        return extend(task, placement, step);
    };
    let Task {
        handle,
        body: inner,
        hook,
        executor,
        dispatcher,
        ..
    } = task;

    let shared = Arc::clone(&chain);
    let body: Body<V> = Box::new(move |ctx: TaskContext| {
        // The wrapped body recovers its failures where this step would.
        let ctx = ctx.with_recovery(placement);
        let link = Link {
            ctx: ctx.clone(),
            chain: shared,
            placement,
        };
        async move {
            let value = inner(ctx).await?;
            step(link, value).await
        }
        .boxed()
    });

    Task {
        handle,
        body,
        chain: Some(chain),
        hook,
        executor,
        dispatcher,
    }
}

/// Attaches a recovery handler, wrapping plain tasks in a pass-through node.
pub(crate) fn attach<V: Send + 'static>(task: Task<V>, handler: Handler, placement: Placement) -> Task<V> {
    let task = if task.chain.is_some() {
        task
    } else {
        extend(task, None, |_link, value| async move { Ok(value) })
    };
    if let Some(chain) = &task.chain {
        chain.set_handler(handler, placement);
    }
    task
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, Handler) {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let handler: Handler = Arc::new(move |_e: &TaskError| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        (hits, handler)
    }

    #[tokio::test]
    async fn extend_shares_the_chain() {
        let first = extend(Task::success(1), None, |_l, v| async move { Ok(v + 1) });
        let second = extend(first, None, |_l, v| async move { Ok(v * 10) });
        assert!(second.chain.is_some());
        assert_eq!(second.run().await.ok(), Some(20));
    }

    #[tokio::test]
    async fn amend_keeps_handle_identity() {
        let node = extend(Task::success(2), None, |_l, v| async move { Ok(v) });
        let before = node.handle();
        let node = amend(node, None, |_l, v| async move { Ok(v + 1) });
        assert_eq!(node.handle(), before);
        assert_eq!(node.run().await.ok(), Some(3));
    }

    #[tokio::test]
    async fn foreign_failure_is_recovered_once_per_chain() {
        let (hits, handler) = counter();
        let chain = extend(
            Task::<u8>::failure(TaskError::fail("root")),
            None,
            |_l, v| async move { Ok(v) },
        );
        let chain = extend(chain, None, |_l, v| async move { Ok(v) });
        let chain = attach(chain, handler, Placement::Worker);

        assert!(chain.run().await.is_err());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn attach_overwrites_previous_handler() {
        let (first, h1) = counter();
        let (second, h2) = counter();
        let task = attach(Task::<()>::failure(TaskError::Canceled), h1, Placement::Worker);
        let task = attach(task, h2, Placement::Worker);

        assert!(task.run().await.is_err());
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn node_tracks_its_upstream_before_running() {
        let upstream = Task::success(());
        let up = upstream.handle();
        let node = extend(upstream, None, |_l, v| async move { Ok(v) });
        assert_eq!(node.handle().tracked_len(), 1);
        node.cancel();
        assert!(up.is_cancelled());
    }

    #[tokio::test]
    async fn upstream_cancelled_alone_reports_canceled() {
        let upstream = Task::success(1);
        upstream.cancel();
        let node = extend(upstream, None, |_l, v| async move { Ok(v) });
        assert!(matches!(node.run().await, Err(TaskError::Canceled)));
    }
}
