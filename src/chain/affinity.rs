//! Continuations and recovery handlers dispatched to the affinity thread.
//!
//! The dispatch is fire-and-forget: the node reports as soon as the callback
//! is scheduled, never waiting for it to run.

use std::sync::Arc;
use std::time::Duration;

use super::{Placement, amend, attach};
use crate::error::TaskError;
use crate::tasks::Task;

impl<V: Clone + Send + 'static> Task<V> {
    /// Schedules `continuation(value)` on the affinity thread and reports the
    /// value once scheduled.
    ///
    /// Failures go to the recovery handler, dispatched to the affinity thread.
    pub fn then_on_affinity<F>(self, continuation: F) -> Task<V>
    where
        F: FnOnce(V) + Send + 'static,
    {
        amend(self, Some(Placement::Affinity), |link, value| async move {
            let copy = value.clone();
            link.ctx()
                .dispatcher()
                .dispatch(Box::new(move || continuation(copy)));
            Ok(value)
        })
    }

    /// Like [`then_on_affinity`](Self::then_on_affinity), with the
    /// continuation dispatched after `delay`.
    pub fn then_on_affinity_after<F>(self, delay: Duration, continuation: F) -> Task<V>
    where
        F: FnOnce(V) + Send + 'static,
    {
        amend(self, Some(Placement::Affinity), move |link, value| async move {
            let copy = value.clone();
            link.ctx()
                .dispatcher()
                .dispatch_after(delay, Box::new(move || continuation(copy)));
            Ok(value)
        })
    }
}

impl<V: Send + 'static> Task<V> {
    /// Sets the chain's recovery handler, run on the affinity thread.
    ///
    /// Replaces any previous handler, including one set with [`catch`](Self::catch).
    pub fn catch_on_affinity<H>(self, handler: H) -> Task<V>
    where
        H: Fn(&TaskError) + Send + Sync + 'static,
    {
        attach(self, Arc::new(handler), Placement::Affinity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread::ThreadId;

    use crate::executor::{AffinityThread, Dispatcher};

    fn affinity() -> (AffinityThread, Arc<dyn Dispatcher>) {
        let thread = AffinityThread::spawn("chain-affinity").expect("spawn");
        let dispatcher: Arc<dyn Dispatcher> = Arc::new(thread.clone());
        (thread, dispatcher)
    }

    #[tokio::test]
    async fn continuation_runs_on_affinity_thread() {
        let (thread, dispatcher) = affinity();
        let (tx, rx) = mpsc::channel::<(u8, ThreadId)>();

        let res = Task::success(4_u8)
            .with_dispatcher(dispatcher)
            .then_on_affinity(move |v| {
                let _ = tx.send((v, std::thread::current().id()));
            })
            .run()
            .await;

        assert_eq!(res.ok(), Some(4));
        let (v, id) = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("continuation ran");
        assert_eq!(v, 4);
        assert_eq!(id, thread.thread_id());
    }

    #[tokio::test]
    async fn delayed_continuation_does_not_hold_the_result() {
        let (_thread, dispatcher) = affinity();
        let (tx, rx) = mpsc::channel();
        let started = std::time::Instant::now();

        let res = Task::success("done")
            .with_dispatcher(dispatcher)
            .then_on_affinity_after(Duration::from_millis(200), move |v| {
                let _ = tx.send(v);
            })
            .run()
            .await;
        assert_eq!(res.ok(), Some("done"));
        assert!(started.elapsed() < Duration::from_millis(200));

        let v = rx.recv_timeout(Duration::from_secs(5)).expect("ran later");
        assert_eq!(v, "done");
        assert!(started.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn failure_handler_dispatched_to_affinity_thread() {
        let (thread, dispatcher) = affinity();
        let (tx, rx) = mpsc::channel();
        let continuation_ran = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = Arc::clone(&continuation_ran);

        let res = Task::<u8>::failure(TaskError::fail("upstream"))
            .with_dispatcher(dispatcher)
            .then_on_affinity(move |_| flag.store(true, std::sync::atomic::Ordering::SeqCst))
            .catch(move |e| {
                let _ = tx.send((e.as_label(), std::thread::current().id()));
            })
            .run()
            .await;

        assert!(res.is_err());
        let (label, id) = rx.recv_timeout(Duration::from_secs(5)).expect("handler ran");
        assert_eq!(label, "task_failed");
        assert_eq!(id, thread.thread_id());
        assert!(!continuation_ran.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn chained_upstream_failure_recovered_on_affinity_thread() {
        let (thread, dispatcher) = affinity();
        let (tx, rx) = mpsc::channel();

        let res = Task::<u8>::failure(TaskError::fail("upstream"))
            .with_dispatcher(dispatcher)
            .map(|v| v)
            .then_on_affinity(|_| {})
            .catch(move |_| {
                let _ = tx.send(std::thread::current().id());
            })
            .run()
            .await;

        assert!(res.is_err());
        let id = rx.recv_timeout(Duration::from_secs(5)).expect("handler ran");
        assert_eq!(id, thread.thread_id());
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[tokio::test]
    async fn catch_on_affinity_runs_handler_there() {
        let (thread, dispatcher) = affinity();
        let (tx, rx) = mpsc::channel();

        let res = Task::success(1)
            .with_dispatcher(dispatcher)
            .try_map(|_: i32| Err::<i32, _>(TaskError::NotImplemented))
            .catch_on_affinity(move |_| {
                let _ = tx.send(std::thread::current().id());
            })
            .run()
            .await;

        assert!(res.is_err());
        let id = rx.recv_timeout(Duration::from_secs(5)).expect("handler ran");
        assert_eq!(id, thread.thread_id());
    }
}
