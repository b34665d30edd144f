//! # Tokio-backed executor.
//!
//! ```text
//! submit(job)
//!   ├─ pinned handle        ─► handle.spawn(job)
//!   ├─ inside a runtime     ─► Handle::current().spawn(job)
//!   └─ outside any runtime  ─► fallback multi-thread runtime (lazy, process-wide)
//!
//! submit_batch_and_wait(jobs)
//!   └─► JoinSet::spawn_on(job, handle) for each, then drain join_next()
//! ```
//!
//! The ambient lookup happens per call, so one executor instance serves every
//! runtime it is used from (tests create many).

use std::sync::LazyLock;

use async_trait::async_trait;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinSet;

use super::{Executor, Job};

/// Runtime used when work is submitted from a thread with no tokio context.
static FALLBACK: LazyLock<std::io::Result<Runtime>> = LazyLock::new(|| {
    Builder::new_multi_thread()
        .thread_name("taskchain-worker")
        .enable_all()
        .build()
});

/// Executor spawning jobs onto a tokio runtime.
#[derive(Clone, Debug, Default)]
pub struct TokioExecutor {
    handle: Option<Handle>,
}

impl TokioExecutor {
    /// Uses whichever runtime is current at submission time.
    pub fn new() -> Self {
        Self { handle: None }
    }

    /// Pins the executor to a specific runtime.
    pub fn with_handle(handle: Handle) -> Self {
        Self {
            handle: Some(handle),
        }
    }

    fn resolve(&self) -> Option<Handle> {
        if let Some(handle) = &self.handle {
            return Some(handle.clone());
        }
        if let Ok(handle) = Handle::try_current() {
            return Some(handle);
        }
        match &*FALLBACK {
            Ok(rt) => Some(rt.handle().clone()),
            Err(e) => {
                eprintln!("[executor] fallback runtime unavailable: {e}");
                None
            }
        }
    }
}

#[async_trait]
impl Executor for TokioExecutor {
    fn submit(&self, job: Job) {
        if let Some(handle) = self.resolve() {
            handle.spawn(job);
        }
    }

    async fn submit_batch_and_wait(&self, jobs: Vec<Job>) {
        let Some(handle) = self.resolve() else { return };

        let mut set = JoinSet::new();
        for job in jobs {
            set.spawn_on(job, &handle);
        }
        while let Some(joined) = set.join_next().await {
            if let Err(e) = joined {
                if e.is_panic() {
                    eprintln!("[executor] batch job panicked: {e}");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn batch_waits_for_every_job() {
        let exec = TokioExecutor::new();
        let done = Arc::new(AtomicUsize::new(0));

        let jobs: Vec<Job> = (0..8_u64)
            .map(|i| {
                let done = Arc::clone(&done);
                Box::pin(async move {
                    tokio::time::sleep(Duration::from_millis(8 - i)).await;
                    done.fetch_add(1, Ordering::SeqCst);
                }) as Job
            })
            .collect();

        exec.submit_batch_and_wait(jobs).await;
        assert_eq!(done.load(Ordering::SeqCst), 8);
    }

    #[tokio::test]
    async fn empty_batch_returns_immediately() {
        TokioExecutor::new().submit_batch_and_wait(Vec::new()).await;
    }

    #[tokio::test]
    async fn submit_runs_on_current_runtime() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        TokioExecutor::new().submit(Box::pin(async move {
            let _ = tx.send(7_u8);
        }));
        assert_eq!(rx.await.ok(), Some(7));
    }

    #[test]
    fn submit_outside_runtime_uses_fallback() {
        let (tx, rx) = std::sync::mpsc::channel();
        TokioExecutor::new().submit(Box::pin(async move {
            let _ = tx.send(Handle::try_current().is_ok());
        }));
        let ran_in_runtime = rx.recv_timeout(Duration::from_secs(5));
        assert_eq!(ran_in_runtime.ok(), Some(true));
    }
}
