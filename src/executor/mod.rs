//! # Executor adapter.
//!
//! The core never owns worker threads. It needs exactly two things from the
//! outside world:
//!
//! ```text
//!   Executor::submit(job)                       fire-and-forget
//!   Executor::submit_batch_and_wait(jobs).await barrier used by fan-out
//! ```
//!
//! [`TokioExecutor`] implements both on top of a tokio runtime. A process-wide
//! default instance is created lazily by [`default_executor`]; it can be
//! replaced once with [`install_default_executor`], and every task can
//! override it with [`Task::with_executor`](crate::Task::with_executor).
//!
//! Affinity-thread dispatch lives in [`affinity`].

pub mod affinity;
mod error;
mod tokio_pool;

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use futures::future::BoxFuture;

pub use affinity::{AffinityThread, Callback, Dispatcher, InlineDispatcher, default_dispatcher, install_default_dispatcher};
pub use error::ExecutorError;
pub use tokio_pool::TokioExecutor;

/// Unit of work submitted to an [`Executor`].
pub type Job = BoxFuture<'static, ()>;

/// Worker pool abstraction.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use taskchain::executor::{Executor, Job};
///
/// /// Runs everything on the caller's runtime, one job at a time.
/// struct Sequential;
///
/// #[async_trait]
/// impl Executor for Sequential {
///     fn submit(&self, job: Job) {
///         tokio::spawn(job);
///     }
///
///     async fn submit_batch_and_wait(&self, jobs: Vec<Job>) {
///         for job in jobs {
///             job.await;
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait Executor: Send + Sync + 'static {
    /// Schedules `job` to run later on some worker.
    fn submit(&self, job: Job);

    /// Schedules every job and resolves once all of them have finished.
    async fn submit_batch_and_wait(&self, jobs: Vec<Job>);
}

static DEFAULT_EXECUTOR: OnceLock<Arc<dyn Executor>> = OnceLock::new();

/// Returns the process-wide executor, creating a [`TokioExecutor`] on first use.
pub fn default_executor() -> Arc<dyn Executor> {
    Arc::clone(DEFAULT_EXECUTOR.get_or_init(|| Arc::new(TokioExecutor::new())))
}

/// Installs the process-wide executor.
///
/// Fails if the default was already installed or already used.
pub fn install_default_executor(executor: Arc<dyn Executor>) -> Result<(), ExecutorError> {
    DEFAULT_EXECUTOR
        .set(executor)
        .map_err(|_| ExecutorError::AlreadyInstalled)
}
