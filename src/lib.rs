//! # taskchain
//!
//! **Taskchain** is a composable task library for Rust: units of deferred
//! async work that can be chained, transformed, recovered from failure, fanned
//! out over collections, run on a background executor and cancelled, with
//! results delivered at most once.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   Task<V> ──then/map/inspect──► Task<W> ──then_all──► Task<Vec<X>> ──catch──► ...
//!      │            (chain nodes share one recovery slot, track their upstream)
//!      ▼
//!  execute(completion) / run().await / wait()          Controller<V>
//!      │                                               ┌────────────────────────┐
//!      ▼                                               │ identity → TaskHandle  │
//! ┌──────────────────────────┐    submit(job)          │ identity → observers   │
//! │ Executor (TokioExecutor) │◄────────────────────────┤  (weak, by ObserverId) │
//! │  submit / batch barrier  │                         └───────────┬────────────┘
//! └──────────────────────────┘                                     │ publish
//! ┌──────────────────────────┐                                     ▼
//! │ Dispatcher (affinity     │                       Bus ──► SubscriberSet ──► LogWriter, ...
//! │ thread, fire-and-forget) │
//! └──────────────────────────┘
//! ```
//!
//! ### Lifecycle
//! ```text
//! Ready ──begin──► Executing ──deliver──► Finished
//!   │                  │
//!   └──── cancel ──────┴──────────────────► Finished (cancelled; result dropped)
//! ```
//! - Completion fires at most once and never after a cancellation.
//! - Cancelling a chain node cascades to the operations it waits on first.
//!
//! ## Features
//! | Area              | Description                                                     | Key types / traits                         |
//! |-------------------|-----------------------------------------------------------------|--------------------------------------------|
//! | **Tasks**         | Deferred work with a race-free lifecycle.                       | [`Task`], [`TaskHandle`], [`TaskContext`]  |
//! | **Combinators**   | Sequencing, mapping, recovery, fan-out, affinity continuations. | [`Task::then`], [`Task::then_all`], [`join_all`] |
//! | **Controller**    | One in-flight task per identity, observers per identity.        | [`Controller`], [`Observe`]                |
//! | **Executors**     | Worker pool and affinity-thread adapters.                       | [`Executor`], [`Dispatcher`]               |
//! | **Subscriber API**| Hook into controller events (logging, metrics).                 | [`Subscribe`], [`Event`]                   |
//! | **Errors**        | Typed errors for tasks and the controller.                      | [`TaskError`], [`ControllerError`]         |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] _(demo/reference only)_.
//!
//! ## Example
//! ```rust
//! use taskchain::{Task, TaskError};
//!
//! #[tokio::main(flavor = "multi_thread", worker_threads = 2)]
//! async fn main() {
//!     let total = Task::success(vec![1_u32, 2, 3])
//!         .then_all(|ids| Ok(ids.into_iter().map(|id| Task::success(id * 10)).collect()))
//!         .map(|prices: Vec<u32>| prices.iter().sum::<u32>())
//!         .catch(|err: &TaskError| eprintln!("pricing failed: {err}"));
//!
//!     assert_eq!(total.run().await.ok(), Some(60));
//! }
//! ```

mod chain;
mod controller;
mod error;
mod events;
pub mod executor;
mod subscribers;
mod sync;
mod tasks;

// ---- Public re-exports ----

pub use chain::join_all;
pub use controller::{Controller, ControllerBuilder, ControllerConfig, ControllerError, ObserverId, Observe};
pub use error::{TaskError, TaskResult};
pub use events::{Bus, Event, EventKind};
pub use executor::{Dispatcher, Executor, ExecutorError, TokioExecutor};
pub use subscribers::{Subscribe, SubscriberSet};
pub use tasks::{Completer, Task, TaskContext, TaskHandle, TaskState, execute_all};

// Optional: expose a simple built-in logger subscriber (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
