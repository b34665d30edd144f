//! # Tasks: deferred work with a race-free lifecycle.
//!
//! - [`Task`] - the unit of work; consumed by execution
//! - [`TaskHandle`] - cloneable view of a task's lifecycle, valid after it ran
//! - [`TaskState`] - `Ready → Executing → Finished`
//! - [`TaskContext`] / [`Completer`] - what a body sees while running
//!
//! Combinators that build tasks out of other tasks live in [`chain`](crate::chain).

mod context;
mod handle;
mod state;
mod task;

pub use context::{Completer, TaskContext};
pub use handle::TaskHandle;
pub use state::TaskState;
pub use task::{Task, execute_all};

pub(crate) use handle::CancelHook;
pub(crate) use task::{Body, LifecycleHook};
