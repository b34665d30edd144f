//! Sequencing combinators: `then`, `map`, `inspect`, `catch`.

use std::sync::Arc;

use super::{Placement, amend, attach, extend};
use crate::error::{TaskError, TaskResult};
use crate::tasks::Task;

impl<V: Send + 'static> Task<V> {
    /// Runs the task produced by `producer` from this task's value.
    ///
    /// A failure of this task, of the producer or of the produced task is
    /// handed to the chain's recovery handler (if any) and reported.
    pub fn then<W, F>(self, producer: F) -> Task<W>
    where
        W: Send + 'static,
        F: FnOnce(V) -> TaskResult<Task<W>> + Send + 'static,
    {
        extend(self, None, |link, value| async move {
            match producer(value) {
                Ok(next) => link.follow(next).await,
                Err(e) => Err(link.recover(e).await),
            }
        })
    }

    /// Like [`then`](Self::then), for producers that ignore the value.
    pub fn then_discarding<W, F>(self, producer: F) -> Task<W>
    where
        W: Send + 'static,
        F: FnOnce() -> TaskResult<Task<W>> + Send + 'static,
    {
        self.then(move |_| producer())
    }

    /// Transforms the value.
    pub fn map<W, F>(self, transform: F) -> Task<W>
    where
        W: Send + 'static,
        F: FnOnce(V) -> W + Send + 'static,
    {
        self.try_map(move |value| Ok(transform(value)))
    }

    /// Transforms the value with a fallible function; its failure is handed
    /// to the recovery handler and reported.
    pub fn try_map<W, F>(self, transform: F) -> Task<W>
    where
        W: Send + 'static,
        F: FnOnce(V) -> TaskResult<W> + Send + 'static,
    {
        extend(self, None, |link, value| async move {
            match transform(value) {
                Ok(mapped) => Ok(mapped),
                Err(e) => Err(link.recover(e).await),
            }
        })
    }

    /// Runs a side effect on the value and passes the value on.
    ///
    /// If `consumer` fails and the chain has a recovery handler, the handler
    /// runs and the original value is still reported; without a handler the
    /// consumer's failure is reported.
    pub fn inspect<F>(self, consumer: F) -> Task<V>
    where
        F: FnOnce(&V) -> TaskResult<()> + Send + 'static,
    {
        amend(self, None, |link, value| async move {
            match consumer(&value) {
                Ok(()) => Ok(value),
                Err(e) if link.has_handler() => {
                    link.recover(e).await;
                    Ok(value)
                }
                Err(e) => Err(e),
            }
        })
    }

    /// Sets the chain's recovery handler, replacing any previous one.
    ///
    /// The handler observes failures; it cannot turn them into values.
    pub fn catch<H>(self, handler: H) -> Task<V>
    where
        H: Fn(&TaskError) + Send + Sync + 'static,
    {
        attach(self, Arc::new(handler), Placement::Worker)
    }
}
