//! # Fan-out / fan-in over an ordered list of sub-tasks.
//!
//! ```text
//! then_all(producer):
//!   upstream ok ─► producer(value) ─► [t0, t1, .. tn-1]
//!      ├─ n == 0 ─► Ok(vec![])
//!      └─ track all, submit_batch_and_wait(jobs)      (the only barrier)
//!            each job: drive(ti) ─► slots.push((i, result))
//!         sort slots by i
//!         every failure ─► recovery handler (individually)
//!         any failure   ─► Err(lowest-index error), values discarded
//!         otherwise     ─► Ok(values in submission order)
//! ```

use std::sync::{Arc, Mutex};

use super::{Link, extend};
use crate::error::{TaskError, TaskResult};
use crate::executor::Job;
use crate::sync::lock;
use crate::tasks::Task;

impl<V: Send + 'static> Task<V> {
    /// Runs every task produced from this task's value as one batch and
    /// collects their values in submission order.
    ///
    /// Each failing sub-task is handed to the recovery handler; if any failed,
    /// the combinator fails with the error of the lowest-indexed failure.
    ///
    /// # Example
    /// ```
    /// use taskchain::Task;
    ///
    /// # #[tokio::main(flavor = "multi_thread", worker_threads = 2)]
    /// # async fn main() {
    /// let squares = Task::success(vec![1, 2, 3])
    ///     .then_all(|xs| Ok(xs.into_iter().map(|x| Task::success(x * x)).collect()));
    ///
    /// assert_eq!(squares.run().await.ok(), Some(vec![1, 4, 9]));
    /// # }
    /// ```
    pub fn then_all<W, F>(self, producer: F) -> Task<Vec<W>>
    where
        W: Send + 'static,
        F: FnOnce(V) -> TaskResult<Vec<Task<W>>> + Send + 'static,
    {
        extend(self, None, |link, value| async move {
            match producer(value) {
                Ok(tasks) => gather(&link, tasks).await,
                Err(e) => Err(link.recover(e).await),
            }
        })
    }
}

/// Runs `tasks` as one batch and collects their values in order.
pub fn join_all<W: Send + 'static>(tasks: Vec<Task<W>>) -> Task<Vec<W>> {
    Task::success(()).then_all(move |()| Ok(tasks))
}

async fn gather<W: Send + 'static>(link: &Link, tasks: Vec<Task<W>>) -> TaskResult<Vec<W>> {
    let total = tasks.len();
    if total == 0 {
        return Ok(Vec::new());
    }

    let ctx = link.ctx();
    ctx.handle()
        .track(tasks.iter().map(Task::handle).collect());

    let slots: Arc<Mutex<Vec<(usize, TaskResult<W>)>>> = Arc::new(Mutex::new(Vec::with_capacity(total)));
    let jobs: Vec<Job> = tasks
        .into_iter()
        .enumerate()
        .map(|(index, task)| {
            let task = task.inherit(ctx);
            let slots = Arc::clone(&slots);
            Box::pin(async move {
                let result = task.drive().await.unwrap_or(Err(TaskError::Canceled));
                lock(&slots).push((index, result));
            }) as Job
        })
        .collect();

    ctx.executor().submit_batch_and_wait(jobs).await;

    let mut settled = std::mem::take(&mut *lock(&slots));
    settled.sort_by_key(|(index, _)| *index);

    let mut settled = settled.into_iter().peekable();
    let mut values = Vec::with_capacity(total);
    let mut first_error = None;
    for index in 0..total {
        let result = match settled.next_if(|(i, _)| *i == index) {
            Some((_, result)) => result,
            None => Err(TaskError::Abandoned),
        };
        match result {
            Ok(value) => values.push(value),
            Err(e) => {
                let e = link.recover(e).await;
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(values),
    }
}
