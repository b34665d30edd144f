//! # Identity controller.
//!
//! Keeps at most one in-flight task per identity and fans task lifecycle out
//! to the observers registered for that identity.
//!
//! ```text
//! execute(task "feed")
//!   ├─ no identity             ─► Err(MissingIdentity)
//!   ├─ registry["feed"] = task (returns the previous task, if any)
//!   ├─ previous.cancel()       ─► observers.on_cancelled(previous), TaskSuperseded
//!   ├─ already cancelled       ─► evict, observers.on_cancelled, not submitted
//!   └─ submit(task)
//!        ├─ will run           ─► observers.on_will_run, TaskStarting
//!        ├─ completed          ─► evict (unless retain_finished), observers.on_completed
//!        └─ cancelled          ─► evict, observers.on_cancelled
//! ```
//!
//! ## Rules
//! - One mutex guards the registry; it is never held while calling tasks or observers.
//! - An entry is only evicted by its own task, never by a superseded one.
//! - Dropping the last controller handle cancels every registered task.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use super::builder::ControllerBuilder;
use super::config::ControllerConfig;
use super::error::ControllerError;
use super::observer::{ObserverId, Observe};
use super::registry::Registry;
use crate::error::{TaskResult, panic_message};
use crate::events::{Bus, Event, EventKind};
use crate::executor::{Executor, default_executor};
use crate::sync::lock;
use crate::tasks::{CancelHook, LifecycleHook, Task, TaskHandle};

pub(super) struct Inner<V> {
    config: ControllerConfig,
    executor: Option<Arc<dyn Executor>>,
    bus: Bus,
    registry: Mutex<Registry<V>>,
    /// Stops the subscriber listener when the controller goes away.
    shutdown: CancellationToken,
}

/// Registry of in-flight tasks keyed by identity.
///
/// Cheap to clone; clones share the registry. Dropping the last clone
/// cancels every registered task.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use taskchain::{Controller, Observe, ObserverId, Task, TaskHandle, TaskResult};
///
/// struct Screen(ObserverId);
///
/// impl Observe<u32> for Screen {
///     fn observer_id(&self) -> ObserverId { self.0 }
///     fn on_completed(&self, _task: &TaskHandle, result: &TaskResult<u32>) {
///         println!("balance: {result:?}");
///     }
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let controller = Controller::<u32>::default();
/// let screen = Arc::new(Screen(ObserverId::next()));
/// controller.add_observer("balance", &screen);
///
/// controller
///     .execute(Task::success(100).with_id("balance"))
///     .expect("task has an identity");
/// # }
/// ```
pub struct Controller<V> {
    inner: Arc<Inner<V>>,
}

impl<V> Clone for Controller<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V: Send + 'static> Default for Controller<V> {
    fn default() -> Self {
        Self::new(ControllerConfig::default())
    }
}

impl<V: Send + 'static> Controller<V> {
    /// Creates a controller with no subscribers.
    pub fn new(config: ControllerConfig) -> Self {
        ControllerBuilder::new(config).build()
    }

    /// Starts a builder.
    pub fn builder(config: ControllerConfig) -> ControllerBuilder<V> {
        ControllerBuilder::new(config)
    }

    pub(super) fn from_parts(
        config: ControllerConfig,
        executor: Option<Arc<dyn Executor>>,
        bus: Bus,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                executor,
                bus,
                registry: Mutex::new(Registry::new()),
                shutdown,
            }),
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &ControllerConfig {
        &self.inner.config
    }

    /// Receiver of controller events published from now on.
    pub fn events(&self) -> broadcast::Receiver<Event> {
        self.inner.bus.subscribe()
    }

    // ---- execution ----

    /// Registers `task` under its identity and submits it.
    ///
    /// A task already registered under the same identity is cancelled first.
    /// The task runs on its own executor override, else the controller's,
    /// else the process default.
    pub fn execute(&self, task: Task<V>) -> Result<TaskHandle, ControllerError> {
        let id = task
            .id()
            .filter(|id| !id.is_empty())
            .ok_or(ControllerError::MissingIdentity)?;
        Ok(self.admit(id, task))
    }

    /// Executes every task; none is submitted if any lacks an identity.
    pub fn execute_all(&self, tasks: Vec<Task<V>>) -> Result<Vec<TaskHandle>, ControllerError> {
        let mut admitted = Vec::with_capacity(tasks.len());
        for task in tasks {
            let id = task
                .id()
                .filter(|id| !id.is_empty())
                .ok_or(ControllerError::MissingIdentity)?;
            admitted.push((id, task));
        }
        Ok(admitted
            .into_iter()
            .map(|(id, task)| self.admit(id, task))
            .collect())
    }

    fn admit(&self, id: Arc<str>, mut task: Task<V>) -> TaskHandle {
        let handle = task.handle();

        let previous = lock(&self.inner.registry).admit(Arc::clone(&id), handle.clone());
        if let Some(previous) = previous.filter(|p| *p != handle) {
            self.inner.bus.publish(
                Event::new(EventKind::TaskSuperseded)
                    .with_task(Arc::clone(&id))
                    .with_uid(previous.uid()),
            );
            previous.cancel();
        }

        self.inner.bus.publish(
            Event::new(EventKind::TaskAdmitted)
                .with_task(id)
                .with_uid(handle.uid()),
        );

        let cancel_hook: Weak<dyn CancelHook> = Arc::downgrade(&self.inner) as Weak<Inner<V>>;
        if !handle.set_cancel_hook(cancel_hook) {
            // Cancelled before it reached the controller.
            self.inner.task_cancelled(&handle);
            return handle;
        }
        let lifecycle: Weak<dyn LifecycleHook<V>> = Arc::downgrade(&self.inner) as Weak<Inner<V>>;
        task.hook = Some(lifecycle);

        let executor = task
            .executor
            .clone()
            .or_else(|| self.inner.executor.clone())
            .unwrap_or_else(default_executor);
        task.execute_on(&executor, |_| {})
    }

    // ---- cancellation ----

    /// Cancels the task registered under `id`. Returns `false` if there is
    /// none or it already finished.
    pub fn cancel_task(&self, id: &str) -> bool {
        let task = lock(&self.inner.registry).get(id).cloned();
        task.is_some_and(|t| t.cancel())
    }

    /// Cancels every registered task.
    pub fn cancel_all(&self) {
        let tasks = lock(&self.inner.registry).tasks();
        for task in tasks {
            task.cancel();
        }
    }

    // ---- queries ----

    /// Handle of the task registered under `id`.
    pub fn task(&self, id: &str) -> Option<TaskHandle> {
        lock(&self.inner.registry).get(id).cloned()
    }

    /// Identities with a registered task.
    pub fn ids(&self) -> Vec<Arc<str>> {
        lock(&self.inner.registry).ids()
    }

    /// `true` while the task registered under `id` runs its body.
    pub fn is_executing(&self, id: &str) -> bool {
        self.task(id).is_some_and(|t| t.is_executing())
    }

    /// `true` if the task registered under `id` has finished.
    ///
    /// Without `retain_finished`, completed tasks are evicted and this only
    /// reports the short window before eviction.
    pub fn did_finish(&self, id: &str) -> bool {
        self.task(id).is_some_and(|t| t.is_finished())
    }

    /// Latest in-flight update published by the task registered under `id`.
    pub fn pending_update(&self, id: &str) -> Option<Arc<dyn Any + Send + Sync>> {
        self.task(id).and_then(|t| t.update())
    }

    /// Typed [`pending_update`](Self::pending_update).
    pub fn pending_update_as<T: Any + Send + Sync>(&self, id: &str) -> Option<Arc<T>> {
        self.task(id).and_then(|t| t.update_as::<T>())
    }

    // ---- observers ----

    /// Registers `observer` (held weakly) for tasks under `id`.
    pub fn add_observer<O: Observe<V>>(&self, id: impl Into<Arc<str>>, observer: &Arc<O>) {
        let weak: Weak<O> = Arc::downgrade(observer);
        lock(&self.inner.registry).add_observer(id.into(), observer.observer_id(), weak);
    }

    /// Registers several observers for `id`.
    pub fn add_observers<O: Observe<V>>(&self, id: impl Into<Arc<str>>, observers: &[Arc<O>]) {
        let id = id.into();
        let mut registry = lock(&self.inner.registry);
        for observer in observers {
            let weak: Weak<O> = Arc::downgrade(observer);
            registry.add_observer(Arc::clone(&id), observer.observer_id(), weak);
        }
    }

    /// Unregisters the observer with `observer_id` from `id`.
    pub fn remove_observer(&self, id: &str, observer_id: ObserverId) -> bool {
        lock(&self.inner.registry).remove_observer(id, observer_id)
    }

    /// Unregisters several observers from `id`.
    pub fn remove_observers(&self, id: &str, observer_ids: &[ObserverId]) {
        let mut registry = lock(&self.inner.registry);
        for key in observer_ids {
            registry.remove_observer(id, *key);
        }
    }

    /// Unregisters every observer of `id`.
    pub fn remove_all_observers_for(&self, id: &str) {
        lock(&self.inner.registry).remove_observers_for(id);
    }

    /// Unregisters every observer.
    pub fn remove_all_observers(&self) {
        lock(&self.inner.registry).clear_observers();
    }
}

impl<V: Send + 'static> Inner<V> {
    fn notify(&self, task: &TaskHandle, call: impl Fn(&dyn Observe<V>)) {
        let Some(id) = task.id() else { return };
        let observers = lock(&self.registry).observers_of(&id);
        for observer in observers {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| call(observer.as_ref()))) {
                self.bus.publish(
                    Event::new(EventKind::ObserverPanicked)
                        .with_task(Arc::clone(&id))
                        .with_uid(task.uid())
                        .with_reason(panic_message(payload)),
                );
            }
        }
    }

    fn event_for(&self, kind: EventKind, task: &TaskHandle) -> Event {
        let mut ev = Event::new(kind).with_uid(task.uid());
        if let Some(id) = task.id() {
            ev = ev.with_task(id);
        }
        ev
    }
}

impl<V: Send + 'static> LifecycleHook<V> for Inner<V> {
    fn task_will_run(&self, task: &TaskHandle) {
        self.bus.publish(self.event_for(EventKind::TaskStarting, task));
        self.notify(task, |o| o.on_will_run(task));
    }

    fn task_completed(&self, task: &TaskHandle, result: &TaskResult<V>) {
        let ev = match result {
            Ok(_) => self.event_for(EventKind::TaskCompleted, task),
            Err(e) => self.event_for(EventKind::TaskFailed, task).with_reason(e.to_string()),
        };
        self.bus.publish(ev);

        if !self.config.retain_finished {
            if let Some(id) = task.id() {
                lock(&self.registry).evict(&id, task);
            }
        }
        self.notify(task, |o| o.on_completed(task, result));
    }
}

impl<V: Send + 'static> CancelHook for Inner<V> {
    fn task_cancelled(&self, task: &TaskHandle) {
        self.bus.publish(self.event_for(EventKind::TaskCancelled, task));
        if let Some(id) = task.id() {
            lock(&self.registry).evict(&id, task);
        }
        self.notify(task, |o| o.on_cancelled(task));
    }
}

impl<V> Drop for Inner<V> {
    fn drop(&mut self) {
        let registry = self
            .registry
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        registry.clear_observers();
        for task in registry.drain_tasks() {
            task.cancel();
        }
        self.shutdown.cancel();
    }
}
