use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

use super::config::ControllerConfig;
use super::core::Controller;
use crate::events::Bus;
use crate::executor::Executor;
use crate::subscribers::{Subscribe, SubscriberSet};

/// Builder for a [`Controller`] with optional subscribers and executor.
pub struct ControllerBuilder<V> {
    config: ControllerConfig,
    executor: Option<Arc<dyn Executor>>,
    subscribers: Vec<Arc<dyn Subscribe>>,
    _value: std::marker::PhantomData<fn() -> V>,
}

impl<V: Send + 'static> ControllerBuilder<V> {
    /// Creates a builder with the given configuration.
    pub fn new(config: ControllerConfig) -> Self {
        Self {
            config,
            executor: None,
            subscribers: Vec::new(),
            _value: std::marker::PhantomData,
        }
    }

    /// Runs registered tasks on `executor` unless a task carries its own override.
    pub fn with_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Sets event subscribers.
    ///
    /// Subscribers receive controller events through dedicated workers with
    /// bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Builds the controller.
    ///
    /// Subscriber workers are spawned on the current tokio runtime; outside a
    /// runtime they are dropped with a warning.
    pub fn build(self) -> Controller<V> {
        let bus = Bus::new(self.config.bus_capacity_clamped());
        let shutdown = CancellationToken::new();

        if !self.subscribers.is_empty() {
            match Handle::try_current() {
                Ok(_) => spawn_listener(&bus, self.subscribers, shutdown.clone()),
                Err(_) => eprintln!("[controller] no tokio runtime; subscribers disabled"),
            }
        }
        Controller::from_parts(self.config, self.executor, bus, shutdown)
    }
}

/// Forwards bus events to the subscribers until the controller is dropped.
fn spawn_listener(bus: &Bus, subscribers: Vec<Arc<dyn Subscribe>>, shutdown: CancellationToken) {
    let set = SubscriberSet::new(subscribers, bus.clone());
    let mut rx = bus.subscribe();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                ev = rx.recv() => match ev {
                    Ok(ev) => set.emit(ev),
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                },
            }
        }
        // Events published while the controller was being dropped.
        while let Ok(ev) = rx.try_recv() {
            set.emit(ev);
        }
        set.shutdown().await;
    });
}
