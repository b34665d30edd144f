//! # Affinity-thread dispatch.
//!
//! Some continuations must run on one designated thread (typically the thread
//! that owns UI state). The core only needs fire-and-forget dispatch:
//!
//! ```text
//! Dispatcher::dispatch(callback)               run "soon" on the affinity thread
//! Dispatcher::dispatch_after(delay, callback)  run after `delay`, measured from the call
//! ```
//!
//! [`AffinityThread`] is a ready-made dispatcher: one OS thread driving a
//! `current_thread` tokio runtime that executes callbacks in arrival order.
//! Embedders with their own event loop implement [`Dispatcher`] instead and
//! install it with [`install_default_dispatcher`].

use std::sync::{Arc, OnceLock};
use std::thread::{self, ThreadId};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use super::ExecutorError;
use crate::error::panic_message;

/// Closure dispatched to the affinity thread.
pub type Callback = Box<dyn FnOnce() + Send + 'static>;

/// Runs callbacks on a designated thread.
pub trait Dispatcher: Send + Sync + 'static {
    /// Runs `callback` on the affinity thread as soon as possible.
    fn dispatch(&self, callback: Callback);

    /// Runs `callback` on the affinity thread once `delay` has elapsed.
    fn dispatch_after(&self, delay: Duration, callback: Callback);
}

enum Command {
    Now(Callback),
    At(Instant, Callback),
}

/// Dedicated thread executing dispatched callbacks.
///
/// The thread exits once every clone of the dispatcher is dropped; delayed
/// callbacks still pending at that moment are discarded.
#[derive(Clone, Debug)]
pub struct AffinityThread {
    tx: mpsc::UnboundedSender<Command>,
    thread: ThreadId,
}

impl AffinityThread {
    /// Spawns the thread with the given name.
    pub fn spawn(name: impl Into<String>) -> std::io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;
        let (tx, mut rx) = mpsc::unbounded_channel::<Command>();

        let join = thread::Builder::new().name(name.into()).spawn(move || {
            runtime.block_on(async move {
                while let Some(cmd) = rx.recv().await {
                    match cmd {
                        Command::Now(callback) => run_isolated(callback),
                        Command::At(deadline, callback) => {
                            tokio::spawn(async move {
                                tokio::time::sleep_until(deadline).await;
                                run_isolated(callback);
                            });
                        }
                    }
                }
            });
        })?;

        Ok(Self {
            tx,
            thread: join.thread().id(),
        })
    }

    /// Id of the affinity thread.
    pub fn thread_id(&self) -> ThreadId {
        self.thread
    }

    fn send(&self, cmd: Command) {
        if self.tx.send(cmd).is_err() {
            eprintln!("[affinity] thread gone; callback dropped");
        }
    }
}

impl Dispatcher for AffinityThread {
    fn dispatch(&self, callback: Callback) {
        self.send(Command::Now(callback));
    }

    fn dispatch_after(&self, delay: Duration, callback: Callback) {
        self.send(Command::At(Instant::now() + delay, callback));
    }
}

/// Runs callbacks on the calling thread; delays block it.
///
/// Used as a fallback when no affinity thread can be spawned, and handy in
/// tests that want deterministic, synchronous dispatch.
#[derive(Clone, Copy, Debug, Default)]
pub struct InlineDispatcher;

impl Dispatcher for InlineDispatcher {
    fn dispatch(&self, callback: Callback) {
        run_isolated(callback);
    }

    fn dispatch_after(&self, delay: Duration, callback: Callback) {
        thread::sleep(delay);
        run_isolated(callback);
    }
}

/// A panicking callback must not take the affinity thread down with it.
fn run_isolated(callback: Callback) {
    if let Err(payload) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(callback)) {
        eprintln!("[affinity] callback panicked: {}", panic_message(payload));
    }
}

static DEFAULT_DISPATCHER: OnceLock<Arc<dyn Dispatcher>> = OnceLock::new();

/// Returns the process-wide dispatcher, spawning an [`AffinityThread`] named
/// `taskchain-affinity` on first use.
pub fn default_dispatcher() -> Arc<dyn Dispatcher> {
    Arc::clone(DEFAULT_DISPATCHER.get_or_init(|| {
        match AffinityThread::spawn("taskchain-affinity") {
            Ok(thread) => Arc::new(thread),
            Err(e) => {
                eprintln!("[affinity] cannot spawn thread ({e}); dispatching inline");
                Arc::new(InlineDispatcher)
            }
        }
    }))
}

/// Installs the process-wide dispatcher.
///
/// Fails if the default was already installed or already used.
pub fn install_default_dispatcher(dispatcher: Arc<dyn Dispatcher>) -> Result<(), ExecutorError> {
    DEFAULT_DISPATCHER
        .set(dispatcher)
        .map_err(|_| ExecutorError::AlreadyInstalled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc as std_mpsc;

    #[test]
    fn callbacks_run_on_the_affinity_thread_in_order() {
        let affinity = AffinityThread::spawn("test-affinity").expect("spawn");
        let (tx, rx) = std_mpsc::channel();

        for i in 0..3 {
            let tx = tx.clone();
            affinity.dispatch(Box::new(move || {
                let _ = tx.send((i, thread::current().id()));
            }));
        }

        for expected in 0..3 {
            let (i, id) = rx.recv_timeout(Duration::from_secs(5)).expect("callback ran");
            assert_eq!(i, expected);
            assert_eq!(id, affinity.thread_id());
        }
    }

    #[test]
    fn delayed_callback_waits() {
        let affinity = AffinityThread::spawn("test-affinity-delay").expect("spawn");
        let (tx, rx) = std_mpsc::channel();
        let started = std::time::Instant::now();

        affinity.dispatch_after(
            Duration::from_millis(50),
            Box::new(move || {
                let _ = tx.send(std::time::Instant::now());
            }),
        );

        let ran_at = rx.recv_timeout(Duration::from_secs(5)).expect("callback ran");
        assert!(ran_at.duration_since(started) >= Duration::from_millis(50));
    }

    #[test]
    fn panicking_callback_keeps_thread_alive() {
        let affinity = AffinityThread::spawn("test-affinity-panic").expect("spawn");
        let (tx, rx) = std_mpsc::channel();

        affinity.dispatch(Box::new(|| panic!("boom")));
        affinity.dispatch(Box::new(move || {
            let _ = tx.send(());
        }));

        assert!(rx.recv_timeout(Duration::from_secs(5)).is_ok());
    }

    #[test]
    fn inline_dispatch_runs_on_caller() {
        let (tx, rx) = std_mpsc::channel();
        InlineDispatcher.dispatch(Box::new(move || {
            let _ = tx.send(thread::current().id());
        }));
        assert_eq!(rx.try_recv().ok(), Some(thread::current().id()));
    }
}
