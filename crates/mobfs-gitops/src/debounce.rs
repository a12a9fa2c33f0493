//! Debounced deferred action.
//!
//! Each trigger restarts a quiet-period timer; the action runs once the
//! timer survives the full delay. An async mutex guarantees the action is
//! never running twice in parallel, even when a flush races a timer fire.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

type Action = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Pending-timer slot. The generation stamps the live timer: trigger, stop,
/// and flush all advance it, so a timer task that wakes up late can tell it
/// has been superseded and must not fire or clear a newer timer.
#[derive(Default)]
struct TimerState {
    generation: u64,
    pending: Option<JoinHandle<()>>,
}

struct DebounceInner {
    delay: Duration,
    action: Action,
    timer: Mutex<TimerState>,
    running: tokio::sync::Mutex<()>,
}

impl DebounceInner {
    async fn fire(&self) {
        let _serialized = self.running.lock().await;
        (self.action)().await;
    }
}

/// Runs an async action after a quiet period.
pub struct Debouncer {
    inner: Arc<DebounceInner>,
}

impl Debouncer {
    pub fn new<F, Fut>(delay: Duration, action: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let action: Action = Arc::new(move || -> Pin<Box<dyn Future<Output = ()> + Send>> {
            Box::pin(action())
        });
        Self {
            inner: Arc::new(DebounceInner {
                delay,
                action,
                timer: Mutex::new(TimerState::default()),
                running: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Schedule the action after the delay, restarting the timer if one is
    /// already pending. Must be called from within a tokio runtime.
    pub fn trigger(&self) {
        let mut timer = self.inner.timer.lock();
        timer.generation = timer.generation.wrapping_add(1);
        let generation = timer.generation;
        if let Some(pending) = timer.pending.take() {
            pending.abort();
        }

        let inner = Arc::clone(&self.inner);
        timer.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(inner.delay).await;

            // A natural fire empties the slot so flush sees an idle
            // debouncer, then detaches the action so a later trigger or
            // stop can only cancel the waiting phase, never an execution
            // already in flight.
            {
                let mut timer = inner.timer.lock();
                if timer.generation != generation {
                    return;
                }
                timer.pending = None;
            }
            tokio::spawn(async move { inner.fire().await });
        }));
    }

    /// Cancel any pending timer without firing.
    pub fn stop(&self) {
        let mut timer = self.inner.timer.lock();
        timer.generation = timer.generation.wrapping_add(1);
        if let Some(pending) = timer.pending.take() {
            pending.abort();
        }
    }

    /// Run the action immediately iff a trigger is pending.
    pub async fn flush(&self) {
        let pending = {
            let mut timer = self.inner.timer.lock();
            timer.generation = timer.generation.wrapping_add(1);
            match timer.pending.take() {
                Some(handle) => {
                    handle.abort();
                    true
                }
                None => false,
            }
        };

        if pending {
            self.inner.fire().await;
        }
    }
}
