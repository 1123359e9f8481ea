//! Tick-based timer scheduling.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::AbortHandle;
use tracing::trace;

/// Callback run when a timer fires.
pub type TimerCallback = Box<dyn FnOnce() + Send>;

/// Identifies an armed timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

impl TimerHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(self) -> u64 {
        self.0
    }
}

/// Runs callbacks after a number of ticks.
pub trait Scheduler: Send + Sync + 'static {
    /// Arm a timer that runs `callback` once after `ticks` ticks.
    fn after(&self, ticks: u32, callback: TimerCallback) -> TimerHandle;

    /// Disarm a timer. Returns `false` if it already fired or was cancelled.
    fn cancel(&self, handle: TimerHandle) -> bool;
}

/// Scheduler backed by `tokio::time`.
///
/// Must be used from within a tokio runtime.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    tick: Duration,
    next_id: Arc<AtomicU64>,
    timers: Arc<Mutex<HashMap<u64, AbortHandle>>>,
}

impl TokioScheduler {
    pub fn new(tick: Duration) -> Self {
        Self {
            tick,
            next_id: Arc::new(AtomicU64::new(1)),
            timers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Length of one tick.
    pub fn tick(&self) -> Duration {
        self.tick
    }

    /// Timers armed and not yet fired or cancelled.
    pub fn armed(&self) -> usize {
        lock(&self.timers).len()
    }
}

impl Scheduler for TokioScheduler {
    fn after(&self, ticks: u32, callback: TimerCallback) -> TimerHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let delay = self.tick.checked_mul(ticks).unwrap_or(Duration::MAX);
        let timers = Arc::clone(&self.timers);

        // Hold the map while spawning so the task cannot remove its entry
        // before it has been inserted.
        let mut armed = lock(&self.timers);
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if lock(&timers).remove(&id).is_some() {
                trace!(timer = id, "timer fired");
                callback();
            }
        });
        armed.insert(id, task.abort_handle());

        TimerHandle(id)
    }

    fn cancel(&self, handle: TimerHandle) -> bool {
        match lock(&self.timers).remove(&handle.0) {
            Some(task) => {
                task.abort();
                trace!(timer = handle.0, "timer cancelled");
                true
            }
            None => false,
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
