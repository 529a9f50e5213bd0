//! Coalescing of bursty triggers into single invocations.
//!
//! `DebounceWindow` holds the timing decisions and knows nothing about the
//! runtime. `DebounceWithLimit` and `IdempotentDebounce` drive it with tokio
//! timers and must be used from inside a tokio runtime.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};

/// Timing state of one debounced invocation.
///
/// Every trigger pushes the deadline to `now + delay`, but never past
/// `first + max_wait`, where `first` is the earliest trigger still pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceWindow {
    delay: Duration,
    max_wait: Option<Duration>,
    first: Option<Instant>,
    deadline: Option<Instant>,
}

impl DebounceWindow {
    pub fn new(delay: Duration, max_wait: Option<Duration>) -> Self {
        Self {
            delay,
            max_wait,
            first: None,
            deadline: None,
        }
    }

    /// Records a trigger and returns when the pending invocation should fire.
    /// A deadline at or before `now` means "fire right away".
    pub fn trigger(&mut self, now: Instant) -> Instant {
        let first = *self.first.get_or_insert(now);
        let mut deadline = now + self.delay;
        if let Some(max_wait) = self.max_wait {
            deadline = deadline.min(first + max_wait);
        }
        self.deadline = Some(deadline);
        deadline
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn clear(&mut self) {
        self.first = None;
        self.deadline = None;
    }
}

struct Pending {
    window: DebounceWindow,
    task: Option<JoinHandle<()>>,
    generation: u64,
}

impl Pending {
    fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.window.clear();
    }
}

fn lock(pending: &Mutex<Pending>) -> MutexGuard<'_, Pending> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Arms a timer that runs `f` at `deadline` unless a later `generation` has
/// replaced it in the meantime.
fn arm<F>(pending: &Arc<Mutex<Pending>>, deadline: Instant, generation: u64, f: F) -> Option<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    let Ok(handle) = Handle::try_current() else {
        tracing::warn!("debounce scheduled outside a tokio runtime, dropping trigger");
        return None;
    };
    let shared = Arc::downgrade(pending);
    Some(handle.spawn(async move {
        sleep_until(deadline).await;
        let Some(shared) = shared.upgrade() else {
            return;
        };
        {
            let mut guard = lock(&shared);
            if guard.generation != generation {
                return;
            }
            guard.window.clear();
            guard.task = None;
        }
        f();
    }))
}

/// Trailing-edge debounce with an upper bound on how long a burst can defer
/// the invocation. The last scheduled callback is the one that runs.
#[derive(Clone)]
pub struct DebounceWithLimit {
    pending: Arc<Mutex<Pending>>,
}

impl DebounceWithLimit {
    pub fn new(delay: Duration, max_wait: Duration) -> Self {
        Self {
            pending: Arc::new(Mutex::new(Pending {
                window: DebounceWindow::new(delay, Some(max_wait)),
                task: None,
                generation: 0,
            })),
        }
    }

    pub fn schedule<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let now = Instant::now();
        let mut guard = lock(&self.pending);
        if let Some(task) = guard.task.take() {
            task.abort();
        }
        guard.generation += 1;
        let deadline = guard.window.trigger(now);
        if deadline <= now {
            guard.window.clear();
            drop(guard);
            f();
            return;
        }
        let generation = guard.generation;
        guard.task = arm(&self.pending, deadline, generation, f);
        if guard.task.is_none() {
            guard.window.clear();
        }
    }

    pub fn cancel(&self) {
        let mut guard = lock(&self.pending);
        guard.generation += 1;
        guard.cancel();
    }

    pub fn is_pending(&self) -> bool {
        lock(&self.pending).window.is_pending()
    }

    pub fn deadline(&self) -> Option<Instant> {
        lock(&self.pending).window.deadline()
    }
}

/// Fires once `delay` after the first trigger; triggers arriving while one is
/// pending are ignored.
#[derive(Clone)]
pub struct IdempotentDebounce {
    pending: Arc<Mutex<Pending>>,
}

impl IdempotentDebounce {
    pub fn new(delay: Duration) -> Self {
        Self {
            pending: Arc::new(Mutex::new(Pending {
                window: DebounceWindow::new(delay, None),
                task: None,
                generation: 0,
            })),
        }
    }

    /// Returns whether this call armed the timer.
    pub fn schedule<F>(&self, f: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let mut guard = lock(&self.pending);
        if guard.window.is_pending() {
            return false;
        }
        guard.generation += 1;
        let deadline = guard.window.trigger(Instant::now());
        let generation = guard.generation;
        guard.task = arm(&self.pending, deadline, generation, f);
        if guard.task.is_none() {
            guard.window.clear();
            return false;
        }
        true
    }

    pub fn cancel(&self) {
        let mut guard = lock(&self.pending);
        guard.generation += 1;
        guard.cancel();
    }

    pub fn is_pending(&self) -> bool {
        lock(&self.pending).window.is_pending()
    }
}

impl Drop for Pending {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
