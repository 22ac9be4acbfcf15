//! Fan-in join barrier with trailing-edge debounce
//!
//! A [`FanInSynchronizer`] waits for every [`Holder`] it handed out to be
//! released, then fires one callback with all recorded results.
//!
//! ## Timing
//!
//! ```text
//! create ×N ──→ release … release(last) ──→ [debounce] ──→ callback(results)
//!                                 ▲                │
//!                  create_holder ─┘ (invalidates)  └─ only if still 0 pending
//! ```
//!
//! Every release that brings the pending count to zero arms a delayed task
//! tagged with the current generation. Creating a holder bumps the
//! generation and aborts the armed task, so the callback then waits for the
//! new holder as well. The callback fires at most once; after it fired, or
//! after [`cancel`](FanInSynchronizer::cancel), new holders are inert.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Default trailing-edge delay
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

type DoneCallback<T> = Box<dyn FnOnce(Vec<Option<T>>) + Send + 'static>;

struct State<T> {
    pending: usize,
    results: Vec<Option<T>>,
    generation: u64,
    armed: Option<JoinHandle<()>>,
    callback: Option<DoneCallback<T>>,
    cancelled: bool,
    fired: bool,
}

struct Inner<T> {
    runtime: Handle,
    debounce: Duration,
    state: Mutex<State<T>>,
}

impl<T> Inner<T> {
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Joins a dynamic number of asynchronous completions into one callback
pub struct FanInSynchronizer<T> {
    inner: Arc<Inner<T>>,
}

/// One expected completion of a [`FanInSynchronizer`]
pub struct Holder<T> {
    inner: Arc<Inner<T>>,
    released: AtomicBool,
    /// Handed out after the synchronizer finished or was cancelled
    inert: bool,
}

impl<T: Send + 'static> FanInSynchronizer<T> {
    /// Creates a synchronizer whose delayed callback runs on `runtime`
    pub fn new<F>(runtime: Handle, on_done: F) -> Self
    where
        F: FnOnce(Vec<Option<T>>) + Send + 'static,
    {
        Self::with_debounce(runtime, DEFAULT_DEBOUNCE, on_done)
    }

    pub fn with_debounce<F>(runtime: Handle, debounce: Duration, on_done: F) -> Self
    where
        F: FnOnce(Vec<Option<T>>) + Send + 'static,
    {
        Self {
            inner: Arc::new(Inner {
                runtime,
                debounce,
                state: Mutex::new(State {
                    pending: 0,
                    results: Vec::new(),
                    generation: 0,
                    armed: None,
                    callback: Some(Box::new(on_done)),
                    cancelled: false,
                    fired: false,
                }),
            }),
        }
    }

    /// Adds one expected completion
    ///
    /// Invalidates a trailing delay that is currently counting down.
    pub fn create_holder(&self) -> Holder<T> {
        let mut state = self.inner.lock();
        let inert = state.cancelled || state.fired;
        if !inert {
            state.pending += 1;
            state.generation += 1;
            if let Some(task) = state.armed.take() {
                task.abort();
                debug!(
                    generation = state.generation,
                    "Trailing delay invalidated by new holder"
                );
            }
        }

        Holder {
            inner: Arc::clone(&self.inner),
            released: AtomicBool::new(false),
            inert,
        }
    }

    /// Permanently prevents the callback from firing
    pub fn cancel(&self) {
        let mut state = self.inner.lock();
        if state.cancelled {
            return;
        }
        state.cancelled = true;
        if let Some(task) = state.armed.take() {
            task.abort();
        }
        state.callback = None;
        state.results.clear();
        debug!(pending = state.pending, "Synchronizer cancelled");
    }

    /// True while at least one holder has not been released
    pub fn is_waiting(&self) -> bool {
        self.inner.lock().pending > 0
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.lock().cancelled
    }

    /// Number of holders not yet released
    pub fn pending(&self) -> usize {
        self.inner.lock().pending
    }
}

impl<T: Send + 'static> Holder<T> {
    /// Records this holder's result
    ///
    /// Only the first call per holder counts; later calls return `false`.
    pub fn release(&self, result: Option<T>) -> bool {
        if self.released.swap(true, Ordering::AcqRel) {
            return false;
        }
        if self.inert {
            return true;
        }

        let mut state = self.inner.lock();
        state.pending = state.pending.saturating_sub(1);
        if state.cancelled || state.fired {
            return true;
        }

        state.results.push(result);
        trace!(pending = state.pending, "Holder released");

        if state.pending == 0 {
            arm(&self.inner, &mut state);
        }
        true
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

/// Schedules the trailing-edge check for the current generation
fn arm<T: Send + 'static>(inner: &Arc<Inner<T>>, state: &mut State<T>) {
    if let Some(task) = state.armed.take() {
        task.abort();
    }

    let generation = state.generation;
    let delay = inner.debounce;
    let weak = Arc::downgrade(inner);

    state.armed = Some(inner.runtime.spawn(async move {
        tokio::time::sleep(delay).await;

        let Some(inner) = weak.upgrade() else {
            return;
        };
        let fire = {
            let mut state = inner.lock();
            let settled = !state.cancelled
                && !state.fired
                && state.pending == 0
                && state.generation == generation;
            if settled {
                state.fired = true;
                state.armed = None;
                state
                    .callback
                    .take()
                    .map(|cb| (cb, std::mem::take(&mut state.results)))
            } else {
                None
            }
        };

        if let Some((callback, results)) = fire {
            debug!(results = results.len(), "Synchronizer completed");
            callback(results);
        }
    }));
}
