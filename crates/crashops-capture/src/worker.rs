//! Dedicated single-thread execution contexts
//!
//! A [`BackgroundWorker`] owns one named OS thread that runs submitted jobs
//! in order. It uses plain `std::sync::mpsc` channels so it can be driven
//! from inside a panic hook, including on threads that belong to an async
//! runtime.

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Sender};
use std::sync::{Mutex, PoisonError};
use std::thread::{self, ThreadId};
use std::time::Duration;

use tracing::{debug, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A named thread executing jobs one at a time, in submission order
#[derive(Debug)]
pub struct BackgroundWorker {
    name: String,
    thread_id: ThreadId,
    sender: Mutex<Option<Sender<Job>>>,
}

impl BackgroundWorker {
    /// Starts the worker thread
    ///
    /// # Errors
    ///
    /// Returns the OS error if the thread cannot be spawned.
    pub fn spawn(name: impl Into<String>) -> std::io::Result<Self> {
        let name = name.into();
        let (sender, receiver) = mpsc::channel::<Job>();

        let thread_name = name.clone();
        let handle = thread::Builder::new().name(name.clone()).spawn(move || {
            while let Ok(job) = receiver.recv() {
                if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                    warn!(worker = %thread_name, "Job panicked; worker continues");
                }
            }
            debug!(worker = %thread_name, "Worker stopped");
        })?;

        Ok(Self {
            name,
            thread_id: handle.thread().id(),
            sender: Mutex::new(Some(sender)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the calling thread is this worker's thread
    pub fn is_current(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    /// Queues `job` without waiting for it. Returns `false` if the worker
    /// has stopped.
    pub fn execute<F>(&self, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        match sender.as_ref() {
            Some(sender) => sender.send(Box::new(job)).is_ok(),
            None => false,
        }
    }

    /// Runs `job` on the worker and waits at most `timeout` for its result
    ///
    /// Called from the worker's own thread, the job runs inline instead of
    /// being queued behind itself. Returns `None` on timeout or if the
    /// worker has stopped; the job may still complete later.
    pub fn run_and_wait<F, R>(&self, timeout: Duration, job: F) -> Option<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.is_current() {
            return Some(job());
        }

        let (tx, rx) = mpsc::sync_channel(1);
        let queued = self.execute(move || {
            // The waiter may have given up already
            let _ = tx.send(job());
        });
        if !queued {
            return None;
        }

        match rx.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(_) => {
                warn!(
                    worker = %self.name,
                    timeout_ms = timeout.as_millis() as u64,
                    "Worker did not answer in time"
                );
                None
            }
        }
    }

    /// Stops accepting jobs; the thread exits once the queue drains
    pub fn stop(&self) {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

impl Drop for BackgroundWorker {
    fn drop(&mut self) {
        self.stop();
    }
}
