//! Periodic permit reset.
//!
//! A reset task refills its pool on a fixed cadence. It recovers permits leaked by
//! callers that never released them, and turns a pool into an "N connections per
//! window" quota.
//!
//! Reset tasks never run on the caller's runtime. A [`ResetScheduler`] owns a
//! single-threaded tokio runtime on its own named thread, so callers blocked in
//! `acquire` (plain threads or async workers alike) cannot starve the reset that
//! would admit them.
//!
//! Lifecycle:
//! 1. `ResetScheduler::spawn` starts the task; the first reset fires one interval
//!    after the task starts
//! 2. Each tick calls `Resettable::reset`
//! 3. `ResetTask::stop` cancels the task and blocks until it has exited; dropping
//!    the handle cancels without waiting
//! 4. Dropping the scheduler shuts its runtime down and ends any task still on it

use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::instrument::WithSubscriber;

use crate::config::whole_millis;
use crate::permit::Resettable;

const SCHEDULER_THREAD_NAME: &str = "conn-throttle-reset";

/// Owns the thread and runtime that drive reset tasks.
///
/// The thread is started on the first positive-interval spawn, so a scheduler whose
/// pools never reset costs nothing.
pub struct ResetScheduler {
    driver: Mutex<Option<Driver>>,
}

impl ResetScheduler {
    pub fn new() -> Self {
        Self {
            driver: Mutex::new(None),
        }
    }

    /// Schedule periodic resets of `target` every `interval`.
    ///
    /// Returns `None` for a zero interval: there is nothing to schedule.
    ///
    /// # Panics
    ///
    /// If the operating system refuses the scheduler thread or its timer driver on
    /// first use.
    pub fn spawn<R>(&self, interval: Duration, target: Arc<R>) -> Option<ResetTask>
    where
        R: Resettable + ?Sized + 'static,
    {
        if interval.is_zero() {
            return None;
        }
        Some(ResetTask::start(&self.runtime(), interval, target))
    }

    /// Whether the scheduler thread is running.
    pub fn is_started(&self) -> bool {
        self.lock_driver().is_some()
    }

    fn runtime(&self) -> Handle {
        self.lock_driver()
            .get_or_insert_with(Driver::start)
            .handle
            .clone()
    }

    fn lock_driver(&self) -> std::sync::MutexGuard<'_, Option<Driver>> {
        self.driver.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ResetScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ResetScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResetScheduler")
            .field("started", &self.is_started())
            .finish()
    }
}

struct Driver {
    handle: Handle,
    shutdown: CancellationToken,
    thread: Option<thread::JoinHandle<()>>,
}

impl Driver {
    fn start() -> Self {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .expect("failed to create reset scheduler runtime");
        let handle = runtime.handle().clone();

        let shutdown = CancellationToken::new();
        let signal = shutdown.clone();
        let thread = thread::Builder::new()
            .name(SCHEDULER_THREAD_NAME.into())
            .spawn(move || {
                runtime.block_on(signal.cancelled());
            })
            .expect("failed to spawn reset scheduler thread");

        tracing::debug!(thread = SCHEDULER_THREAD_NAME, "Reset scheduler started");
        Self {
            handle,
            shutdown,
            thread: Some(thread),
        }
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        self.shutdown.cancel();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("Reset scheduler thread panicked");
            }
        }
    }
}

/// Handle to a running periodic reset.
pub struct ResetTask {
    cancel: CancellationToken,
    /// Disconnects once the task has returned or been dropped by its runtime.
    finished: mpsc::Receiver<()>,
    handle: JoinHandle<()>,
}

impl ResetTask {
    fn start<R>(runtime: &Handle, interval: Duration, target: Arc<R>) -> Self
    where
        R: Resettable + ?Sized + 'static,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let (done, finished) = mpsc::channel::<()>();
        let pool = target.id();

        let task = async move {
            let _done = done;
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            tracing::debug!(pool = %pool, interval_ms = whole_millis(interval), "Reset task started");
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        tracing::debug!(pool = %pool, "Reset task stopped");
                        return;
                    }
                    _ = ticker.tick() => {
                        target.reset();
                    }
                }
            }
        };

        // Records from the scheduler thread go to the spawner's subscriber.
        let handle = runtime.spawn(task.with_current_subscriber());

        Self {
            cancel,
            finished,
            handle,
        }
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Cancel the task and block until it has exited.
    ///
    /// Once this returns, the task will not reset its pool again. Must not be called
    /// from the scheduler thread itself.
    pub fn stop(self) {
        self.cancel.cancel();
        let _ = self.finished.recv();
    }
}

impl Drop for ResetTask {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for ResetTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResetTask")
            .field("running", &self.is_running())
            .finish()
    }
}
