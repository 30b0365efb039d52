//! Permit pool with an optional periodic reset task.
//!
//! Reconfiguration (interval or capacity) always runs stop -> join -> mutate -> restart
//! while holding the schedule lock, so at most one reset task exists per pool.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::{PermitPool, Permits, PoolId, Releasable, Resettable, Throttle};
use crate::config::{ThrottleConfig, whole_millis};
use crate::reset::{ResetScheduler, ResetTask};

/// Releasable, resettable permit pool. This is what the registry shares between callers.
pub struct ResettablePool {
    pool: Arc<PermitPool>,
    scheduler: Arc<ResetScheduler>,
    schedule: Mutex<Schedule>,
}

struct Schedule {
    interval: Duration,
    task: Option<ResetTask>,
}

impl ResettablePool {
    /// Create a pool with its own reset scheduler.
    ///
    /// Works from any thread, inside or outside a tokio runtime.
    pub fn new(config: ThrottleConfig) -> Self {
        Self::with_scheduler(config, Arc::new(ResetScheduler::new()))
    }

    /// Create a pool whose resets run on a shared `scheduler`.
    pub fn with_scheduler(config: ThrottleConfig, scheduler: Arc<ResetScheduler>) -> Self {
        let pool = Arc::new(PermitPool::new(config.capacity));
        let task = scheduler.spawn(config.reset_interval, Arc::clone(&pool));

        Self {
            pool,
            scheduler,
            schedule: Mutex::new(Schedule {
                interval: config.reset_interval,
                task,
            }),
        }
    }

    pub fn interval(&self) -> Duration {
        self.lock_schedule().interval
    }

    pub fn config(&self) -> ThrottleConfig {
        ThrottleConfig::new(self.capacity(), self.interval())
    }

    /// Permits currently available. Diagnostic only.
    pub fn available(&self) -> Permits {
        self.pool.available()
    }

    pub fn acquire_cancellable(&self, timeout: Duration, cancel: &CancellationToken) -> bool {
        self.pool.acquire_cancellable(timeout, cancel)
    }

    /// Whether a reset task is currently scheduled.
    pub fn is_resetting(&self) -> bool {
        self.lock_schedule()
            .task
            .as_ref()
            .is_some_and(ResetTask::is_running)
    }

    /// Change the reset cadence.
    ///
    /// The running task is stopped and joined before a new one starts, so two reset
    /// loops never overlap. A zero interval stops periodic resets.
    pub fn set_interval(&self, interval: Duration) {
        let mut schedule = self.lock_schedule();

        if let Some(running) = schedule.task.take() {
            running.stop();
        }

        schedule.interval = interval;
        tracing::info!(
            pool = %self.pool.id(),
            interval_ms = whole_millis(interval),
            "Reset interval changed"
        );

        schedule.task = self.scheduler.spawn(interval, Arc::clone(&self.pool));
    }

    /// Replace the permit counter with one of the new capacity.
    ///
    /// The reset task is stopped while the counter is swapped and restarted afterwards
    /// at the current interval.
    pub fn set_capacity(&self, capacity: Permits) {
        let mut schedule = self.lock_schedule();

        if let Some(running) = schedule.task.take() {
            running.stop();
        }

        self.pool.set_capacity(capacity);

        schedule.task = self
            .scheduler
            .spawn(schedule.interval, Arc::clone(&self.pool));
    }

    fn lock_schedule(&self) -> MutexGuard<'_, Schedule> {
        self.schedule.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Throttle for ResettablePool {
    fn acquire(&self, timeout: Duration) -> bool {
        self.pool.acquire(timeout)
    }

    fn capacity(&self) -> Permits {
        self.pool.capacity()
    }

    fn id(&self) -> PoolId {
        self.pool.id()
    }
}

impl Releasable for ResettablePool {
    fn release(&self) -> Permits {
        self.pool.release()
    }
}

impl Resettable for ResettablePool {
    fn reset(&self) -> Permits {
        self.pool.reset()
    }
}

impl std::fmt::Debug for ResettablePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResettablePool")
            .field("pool", &self.pool)
            .field("interval", &self.interval())
            .finish()
    }
}
