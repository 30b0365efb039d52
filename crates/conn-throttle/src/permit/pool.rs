//! Counting permit pool built on a mutex and condition variable.
//!
//! The counter supports a full refill under the same lock that guards timed
//! acquisition, which a plain semaphore does not offer.

use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use super::{Permits, PoolId, Releasable, Resettable, Throttle};

/// Timeouts below this never block.
const MIN_BLOCKING_TIMEOUT: Duration = Duration::from_millis(1);

/// Upper bound on a single condvar wait when a cancellation token is watched.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug)]
struct PermitState {
    capacity: Permits,
    /// Meaningless when `capacity` is unlimited.
    available: usize,
}

impl PermitState {
    fn new(capacity: Permits) -> Self {
        Self {
            capacity,
            available: capacity.limit().unwrap_or(0),
        }
    }

    fn try_take(&mut self) -> bool {
        match self.capacity {
            Permits::Unlimited => true,
            Permits::Limited(_) if self.available > 0 => {
                self.available -= 1;
                true
            }
            Permits::Limited(_) => false,
        }
    }

    fn remaining(&self) -> Permits {
        match self.capacity {
            Permits::Unlimited => Permits::Unlimited,
            Permits::Limited(_) => Permits::Limited(self.available),
        }
    }
}

/// Pool of connection permits with timed acquisition and explicit release.
pub struct PermitPool {
    id: PoolId,
    state: Mutex<PermitState>,
    permit_returned: Condvar,
}

impl PermitPool {
    pub fn new(capacity: Permits) -> Self {
        let id = PoolId::new();
        tracing::debug!(pool = %id, capacity = %capacity, "Initializing connection permit pool");
        Self {
            id,
            state: Mutex::new(PermitState::new(capacity)),
            permit_returned: Condvar::new(),
        }
    }

    pub fn unlimited() -> Self {
        Self::new(Permits::Unlimited)
    }

    /// Permits currently available. Diagnostic only; admission never reads this.
    pub fn available(&self) -> Permits {
        self.lock_state().remaining()
    }

    /// Replace the counter with a fresh one of the new capacity.
    ///
    /// Permits handed out before the swap are forgotten: the new counter starts full.
    /// Blocked waiters are woken to retry against the new counter.
    pub fn set_capacity(&self, capacity: Permits) {
        let mut state = self.lock_state();
        if state.capacity == capacity {
            return;
        }
        tracing::info!(
            pool = %self.id,
            from = %state.capacity,
            to = %capacity,
            "Reinitializing connection permit pool"
        );
        *state = PermitState::new(capacity);
        drop(state);
        self.permit_returned.notify_all();
    }

    /// [`acquire`](Throttle::acquire) that gives up early once `cancel` fires.
    ///
    /// A cancelled wait is reported as a denial.
    pub fn acquire_cancellable(&self, timeout: Duration, cancel: &CancellationToken) -> bool {
        self.acquire_inner(timeout, Some(cancel))
    }

    fn acquire_inner(&self, timeout: Duration, cancel: Option<&CancellationToken>) -> bool {
        let mut state = self.lock_state();

        if timeout < MIN_BLOCKING_TIMEOUT {
            let granted = state.try_take();
            self.log_acquisition(granted, &state);
            return granted;
        }

        let deadline = Instant::now().checked_add(timeout);
        loop {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                tracing::debug!(pool = %self.id, "Permit wait cancelled");
                self.log_acquisition(false, &state);
                return false;
            }

            if state.try_take() {
                self.log_acquisition(true, &state);
                return true;
            }

            let remaining = match deadline {
                Some(deadline) => deadline.saturating_duration_since(Instant::now()),
                None => timeout,
            };
            if remaining.is_zero() {
                self.log_acquisition(false, &state);
                return false;
            }

            let wait = match cancel {
                Some(_) => remaining.min(CANCEL_POLL_INTERVAL),
                None => remaining,
            };
            state = match self.permit_returned.wait_timeout(state, wait) {
                Ok((guard, _)) => guard,
                Err(poisoned) => {
                    tracing::error!(pool = %self.id, "Permit state mutex poisoned while waiting");
                    poisoned.into_inner().0
                }
            };
        }
    }

    /// Refill to capacity and wake every waiter.
    fn refill(&self) -> Permits {
        let mut state = self.lock_state();
        let capacity = state.capacity;
        *state = PermitState::new(capacity);
        drop(state);
        self.permit_returned.notify_all();

        tracing::debug!(
            pool = %self.id,
            outcome = "reset",
            remaining = %capacity,
            capacity = %capacity,
            "Reset connection permits"
        );
        capacity
    }

    /// The counter is plain data, so a panic while holding the lock leaves it usable.
    fn lock_state(&self) -> MutexGuard<'_, PermitState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            tracing::error!(pool = %self.id, "Permit state mutex poisoned - recovering");
            poisoned.into_inner()
        })
    }

    fn log_acquisition(&self, granted: bool, state: &PermitState) {
        if granted {
            tracing::debug!(
                pool = %self.id,
                outcome = "granted",
                remaining = %state.remaining(),
                capacity = %state.capacity,
                "Acquired permit"
            );
        } else {
            tracing::debug!(
                pool = %self.id,
                outcome = "denied",
                remaining = %state.remaining(),
                capacity = %state.capacity,
                "Denied permit"
            );
        }
    }
}

impl Throttle for PermitPool {
    fn acquire(&self, timeout: Duration) -> bool {
        self.acquire_inner(timeout, None)
    }

    fn capacity(&self) -> Permits {
        self.lock_state().capacity
    }

    fn id(&self) -> PoolId {
        self.id
    }
}

impl Releasable for PermitPool {
    /// Releases beyond capacity are ignored: a permit that was never acquired cannot
    /// raise the pool above its bound.
    fn release(&self) -> Permits {
        let mut state = self.lock_state();
        let Permits::Limited(capacity) = state.capacity else {
            return Permits::Unlimited;
        };

        if state.available >= capacity {
            tracing::warn!(
                pool = %self.id,
                capacity,
                "Permit released without a matching acquire - ignored"
            );
            return state.remaining();
        }

        state.available += 1;
        let remaining = state.remaining();
        drop(state);
        self.permit_returned.notify_one();

        tracing::debug!(
            pool = %self.id,
            outcome = "released",
            remaining = %remaining,
            capacity,
            "Released permit"
        );
        remaining
    }
}

impl Resettable for PermitPool {
    fn reset(&self) -> Permits {
        self.refill()
    }
}

impl std::fmt::Debug for PermitPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock_state();
        f.debug_struct("PermitPool")
            .field("id", &self.id)
            .field("capacity", &state.capacity)
            .field("available", &state.available)
            .finish()
    }
}
