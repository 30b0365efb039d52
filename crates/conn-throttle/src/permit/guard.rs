//! Scoped permit that returns to its pool on drop.

use super::{Permits, Releasable};

/// A checked-out permit.
///
/// Dropping the guard releases the permit. [`forget`](Self::forget) keeps it checked
/// out; only a reset of the pool recovers it afterwards.
#[must_use = "dropping the guard releases the permit immediately"]
pub struct PermitGuard<'a, P: Releasable + ?Sized> {
    pool: &'a P,
    armed: bool,
}

impl<'a, P: Releasable + ?Sized> PermitGuard<'a, P> {
    pub(crate) fn new(pool: &'a P) -> Self {
        Self { pool, armed: true }
    }

    /// Release now and report the permits available afterwards.
    pub fn release(mut self) -> Permits {
        self.armed = false;
        self.pool.release()
    }

    /// Keep the permit checked out past the guard's lifetime.
    pub fn forget(mut self) {
        self.armed = false;
        tracing::debug!(pool = %self.pool.id(), "Permit guard forgotten - permit stays checked out");
    }
}

impl<P: Releasable + ?Sized> Drop for PermitGuard<'_, P> {
    fn drop(&mut self) {
        if self.armed {
            self.pool.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::permit::{PermitPool, Permits, Releasable, Resettable, Throttle};

    #[test]
    fn guard_returns_permit_on_drop() {
        let pool = PermitPool::new(Permits::Limited(1));

        {
            let _guard = pool.acquire_guard(Duration::ZERO).unwrap();
            assert!(pool.acquire_guard(Duration::ZERO).is_none());
        }

        assert!(pool.acquire_guard(Duration::ZERO).is_some());
    }

    #[test]
    fn explicit_release_reports_remaining() {
        let pool = PermitPool::new(Permits::Limited(2));
        let guard = pool.acquire_guard(Duration::ZERO).unwrap();
        assert_eq!(pool.available(), Permits::Limited(1));

        assert_eq!(guard.release(), Permits::Limited(2));
        assert_eq!(pool.available(), Permits::Limited(2));
    }

    #[test]
    fn forgotten_permit_needs_reset() {
        let pool = PermitPool::new(Permits::Limited(1));
        pool.acquire_guard(Duration::ZERO).unwrap().forget();

        assert!(!pool.acquire(Duration::ZERO));
        pool.reset();
        assert!(pool.acquire(Duration::ZERO));
    }

    #[test]
    fn denied_guard_does_not_release() {
        let pool = PermitPool::new(Permits::Limited(0));
        assert!(pool.acquire_guard(Duration::ZERO).is_none());
        assert_eq!(pool.available(), Permits::Limited(0));
    }
}
