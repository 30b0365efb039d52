//! Connection permits.
//!
//! A transport acquires a permit before opening a connection. The capability set is
//! split across traits so callers can depend on exactly what they use:
//! - [`Throttle`]: timed acquisition (every pool)
//! - [`Releasable`]: explicit return of a permit
//! - [`Resettable`]: forced refill back to capacity
//!
//! [`PermitPool`] is the releasable counter. [`ResettablePool`] wraps it with a
//! periodic reset task and is what the registry hands out.

mod guard;
mod pool;
mod resettable;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ThrottleError;

pub use guard::PermitGuard;
pub use pool::PermitPool;
pub use resettable::ResettablePool;

/// A permit count: either a bound or unlimited.
///
/// The raw integer form follows the transport configuration convention: negative
/// means unlimited, zero means no permit is ever granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum Permits {
    Unlimited,
    Limited(usize),
}

impl Permits {
    /// The bound, if any.
    pub fn limit(&self) -> Option<usize> {
        match self {
            Self::Unlimited => None,
            Self::Limited(n) => Some(*n),
        }
    }

    pub fn as_raw(&self) -> i64 {
        match self {
            Self::Unlimited => -1,
            Self::Limited(n) => i64::try_from(*n).unwrap_or(i64::MAX),
        }
    }
}

impl From<i64> for Permits {
    fn from(raw: i64) -> Self {
        match usize::try_from(raw) {
            Ok(n) => Self::Limited(n),
            Err(_) if raw < 0 => Self::Unlimited,
            Err(_) => Self::Limited(usize::MAX),
        }
    }
}

impl From<Permits> for i64 {
    fn from(permits: Permits) -> Self {
        permits.as_raw()
    }
}

impl std::fmt::Display for Permits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unlimited => f.write_str("unlimited"),
            Self::Limited(n) => write!(f, "{}", n),
        }
    }
}

/// Identity of a pool in diagnostic records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PoolId(uuid::Uuid);

impl PoolId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for PoolId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PoolId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Timed permit acquisition.
pub trait Throttle: Send + Sync {
    /// Acquire one permit, waiting at most `timeout`.
    ///
    /// Timeouts under one millisecond never block. Returns `false` when no permit
    /// was obtained; denial is not an error.
    fn acquire(&self, timeout: Duration) -> bool;

    fn capacity(&self) -> Permits;

    fn id(&self) -> PoolId;

    /// Like [`acquire`](Self::acquire), but a denial becomes [`ThrottleError::Denied`].
    fn admit(&self, timeout: Duration) -> Result<(), ThrottleError> {
        if self.acquire(timeout) {
            Ok(())
        } else {
            Err(ThrottleError::Denied {
                pool: self.id(),
                capacity: self.capacity(),
                timeout,
            })
        }
    }
}

/// A throttle whose permits can be handed back explicitly.
pub trait Releasable: Throttle {
    /// Return one permit. Returns the permits now available.
    fn release(&self) -> Permits;

    /// Acquire a permit that is released when the guard drops.
    fn acquire_guard(&self, timeout: Duration) -> Option<PermitGuard<'_, Self>>
    where
        Self: Sized,
    {
        self.acquire(timeout).then(|| PermitGuard::new(self))
    }
}

/// A throttle that can be refilled to capacity, recovering leaked permits.
pub trait Resettable: Throttle {
    /// Discard the current permit state and make the full capacity available.
    /// Returns the capacity.
    fn reset(&self) -> Permits;
}
