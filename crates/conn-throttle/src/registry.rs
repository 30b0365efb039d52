//! Shared pool registry.
//!
//! Unrelated call sites that throttle with the same settings must coordinate through
//! one pool, not one each. The registry hands out a single [`ResettablePool`] per
//! distinct [`ThrottleConfig`].
//!
//! The registry is an ordinary owned value: whoever assembles the transport layer
//! creates one and passes it to the transports. Entries are never removed, so a pool
//! lives as long as its registry. Every pool it creates resets on the registry's
//! [`ResetScheduler`] thread.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::config::{ThrottleConfig, whole_millis};
use crate::permit::{ResettablePool, Throttle};
use crate::reset::ResetScheduler;

pub struct SemaphoreRegistry {
    pools: DashMap<ThrottleConfig, Arc<ResettablePool>>,
    scheduler: Arc<ResetScheduler>,
}

impl SemaphoreRegistry {
    /// Create an empty registry with its own reset scheduler.
    pub fn new() -> Self {
        Self::with_scheduler(Arc::new(ResetScheduler::new()))
    }

    /// Create an empty registry whose pools reset on `scheduler`.
    pub fn with_scheduler(scheduler: Arc<ResetScheduler>) -> Self {
        Self {
            pools: DashMap::new(),
            scheduler,
        }
    }

    /// The pool for `config`, created on first request.
    ///
    /// Creation happens under the entry lock, so concurrent first requests for the
    /// same config still produce exactly one pool.
    pub fn get_or_create(&self, config: ThrottleConfig) -> Arc<ResettablePool> {
        match self.pools.entry(config) {
            Entry::Occupied(entry) => Arc::clone(entry.get()),
            Entry::Vacant(entry) => {
                let pool = Arc::new(ResettablePool::with_scheduler(
                    config,
                    Arc::clone(&self.scheduler),
                ));
                tracing::info!(
                    pool = %pool.id(),
                    capacity = %config.capacity,
                    reset_interval_ms = whole_millis(config.reset_interval),
                    "Registered shared connection pool"
                );
                entry.insert(Arc::clone(&pool));
                pool
            }
        }
    }

    /// The pool for `config`, if one was created.
    pub fn get(&self, config: &ThrottleConfig) -> Option<Arc<ResettablePool>> {
        self.pools.get(config).map(|entry| Arc::clone(entry.value()))
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }
}

impl Default for SemaphoreRegistry {
    fn default() -> Self {
        Self::new()
    }
}
