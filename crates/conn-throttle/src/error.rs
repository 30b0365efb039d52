use std::time::Duration;

use crate::permit::{Permits, PoolId};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ThrottleError {
    /// No permit could be acquired within the timeout.
    #[error("connection permit denied by pool {pool} (capacity {capacity}, waited {timeout:?})")]
    Denied {
        pool: PoolId,
        capacity: Permits,
        timeout: Duration,
    },

    #[error("invalid value for {var}: {value:?}")]
    InvalidConfig { var: &'static str, value: String },
}
