//! conn-throttle: admission control for outbound transfer connections.

pub mod config;
mod error;
pub mod logging;
pub mod permit;
pub mod registry;
pub mod reset;

#[cfg(test)]
mod test_support;

pub use config::ThrottleConfig;
pub use error::ThrottleError;
pub use permit::{
    PermitGuard, PermitPool, Permits, PoolId, Releasable, Resettable, ResettablePool, Throttle,
};
pub use registry::SemaphoreRegistry;
pub use reset::{ResetScheduler, ResetTask};
pub use tokio_util::sync::CancellationToken;
