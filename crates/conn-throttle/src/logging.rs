//! Subscriber setup for binaries and transports that embed the throttle.
//!
//! The library only emits `tracing` events; installing a subscriber is left to the
//! host. `init_tracing` is a ready-made one honoring `RUST_LOG`, `THROTTLE_LOG` and
//! `LOG_FORMAT`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Log level for this crate when `RUST_LOG` is unset.
pub const LOG_LEVEL_VAR: &str = "THROTTLE_LOG";

/// Install a global stderr subscriber. Does nothing if one is already set.
pub fn init_tracing() {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match std::env::var(LOG_LEVEL_VAR).as_deref() {
            Ok("trace") => "trace",
            Ok("debug") => "debug",
            Ok("warn") | Ok("warning") => "warn",
            Ok("error") => "error",
            _ => "info",
        };
        EnvFilter::new(format!("conn_throttle={level}"))
    };

    let layer = fmt::layer().with_writer(std::io::stderr);
    if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(layer.json())
            .try_init();
    } else {
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(layer)
            .try_init();
    }
}
