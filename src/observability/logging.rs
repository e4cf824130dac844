//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber
//! - Respect `RUST_LOG` when set, with a sane default filter

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize logging. Safe to call more than once; later calls are
/// no-ops.
pub fn init() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "conncore=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
