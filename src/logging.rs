//! Logging and tracing configuration for the case views
//!
//! Initialize once at startup:
//! ```rust,ignore
//! case_views::logging::init();
//! ```
//!
//! # Log Levels
//!
//! - `error` - Failed key loads and other faults the views degrade around
//! - `warn`  - Truncated result sets, unparsable preferences
//! - `info`  - Case open/close, preference changes, exports (default in release)
//! - `debug` - Key recomputations, channel registration (default in debug builds)
//! - `trace` - Every refresh event delivered
//!
//! # Environment Variable Control
//!
//! ```bash
//! RUST_LOG=debug case-views case.db
//! RUST_LOG=case_views::refresh=trace case-views case.db
//! RUST_LOG=forensic_audit=info,case_views=warn case-views case.db
//! ```

use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the logging/tracing system
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cfg!(debug_assertions) || cfg!(feature = "debug-logging") {
            EnvFilter::new("case_views=debug,forensic_audit=info")
        } else {
            EnvFilter::new("case_views=info,forensic_audit=info")
        }
    });

    let subscriber = tracing_subscriber::registry().with(filter).with(
        fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .compact(),
    );

    // Ignore the error if a subscriber is already installed
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// Initialize logging with file:line and thread ids; background loads show
/// up under their `view-loader-N` threads
pub fn init_verbose() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("trace"));

    let subscriber = tracing_subscriber::registry().with(filter).with(
        fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .pretty(),
    );

    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[inline]
pub fn is_debug_enabled() -> bool {
    tracing::enabled!(Level::DEBUG)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::{debug, info};

    #[test]
    fn test_init_twice() {
        init();
        init();
        info!("Test log message");
        debug!(channel = "FileSize_SIZE_50_200", "Structured log");
        let _ = is_debug_enabled();
    }
}
