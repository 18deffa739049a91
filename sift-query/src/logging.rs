//! Logging setup for sift.
//!
//! Structured logging is controlled by the `SIFT_DEBUG` environment variable.
//!
//! # Environment Variables
//!
//! - `SIFT_DEBUG=true` - Enable debug logging
//! - `SIFT_DEBUG=1` - Enable debug logging
//! - `SIFT_LOG_LEVEL=debug|info|warn|error|trace` - Set specific log level
//! - `SIFT_LOG_FORMAT=json|pretty|compact` - Set output format (default: json)
//!
//! # Usage
//!
//! ```rust,no_run
//! use sift_query::logging;
//!
//! // Initialize logging (call once at startup)
//! logging::init();
//! ```
//!
//! Inside the crate the standard tracing macros are used:
//!
//! ```rust,ignore
//! use tracing::{debug, trace, warn};
//!
//! debug!(resource = %registry.resource(), "Parsing filter");
//! trace!(field = %field, op = %op, "Built comparison");
//! warn!(requested = items, max = max_items, "Clamped page size");
//! ```

use std::env;
use std::sync::Once;

static INIT: Once = Once::new();

/// Check if debug logging is enabled via `SIFT_DEBUG`.
///
/// Returns `true` if `SIFT_DEBUG` is set to "true", "1", or "yes" (case-insensitive).
#[inline]
pub fn is_debug_enabled() -> bool {
    env::var("SIFT_DEBUG")
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false)
}

/// Get the configured log level from `SIFT_LOG_LEVEL`.
///
/// Defaults to "debug" if `SIFT_DEBUG` is enabled, otherwise "warn".
pub fn get_log_level() -> &'static str {
    let fallback = if is_debug_enabled() { "debug" } else { "warn" };
    match env::var("SIFT_LOG_LEVEL") {
        Ok(level) => match level.to_lowercase().as_str() {
            "trace" => "trace",
            "debug" => "debug",
            "info" => "info",
            "warn" => "warn",
            "error" => "error",
            _ => fallback,
        },
        Err(_) => fallback,
    }
}

/// Get the configured log format from `SIFT_LOG_FORMAT`.
///
/// Defaults to "json".
pub fn get_log_format() -> &'static str {
    env::var("SIFT_LOG_FORMAT")
        .map(|f| match f.to_lowercase().as_str() {
            "pretty" => "pretty",
            "compact" => "compact",
            _ => "json",
        })
        .unwrap_or("json")
}

/// Initialize the sift logging system.
///
/// Subsequent calls are no-ops. Nothing is installed unless `SIFT_DEBUG` or
/// `SIFT_LOG_LEVEL` is set, and only when the `tracing-subscriber` feature
/// is enabled; otherwise the host application's subscriber receives events.
pub fn init() {
    INIT.call_once(|| {
        if !is_debug_enabled() && env::var("SIFT_LOG_LEVEL").is_err() {
            return;
        }

        #[cfg(feature = "tracing-subscriber")]
        {
            use tracing_subscriber::{EnvFilter, fmt, prelude::*};

            let level = get_log_level();
            let filter = EnvFilter::try_new(format!("sift={},sift_query={}", level, level))
                .unwrap_or_else(|_| EnvFilter::new("warn"));

            let registry = tracing_subscriber::registry().with(filter);
            let installed = match get_log_format() {
                "json" => registry.with(fmt::layer().json()).try_init(),
                "compact" => registry.with(fmt::layer().compact()).try_init(),
                _ => registry.with(fmt::layer().pretty()).try_init(),
            };

            if installed.is_ok() {
                tracing::info!(
                    level = level,
                    format = get_log_format(),
                    "sift logging initialized"
                );
            }
        }
    });
}

/// Debug-level event, emitted only when `SIFT_DEBUG` is enabled at runtime.
#[macro_export]
macro_rules! sift_debug {
    ($($arg:tt)*) => {
        if $crate::logging::is_debug_enabled() {
            tracing::debug!($($arg)*);
        }
    };
}

/// Trace-level event, emitted only when `SIFT_DEBUG` is enabled at runtime.
#[macro_export]
macro_rules! sift_trace {
    ($($arg:tt)*) => {
        if $crate::logging::is_debug_enabled() {
            tracing::trace!($($arg)*);
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_env() {
        // SAFETY: the only test touching these variables
        unsafe {
            env::remove_var("SIFT_DEBUG");
            env::remove_var("SIFT_LOG_LEVEL");
            env::remove_var("SIFT_LOG_FORMAT");
        }
        assert!(!is_debug_enabled());
        assert_eq!(get_log_level(), "warn");
        assert_eq!(get_log_format(), "json");
        // no subscriber is requested, so this must be a silent no-op
        init();
    }
}
