//! Diagnostic logging setup.
//!
//! The engine reports through `tracing` at phase boundaries and the SQL
//! Server driver logs every statement at `DEBUG`. This module installs a
//! subscriber for applications that do not bring their own.
//!
//! # Environment Variables
//!
//! - `PRAX_DEBUG=true|1|yes` - Enable debug logging
//! - `PRAX_LOG_LEVEL=trace|debug|info|warn|error` - Set a specific level
//! - `PRAX_LOG_FORMAT=json|pretty|compact` - Output format (default: json)
//!
//! ```rust,no_run
//! use prax_automigrate_core::logging;
//!
//! logging::init();
//! ```
//!
//! Installing the subscriber requires the `tracing-subscriber` feature;
//! without it `init` only records that initialization happened.

use std::env;
use std::sync::Once;

static INIT: Once = Once::new();

/// Crates whose events the installed filter lets through.
const LOG_TARGETS: &[&str] = &[
    "prax_automigrate",
    "prax_automigrate_core",
    "prax_automigrate_mssql",
];

/// Whether `PRAX_DEBUG` asks for debug logging.
pub fn is_debug_enabled() -> bool {
    env::var("PRAX_DEBUG")
        .map(|v| parse_flag(&v))
        .unwrap_or(false)
}

/// Level taken from `PRAX_LOG_LEVEL`, falling back on `PRAX_DEBUG`.
pub fn get_log_level() -> &'static str {
    resolve_level(env::var("PRAX_LOG_LEVEL").ok().as_deref(), is_debug_enabled())
}

/// Format taken from `PRAX_LOG_FORMAT`.
pub fn get_log_format() -> &'static str {
    resolve_format(env::var("PRAX_LOG_FORMAT").ok().as_deref())
}

fn parse_flag(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "true" | "1" | "yes")
}

fn resolve_level(requested: Option<&str>, debug: bool) -> &'static str {
    let fallback = if debug { "debug" } else { "warn" };

    match requested.map(str::to_lowercase).as_deref() {
        Some("trace") => "trace",
        Some("debug") => "debug",
        Some("info") => "info",
        Some("warn") => "warn",
        Some("error") => "error",
        _ => fallback,
    }
}

fn resolve_format(requested: Option<&str>) -> &'static str {
    match requested.map(str::to_lowercase).as_deref() {
        Some("pretty") => "pretty",
        Some("compact") => "compact",
        _ => "json",
    }
}

#[cfg_attr(not(feature = "tracing-subscriber"), allow(dead_code))]
fn filter_directives(level: &str) -> String {
    LOG_TARGETS
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Install the global subscriber once. Later calls are no-ops.
///
/// Nothing is installed unless `PRAX_DEBUG` or `PRAX_LOG_LEVEL` is set.
pub fn init() {
    INIT.call_once(|| {
        if !is_debug_enabled() && env::var("PRAX_LOG_LEVEL").is_err() {
            return;
        }

        #[cfg(feature = "tracing-subscriber")]
        {
            use tracing_subscriber::{EnvFilter, fmt, prelude::*};

            let level = get_log_level();
            let filter = EnvFilter::try_new(filter_directives(level))
                .unwrap_or_else(|_| EnvFilter::new("warn"));

            let installed = match get_log_format() {
                "json" => tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().json())
                    .try_init(),
                "compact" => tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().compact())
                    .try_init(),
                _ => tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().pretty())
                    .try_init(),
            };

            if installed.is_ok() {
                tracing::info!(
                    level = level,
                    format = get_log_format(),
                    "Auto-migrate logging initialized"
                );
            }
        }
    });
}
