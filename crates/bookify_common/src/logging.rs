//! Logging utilities for Bookify.
//!
//! Every binary calls one of the `init*` functions once at startup; library crates only use
//! the `tracing` macros.

use std::str::FromStr;

use tracing::{error, info, Level};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the tracing subscriber at INFO level.
///
/// # Examples
///
/// ```
/// use bookify_common::logging;
///
/// logging::init();
/// logging::init_with_level(tracing::Level::DEBUG);
/// ```
pub fn init() {
    init_with_level(Level::INFO);
}

/// Initialize the tracing subscriber with a specific log level for the `bookify` targets.
///
/// `RUST_LOG` still applies to every other target.
pub fn init_with_level(level: Level) {
    // Nothing is written to a file, so the guard can be dropped right away.
    let _ = init_with_options(level, None);
}

/// Initialize logging from the string level and optional directory found in configuration.
///
/// Returns the file writer guard when a directory is given; keep it alive for the lifetime
/// of the process or buffered lines are lost.
pub fn init_from_config(level: Option<&str>, directory: Option<&str>) -> Option<WorkerGuard> {
    let level = level
        .and_then(|l| Level::from_str(l).ok())
        .unwrap_or(Level::INFO);
    init_with_options(level, directory)
}

fn init_with_options(level: Level, directory: Option<&str>) -> Option<WorkerGuard> {
    let mut filter = EnvFilter::from_default_env();
    // prefix match: covers bookify_sync, bookify_booking, ...
    if let Ok(directive) = format!("bookify={}", level).parse() {
        filter = filter.add_directive(directive);
    }

    let (file_layer, guard) = match directory {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "bookify.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    // try_init: a subscriber may already be installed (tests, embedding binaries)
    let result = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_thread_ids(true),
        )
        .with(file_layer)
        .with(filter)
        .try_init();

    if result.is_ok() {
        info!("Logging initialized at level: {}", level);
    }
    guard
}

/// Log an error with context at the ERROR level.
pub fn log_error<E: std::fmt::Display>(error: E, context: &str) {
    error!("{}: {}", context, error);
}

/// Log a result, with different messages for success and error cases.
///
/// Returns the original result, so it can be used in a chain.
pub fn log_result<T, E: std::fmt::Display>(
    result: Result<T, E>,
    success_message: &str,
    error_context: &str,
) -> Result<T, E> {
    match &result {
        Ok(_) => info!("{}", success_message),
        Err(e) => error!("{}: {}", error_context, e),
    }
    result
}
