//! File-based logging
//!
//! Writes logs to files under logs/, separated by log type:
//! - logs/main - every event, JSON
//! - logs/error - warnings and errors only
//! - logs/feed - connection lifecycle, probes and dispatch

use std::fs;
use std::path::Path;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    filter::{filter_fn, LevelFilter},
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
    EnvFilter,
};

const LOG_DIR: &str = "logs";

/// Initialize console and file logging
///
/// Console verbosity follows `RUST_LOG` (default `info`). The returned guards
/// flush the file writers and must live for the duration of the program.
/// # Errors
/// Returns error if the log directories cannot be created.
pub fn init_logging() -> std::io::Result<Vec<WorkerGuard>> {
    let logs_dir = Path::new(LOG_DIR);
    for log_type in ["main", "error", "feed"] {
        fs::create_dir_all(logs_dir.join(log_type))?;
    }

    let mut guards = Vec::new();

    let (main_appender, main_guard) = create_appender(logs_dir.join("main"), "main");
    guards.push(main_guard);

    let (error_appender, error_guard) = create_appender(logs_dir.join("error"), "error");
    guards.push(error_guard);

    let (feed_appender, feed_guard) = create_appender(logs_dir.join("feed"), "feed");
    guards.push(feed_guard);

    let main_layer = tracing_subscriber::fmt::layer()
        .with_writer(main_appender)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .json()
        .with_filter(LevelFilter::INFO);

    let error_layer = tracing_subscriber::fmt::layer()
        .with_writer(error_appender)
        .with_ansi(false)
        .with_target(true)
        .with_filter(LevelFilter::WARN);

    let feed_layer = tracing_subscriber::fmt::layer()
        .with_writer(feed_appender)
        .with_ansi(false)
        .with_target(true)
        .with_filter(filter_fn(|metadata| is_feed_target(metadata.target())));

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")));

    tracing_subscriber::registry()
        .with(main_layer)
        .with(error_layer)
        .with(feed_layer)
        .with(console_layer)
        .init();

    tracing::info!("Logging initialized, log files in {}/", LOG_DIR);

    Ok(guards)
}

/// Targets routed to the feed log
fn is_feed_target(target: &str) -> bool {
    target.contains("::ws") || target.contains("::client") || target.contains("::dispatch")
}

/// Create a daily rolling non-blocking file appender
fn create_appender(dir: impl AsRef<Path>, name: &str) -> (NonBlocking, WorkerGuard) {
    let appender = RollingFileAppender::new(Rotation::DAILY, dir, name);
    tracing_appender::non_blocking(appender)
}
