//! Tracing subscriber setup.
//!
//! Logs go to a daily-rolling file under `<home>/logs/` so stdout stays free
//! for command output. The filter comes from `DOCDESK_LOG` (default `warn`).

use std::fs;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::paths;

pub const LOG_ENV_VAR: &str = "DOCDESK_LOG";
const LOG_FILE_PREFIX: &str = "docdesk.log";

/// Installs the global subscriber writing to the default logs directory.
///
/// The returned guard must stay alive until exit so buffered lines are
/// flushed. Returns `None` when the directory cannot be created or a
/// subscriber is already installed.
pub fn init() -> Option<WorkerGuard> {
    init_in(&paths::logs_dir())
}

pub fn init_in(log_dir: &Path) -> Option<WorkerGuard> {
    if let Err(e) = fs::create_dir_all(log_dir) {
        eprintln!("Failed to create logs directory {}: {e}", log_dir.display());
        return None;
    }

    let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_filter(env_filter());

    tracing_subscriber::registry()
        .with(file_layer)
        .try_init()
        .ok()?;

    Some(guard)
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new("warn"))
}
