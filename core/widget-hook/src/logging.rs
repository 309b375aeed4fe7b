//! Log setup. Output goes to a daily file under `<root>/logs/` so stdout stays
//! reserved for protocol responses.

use std::env;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use widget_core::StorageConfig;

const DEBUG_ENV_VAR: &str = "WIDGET_DEBUG_LOG";
const LOG_FILE_PREFIX: &str = "widget-hook.log";

fn filter() -> EnvFilter {
    let debug_enabled = env::var(DEBUG_ENV_VAR)
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Installs the global subscriber. Keep the guard alive until exit or
/// buffered lines are lost.
///
/// Falls back to stderr when the log directory cannot be created.
pub fn init(storage: &StorageConfig) -> Option<WorkerGuard> {
    if let Err(err) = storage.ensure_dirs() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter())
            .with_writer(std::io::stderr)
            .try_init();
        tracing::warn!(error = %err, "Log directory unavailable, logging to stderr");
        return None;
    }

    let appender = tracing_appender::rolling::daily(storage.logs_dir(), LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter())
        .with_writer(writer)
        .with_ansi(false)
        .try_init();
    Some(guard)
}
