use std::env;
use std::io;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use gesture_lock_core::StorageConfig;

const LOG_FILE_PREFIX: &str = "gesture-lock.log";

fn debug_enabled() -> bool {
    env::var("GESTURE_LOCK_DEBUG_LOG")
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false)
}

fn env_filter() -> EnvFilter {
    if debug_enabled() {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Logs go to stderr and to a daily file under `logs/`. Stdout is reserved for
/// protocol lines. The returned guard flushes the file writer on drop.
pub fn init(storage: Option<&StorageConfig>) -> Option<WorkerGuard> {
    let stderr_layer = fmt::layer().with_writer(io::stderr).with_target(false);

    let Some(storage) = storage else {
        tracing_subscriber::registry()
            .with(env_filter())
            .with(stderr_layer)
            .init();
        return None;
    };

    let appender = tracing_appender::rolling::daily(storage.logs_dir(), LOG_FILE_PREFIX);
    let (file_writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::registry()
        .with(env_filter())
        .with(stderr_layer)
        .with(fmt::layer().with_writer(file_writer).with_ansi(false))
        .init();
    Some(guard)
}
