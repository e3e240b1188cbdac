//! Logging init: stderr plus a daily-rotated file under `logs/`, level
//! controlled by `RUST_LOG` (default `info`). Rotated files older than
//! `CAPSWRITER_LOG_RETENTION_DAYS` (default 7, `0` disables) are pruned
//! once at startup.

use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const LOG_FILE_PREFIX: &str = "capswriter-server.log";

pub fn init() -> anyhow::Result<WorkerGuard> {
    std::fs::create_dir_all("logs")?;
    let file_appender = RollingFileAppender::new(Rotation::DAILY, "logs", LOG_FILE_PREFIX);
    let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let env_filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    let stderr_layer = fmt::layer().with_writer(std::io::stderr);
    let file_layer = fmt::layer().with_writer(non_blocking_file).with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    let retention_days = std::env::var("CAPSWRITER_LOG_RETENTION_DAYS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok());
    prune_old_logs(retention_days);

    Ok(guard)
}

/// Removes rotated files under `logs/` (named `{LOG_FILE_PREFIX}.YYYY-MM-DD`)
/// whose mtime is older than `retention_days` days. `Some(0)` disables
/// pruning; `None` defaults to 7 days.
fn prune_old_logs(retention_days: Option<u64>) {
    let retention = retention_days.unwrap_or(7);
    if retention == 0 {
        tracing::debug!("log retention disabled (CAPSWRITER_LOG_RETENTION_DAYS=0)");
        return;
    }

    let cutoff = match SystemTime::now().checked_sub(Duration::from_secs(retention * 24 * 60 * 60))
    {
        Some(t) => t,
        None => return,
    };

    let logs_dir = Path::new("logs");
    if !logs_dir.exists() {
        return;
    }

    match fs::read_dir(logs_dir) {
        Ok(entries) => {
            for entry in entries.flatten() {
                let path = entry.path();
                let rotated_prefix = format!("{LOG_FILE_PREFIX}.");
                if let Some(name) = path.file_name().and_then(|s| s.to_str()) {
                    if name.starts_with(&rotated_prefix) {
                        if let Ok(meta) = entry.metadata() {
                            if let Ok(modified) = meta.modified() {
                                if modified < cutoff {
                                    if let Err(err) = fs::remove_file(&path) {
                                        tracing::warn!(path = %path.display(), %err, "failed to remove old log");
                                    } else {
                                        tracing::info!(path = %path.display(), "removed old log file");
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
        Err(err) => tracing::warn!(%err, "failed to read logs directory for pruning"),
    }
}
