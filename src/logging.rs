use std::{
    fs,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use anyhow::{Context, Result, anyhow};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{self, RollingFileAppender},
};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, Layer, filter::LevelFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};
use uuid::Uuid;

use crate::config::{LoggingConfig, LoggingRotation};

const LOG_FILE_PREFIX: &str = "dojo.log";
const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Keeps the background log writer alive; drop it last.
pub struct LoggingGuard {
    _writer: WorkerGuard,
    run_id: Uuid,
    log_dir: PathBuf,
}

impl LoggingGuard {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }
}

/// Installs JSON file logging plus an optional WARN echo on stderr.
pub fn init_tracing(config: &LoggingConfig) -> Result<LoggingGuard> {
    let filter = parse_filter(&config.filter)?;
    let log_dir = absolute_log_dir(&config.dir)?;
    fs::create_dir_all(&log_dir)
        .with_context(|| format!("failed to create log directory {}", log_dir.display()))?;

    let expired = ExpiredLogs::sweep(&log_dir, config.retention_days, SystemTime::now());
    let (writer, writer_guard) = tracing_appender::non_blocking(appender(&log_dir, &config.rotation));

    let file_layer = fmt::layer()
        .json()
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_target(true)
        .with_current_span(true)
        .with_ansi(false)
        .with_writer(writer)
        .with_filter(filter);
    let stderr_layer = config.stderr_warn_enabled.then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_filter(LevelFilter::WARN)
    });

    tracing_subscriber::registry()
        .with(ErrorLayer::default())
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .context("tracing subscriber is already installed")?;

    let run_id = Uuid::now_v7();
    tracing::info!(
        target: "logging",
        run_id = %run_id,
        dir = %log_dir.display(),
        filter = %config.filter,
        rotation = ?config.rotation,
        retention_days = config.retention_days,
        removed_files = expired.removed,
        "logging_initialized"
    );
    for problem in &expired.problems {
        tracing::warn!(target: "logging", problem = %problem, "log_retention_problem");
    }

    Ok(LoggingGuard {
        _writer: writer_guard,
        run_id,
        log_dir,
    })
}

fn parse_filter(filter: &str) -> Result<EnvFilter> {
    if filter.trim().is_empty() {
        return Err(anyhow!("logging.filter must not be empty"));
    }
    EnvFilter::try_new(filter).with_context(|| format!("invalid logging.filter '{filter}'"))
}

fn appender(log_dir: &Path, rotation: &LoggingRotation) -> RollingFileAppender {
    match rotation {
        LoggingRotation::Daily => rolling::daily(log_dir, LOG_FILE_PREFIX),
        LoggingRotation::Hourly => rolling::hourly(log_dir, LOG_FILE_PREFIX),
    }
}

fn absolute_log_dir(dir: &Path) -> Result<PathBuf> {
    if dir.as_os_str().is_empty() {
        return Err(anyhow!("logging.dir must not be empty"));
    }
    if dir.is_absolute() {
        return Ok(dir.to_path_buf());
    }
    let cwd = std::env::current_dir().context("failed to resolve relative logging.dir")?;
    Ok(cwd.join(dir))
}

/// Result of deleting rotated log files older than the retention window.
#[derive(Debug, Default)]
struct ExpiredLogs {
    removed: usize,
    problems: Vec<String>,
}

impl ExpiredLogs {
    fn sweep(log_dir: &Path, retention_days: usize, now: SystemTime) -> Self {
        let mut outcome = Self::default();
        let window = Duration::from_secs(SECONDS_PER_DAY.saturating_mul(retention_days as u64));
        let cutoff = now.checked_sub(window).unwrap_or(SystemTime::UNIX_EPOCH);

        let entries = match fs::read_dir(log_dir) {
            Ok(entries) => entries,
            Err(err) => {
                outcome
                    .problems
                    .push(format!("cannot list {}: {}", log_dir.display(), err));
                return outcome;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            let is_log = entry
                .file_name()
                .to_string_lossy()
                .starts_with(LOG_FILE_PREFIX);
            if !is_log {
                continue;
            }

            let modified = entry
                .metadata()
                .and_then(|metadata| {
                    if metadata.is_file() {
                        metadata.modified().map(Some)
                    } else {
                        Ok(None)
                    }
                });
            match modified {
                Ok(Some(modified)) if modified <= cutoff => match fs::remove_file(&path) {
                    Ok(()) => outcome.removed += 1,
                    Err(err) => outcome
                        .problems
                        .push(format!("cannot remove {}: {}", path.display(), err)),
                },
                Ok(_) => {}
                Err(err) => outcome
                    .problems
                    .push(format!("cannot inspect {}: {}", path.display(), err)),
            }
        }

        outcome
    }
}
