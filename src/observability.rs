//! Logging and observability helpers.

pub mod sensitive;

pub use sensitive::Sensitive;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

const LOG_FILE_PREFIX: &str = "qoredb-shard.log";
const DEFAULT_FILTER: &str = "qoredb_shard=info";
const DEFAULT_RETENTION_DAYS: u64 = 14;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human readable, to stderr
    #[default]
    Human,
    /// JSON lines in a daily rolling file
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
    /// Directive used when `RUST_LOG` is unset
    #[serde(default)]
    pub filter: Option<String>,
    /// Log directory for the JSON format, `~/.qoredb-shard/logs` by default
    #[serde(default)]
    pub directory: Option<PathBuf>,
    #[serde(default = "default_retention_days")]
    pub retention_days: u64,
}

fn default_retention_days() -> u64 {
    DEFAULT_RETENTION_DAYS
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            filter: None,
            directory: None,
            retention_days: DEFAULT_RETENTION_DAYS,
        }
    }
}

impl LoggingConfig {
    pub fn log_directory(&self) -> PathBuf {
        self.directory.clone().unwrap_or_else(default_log_directory)
    }
}

/// Installs the global subscriber. Calling it again is a no-op.
pub fn init_tracing(config: &LoggingConfig) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(config.filter.as_deref().unwrap_or(DEFAULT_FILTER))
    });

    match config.format {
        LogFormat::Human => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(true)
                .try_init();
        }
        LogFormat::Json => {
            let log_dir = config.log_directory();
            let _ = fs::create_dir_all(&log_dir);

            if let Err(e) = cleanup_old_logs(&log_dir, config.retention_days) {
                eprintln!("Failed to clean up old logs: {}", e);
            }

            let file_appender: RollingFileAppender =
                tracing_appender::rolling::daily(&log_dir, LOG_FILE_PREFIX);
            let _ = tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(file_appender)
                .json()
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_current_span(true)
                .with_span_list(true)
                .with_ansi(false)
                .with_span_events(FmtSpan::CLOSE)
                .try_init();
        }
    }

    install_panic_hook();
    tracing::info!(format = ?config.format, "Tracing initialized");
}

fn install_panic_hook() {
    let previous_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let payload = panic_info.payload();
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());

        let msg = if let Some(s) = payload.downcast_ref::<&str>() {
            format!("PANIC: {}", s)
        } else if let Some(s) = payload.downcast_ref::<String>() {
            format!("PANIC: {}", s)
        } else {
            "PANIC: unknown cause".to_string()
        };

        tracing::error!(target: "panic", location = %location, message = %msg, "Panicked");
        previous_hook(panic_info);
    }));
}

fn default_log_directory() -> PathBuf {
    let home = if cfg!(windows) {
        std::env::var_os("USERPROFILE")
    } else {
        std::env::var_os("HOME")
    };
    let mut path = PathBuf::from(home.unwrap_or_default());
    path.push(".qoredb-shard");
    path.push("logs");
    path
}

/// Removes log files older than `retention_days`. Returns how many went.
fn cleanup_old_logs(log_dir: &Path, retention_days: u64) -> std::io::Result<usize> {
    let now = SystemTime::now();
    let retention = Duration::from_secs(retention_days * 24 * 60 * 60);
    let mut removed = 0;

    for entry in fs::read_dir(log_dir)? {
        let path = entry?.path();
        let is_log = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with(LOG_FILE_PREFIX));
        if !is_log {
            continue;
        }

        let age = fs::metadata(&path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| now.duration_since(modified).ok());
        if age.is_some_and(|age| age > retention) {
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => eprintln!("Failed to remove old log file {:?}: {}", path, e),
            }
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    #[test]
    fn removes_only_expired_log_files() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join(format!("{LOG_FILE_PREFIX}.2020-01-01"));
        let fresh = dir.path().join(format!("{LOG_FILE_PREFIX}.2099-01-01"));
        let other = dir.path().join("notes.txt");
        for path in [&old, &fresh, &other] {
            File::create(path).unwrap();
        }

        let a_month_ago = SystemTime::now() - Duration::from_secs(30 * 24 * 60 * 60);
        for path in [&old, &other] {
            File::options()
                .write(true)
                .open(path)
                .unwrap()
                .set_modified(a_month_ago)
                .unwrap();
        }

        assert_eq!(cleanup_old_logs(dir.path(), 14).unwrap(), 1);
        assert!(!old.exists());
        assert!(fresh.exists());
        assert!(other.exists());
    }

    #[test]
    fn json_logging_creates_its_directory() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("nested").join("logs");
        let config = LoggingConfig {
            format: LogFormat::Json,
            filter: Some("qoredb_shard=debug".into()),
            directory: Some(logs.clone()),
            retention_days: 1,
        };

        init_tracing(&config);
        // a second subscriber is refused without panicking
        init_tracing(&config);
        assert!(logs.is_dir());
    }

    #[test]
    fn logging_config_defaults() {
        let config: LoggingConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.format, LogFormat::Human);
        assert_eq!(config.retention_days, DEFAULT_RETENTION_DAYS);
        assert!(config.log_directory().ends_with("logs"));
    }
}
