//! Subscriber setup: env-filtered stdout, plus a daily-rotated file when
//! [`LogConfig::file_dir`] is set.

use std::io;
use std::path::Path;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogConfig;

const LOG_FILE_PREFIX: &str = "adaptive-tutor.log";
const FALLBACK_LEVEL: &str = "info";
/// sqlx logs every statement at info; keep it to slow queries and failures.
const SQLX_DIRECTIVE: &str = "sqlx=warn";

/// Flushes the file writer on drop. Hold it for the life of the process.
#[must_use]
pub struct LogGuard {
    file: Option<WorkerGuard>,
}

impl LogGuard {
    pub fn writes_file(&self) -> bool {
        self.file.is_some()
    }
}

/// Installs the global subscriber. Later calls leave the first one in place
/// and return a guard without a file writer.
pub fn init(config: &LogConfig) -> LogGuard {
    let file = config.file_dir.as_deref().and_then(|dir| match file_writer(dir) {
        Ok(writer) => Some(writer),
        Err(err) => {
            eprintln!("file logging disabled, cannot use {}: {err}", dir.display());
            None
        }
    });
    let (writer, guard) = match file {
        Some((writer, guard)) => (Some(writer), Some(guard)),
        None => (None, None),
    };
    let file_layer = writer.map(|w| fmt::layer().with_writer(w).with_ansi(false).with_target(true));

    let installed = tracing_subscriber::registry()
        .with(build_filter(&config.level))
        .with(fmt::layer().with_target(true))
        .with(file_layer)
        .try_init()
        .is_ok();

    LogGuard {
        file: if installed { guard } else { None },
    }
}

fn build_filter(level: &str) -> EnvFilter {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new(FALLBACK_LEVEL));
    if level.contains("sqlx") {
        return filter;
    }
    match SQLX_DIRECTIVE.parse() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    }
}

fn file_writer(dir: &Path) -> io::Result<(NonBlocking, WorkerGuard)> {
    std::fs::create_dir_all(dir)?;
    let appender = RollingFileAppender::new(Rotation::DAILY, dir, LOG_FILE_PREFIX);
    Ok(tracing_appender::non_blocking(appender))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_quiets_sqlx_unless_configured() {
        assert!(build_filter("debug").to_string().contains(SQLX_DIRECTIVE));
        assert!(build_filter("not a valid filter [").to_string().contains(SQLX_DIRECTIVE));
        assert!(!build_filter("info,sqlx=debug").to_string().contains(SQLX_DIRECTIVE));
    }

    #[test]
    fn test_file_writer_creates_directory() {
        let dir = std::env::temp_dir().join(format!("adaptive-tutor-logs-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let (_writer, _guard) = file_writer(&dir).unwrap();
        assert!(dir.is_dir());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_init_twice_does_not_panic() {
        let _first = init(&LogConfig::default());
        let second = init(&LogConfig {
            level: "not a valid filter [".into(),
            file_dir: None,
        });
        assert!(!second.writes_file());
    }
}
