use std::path::PathBuf;
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_subscriber::{
    fmt,
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
    Registry,
    Layer,
};

use crate::error::{SnyfterError, SnyfterResult};

/// Logging configuration for SNYFTER
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub log_dir: PathBuf,
    pub enable_file_logging: bool,
    pub enable_json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: PathBuf::from("logs"),
            enable_file_logging: false,
            enable_json_format: false,
        }
    }
}

/// Keeps the non-blocking file writer alive; drop it at shutdown to flush
pub struct LoggingGuard {
    #[cfg(feature = "advanced_logging")]
    _file_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}

fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "snyfter={},sqlx=warn,lopdf=warn,{}",
            level, level
        ))
    })
}

/// Initialize the logging system for SNYFTER
pub fn init_logging(config: &LoggingConfig) -> SnyfterResult<LoggingGuard> {
    let registry = Registry::default().with(build_filter(&config.level));

    let console_layer = if config.enable_json_format {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .without_time()
            .compact()
            .boxed()
    };

    #[cfg(feature = "advanced_logging")]
    let guard = if config.enable_file_logging {
        std::fs::create_dir_all(&config.log_dir)
            .map_err(|e| SnyfterError::file_io(
                config.log_dir.to_string_lossy().to_string(),
                e
            ))?;

        let file_appender = tracing_appender::rolling::daily(&config.log_dir, "snyfter.log");
        let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);

        let file_layer = if config.enable_json_format {
            fmt::layer()
                .json()
                .with_writer(file_writer)
                .boxed()
        } else {
            fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .boxed()
        };

        registry
            .with(console_layer)
            .with(file_layer)
            .try_init()
            .map_err(|e| SnyfterError::configuration(format!("logging already initialized: {}", e)))?;

        LoggingGuard { _file_guard: Some(file_guard) }
    } else {
        registry
            .with(console_layer)
            .try_init()
            .map_err(|e| SnyfterError::configuration(format!("logging already initialized: {}", e)))?;

        LoggingGuard { _file_guard: None }
    };

    #[cfg(not(feature = "advanced_logging"))]
    let guard = {
        registry
            .with(console_layer)
            .try_init()
            .map_err(|e| SnyfterError::configuration(format!("logging already initialized: {}", e)))?;

        if config.enable_file_logging {
            tracing::warn!(
                "File logging requested but snyfter was built without the advanced_logging feature"
            );
        }
        LoggingGuard {}
    };

    info!("📄 SNYFTER logging initialized");
    info!("Log level: {}", config.level);

    if config.enable_file_logging && cfg!(feature = "advanced_logging") {
        info!("File logging enabled: {}", config.log_dir.display());
    }

    Ok(guard)
}

/// Performance logging utilities
pub struct PerformanceTimer {
    start: std::time::Instant,
    operation: String,
}

impl PerformanceTimer {
    pub fn start(operation: impl Into<String>) -> Self {
        let operation = operation.into();
        tracing::debug!("⏱️  Starting: {}", operation);
        Self {
            start: std::time::Instant::now(),
            operation,
        }
    }

    pub fn checkpoint(&self, checkpoint: &str) {
        let elapsed = self.start.elapsed();
        tracing::debug!("⏱️  {} - {}: {}ms", self.operation, checkpoint, elapsed.as_millis());
    }

    pub fn elapsed_ms(&self) -> u128 {
        self.start.elapsed().as_millis()
    }
}

impl Drop for PerformanceTimer {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        info!("⏱️  Completed {}: {}ms", self.operation, elapsed.as_millis());
    }
}

/// Macro for logging with context
#[macro_export]
macro_rules! log_error {
    ($error:expr, $context:expr) => {
        tracing::error!(
            error = %$error,
            context = $context,
            recoverable = $error.is_recoverable(),
            "SNYFTER error occurred"
        );
    };
}

#[macro_export]
macro_rules! log_processing_start {
    ($file:expr, $size:expr) => {
        tracing::info!(
            file = %$file,
            size_bytes = $size,
            "📄 Starting document processing"
        );
    };
}

#[macro_export]
macro_rules! log_table_extracted {
    ($index:expr, $method:expr, $rows:expr, $cols:expr) => {
        tracing::debug!(
            table_index = $index,
            method = %$method,
            rows = $rows,
            columns = $cols,
            "Extracted table"
        );
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_measures_elapsed() {
        let timer = PerformanceTimer::start("unit");
        timer.checkpoint("halfway");
        assert!(timer.elapsed_ms() < 10_000);
    }

    #[test]
    fn test_default_logs_to_console_only() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "info");
        assert!(!config.enable_file_logging);
    }
}
