//! Subscriber setup for hosts and the `perf-issues` tool.
//!
//! The library never installs a subscriber on its own; embedding processes
//! usually bring their own. Tools and tests call [`init_logging`].

use std::fs::File;
use std::path::PathBuf;
use std::sync::Mutex;

use thiserror::Error;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Human-readable, for local inspection.
    Pretty,
}

impl LogFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "json" => Some(LogFormat::Json),
            "pretty" | "text" => Some(LogFormat::Pretty),
            _ => None,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub format: LogFormat,
    /// Filter directive, e.g. "info" or "perf_issues::store=debug".
    pub level: String,
    /// Write to this file instead of stderr.
    pub output_path: Option<PathBuf>,
    /// Include the records themselves (`perf_issues::record` target).
    pub echo_records: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Json,
            level: "info".to_string(),
            output_path: None,
            echo_records: true,
        }
    }
}

impl LogConfig {
    pub fn pretty() -> Self {
        Self {
            format: LogFormat::Pretty,
            ..Self::default()
        }
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    fn directives(&self) -> String {
        if self.echo_records {
            self.level.clone()
        } else {
            format!("{},perf_issues::record=off", self.level)
        }
    }
}

#[derive(Debug, Error)]
pub enum LogError {
    #[error("Invalid log filter: {0}")]
    InvalidFilter(String),
    #[error("Failed to open log file: {0}")]
    FileOpen(String),
    #[error("Subscriber already initialized")]
    AlreadyInitialized,
}

/// Install the global subscriber. Call once.
pub fn init_logging(config: &LogConfig) -> Result<(), LogError> {
    let filter = EnvFilter::try_new(config.directives())
        .map_err(|e| LogError::InvalidFilter(e.to_string()))?;
    let file = match &config.output_path {
        Some(path) => Some(File::create(path).map_err(|e| LogError::FileOpen(e.to_string()))?),
        None => None,
    };
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match (config.format, file) {
        (LogFormat::Json, Some(file)) => registry
            .with(fmt::layer().json().with_writer(Mutex::new(file)))
            .try_init(),
        (LogFormat::Json, None) => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        (LogFormat::Pretty, Some(file)) => registry
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .try_init(),
        (LogFormat::Pretty, None) => registry
            .with(fmt::layer().pretty().with_writer(std::io::stderr))
            .try_init(),
    };
    installed.map_err(|_| LogError::AlreadyInitialized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_names_parse() {
        assert_eq!(LogFormat::parse("JSON"), Some(LogFormat::Json));
        assert_eq!(LogFormat::parse("text"), Some(LogFormat::Pretty));
        assert_eq!(LogFormat::parse("xml"), None);
    }

    #[test]
    fn muted_records_extend_filter() {
        let config = LogConfig {
            echo_records: false,
            ..LogConfig::default().with_level("debug")
        };
        assert_eq!(config.directives(), "debug,perf_issues::record=off");
    }

    #[test]
    fn bad_filter_is_rejected() {
        let config = LogConfig::default().with_level("perf_issues=loudest");
        assert!(matches!(init_logging(&config), Err(LogError::InvalidFilter(_))));
    }
}
