//! tracing subscriber setup.
//!
//! Logs always go to stderr: stdout carries the single plugin result line.
use crate::config::Overlay;
use clap::{ArgAction, Args, ValueEnum};
use serde::Deserialize;
use thiserror::Error;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to initialize logging: {0}")]
    Init(String),
}

#[derive(Default, Copy, Clone, Debug, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Default, Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Logging configuration
#[derive(Args, Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LoggerArgs {
    /// Log format
    #[arg(long, env = "OSCHECKS_LOG_FORMAT", value_enum)]
    pub log_format: Option<LogFormat>,

    /// Log level
    #[arg(long, env = "OSCHECKS_LOG_LEVEL", value_enum)]
    pub log_level: Option<LogLevel>,

    /// Print requests and probe attempts on stderr. Repeat for more detail.
    #[arg(short, long, action = ArgAction::Count)]
    #[serde(default)]
    pub verbose: u8,
}

impl Overlay for LoggerArgs {
    fn overlay(self, top: Self) -> Self {
        Self {
            log_format: self.log_format.overlay(top.log_format),
            log_level: self.log_level.overlay(top.log_level),
            verbose: self.verbose.max(top.verbose),
        }
    }
}

/// Resolved logging configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Logger {
    pub format: LogFormat,
    pub level: LogLevel,
}

impl From<LoggerArgs> for Logger {
    fn from(args: LoggerArgs) -> Self {
        let configured = args.log_level.unwrap_or_default();
        let verbose = match args.verbose {
            0 => LogLevel::Error,
            1 => LogLevel::Debug,
            _ => LogLevel::Trace,
        };
        Self {
            format: args.log_format.unwrap_or_default(),
            level: configured.max(verbose),
        }
    }
}

impl Logger {
    pub fn init(&self) -> Result<(), LoggingError> {
        let filter = EnvFilter::try_new(self.level.as_str())
            .unwrap_or_else(|_| EnvFilter::new("warn"));
        let result = match self.format {
            LogFormat::Json => tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .json()
                        .with_current_span(false)
                        .with_writer(std::io::stderr),
                )
                .try_init(),
            LogFormat::Text => tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_target(false)
                        .with_writer(std::io::stderr),
                )
                .try_init(),
        };
        match result {
            Ok(()) => Ok(()),
            // a subscriber installed earlier in this process keeps receiving events
            Err(_) if tracing::dispatcher::has_been_set() => Ok(()),
            Err(e) => Err(LoggingError::Init(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_raises_level() {
        let quiet = Logger::from(LoggerArgs::default());
        assert_eq!(quiet.level, LogLevel::Warn);

        let verbose = Logger::from(LoggerArgs {
            verbose: 1,
            ..LoggerArgs::default()
        });
        assert_eq!(verbose.level, LogLevel::Debug);

        let explicit = Logger::from(LoggerArgs {
            log_level: Some(LogLevel::Trace),
            verbose: 1,
            ..LoggerArgs::default()
        });
        assert_eq!(explicit.level, LogLevel::Trace);

        let very = Logger::from(LoggerArgs {
            log_level: Some(LogLevel::Info),
            verbose: 3,
            ..LoggerArgs::default()
        });
        assert_eq!(very.level, LogLevel::Trace);
    }

    #[test]
    fn repeated_init_keeps_first_subscriber() {
        let logger = Logger::default();
        logger.init().unwrap();
        Logger {
            format: LogFormat::Json,
            level: LogLevel::Debug,
        }
        .init()
        .unwrap();
    }
}
