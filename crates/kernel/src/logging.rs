//! Installs the process-wide tracing subscriber from a [`LoggingConfig`].
//!
//! Console output is compact and colored; file output goes through a non-blocking rolling
//! appender, as plain text or JSON.

use crate::config::{LogRotation, LoggingConfig};
use crate::error::LoggingError;
use std::fs;
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::layer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

const LOG_FILE_SUFFIX: &str = "log";

/// A handle to the initialized logging system.
///
/// Holds the background writer of the file appender. Keep it alive until shutdown, dropping it
/// flushes and stops file logging.
#[must_use = "Dropping this handle will stop background logging threads."]
#[derive(Debug)]
pub struct Logger {
    guard: Option<WorkerGuard>,
}

impl Logger {
    /// Installs the global subscriber described by `config`.
    ///
    /// # Errors
    ///
    /// - [`LoggingError::InvalidConfiguration`] for an empty name, zero `max_files`, an unknown
    ///   level or filter, or when neither console nor file output is enabled.
    /// - [`LoggingError::Io`] / [`LoggingError::Appender`] if the log directory cannot be used.
    /// - [`LoggingError::Subscriber`] if a global subscriber is already installed.
    pub fn init(config: &LoggingConfig) -> Result<Self, LoggingError> {
        validate_config(config)?;

        let env_filter = build_env_filter(config)?;

        let mut layers = Vec::new();

        if config.console {
            layers.push(layer().compact().with_ansi(true).boxed());
        }

        let guard = if let Some(path) = &config.path {
            fs::create_dir_all(path).map_err(|source| LoggingError::Io {
                source,
                context: Some(format!("Failed to create path: {}", path.display()).into()),
            })?;

            let file_appender = RollingFileAppender::builder()
                .rotation(rotation(config.rotation))
                .filename_prefix(&config.name)
                .filename_suffix(LOG_FILE_SUFFIX)
                .max_log_files(config.max_files)
                .build(path)?;

            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            let file_layer = layer().with_writer(non_blocking).with_ansi(false);

            layers.push(if config.json { file_layer.json().boxed() } else { file_layer.boxed() });
            Some(guard)
        } else {
            None
        };

        if layers.is_empty() {
            return Err(LoggingError::InvalidConfiguration {
                message: "No logging layers enabled. Enable console or file output.".into(),
                context: None,
            });
        }

        tracing_subscriber::registry().with(env_filter).with(layers).try_init()?;

        tracing::debug!(name = %config.name, file = guard.is_some(), "Logging initialized");
        Ok(Self { guard })
    }

    /// Returns a reference to the underlying worker guard, if file output is enabled.
    #[must_use]
    pub const fn guard(&self) -> Option<&WorkerGuard> {
        self.guard.as_ref()
    }
}

impl Drop for Logger {
    fn drop(&mut self) {
        if self.guard.is_some() {
            tracing::info!("Logging system shutting down, flushing buffers...");
        }
    }
}

const fn rotation(rotation: LogRotation) -> Rotation {
    match rotation {
        LogRotation::Minutely => Rotation::MINUTELY,
        LogRotation::Hourly => Rotation::HOURLY,
        LogRotation::Daily => Rotation::DAILY,
        LogRotation::Never => Rotation::NEVER,
    }
}

fn validate_config(config: &LoggingConfig) -> Result<(), LoggingError> {
    if config.name.trim().is_empty() {
        return Err(LoggingError::InvalidConfiguration {
            message: "Logger name cannot be empty".into(),
            context: None,
        });
    }

    if config.max_files == 0 {
        return Err(LoggingError::InvalidConfiguration {
            message: "max_files must be greater than zero".into(),
            context: None,
        });
    }

    Ok(())
}

fn build_env_filter(config: &LoggingConfig) -> Result<EnvFilter, LoggingError> {
    let level: LevelFilter = config.level.parse().map_err(|_| LoggingError::InvalidConfiguration {
        message: format!("Unknown log level '{}'", config.level).into(),
        context: None,
    })?;

    let builder = EnvFilter::builder().with_default_directive(level.into());
    config.filter.as_ref().map_or_else(
        || Ok(builder.from_env_lossy()),
        |filter| {
            builder.parse(filter).map_err(|e| LoggingError::InvalidConfiguration {
                message: format!("Invalid filter '{filter}': {e}").into(),
                context: None,
            })
        },
    )
}
