//! # Logging Utilities
//!
//! Logging setup for symscope built on `tracing-subscriber`.
//!
//! Console output goes to stderr so that query results printed on stdout stay
//! machine-readable. An optional file sink is written through
//! `tracing-appender`'s non-blocking writer; the returned [`LogGuard`] must be
//! held for as long as events should reach the file.
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: filter directives (e.g. `RUST_LOG=symscope_core=debug`)
//! - `SYMSCOPE_LOG_FORMAT`: `pretty` (default) or `json`
//! - `SYMSCOPE_LOG_FILE`: optional path of an additional log file, rotated daily
//!
//! ## Example
//!
//! ```rust,no_run
//! use symscope_utils::{init_logging_with, LogFormat, LogLevel, LoggingConfig};
//!
//! let config = LoggingConfig::default().with_level(LogLevel::Debug).with_format(LogFormat::Json);
//! let _guard = init_logging_with(&config).expect("Failed to initialize logging");
//! tracing::info!("ready");
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::{env, io};

use chrono::Utc;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::{self};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Environment variable selecting the output format.
pub const LOG_FORMAT_ENV: &str = "SYMSCOPE_LOG_FORMAT";
/// Environment variable naming an additional log file.
pub const LOG_FILE_ENV: &str = "SYMSCOPE_LOG_FILE";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat
{
    /// Human-readable output (default)
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

impl FromStr for LogFormat
{
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.trim().to_lowercase().as_str() {
            "pretty" | "text" | "dev" => Ok(LogFormat::Pretty),
            "json" | "prod" => Ok(LogFormat::Json),
            _ => Err(LoggingError::InvalidFormat(s.to_string())),
        }
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel
{
    /// Error level
    Error,
    /// Warning level
    Warn,
    /// Info level
    Info,
    /// Debug level
    Debug,
    /// Trace level (most verbose)
    Trace,
}

impl From<LogLevel> for Level
{
    fn from(level: LogLevel) -> Self
    {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

impl FromStr for LogLevel
{
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.trim().to_lowercase().as_str() {
            "error" | "err" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" | "dbg" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(LoggingError::InvalidLevel(s.to_string())),
        }
    }
}

/// Resolved logging configuration.
///
/// Built either explicitly through the `with_*` methods or from the
/// environment with [`LoggingConfig::from_env`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig
{
    /// Explicit level. When `None`, `RUST_LOG` decides and `warn` is the fallback.
    pub level: Option<LogLevel>,
    /// Output format for every sink.
    pub format: LogFormat,
    /// Optional log file, rotated daily.
    pub file: Option<PathBuf>,
    /// Whether events are also written to stderr.
    pub console: bool,
}

impl Default for LoggingConfig
{
    fn default() -> Self
    {
        Self {
            level: None,
            format: LogFormat::Pretty,
            file: None,
            console: true,
        }
    }
}

impl LoggingConfig
{
    /// Read `SYMSCOPE_LOG_FORMAT` and `SYMSCOPE_LOG_FILE`.
    ///
    /// ## Errors
    ///
    /// Returns [`LoggingError::InvalidFormat`] when the format variable is set
    /// to something other than `pretty` or `json`.
    pub fn from_env() -> Result<Self, LoggingError>
    {
        Self::from_values(env::var(LOG_FORMAT_ENV).ok().as_deref(), env::var(LOG_FILE_ENV).ok().as_deref())
    }

    /// Build a configuration from raw environment values.
    ///
    /// Empty values count as unset.
    ///
    /// ## Errors
    ///
    /// Returns [`LoggingError::InvalidFormat`] for an unknown format string.
    pub fn from_values(format: Option<&str>, file: Option<&str>) -> Result<Self, LoggingError>
    {
        let format = match format.filter(|value| !value.trim().is_empty()) {
            Some(value) => value.parse()?,
            None => LogFormat::Pretty,
        };
        let file = file.filter(|value| !value.trim().is_empty()).map(PathBuf::from);

        Ok(Self {
            format,
            file,
            ..Self::default()
        })
    }

    /// Set an explicit level, overriding `RUST_LOG`.
    #[must_use]
    pub fn with_level(mut self, level: LogLevel) -> Self
    {
        self.level = Some(level);
        self
    }

    /// Set the output format.
    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self
    {
        self.format = format;
        self
    }

    /// Add a log file sink.
    #[must_use]
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self
    {
        self.file = Some(path.into());
        self
    }

    /// Disable the stderr sink.
    #[must_use]
    pub fn without_console(mut self) -> Self
    {
        self.console = false;
        self
    }

    fn filter(&self) -> EnvFilter
    {
        // Explicit level first, then RUST_LOG (which may carry per-crate directives), then `warn`.
        if let Some(level) = self.level {
            return EnvFilter::new(Level::from(level).to_string());
        }
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(Level::WARN.to_string()))
    }
}

/// Keeps the non-blocking file writer alive.
///
/// Dropping the guard flushes pending events and stops the writer thread.
#[derive(Debug, Default)]
pub struct LogGuard
{
    _file: Option<WorkerGuard>,
}

/// Initialize logging from the environment.
///
/// ## Errors
///
/// Returns an error if a global subscriber is already installed, if
/// `SYMSCOPE_LOG_FORMAT` is invalid, or if the log file directory cannot be
/// created.
pub fn init_logging() -> Result<LogGuard, LoggingError>
{
    init_logging_with(&LoggingConfig::from_env()?)
}

/// Initialize logging from an explicit configuration.
///
/// ## Errors
///
/// Returns an error if a global subscriber is already installed or if the log
/// file directory cannot be created.
pub fn init_logging_with(config: &LoggingConfig) -> Result<LogGuard, LoggingError>
{
    let mut layers: Vec<BoxedLayer> = Vec::new();
    let mut guard = LogGuard::default();

    if config.console {
        let layer = match config.format {
            LogFormat::Pretty => fmt::layer()
                .with_target(true)
                .with_timer(ChronoUtc::rfc_3339())
                .with_ansi(true)
                .with_writer(io::stderr)
                .with_filter(config.filter())
                .boxed(),
            LogFormat::Json => fmt::layer()
                .json()
                .with_target(true)
                .with_timer(ChronoUtc::rfc_3339())
                .with_current_span(true)
                .with_span_list(true)
                .with_writer(io::stderr)
                .with_filter(config.filter())
                .boxed(),
        };
        layers.push(layer);
    }

    if let Some(path) = &config.file {
        let (directory, file_name) = split_log_path(path)?;
        std::fs::create_dir_all(&directory)?;
        let appender = tracing_appender::rolling::daily(directory, file_name);
        let (writer, file_guard) = tracing_appender::non_blocking(appender);
        guard._file = Some(file_guard);
        layers.push(file_layer(config.format, writer, config.filter()));
    }

    Registry::default()
        .with(layers)
        .try_init()
        .map_err(|err| LoggingError::InitializationFailed(err.to_string()))?;

    Ok(guard)
}

/// Initialize file-only logging into a dated file under `dir`.
///
/// The file is named `YYYY-MM-DD-symscope.log` and is never rotated, since
/// the date is already part of the name. Returns the file path together with
/// the writer guard.
///
/// ## Errors
///
/// Returns an error if `dir` cannot be created or a global subscriber is
/// already installed.
pub fn init_logging_to_dir(dir: &Path, level: Option<LogLevel>) -> Result<(PathBuf, LogGuard), LoggingError>
{
    std::fs::create_dir_all(dir)?;
    let log_file = dir.join(dated_log_name(&Utc::now().format("%Y-%m-%d").to_string()));

    let config = LoggingConfig {
        level,
        format: LogFormat::Pretty,
        file: None,
        console: false,
    };

    let appender = tracing_appender::rolling::never(dir, log_file.file_name().unwrap_or_default());
    let (writer, file_guard) = tracing_appender::non_blocking(appender);
    let layers: Vec<BoxedLayer> = vec![file_layer(config.format, writer, config.filter())];

    Registry::default()
        .with(layers)
        .try_init()
        .map_err(|err| LoggingError::InitializationFailed(err.to_string()))?;

    Ok((log_file, LogGuard { _file: Some(file_guard) }))
}

fn file_layer(format: LogFormat, writer: tracing_appender::non_blocking::NonBlocking, filter: EnvFilter) -> BoxedLayer
{
    match format {
        LogFormat::Pretty => fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_timer(ChronoUtc::rfc_3339())
            .with_ansi(false)
            .with_filter(filter)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(writer)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_timer(ChronoUtc::rfc_3339())
            .with_current_span(true)
            .with_span_list(true)
            .with_filter(filter)
            .boxed(),
    }
}

fn split_log_path(path: &Path) -> Result<(PathBuf, PathBuf), LoggingError>
{
    let file_name = path
        .file_name()
        .ok_or_else(|| LoggingError::InvalidFile(path.display().to_string()))?;
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((directory, PathBuf::from(file_name)))
}

fn dated_log_name(date: &str) -> String
{
    format!("{date}-symscope.log")
}

/// Logging initialization error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError
{
    /// Invalid log format
    #[error("Invalid log format: {0}. Use 'pretty' or 'json'")]
    InvalidFormat(String),

    /// Invalid log level
    #[error("Invalid log level: {0}. Use 'error', 'warn', 'info', 'debug', or 'trace'")]
    InvalidLevel(String),

    /// Log file path has no file name component
    #[error("Invalid log file path: {0}")]
    InvalidFile(String),

    /// A global subscriber was already installed
    #[error("Failed to initialize logging: {0}")]
    InitializationFailed(String),

    /// File logging error
    #[error("File logging error: {0}")]
    FileError(#[from] io::Error),
}
