//! # symscope utilities
//!
//! Shared helpers for the symscope workspace. Today that is the logging
//! setup used by the `symscope` command-line front end; the core library only
//! emits `tracing` events and never installs a subscriber itself.

pub mod logging;

// Re-export commonly used logging functions for convenience
pub use logging::{
    init_logging, init_logging_to_dir, init_logging_with, LogFormat, LogGuard, LogLevel, LoggingConfig,
    LoggingError,
};
pub use tracing::{debug, error, info, trace, warn};
