//! Logger capability passed explicitly to delivery components.
//!
//! Asynchronous delivery failures have no return channel; a critical entry
//! on this logger is the only way they become observable.

use std::error::Error as StdError;

/// Severity of a log entry.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

pub trait Logger: Send + Sync {
    fn log(&self, severity: Severity, message: &str);

    fn critical(&self, message: &str) {
        self.log(Severity::Critical, message);
    }
}

/// [`Logger`] backed by the process-wide `tracing` subscriber.
///
/// `tracing` has no critical level; critical entries are emitted at `ERROR`
/// with a `severity = "critical"` field.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, severity: Severity, message: &str) {
        match severity {
            Severity::Debug => tracing::debug!("{message}"),
            Severity::Info => tracing::info!("{message}"),
            Severity::Warning => tracing::warn!("{message}"),
            Severity::Error => tracing::error!("{message}"),
            Severity::Critical => tracing::error!(severity = "critical", "{message}"),
        }
    }
}

/// Render an error with its full `source()` chain on one line, the same way
/// `anyhow` renders `{:#}`.
pub fn format_error_chain(error: &(dyn StdError + 'static)) -> String {
    anyhow::Chain::new(error)
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(": ")
}
