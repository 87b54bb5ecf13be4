//! Process-wide tracing setup shared by every binary that hosts the bus.

/// Initialize process-wide tracing using `DISPATCHBUS_LOG_FORMAT`.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init_with(tracing::LogFormat::from_env());
}

/// Tracing configuration (filters, output format).
pub mod tracing;

pub use self::tracing::{ENV_LOG_FORMAT, LogFormat, init_with};
