//! Errors shared by the message model.

use thiserror::Error;

/// A message could not be turned into its wire representation.
///
/// Serialization is deterministic and side-effect free, so this error is
/// raised synchronously at the call site and never from broker I/O.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("failed to serialize message \"{message_type}\": {reason}")]
pub struct SerializationError {
    pub message_type: String,
    pub reason: String,
}

impl SerializationError {
    pub fn new(message_type: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            message_type: message_type.into(),
            reason: reason.into(),
        }
    }
}
