//! Message model: commands, events and the tagged [`Message`] sum type.
//!
//! Domain code defines typed messages implementing [`Command`] or [`Event`].
//! Before they cross the bus they are captured as [`CommandMessage`] /
//! [`EventMessage`] values: an id, a stable type name and a JSON payload.
//! These are immutable value objects; all fields are private and only
//! exposed through accessors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::id::MessageId;

/// A request addressed to exactly one logical handler.
///
/// Commands are intent ("place the order"). They are routed point-to-point
/// and are never mirrored to the audit stream.
pub trait Command: Serialize + core::fmt::Debug + Send + Sync + 'static {
    /// Stable command name (e.g. "orders.place_order").
    fn message_type(&self) -> &'static str;
}

/// A fact broadcast to zero or more subscribers.
///
/// Every published event is also mirrored to the originating exchange's
/// audit stream by the broker delivery context.
pub trait Event: Serialize + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name (e.g. "orders.order_placed").
    fn message_type(&self) -> &'static str;
}

macro_rules! impl_message_variant {
    ($t:ident, $bound:ident) => {
        impl $t {
            pub fn new(message_type: impl Into<String>, payload: JsonValue) -> Self {
                Self {
                    message_id: MessageId::new(),
                    message_type: message_type.into(),
                    payload,
                    created_at: Utc::now(),
                }
            }

            /// Capture a typed message, serializing its payload to JSON.
            pub fn from_typed<M: $bound>(message: &M) -> Result<Self, serde_json::Error> {
                let payload = serde_json::to_value(message)?;
                Ok(Self::new(message.message_type(), payload))
            }

            /// Override the generated id (useful for deterministic tests and redelivery).
            pub fn with_message_id(mut self, message_id: MessageId) -> Self {
                self.message_id = message_id;
                self
            }

            pub fn message_id(&self) -> MessageId {
                self.message_id
            }

            pub fn message_type(&self) -> &str {
                &self.message_type
            }

            pub fn payload(&self) -> &JsonValue {
                &self.payload
            }

            pub fn created_at(&self) -> DateTime<Utc> {
                self.created_at
            }
        }
    };
}

/// Captured command, ready to be delivered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandMessage {
    message_id: MessageId,
    message_type: String,
    payload: JsonValue,
    created_at: DateTime<Utc>,
}

/// Captured event, ready to be published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMessage {
    message_id: MessageId,
    message_type: String,
    payload: JsonValue,
    created_at: DateTime<Utc>,
}

impl_message_variant!(CommandMessage, Command);
impl_message_variant!(EventMessage, Event);

/// Either variant of a bus message.
///
/// Consumers that need to tell the two apart match on this enum; there is
/// no open-ended marker trait.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Message {
    Command(CommandMessage),
    Event(EventMessage),
}

impl Message {
    pub fn message_id(&self) -> MessageId {
        match self {
            Message::Command(c) => c.message_id(),
            Message::Event(e) => e.message_id(),
        }
    }

    pub fn message_type(&self) -> &str {
        match self {
            Message::Command(c) => c.message_type(),
            Message::Event(e) => e.message_type(),
        }
    }

    pub fn payload(&self) -> &JsonValue {
        match self {
            Message::Command(c) => c.payload(),
            Message::Event(e) => e.payload(),
        }
    }

    pub fn is_command(&self) -> bool {
        matches!(self, Message::Command(_))
    }
}

impl From<CommandMessage> for Message {
    fn from(value: CommandMessage) -> Self {
        Message::Command(value)
    }
}

impl From<EventMessage> for Message {
    fn from(value: EventMessage) -> Self {
        Message::Event(value)
    }
}
