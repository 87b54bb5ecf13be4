//! JSON wire format for bus messages.

use dispatchbus_core::{Message, SerializationError};
use dispatchbus_messaging::MessageSerializer;

/// Serializes messages as JSON objects tagged with `"kind": "command" | "event"`.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonMessageSerializer;

impl MessageSerializer for JsonMessageSerializer {
    fn serialize(&self, message: &Message) -> Result<Vec<u8>, SerializationError> {
        serde_json::to_vec(message).map_err(|e| SerializationError::new(message.message_type(), e.to_string()))
    }
}
