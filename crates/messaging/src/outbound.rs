//! Outbound delivery capability and the serializer it depends on.

use std::sync::Arc;

use thiserror::Error;

use dispatchbus_core::{CommandMessage, DeliveryOptions, EventMessage, Message, SerializationError};

/// Turns a message into its wire bytes. Deterministic, no side effects.
pub trait MessageSerializer: Send + Sync {
    fn serialize(&self, message: &Message) -> Result<Vec<u8>, SerializationError>;
}

/// Synchronous failure of a delivery call.
///
/// Broker I/O failures are never reported here: they happen after the call
/// has returned and only reach the logger.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error(transparent)]
    Serialization(#[from] SerializationError),
}

/// Something that can put commands and events on the wire.
///
/// Both calls are fire-and-forget: they schedule the delivery and return
/// without waiting for the transport.
pub trait OutboundDeliveryContext: Send + Sync {
    /// Deliver a command to exactly one destination.
    fn send(&self, command: CommandMessage, options: DeliveryOptions) -> Result<(), DeliveryError>;

    /// Publish an event to its destination and to the audit stream.
    fn publish(&self, event: EventMessage, options: DeliveryOptions) -> Result<(), DeliveryError>;
}

impl<T> OutboundDeliveryContext for Arc<T>
where
    T: OutboundDeliveryContext + ?Sized,
{
    fn send(&self, command: CommandMessage, options: DeliveryOptions) -> Result<(), DeliveryError> {
        (**self).send(command, options)
    }

    fn publish(&self, event: EventMessage, options: DeliveryOptions) -> Result<(), DeliveryError> {
        (**self).publish(event, options)
    }
}
