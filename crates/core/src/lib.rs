//! `dispatchbus-core`: message model shared by every bus crate.
//!
//! This crate contains **pure values** (no IO, no async): messages, delivery
//! options and the identifiers/errors they need.

pub mod delivery;
pub mod error;
pub mod id;
pub mod message;

pub use delivery::DeliveryOptions;
pub use error::SerializationError;
pub use id::MessageId;
pub use message::{Command, CommandMessage, Event, EventMessage, Message};
