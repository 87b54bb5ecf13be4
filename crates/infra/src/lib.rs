//! Broker-facing side of the bus: channel capability, outbound delivery
//! context, configuration and the JSON wire format.

pub mod broker;
pub mod channel;
pub mod config;
pub mod in_memory_channel;
pub mod serializer;

pub use broker::{AUDIT_EXCHANGE_SUFFIX, BrokerDeliveryContext, IncomingDelivery};
pub use channel::{BoxError, BrokerChannel, ChannelError};
pub use config::{BrokerConfig, ExchangeKind, UnknownExchangeKind};
pub use in_memory_channel::{DeclaredExchange, InMemoryChannel, PublishedMessage};
pub use serializer::JsonMessageSerializer;
