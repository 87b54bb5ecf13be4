//! Broker channel capability.
//!
//! The connection/channel object belongs to the broker client; the bus only
//! needs the two asynchronous operations below. Implementations are shared
//! across every delivery context and must serialize their own access.

use std::collections::BTreeMap;
use std::error::Error as StdError;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::ExchangeKind;

pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("failed to declare exchange \"{exchange}\"")]
    Declare {
        exchange: String,
        #[source]
        source: BoxError,
    },

    #[error("failed to publish to exchange \"{exchange}\" with routing key \"{routing_key}\"")]
    Publish {
        exchange: String,
        routing_key: String,
        #[source]
        source: BoxError,
    },

    #[error("broker channel is closed")]
    Closed,
}

#[async_trait]
pub trait BrokerChannel: Send + Sync {
    /// Declare `name` if it does not exist yet. Idempotent.
    async fn declare_exchange(&self, name: &str, kind: ExchangeKind, durable: bool) -> Result<(), ChannelError>;

    async fn publish(
        &self,
        body: Vec<u8>,
        headers: BTreeMap<String, String>,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), ChannelError>;
}
