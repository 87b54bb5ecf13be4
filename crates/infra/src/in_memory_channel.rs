//! In-memory broker channel for tests/dev.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::channel::{BrokerChannel, ChannelError};
use crate::config::ExchangeKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredExchange {
    pub name: String,
    pub kind: ExchangeKind,
    pub durable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub exchange: String,
    pub routing_key: String,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

#[derive(Debug, Default)]
struct State {
    declared: Vec<DeclaredExchange>,
    published: Vec<PublishedMessage>,
    failing_declares: HashSet<String>,
    failing_publishes: HashSet<String>,
    closed: bool,
}

/// Records every declare/publish; failures can be injected per exchange.
///
/// - No IO
/// - Calls complete immediately
#[derive(Debug, Default)]
pub struct InMemoryChannel {
    state: Mutex<State>,
}

impl InMemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every declare of `exchange` fail.
    pub fn fail_declare(&self, exchange: impl Into<String>) {
        self.state().failing_declares.insert(exchange.into());
    }

    /// Make every publish to `exchange` fail (the declare still succeeds).
    pub fn fail_publish(&self, exchange: impl Into<String>) {
        self.state().failing_publishes.insert(exchange.into());
    }

    /// Reject all further calls.
    pub fn close(&self) {
        self.state().closed = true;
    }

    pub fn declared(&self) -> Vec<DeclaredExchange> {
        self.state().declared.clone()
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        self.state().published.clone()
    }
}

#[async_trait]
impl BrokerChannel for InMemoryChannel {
    async fn declare_exchange(&self, name: &str, kind: ExchangeKind, durable: bool) -> Result<(), ChannelError> {
        let mut state = self.state();
        if state.closed {
            return Err(ChannelError::Closed);
        }
        if state.failing_declares.contains(name) {
            return Err(ChannelError::Declare {
                exchange: name.to_string(),
                source: "access refused".into(),
            });
        }

        state.declared.push(DeclaredExchange {
            name: name.to_string(),
            kind,
            durable,
        });
        Ok(())
    }

    async fn publish(
        &self,
        body: Vec<u8>,
        headers: BTreeMap<String, String>,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), ChannelError> {
        let mut state = self.state();
        if state.closed {
            return Err(ChannelError::Closed);
        }
        if state.failing_publishes.contains(exchange) {
            return Err(ChannelError::Publish {
                exchange: exchange.to_string(),
                routing_key: routing_key.to_string(),
                source: "network unreachable".into(),
            });
        }

        state.published.push(PublishedMessage {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            headers,
            body,
        });
        Ok(())
    }
}
