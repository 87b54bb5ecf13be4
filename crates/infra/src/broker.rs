//! Broker-backed outbound delivery context.
//!
//! One [`BrokerDeliveryContext`] is created per incoming broker message and
//! remembers where that message came from. Routing rules:
//!
//! ```text
//! send(command)  → destination                       (1 publish)
//! publish(event) → destination + "<exchange>.events" (2 independent publishes)
//!
//! destination = options.destination, or the originating exchange if empty
//! ```
//!
//! Every publish is scheduled as its own task that first declares the target
//! exchange and then publishes to it. The caller returns immediately; a
//! failed declare or publish is reported once, at critical severity, on the
//! logger and goes nowhere else.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::debug;

use dispatchbus_core::{CommandMessage, DeliveryOptions, EventMessage, Message, MessageId};
use dispatchbus_messaging::{DeliveryError, Logger, MessageSerializer, OutboundDeliveryContext, format_error_chain};

use crate::channel::BrokerChannel;
use crate::config::{BrokerConfig, ExchangeKind};

/// Suffix of the audit exchange every event is mirrored to.
pub const AUDIT_EXCHANGE_SUFFIX: &str = ".events";

/// Where an incoming broker message was received from.
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingDelivery {
    exchange: String,
    routing_key: String,
    message: Message,
}

impl IncomingDelivery {
    pub fn new(exchange: impl Into<String>, routing_key: impl Into<String>, message: Message) -> Self {
        Self {
            exchange: exchange.into(),
            routing_key: routing_key.into(),
            message,
        }
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    pub fn routing_key(&self) -> &str {
        &self.routing_key
    }

    pub fn message(&self) -> &Message {
        &self.message
    }
}

pub struct BrokerDeliveryContext {
    exchange: String,
    routing_key: String,
    incoming_id: MessageId,
    channel: Arc<dyn BrokerChannel>,
    serializer: Arc<dyn MessageSerializer>,
    logger: Arc<dyn Logger>,
    config: BrokerConfig,
    scheduled: Mutex<Vec<JoinHandle<()>>>,
}

impl core::fmt::Debug for BrokerDeliveryContext {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BrokerDeliveryContext")
            .field("exchange", &self.exchange)
            .field("routing_key", &self.routing_key)
            .field("incoming_id", &self.incoming_id)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl BrokerDeliveryContext {
    pub fn new(
        incoming: &IncomingDelivery,
        channel: Arc<dyn BrokerChannel>,
        serializer: Arc<dyn MessageSerializer>,
        logger: Arc<dyn Logger>,
    ) -> Self {
        Self {
            exchange: incoming.exchange().to_string(),
            routing_key: incoming.routing_key().to_string(),
            incoming_id: incoming.message().message_id(),
            channel,
            serializer,
            logger,
            config: BrokerConfig::default(),
            scheduled: Mutex::new(Vec::new()),
        }
    }

    pub fn with_config(mut self, config: BrokerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn originating_exchange(&self) -> &str {
        &self.exchange
    }

    pub fn routing_key(&self) -> &str {
        &self.routing_key
    }

    /// Id of the message whose processing created this context.
    pub fn incoming_id(&self) -> MessageId {
        self.incoming_id
    }

    pub fn audit_exchange(&self) -> String {
        format!("{}{AUDIT_EXCHANGE_SUFFIX}", self.exchange)
    }

    /// Wait for every publish scheduled so far.
    ///
    /// Dropping the context without settling does not cancel anything.
    pub async fn settle(&self) {
        let scheduled = {
            let mut guard = self.scheduled.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *guard)
        };

        for handle in scheduled {
            if let Err(e) = handle.await {
                self.logger.critical(&format_error_chain(&e));
            }
        }
    }

    fn schedule(&self, exchange: String, body: Vec<u8>, headers: BTreeMap<String, String>) {
        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                self.logger.critical(&format!(
                    "cannot schedule publish to exchange \"{exchange}\": {}",
                    format_error_chain(&e)
                ));
                return;
            }
        };

        debug!(
            exchange = %exchange,
            routing_key = %self.routing_key,
            incoming_id = %self.incoming_id,
            "scheduling publish"
        );

        let task = PublishTask {
            channel: Arc::clone(&self.channel),
            logger: Arc::clone(&self.logger),
            kind: self.config.exchange_kind,
            durable: self.config.durable,
            exchange,
            routing_key: self.routing_key.clone(),
            headers,
            body,
        };

        let handle = runtime.spawn(task.run());
        self.scheduled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle);
    }

    fn serialize(&self, message: &Message) -> Result<Vec<u8>, DeliveryError> {
        Ok(self.serializer.serialize(message)?)
    }
}

impl OutboundDeliveryContext for BrokerDeliveryContext {
    fn send(&self, command: CommandMessage, options: DeliveryOptions) -> Result<(), DeliveryError> {
        let body = self.serialize(&Message::Command(command))?;
        let destination = options.resolve_destination(&self.exchange).to_string();

        self.schedule(destination, body, options.headers().clone());
        Ok(())
    }

    fn publish(&self, event: EventMessage, options: DeliveryOptions) -> Result<(), DeliveryError> {
        let body = self.serialize(&Message::Event(event))?;
        let destination = options.resolve_destination(&self.exchange).to_string();

        self.schedule(destination, body.clone(), options.headers().clone());
        self.schedule(self.audit_exchange(), body, options.headers().clone());
        Ok(())
    }
}

/// One declare-then-publish step, run detached from the caller.
struct PublishTask {
    channel: Arc<dyn BrokerChannel>,
    logger: Arc<dyn Logger>,
    kind: ExchangeKind,
    durable: bool,
    exchange: String,
    routing_key: String,
    headers: BTreeMap<String, String>,
    body: Vec<u8>,
}

impl PublishTask {
    async fn run(self) {
        // The exchange is declared before every publish, not once per context.
        let result = match self
            .channel
            .declare_exchange(&self.exchange, self.kind, self.durable)
            .await
        {
            Ok(()) => {
                self.channel
                    .publish(self.body, self.headers, &self.exchange, &self.routing_key)
                    .await
            }
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            self.logger.critical(&format_error_chain(&e));
        }
    }
}
