//! Per-dispatch execution context.
//!
//! An [`ExecutionContext`] starts **unbound**. Binding it to an outbound
//! delivery context returns a new, bound value; the receiver is left exactly
//! as it was. Only a bound context may send or publish.

use std::sync::Arc;

use serde_json::json;
use thiserror::Error;

use dispatchbus_core::{CommandMessage, DeliveryOptions, EventMessage, Message};

use crate::descriptor::HandlerDescriptor;
use crate::logger::{Logger, Severity};
use crate::outbound::{DeliveryError, OutboundDeliveryContext};
use crate::validation::ValidationOutcome;

#[derive(Debug, Error)]
pub enum ExecutionError {
    /// `send`/`publish`/`deliver` called before an outbound context was applied.
    #[error("outbound delivery context was not applied to the execution context")]
    OutboundContextNotApplied,

    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

/// What went wrong while dispatching to a handler.
#[derive(Debug, Clone, Copy)]
pub enum FailureOutcome<'a> {
    Validation(&'a ValidationOutcome),
    Handler(&'a anyhow::Error),
}

/// Delivery façade handed to handler code for one incoming message.
///
/// `S` is the saga correlation service. The context only holds and returns
/// it; it never calls into it.
pub struct ExecutionContext<S> {
    outbound: Option<Arc<dyn OutboundDeliveryContext>>,
    sagas: Arc<S>,
    logger: Arc<dyn Logger>,
}

impl<S> Clone for ExecutionContext<S> {
    fn clone(&self) -> Self {
        Self {
            outbound: self.outbound.clone(),
            sagas: Arc::clone(&self.sagas),
            logger: Arc::clone(&self.logger),
        }
    }
}

impl<S> core::fmt::Debug for ExecutionContext<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("bound", &self.is_bound())
            .finish_non_exhaustive()
    }
}

impl<S> ExecutionContext<S> {
    /// Create an unbound context.
    pub fn new(sagas: Arc<S>, logger: Arc<dyn Logger>) -> Self {
        Self {
            outbound: None,
            sagas,
            logger,
        }
    }

    /// Return a copy of this context bound to `outbound`.
    pub fn apply_outbound_context(&self, outbound: Arc<dyn OutboundDeliveryContext>) -> Self {
        Self {
            outbound: Some(outbound),
            ..self.clone()
        }
    }

    pub fn is_bound(&self) -> bool {
        self.outbound.is_some()
    }

    pub fn sagas(&self) -> &Arc<S> {
        &self.sagas
    }

    pub fn logger(&self) -> &Arc<dyn Logger> {
        &self.logger
    }

    /// Send a command or publish an event, depending on the variant.
    pub fn deliver(&self, message: Message, options: DeliveryOptions) -> Result<(), ExecutionError> {
        match message {
            Message::Command(command) => self.send(command, options),
            Message::Event(event) => self.publish(event, options),
        }
    }

    pub fn send(&self, command: CommandMessage, options: DeliveryOptions) -> Result<(), ExecutionError> {
        self.outbound()?.send(command, options)?;
        Ok(())
    }

    pub fn publish(&self, event: EventMessage, options: DeliveryOptions) -> Result<(), ExecutionError> {
        self.outbound()?.publish(event, options)?;
        Ok(())
    }

    fn outbound(&self) -> Result<&dyn OutboundDeliveryContext, ExecutionError> {
        self.outbound
            .as_deref()
            .ok_or(ExecutionError::OutboundContextNotApplied)
    }

    /// Substitute event configured on `descriptor` for this kind of failure.
    ///
    /// `None` means no substitute applies (nothing configured, or the
    /// validation outcome passed) and the caller handles the failure.
    pub fn resolve_failure_event(
        &self,
        descriptor: &HandlerDescriptor,
        source: &Message,
        outcome: FailureOutcome<'_>,
    ) -> Option<EventMessage> {
        match outcome {
            FailureOutcome::Validation(validation) => {
                if validation.is_valid() {
                    return None;
                }
                let event_type = descriptor.on_validation_failure()?;
                Some(EventMessage::new(
                    event_type.as_str(),
                    json!({
                        "message_id": source.message_id(),
                        "message_type": source.message_type(),
                        "violations": validation.violations(),
                    }),
                ))
            }
            FailureOutcome::Handler(error) => {
                let event_type = descriptor.on_throwable()?;
                Some(EventMessage::new(
                    event_type.as_str(),
                    json!({
                        "message_id": source.message_id(),
                        "message_type": source.message_type(),
                        "reason": error.to_string(),
                    }),
                ))
            }
        }
    }

    /// Log a line tagged with the message being processed.
    pub fn log_context_message(&self, message: &Message, text: &str, severity: Severity) {
        self.logger.log(
            severity,
            &format!("[{} {}] {}", message.message_type(), message.message_id(), text),
        );
    }

    /// Log an error (with its cause chain) tagged with the message being processed.
    pub fn log_context_error(&self, message: &Message, error: &anyhow::Error, severity: Severity) {
        self.log_context_message(message, &format!("{error:#}"), severity);
    }

    /// Reusable error callback tagged with `message`, for handlers that log
    /// several failures of the same message.
    pub fn context_error_logger(&self, message: &Message, severity: Severity) -> impl Fn(&anyhow::Error) + '_ {
        let message = message.clone();
        move |error: &anyhow::Error| self.log_context_error(&message, error, severity)
    }
}
