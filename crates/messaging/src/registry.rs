//! Handler registry and per-message dispatch.
//!
//! The registry is built once at boot from (descriptor, handler) pairs and is
//! read-only afterwards. Dispatch applies the descriptor's policy around the
//! handler call:
//!
//! ```text
//! message
//!   ↓
//! 1. validate (only if the descriptor asks for it, restricted to its groups)
//!   ↓ invalid + onValidationFailure → publish substitute event, skip handler
//! 2. invoke handler (with the validation outcome, if any)
//!   ↓ error + onThrowable          → publish substitute event, swallow error
//!   ↓ error, no mapping            → DispatchError::Handler
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value as JsonValue};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use dispatchbus_core::{DeliveryOptions, Message};

use crate::context::{ExecutionContext, ExecutionError, FailureOutcome};
use crate::descriptor::{ConfigurationError, DescriptorBuilder, DescriptorKind, HandlerDescriptor};
use crate::validation::{MessageValidator, ValidationOutcome};

/// Handler body. Receives the validation outcome when validation ran.
pub type Handler<S> = Box<
    dyn Fn(&Message, &ExecutionContext<S>, Option<&ValidationOutcome>) -> anyhow::Result<()>
        + Send
        + Sync,
>;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("command \"{0}\" already has a handler")]
    DuplicateCommandHandler(String),

    #[error("\"{message_type}\" is bound as {existing} and cannot also be bound as {requested}")]
    KindMismatch {
        message_type: String,
        existing: DescriptorKind,
        requested: DescriptorKind,
    },

    #[error("handler for \"{0}\" enables validation but no validator is installed")]
    ValidatorRequired(String),
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no handler registered for command \"{0}\"")]
    NoHandler(String),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    /// Handler failed and its descriptor maps no substitute event.
    #[error("handler for \"{message_type}\" failed: {error:#}")]
    Handler {
        message_type: String,
        error: anyhow::Error,
    },
}

/// How one binding finished.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Handled,
    ValidationFailureEventPublished,
    HandlerFailureEventPublished,
}

struct HandlerBinding<S> {
    descriptor: HandlerDescriptor,
    handler: Handler<S>,
}

/// Dispatch table keyed by message type.
pub struct HandlerRegistry<S> {
    bindings: HashMap<String, Vec<HandlerBinding<S>>>,
    validator: Option<Arc<dyn MessageValidator>>,
}

impl<S> Default for HandlerRegistry<S> {
    fn default() -> Self {
        Self {
            bindings: HashMap::new(),
            validator: None,
        }
    }
}

impl<S> HandlerRegistry<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the validator used by descriptors with `validate = true`.
    pub fn with_validator(mut self, validator: Arc<dyn MessageValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Register a handler under an already-built descriptor.
    pub fn register<F>(&mut self, descriptor: HandlerDescriptor, handler: F) -> Result<(), RegistryError>
    where
        F: Fn(&Message, &ExecutionContext<S>, Option<&ValidationOutcome>) -> anyhow::Result<()>
            + Send
            + Sync
            + 'static,
    {
        self.insert(descriptor, Box::new(handler))
    }

    /// Build the descriptor from parsed metadata, then register.
    pub fn register_fields<F>(
        &mut self,
        kind: DescriptorKind,
        message_type: &str,
        fields: &Map<String, JsonValue>,
        handler: F,
    ) -> Result<(), RegistryError>
    where
        F: Fn(&Message, &ExecutionContext<S>, Option<&ValidationOutcome>) -> anyhow::Result<()>
            + Send
            + Sync
            + 'static,
    {
        let descriptor = DescriptorBuilder::new(kind, message_type).build(fields)?;
        self.register(descriptor, handler)
    }

    pub(crate) fn insert(&mut self, descriptor: HandlerDescriptor, handler: Handler<S>) -> Result<(), RegistryError> {
        let message_type = descriptor.message_type().to_string();

        if descriptor.validate() && self.validator.is_none() {
            return Err(RegistryError::ValidatorRequired(message_type));
        }

        let existing = self.bindings.entry(message_type.clone()).or_default();
        if let Some(first) = existing.first() {
            if first.descriptor.kind() != descriptor.kind() {
                return Err(RegistryError::KindMismatch {
                    message_type,
                    existing: first.descriptor.kind(),
                    requested: descriptor.kind(),
                });
            }
            if descriptor.kind() == DescriptorKind::CommandHandler {
                return Err(RegistryError::DuplicateCommandHandler(message_type));
            }
        }

        existing.push(HandlerBinding { descriptor, handler });
        Ok(())
    }

    /// Descriptors bound to `message_type`, in registration order.
    pub fn descriptors(&self, message_type: &str) -> Vec<&HandlerDescriptor> {
        self.bindings
            .get(message_type)
            .map(|bs| bs.iter().map(|b| &b.descriptor).collect())
            .unwrap_or_default()
    }

    /// Total number of bindings.
    pub fn len(&self) -> usize {
        self.bindings.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dispatch `message` to every matching binding.
    ///
    /// Commands need exactly one handler; events go to all listeners in
    /// registration order (none is fine). Stops at the first unmapped error.
    #[instrument(
        skip(self, message, ctx),
        fields(message_type = %message.message_type(), message_id = %message.message_id())
    )]
    pub fn dispatch(&self, message: &Message, ctx: &ExecutionContext<S>) -> Result<Vec<DispatchOutcome>, DispatchError> {
        let kind = match message {
            Message::Command(_) => DescriptorKind::CommandHandler,
            Message::Event(_) => DescriptorKind::EventListener,
        };

        let bindings: Vec<&HandlerBinding<S>> = self
            .bindings
            .get(message.message_type())
            .map(|bs| bs.iter().filter(|b| b.descriptor.kind() == kind).collect())
            .unwrap_or_default();

        if bindings.is_empty() {
            return match message {
                Message::Command(_) => Err(DispatchError::NoHandler(message.message_type().to_string())),
                Message::Event(_) => {
                    debug!("no listeners for event");
                    Ok(Vec::new())
                }
            };
        }

        bindings
            .into_iter()
            .map(|binding| self.dispatch_one(binding, message, ctx))
            .collect()
    }

    fn dispatch_one(
        &self,
        binding: &HandlerBinding<S>,
        message: &Message,
        ctx: &ExecutionContext<S>,
    ) -> Result<DispatchOutcome, DispatchError> {
        let descriptor = &binding.descriptor;

        let validation = match (&self.validator, descriptor.validate()) {
            (Some(validator), true) => Some(validator.validate(message, descriptor.validation_groups())),
            _ => None,
        };

        if let Some(outcome) = validation.as_ref().filter(|o| !o.is_valid()) {
            if let Some(event) = ctx.resolve_failure_event(descriptor, message, FailureOutcome::Validation(outcome)) {
                warn!(
                    violations = outcome.violations().len(),
                    substitute = event.message_type(),
                    "validation failed; publishing substitute event"
                );
                ctx.publish(event, DeliveryOptions::new())?;
                return Ok(DispatchOutcome::ValidationFailureEventPublished);
            }
        }

        match (binding.handler)(message, ctx, validation.as_ref()) {
            Ok(()) => Ok(DispatchOutcome::Handled),
            Err(error) => match ctx.resolve_failure_event(descriptor, message, FailureOutcome::Handler(&error)) {
                Some(event) => {
                    warn!(
                        error = %format!("{error:#}"),
                        substitute = event.message_type(),
                        "handler failed; publishing substitute event"
                    );
                    ctx.publish(event, DeliveryOptions::new())?;
                    Ok(DispatchOutcome::HandlerFailureEventPublished)
                }
                None => Err(DispatchError::Handler {
                    message_type: message.message_type().to_string(),
                    error,
                }),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use dispatchbus_core::{CommandMessage, EventMessage};

    use crate::test_support::{RecordingLogger, RecordingOutbound};
    use crate::validation::Violation;

    struct Sagas;

    fn fields(value: JsonValue) -> Map<String, JsonValue> {
        match value {
            JsonValue::Object(map) => map,
            _ => Map::new(),
        }
    }

    fn bound() -> (ExecutionContext<Sagas>, Arc<RecordingOutbound>) {
        let outbound = Arc::new(RecordingOutbound::default());
        let ctx = ExecutionContext::new(Arc::new(Sagas), Arc::new(RecordingLogger::default()))
            .apply_outbound_context(outbound.clone());
        (ctx, outbound)
    }

    fn rejecting_validator() -> Arc<dyn MessageValidator> {
        Arc::new(|_: &Message, _: &BTreeSet<String>| {
            ValidationOutcome::invalid(vec![Violation::new("order_id", "required")])
        })
    }

    fn accepting_validator() -> Arc<dyn MessageValidator> {
        Arc::new(|_: &Message, _: &BTreeSet<String>| ValidationOutcome::valid())
    }

    fn place_order() -> Message {
        CommandMessage::new("orders.place_order", json!({})).into()
    }

    fn counting_handler(
        counter: &Arc<AtomicUsize>,
    ) -> impl Fn(&Message, &ExecutionContext<Sagas>, Option<&ValidationOutcome>) -> anyhow::Result<()> + Send + Sync + 'static
    {
        let counter = counter.clone();
        move |_, _, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn validation_failure_publishes_event_and_skips_handler() {
        let mut registry: HandlerRegistry<Sagas> = HandlerRegistry::new().with_validator(rejecting_validator());
        let calls = Arc::new(AtomicUsize::new(0));
        registry
            .register_fields(
                DescriptorKind::CommandHandler,
                "orders.place_order",
                &fields(json!({ "validate": true, "defaultValidationFailedEvent": "ValidationRejected" })),
                counting_handler(&calls),
            )
            .unwrap();

        let (ctx, outbound) = bound();
        let outcome = registry.dispatch(&place_order(), &ctx).unwrap();

        assert_eq!(outcome, vec![DispatchOutcome::ValidationFailureEventPublished]);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        let events = outbound.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].message_type(), "ValidationRejected");
    }

    #[test]
    fn passing_validation_invokes_handler_once() {
        let mut registry: HandlerRegistry<Sagas> = HandlerRegistry::new().with_validator(accepting_validator());
        let calls = Arc::new(AtomicUsize::new(0));
        registry
            .register_fields(
                DescriptorKind::CommandHandler,
                "orders.place_order",
                &fields(json!({ "validate": true, "defaultValidationFailedEvent": "ValidationRejected" })),
                counting_handler(&calls),
            )
            .unwrap();

        let (ctx, outbound) = bound();
        let outcome = registry.dispatch(&place_order(), &ctx).unwrap();

        assert_eq!(outcome, vec![DispatchOutcome::Handled]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(outbound.calls().is_empty());
    }

    #[test]
    fn unmapped_validation_failure_reaches_handler() {
        let mut registry: HandlerRegistry<Sagas> = HandlerRegistry::new().with_validator(rejecting_validator());
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_in_handler = seen.clone();
        registry
            .register_fields(
                DescriptorKind::CommandHandler,
                "orders.place_order",
                &fields(json!({ "validate": true, "groups": ["create"] })),
                move |_, _, validation| {
                    let outcome = validation.ok_or_else(|| anyhow::anyhow!("validation outcome missing"))?;
                    seen_in_handler.fetch_add(outcome.violations().len(), Ordering::SeqCst);
                    Ok(())
                },
            )
            .unwrap();

        let (ctx, _) = bound();
        assert_eq!(registry.dispatch(&place_order(), &ctx).unwrap(), vec![DispatchOutcome::Handled]);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn validator_sees_descriptor_groups() {
        let groups_seen = Arc::new(std::sync::Mutex::new(BTreeSet::new()));
        let groups_in_validator = groups_seen.clone();
        let validator: Arc<dyn MessageValidator> = Arc::new(move |_: &Message, groups: &BTreeSet<String>| {
            if let Ok(mut g) = groups_in_validator.lock() {
                *g = groups.clone();
            }
            ValidationOutcome::valid()
        });

        let mut registry: HandlerRegistry<Sagas> = HandlerRegistry::new().with_validator(validator);
        registry
            .register_fields(
                DescriptorKind::CommandHandler,
                "orders.place_order",
                &fields(json!({ "validate": true, "groups": ["create", "strict"] })),
                |_, _, _| Ok(()),
            )
            .unwrap();

        let (ctx, _) = bound();
        registry.dispatch(&place_order(), &ctx).unwrap();

        let seen = groups_seen.lock().unwrap().clone();
        assert_eq!(seen, BTreeSet::from(["create".to_string(), "strict".to_string()]));
    }

    #[test]
    fn mapped_handler_error_is_replaced_by_event() {
        let mut registry: HandlerRegistry<Sagas> = HandlerRegistry::new();
        registry
            .register_fields(
                DescriptorKind::CommandHandler,
                "orders.place_order",
                &fields(json!({ "defaultThrowableEvent": "PlaceOrderFailed" })),
                |_, _, _| Err(anyhow::anyhow!("stock service unavailable")),
            )
            .unwrap();

        let (ctx, outbound) = bound();
        let outcome = registry.dispatch(&place_order(), &ctx).unwrap();

        assert_eq!(outcome, vec![DispatchOutcome::HandlerFailureEventPublished]);
        let events = outbound.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].payload()["reason"], "stock service unavailable");
    }

    #[test]
    fn unmapped_handler_error_propagates() {
        let mut registry: HandlerRegistry<Sagas> = HandlerRegistry::new();
        registry
            .register_fields(
                DescriptorKind::CommandHandler,
                "orders.place_order",
                &Map::new(),
                |_, _, _| Err(anyhow::anyhow!("boom")),
            )
            .unwrap();

        let (ctx, outbound) = bound();
        let err = registry.dispatch(&place_order(), &ctx).unwrap_err();

        assert!(matches!(err, DispatchError::Handler { ref message_type, .. } if message_type == "orders.place_order"));
        assert!(outbound.calls().is_empty());
    }

    #[test]
    fn substitute_event_needs_bound_context() {
        let mut registry: HandlerRegistry<Sagas> = HandlerRegistry::new();
        registry
            .register_fields(
                DescriptorKind::CommandHandler,
                "orders.place_order",
                &fields(json!({ "defaultThrowableEvent": "PlaceOrderFailed" })),
                |_, _, _| Err(anyhow::anyhow!("boom")),
            )
            .unwrap();

        let ctx = ExecutionContext::new(Arc::new(Sagas), Arc::new(RecordingLogger::default()));
        let err = registry.dispatch(&place_order(), &ctx).unwrap_err();

        assert!(matches!(
            err,
            DispatchError::Execution(ExecutionError::OutboundContextNotApplied)
        ));
    }

    #[test]
    fn handlers_can_deliver_through_context() {
        let mut registry: HandlerRegistry<Sagas> = HandlerRegistry::new();
        registry
            .register_fields(DescriptorKind::CommandHandler, "orders.place_order", &Map::new(), |_, ctx, _| {
                ctx.publish(EventMessage::new("orders.order_placed", json!({})), DeliveryOptions::new())?;
                Ok(())
            })
            .unwrap();

        let (ctx, outbound) = bound();
        registry.dispatch(&place_order(), &ctx).unwrap();

        assert_eq!(outbound.events()[0].message_type(), "orders.order_placed");
    }

    #[test]
    fn events_fan_out_to_every_listener() {
        let mut registry: HandlerRegistry<Sagas> = HandlerRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        for _ in 0..2 {
            registry
                .register_fields(
                    DescriptorKind::EventListener,
                    "orders.order_placed",
                    &Map::new(),
                    counting_handler(&calls),
                )
                .unwrap();
        }

        let (ctx, _) = bound();
        let event: Message = EventMessage::new("orders.order_placed", json!({})).into();
        let outcome = registry.dispatch(&event, &ctx).unwrap();

        assert_eq!(outcome.len(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn event_without_listeners_is_not_an_error() {
        let registry: HandlerRegistry<Sagas> = HandlerRegistry::new();
        let (ctx, _) = bound();
        let event: Message = EventMessage::new("orders.order_placed", json!({})).into();

        assert!(registry.dispatch(&event, &ctx).unwrap().is_empty());
    }

    #[test]
    fn command_without_handler_fails() {
        let registry: HandlerRegistry<Sagas> = HandlerRegistry::new();
        let (ctx, _) = bound();

        assert!(matches!(
            registry.dispatch(&place_order(), &ctx),
            Err(DispatchError::NoHandler(ref t)) if t == "orders.place_order"
        ));
    }

    #[test]
    fn second_command_handler_is_rejected() {
        let mut registry: HandlerRegistry<Sagas> = HandlerRegistry::new();
        registry
            .register_fields(DescriptorKind::CommandHandler, "orders.place_order", &Map::new(), |_, _, _| Ok(()))
            .unwrap();

        let err = registry
            .register_fields(DescriptorKind::CommandHandler, "orders.place_order", &Map::new(), |_, _, _| Ok(()))
            .unwrap_err();

        assert!(matches!(err, RegistryError::DuplicateCommandHandler(_)));
    }

    #[test]
    fn kinds_cannot_share_a_message_type() {
        let mut registry: HandlerRegistry<Sagas> = HandlerRegistry::new();
        registry
            .register_fields(DescriptorKind::EventListener, "orders.order_placed", &Map::new(), |_, _, _| Ok(()))
            .unwrap();

        let err = registry
            .register_fields(DescriptorKind::CommandHandler, "orders.order_placed", &Map::new(), |_, _, _| Ok(()))
            .unwrap_err();

        assert!(matches!(err, RegistryError::KindMismatch { .. }));
    }

    #[test]
    fn validation_requires_installed_validator() {
        let mut registry: HandlerRegistry<Sagas> = HandlerRegistry::new();
        let err = registry
            .register_fields(
                DescriptorKind::CommandHandler,
                "orders.place_order",
                &fields(json!({ "validate": true })),
                |_, _, _| Ok(()),
            )
            .unwrap_err();

        assert!(matches!(err, RegistryError::ValidatorRequired(_)));
        assert!(registry.is_empty());
    }

    #[test]
    fn bad_metadata_fails_registration() {
        let mut registry: HandlerRegistry<Sagas> = HandlerRegistry::new();
        let err = registry
            .register_fields(
                DescriptorKind::CommandHandler,
                "orders.place_order",
                &fields(json!({ "bogus": 1 })),
                |_, _, _| Ok(()),
            )
            .unwrap_err();

        assert!(err.to_string().contains("bogus"));
    }
}
