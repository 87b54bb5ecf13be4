//! Module boot: collect handler definitions and register them.

use serde_json::{Map, Value as JsonValue};
use thiserror::Error;
use tracing::{error, info};

use crate::descriptor::{DescriptorBuilder, DescriptorKind};
use crate::registry::{Handler, HandlerRegistry, RegistryError};

/// One handler as declared by a module: parsed metadata plus the callable.
pub struct HandlerDefinition<S> {
    kind: DescriptorKind,
    message_type: String,
    fields: Map<String, JsonValue>,
    handler: Handler<S>,
}

impl<S> HandlerDefinition<S> {
    pub fn new(
        kind: DescriptorKind,
        message_type: impl Into<String>,
        fields: Map<String, JsonValue>,
        handler: Handler<S>,
    ) -> Self {
        Self {
            kind,
            message_type: message_type.into(),
            fields,
            handler,
        }
    }

    pub fn command_handler(message_type: impl Into<String>, fields: Map<String, JsonValue>, handler: Handler<S>) -> Self {
        Self::new(DescriptorKind::CommandHandler, message_type, fields, handler)
    }

    pub fn event_listener(message_type: impl Into<String>, fields: Map<String, JsonValue>, handler: Handler<S>) -> Self {
        Self::new(DescriptorKind::EventListener, message_type, fields, handler)
    }
}

/// A group of handlers booted together.
pub trait Module<S>: Send + Sync {
    fn name(&self) -> &str;

    fn handlers(&self) -> Vec<HandlerDefinition<S>>;
}

#[derive(Debug, Error)]
#[error("failed to boot module \"{module}\": {source}")]
pub struct BootError {
    pub module: String,
    #[source]
    pub source: RegistryError,
}

/// Register every handler of every module, stopping at the first failure.
///
/// A failure here must abort process start-up.
pub fn boot_modules<S>(registry: &mut HandlerRegistry<S>, modules: &[&dyn Module<S>]) -> Result<(), BootError> {
    for module in modules {
        let definitions = module.handlers();
        let count = definitions.len();

        for definition in definitions {
            DescriptorBuilder::new(definition.kind, definition.message_type)
                .build(&definition.fields)
                .map_err(RegistryError::from)
                .and_then(|descriptor| registry.insert(descriptor, definition.handler))
                .map_err(|source| {
                    error!(module = module.name(), error = %source, "module boot failed");
                    BootError {
                        module: module.name().to_string(),
                        source,
                    }
                })?;
        }

        info!(module = module.name(), handlers = count, "module booted");
    }

    Ok(())
}
