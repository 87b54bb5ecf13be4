//! Dispatch core: handler descriptors, execution context and registry.
//!
//! Nothing in this crate talks to a broker. Transports plug in through
//! [`OutboundDeliveryContext`]; validation through [`MessageValidator`].

pub mod context;
pub mod descriptor;
pub mod logger;
pub mod module;
pub mod outbound;
pub mod registry;
pub mod validation;

#[cfg(test)]
pub(crate) mod test_support;

pub use context::{ExecutionContext, ExecutionError, FailureOutcome};
pub use descriptor::{ConfigurationError, DescriptorBuilder, DescriptorKind, EventType, HandlerDescriptor};
pub use logger::{Logger, Severity, TracingLogger, format_error_chain};
pub use module::{BootError, HandlerDefinition, Module, boot_modules};
pub use outbound::{DeliveryError, MessageSerializer, OutboundDeliveryContext};
pub use registry::{DispatchError, DispatchOutcome, Handler, HandlerRegistry, RegistryError};
pub use validation::{MessageValidator, ValidationOutcome, Violation};
