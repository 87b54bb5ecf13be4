//! Handler descriptors: the declarative policy attached to one handler binding.
//!
//! A [`HandlerDescriptor`] is built once at boot by [`DescriptorBuilder`]
//! from already-parsed metadata and then lives, unchanged, in the registry's
//! dispatch table for the whole process lifetime.

use std::collections::BTreeSet;

use serde_json::{Map, Value as JsonValue};
use thiserror::Error;

const VALIDATE: &str = "validate";
const GROUPS: &str = "groups";
const VALIDATION_FAILED_EVENT: &str = "defaultValidationFailedEvent";
const THROWABLE_EVENT: &str = "defaultThrowableEvent";
const MESSAGE_TYPE: &str = "messageType";

/// Which kind of handler a descriptor configures.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum DescriptorKind {
    /// Handles a command; exactly one per command type.
    CommandHandler,
    /// Listens to an event; any number per event type.
    EventListener,
}

impl DescriptorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DescriptorKind::CommandHandler => "CommandHandler",
            DescriptorKind::EventListener => "EventListener",
        }
    }

    /// Property names accepted for this kind.
    pub fn allowed_properties(&self) -> &'static [&'static str] {
        match self {
            DescriptorKind::CommandHandler => {
                &[VALIDATE, GROUPS, VALIDATION_FAILED_EVENT, THROWABLE_EVENT]
            }
            DescriptorKind::EventListener => &[VALIDATE, GROUPS],
        }
    }

    fn allows(&self, property: &str) -> bool {
        self.allowed_properties().contains(&property)
    }
}

impl core::fmt::Display for DescriptorKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Name of an event type used as a failure substitute.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventType(String);

impl EventType {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for EventType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Descriptor construction failed. Fatal at boot.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("unknown property \"{property}\" on descriptor \"{descriptor}\"")]
    UnknownProperty {
        property: String,
        descriptor: DescriptorKind,
    },

    #[error("invalid value for property \"{property}\" on descriptor \"{descriptor}\": expected {expected}")]
    InvalidValue {
        property: String,
        descriptor: DescriptorKind,
        expected: &'static str,
    },
}

/// Immutable policy record for one handler binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerDescriptor {
    kind: DescriptorKind,
    message_type: String,
    validate: bool,
    validation_groups: BTreeSet<String>,
    on_validation_failure: Option<EventType>,
    on_throwable: Option<EventType>,
}

impl HandlerDescriptor {
    pub fn kind(&self) -> DescriptorKind {
        self.kind
    }

    pub fn message_type(&self) -> &str {
        &self.message_type
    }

    pub fn validate(&self) -> bool {
        self.validate
    }

    pub fn validation_groups(&self) -> &BTreeSet<String> {
        &self.validation_groups
    }

    /// Event published instead of invoking the handler when validation fails.
    pub fn on_validation_failure(&self) -> Option<&EventType> {
        self.on_validation_failure.as_ref()
    }

    /// Event published instead of propagating a handler error.
    pub fn on_throwable(&self) -> Option<&EventType> {
        self.on_throwable.as_ref()
    }
}

/// Builds [`HandlerDescriptor`]s from parsed metadata maps.
///
/// Every key is checked against the kind's allow-list before any value is
/// read, so a typo in handler metadata fails the boot instead of being
/// silently ignored at traffic time.
#[derive(Debug, Clone)]
pub struct DescriptorBuilder {
    kind: DescriptorKind,
    message_type: String,
}

impl DescriptorBuilder {
    pub fn new(kind: DescriptorKind, message_type: impl Into<String>) -> Self {
        Self {
            kind,
            message_type: message_type.into(),
        }
    }

    pub fn command_handler(message_type: impl Into<String>) -> Self {
        Self::new(DescriptorKind::CommandHandler, message_type)
    }

    pub fn event_listener(message_type: impl Into<String>) -> Self {
        Self::new(DescriptorKind::EventListener, message_type)
    }

    pub fn build(&self, fields: &Map<String, JsonValue>) -> Result<HandlerDescriptor, ConfigurationError> {
        if let Some(unknown) = fields.keys().find(|k| !self.kind.allows(k)) {
            return Err(ConfigurationError::UnknownProperty {
                property: unknown.clone(),
                descriptor: self.kind,
            });
        }

        if self.message_type.is_empty() {
            return Err(self.invalid(MESSAGE_TYPE, "a non-empty message type"));
        }

        let mut descriptor = HandlerDescriptor {
            kind: self.kind,
            message_type: self.message_type.clone(),
            validate: false,
            validation_groups: BTreeSet::new(),
            on_validation_failure: None,
            on_throwable: None,
        };

        for (property, value) in fields {
            match property.as_str() {
                VALIDATE => descriptor.validate = self.parse_bool(property, value)?,
                GROUPS => descriptor.validation_groups = self.parse_groups(property, value)?,
                VALIDATION_FAILED_EVENT => {
                    descriptor.on_validation_failure = self.parse_event_type(property, value)?
                }
                THROWABLE_EVENT => descriptor.on_throwable = self.parse_event_type(property, value)?,
                _ => {
                    return Err(ConfigurationError::UnknownProperty {
                        property: property.clone(),
                        descriptor: self.kind,
                    });
                }
            }
        }

        Ok(descriptor)
    }

    fn invalid(&self, property: &str, expected: &'static str) -> ConfigurationError {
        ConfigurationError::InvalidValue {
            property: property.to_string(),
            descriptor: self.kind,
            expected,
        }
    }

    fn parse_bool(&self, property: &str, value: &JsonValue) -> Result<bool, ConfigurationError> {
        value.as_bool().ok_or_else(|| self.invalid(property, "a boolean"))
    }

    fn parse_groups(&self, property: &str, value: &JsonValue) -> Result<BTreeSet<String>, ConfigurationError> {
        match value {
            JsonValue::Null => Ok(BTreeSet::new()),
            JsonValue::Array(items) => items
                .iter()
                .map(|item| {
                    item.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| self.invalid(property, "an array of strings"))
                })
                .collect(),
            _ => Err(self.invalid(property, "an array of strings")),
        }
    }

    fn parse_event_type(&self, property: &str, value: &JsonValue) -> Result<Option<EventType>, ConfigurationError> {
        match value {
            JsonValue::Null => Ok(None),
            JsonValue::String(name) if !name.is_empty() => Ok(Some(EventType(name.clone()))),
            _ => Err(self.invalid(property, "a non-empty event type name or null")),
        }
    }
}
