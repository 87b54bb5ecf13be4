//! Validation outcomes and the validator capability.
//!
//! The validation engine itself lives outside the bus; dispatch only
//! consumes its outcome.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use dispatchbus_core::Message;

/// One failed constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Path of the offending payload property (e.g. "customer.email").
    pub property: String,
    pub message: String,
}

impl Violation {
    pub fn new(property: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            message: message.into(),
        }
    }
}

/// Result of validating one message. Empty means valid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    violations: Vec<Violation>,
}

impl ValidationOutcome {
    pub fn valid() -> Self {
        Self::default()
    }

    pub fn invalid(violations: Vec<Violation>) -> Self {
        Self { violations }
    }

    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }
}

/// Validates messages against a set of validation groups.
pub trait MessageValidator: Send + Sync {
    fn validate(&self, message: &Message, groups: &BTreeSet<String>) -> ValidationOutcome;
}

impl<F> MessageValidator for F
where
    F: Fn(&Message, &BTreeSet<String>) -> ValidationOutcome + Send + Sync,
{
    fn validate(&self, message: &Message, groups: &BTreeSet<String>) -> ValidationOutcome {
        self(message, groups)
    }
}
