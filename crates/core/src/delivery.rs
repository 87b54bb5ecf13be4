use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Per-message delivery options.
///
/// - `destination`: exchange override; empty means "use the context's
///   default (originating) exchange".
/// - `headers`: transport headers attached to the outgoing message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryOptions {
    destination: String,
    headers: BTreeMap<String, String>,
}

impl DeliveryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = destination.into();
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Resolve the exchange to deliver to, falling back to `default_exchange`.
    pub fn resolve_destination<'a>(&'a self, default_exchange: &'a str) -> &'a str {
        if self.destination.is_empty() {
            default_exchange
        } else {
            &self.destination
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_destination_falls_back_to_default() {
        let options = DeliveryOptions::new();
        assert_eq!(options.resolve_destination("orders"), "orders");
    }

    #[test]
    fn explicit_destination_wins() {
        let options = DeliveryOptions::new()
            .with_destination("billing")
            .with_header("trace-id", "abc");

        assert_eq!(options.resolve_destination("orders"), "billing");
        assert_eq!(options.headers().get("trace-id").map(String::as_str), Some("abc"));
    }
}
