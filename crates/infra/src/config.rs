//! Broker configuration.

use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

pub const ENV_EXCHANGE_KIND: &str = "DISPATCHBUS_EXCHANGE_KIND";
pub const ENV_EXCHANGE_DURABLE: &str = "DISPATCHBUS_EXCHANGE_DURABLE";

/// AMQP exchange type used when declaring exchanges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeKind {
    #[default]
    Direct,
    Fanout,
    Topic,
    Headers,
}

impl ExchangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeKind::Direct => "direct",
            ExchangeKind::Fanout => "fanout",
            ExchangeKind::Topic => "topic",
            ExchangeKind::Headers => "headers",
        }
    }
}

impl core::fmt::Display for ExchangeKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown exchange kind \"{0}\"")]
pub struct UnknownExchangeKind(pub String);

impl FromStr for ExchangeKind {
    type Err = UnknownExchangeKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" => Ok(ExchangeKind::Direct),
            "fanout" => Ok(ExchangeKind::Fanout),
            "topic" => Ok(ExchangeKind::Topic),
            "headers" => Ok(ExchangeKind::Headers),
            _ => Err(UnknownExchangeKind(s.to_string())),
        }
    }
}

/// How exchanges are declared before each publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerConfig {
    pub exchange_kind: ExchangeKind,
    pub durable: bool,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            exchange_kind: ExchangeKind::Direct,
            durable: true,
        }
    }
}

impl BrokerConfig {
    pub fn with_exchange_kind(mut self, kind: ExchangeKind) -> Self {
        self.exchange_kind = kind;
        self
    }

    pub fn with_durable(mut self, durable: bool) -> Self {
        self.durable = durable;
        self
    }

    /// Read overrides from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unparseable values keep the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_EXCHANGE_KIND) {
            match raw.parse() {
                Ok(kind) => config.exchange_kind = kind,
                Err(e) => warn!(error = %e, "ignoring {ENV_EXCHANGE_KIND}"),
            }
        }

        if let Some(raw) = lookup(ENV_EXCHANGE_DURABLE) {
            match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => config.durable = true,
                "0" | "false" | "no" => config.durable = false,
                other => warn!(value = other, "ignoring {ENV_EXCHANGE_DURABLE}"),
            }
        }

        config
    }
}
