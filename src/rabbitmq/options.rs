// src/rabbitmq/options.rs

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Exchange kind declared when none is configured.
pub const DEFAULT_EXCHANGE_KIND: &str = "direct";

/// Properties used when declaring the exchange on connect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeOptions {
    /// Exchange type: `direct`, `fanout`, `topic`, `headers` or a plugin-provided kind
    pub kind: String,

    /// Survive a broker restart
    pub durable: bool,

    /// Delete once the last queue is unbound
    pub auto_delete: bool,

    /// Only reachable through exchange-to-exchange bindings
    pub internal: bool,

    /// Do not wait for the broker's declare-ok
    pub no_wait: bool,

    /// Broker-specific arguments (`alternate-exchange` and friends)
    pub args: BTreeMap<String, Value>,
}

impl Default for ExchangeOptions {
    fn default() -> Self {
        Self {
            kind: DEFAULT_EXCHANGE_KIND.to_string(),
            durable: true,
            auto_delete: false,
            internal: false,
            no_wait: false,
            args: BTreeMap::new(),
        }
    }
}

/// A single outbound message. The body is published as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub routing_key: String,
    pub body: Vec<u8>,
}

impl Message {
    pub fn new(body: impl Into<Vec<u8>>, routing_key: impl Into<String>) -> Self {
        Self {
            routing_key: routing_key.into(),
            body: body.into(),
        }
    }
}
