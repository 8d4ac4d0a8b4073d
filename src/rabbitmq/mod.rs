// src/rabbitmq/mod.rs
// Outbound publishing to a single RabbitMQ exchange

pub mod errors;
pub mod options;
pub mod broker;
pub mod amqp_client;
pub mod connection;
pub mod publisher;
pub mod monitor;
pub mod sender;

#[cfg(test)]
pub(crate) mod mock;

// Re-export specific items to simplify imports elsewhere
pub use amqp_client::AmqpBroker;
pub use errors::{Result, SenderError};
pub use options::{ExchangeOptions, Message};
pub use sender::Sender;
