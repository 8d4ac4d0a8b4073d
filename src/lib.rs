//! Publish messages to a RabbitMQ exchange from a background task.
//!
//! A [`Sender`] owns one broker connection. [`Sender::connect`] dials, opens a channel and
//! declares the exchange, then hands both to a task that publishes queued messages in order
//! until a publish fails, the broker closes the connection, or the sender is dropped.

pub mod config;
pub mod rabbitmq;

pub use config::SenderConfig;
pub use rabbitmq::{AmqpBroker, ExchangeOptions, Message, Result, Sender, SenderError};
