// src/rabbitmq/errors.rs

use lapin::Error as LapinError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SenderError {
    #[error("RabbitMQ connection error: {0}")]
    Connection(#[source] LapinError),

    #[error("RabbitMQ channel error: {0}")]
    Channel(#[source] LapinError),

    #[error("Failed to declare exchange: {0}")]
    Declare(#[source] LapinError),

    #[error("RabbitMQ publish error: {0}")]
    Publish(#[source] LapinError),

    /// The broker or the network tore the connection down.
    #[error("NotifyClose: {0}")]
    BrokerClose(#[source] LapinError),

    #[error("Sender already has a live connection")]
    AlreadyConnected,
}

// Custom Result type for sender operations
pub type Result<T> = std::result::Result<T, SenderError>;
