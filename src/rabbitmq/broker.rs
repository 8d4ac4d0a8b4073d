// src/rabbitmq/broker.rs
//
// The operations the sender needs from an AMQP broker. `amqp_client` implements
// them on lapin; tests run against an in-memory broker.

use async_trait::async_trait;
use lapin::{
    options::{BasicPublishOptions, ExchangeDeclareOptions},
    types::FieldTable,
    BasicProperties, Error as LapinError, ExchangeKind,
};
use tokio::sync::oneshot;

#[async_trait]
pub trait Broker: Send + Sync + 'static {
    type Connection: BrokerConnection<Channel = Self::Channel>;
    type Channel: BrokerChannel;

    /// Open a connection to `uri`
    async fn dial(&self, uri: &str) -> Result<Self::Connection, LapinError>;
}

#[async_trait]
pub trait BrokerConnection: Send + Sync + 'static {
    type Channel: BrokerChannel;

    async fn open_channel(&self) -> Result<Self::Channel, LapinError>;

    /// Resolves with the error that tore the connection down.
    /// The sender side is dropped without a value if the connection goes away quietly.
    fn notify_close(&self) -> oneshot::Receiver<LapinError>;

    async fn close(&self) -> Result<(), LapinError>;
}

#[async_trait]
pub trait BrokerChannel: Send + Sync + 'static {
    async fn exchange_declare(
        &self,
        exchange: &str,
        kind: ExchangeKind,
        options: ExchangeDeclareOptions,
        arguments: FieldTable,
    ) -> Result<(), LapinError>;

    async fn basic_publish(
        &self,
        exchange: &str,
        routing_key: &str,
        options: BasicPublishOptions,
        payload: &[u8],
        properties: BasicProperties,
    ) -> Result<(), LapinError>;

    fn notify_close(&self) -> oneshot::Receiver<LapinError>;

    async fn close(&self) -> Result<(), LapinError>;
}
