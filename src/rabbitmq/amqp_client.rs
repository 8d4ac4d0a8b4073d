// src/rabbitmq/amqp_client.rs

use async_trait::async_trait;
use lapin::{
    options::{BasicPublishOptions, ExchangeDeclareOptions},
    types::{AMQPValue, FieldArray, FieldTable},
    BasicProperties, Channel, Connection, ConnectionProperties, Error as LapinError, ExchangeKind,
};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::debug;

use super::broker::{Broker, BrokerChannel, BrokerConnection};

const REPLY_SUCCESS: u16 = 200;

/// How often `notify_close` re-checks the connection and channel status
const CLOSE_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Broker backed by a real RabbitMQ server through lapin.
#[derive(Clone, Default)]
pub struct AmqpBroker;

impl AmqpBroker {
    pub fn new() -> Self {
        Self
    }
}

pub struct AmqpConnection(Connection);

pub struct AmqpChannel(Channel);

#[async_trait]
impl Broker for AmqpBroker {
    type Connection = AmqpConnection;
    type Channel = AmqpChannel;

    async fn dial(&self, uri: &str) -> Result<AmqpConnection, LapinError> {
        let connection = Connection::connect(uri, ConnectionProperties::default()).await?;
        Ok(AmqpConnection(connection))
    }
}

#[async_trait]
impl BrokerConnection for AmqpConnection {
    type Channel = AmqpChannel;

    async fn open_channel(&self) -> Result<AmqpChannel, LapinError> {
        Ok(AmqpChannel(self.0.create_channel().await?))
    }

    fn notify_close(&self) -> oneshot::Receiver<LapinError> {
        let (tx, rx) = oneshot::channel();
        let slot: CloseSlot = Arc::new(Mutex::new(Some(tx)));

        let hook = slot.clone();
        self.0.on_error(move |err| fire(&hook, err));

        // on_error misses clean server closes and anything before registration
        let status = self.0.status().clone();
        watch_status(slot, CLOSE_POLL_INTERVAL, move || {
            (!status.connected()).then(|| LapinError::InvalidConnectionState(status.state()))
        });
        rx
    }

    async fn close(&self) -> Result<(), LapinError> {
        if !self.0.status().connected() {
            debug!("Connection already closed");
            return Ok(());
        }
        self.0.close(REPLY_SUCCESS, "sender stopped").await
    }
}

#[async_trait]
impl BrokerChannel for AmqpChannel {
    async fn exchange_declare(
        &self,
        exchange: &str,
        kind: ExchangeKind,
        options: ExchangeDeclareOptions,
        arguments: FieldTable,
    ) -> Result<(), LapinError> {
        self.0.exchange_declare(exchange, kind, options, arguments).await
    }

    async fn basic_publish(
        &self,
        exchange: &str,
        routing_key: &str,
        options: BasicPublishOptions,
        payload: &[u8],
        properties: BasicProperties,
    ) -> Result<(), LapinError> {
        // Confirms are not enabled, so the returned PublisherConfirm carries nothing to wait on
        self.0
            .basic_publish(exchange, routing_key, options, payload, properties)
            .await?;
        Ok(())
    }

    fn notify_close(&self) -> oneshot::Receiver<LapinError> {
        let (tx, rx) = oneshot::channel();
        let slot: CloseSlot = Arc::new(Mutex::new(Some(tx)));

        let hook = slot.clone();
        self.0.on_error(move |err| fire(&hook, err));

        let status = self.0.status().clone();
        watch_status(slot, CLOSE_POLL_INTERVAL, move || {
            (!status.connected()).then(|| LapinError::InvalidChannelState(status.state()))
        });
        rx
    }

    async fn close(&self) -> Result<(), LapinError> {
        if !self.0.status().connected() {
            debug!(channel_id = self.0.id(), "Channel already closed");
            return Ok(());
        }
        self.0.close(REPLY_SUCCESS, "sender stopped").await
    }
}

/// One-shot close notification shared by the error hook and the status poll
type CloseSlot = Arc<Mutex<Option<oneshot::Sender<LapinError>>>>;

fn lock(slot: &CloseSlot) -> MutexGuard<'_, Option<oneshot::Sender<LapinError>>> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Deliver `err` unless something already filled the slot
fn fire(slot: &CloseSlot, err: LapinError) {
    let tx = lock(slot).take();
    if let Some(tx) = tx {
        let _ = tx.send(err);
    }
}

/// Fill `slot` as soon as `closed` reports a close: once right away, then every
/// `interval` until the slot is filled or its receiver is gone.
fn watch_status<F>(slot: CloseSlot, interval: Duration, closed: F)
where
    F: Fn() -> Option<LapinError> + Send + 'static,
{
    if let Some(err) = closed() {
        fire(&slot, err);
        return;
    }

    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            let waiting = lock(&slot).as_ref().is_some_and(|tx| !tx.is_closed());
            if !waiting {
                return;
            }
            if let Some(err) = closed() {
                debug!("Close detected from status: {}", err);
                fire(&slot, err);
                return;
            }
        }
    });
}

/// Map a configured kind name onto lapin's exchange kinds
pub fn exchange_kind(kind: &str) -> ExchangeKind {
    match kind {
        "direct" => ExchangeKind::Direct,
        "fanout" => ExchangeKind::Fanout,
        "topic" => ExchangeKind::Topic,
        "headers" => ExchangeKind::Headers,
        other => ExchangeKind::Custom(other.to_string()),
    }
}

/// Convert JSON-style declare arguments into an AMQP field table
pub fn field_table(args: &BTreeMap<String, Value>) -> FieldTable {
    let mut table = FieldTable::default();
    for (key, value) in args {
        table.insert(key.clone().into(), amqp_value(value));
    }
    table
}

fn amqp_value(value: &Value) -> AMQPValue {
    match value {
        Value::Null => AMQPValue::Void,
        Value::Bool(b) => AMQPValue::Boolean(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => AMQPValue::LongLongInt(i),
            None => AMQPValue::Double(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => AMQPValue::LongString(s.clone().into()),
        Value::Array(items) => AMQPValue::FieldArray(FieldArray::from(
            items.iter().map(amqp_value).collect::<Vec<_>>(),
        )),
        Value::Object(map) => {
            let mut table = FieldTable::default();
            for (key, value) in map {
                table.insert(key.clone().into(), amqp_value(value));
            }
            AMQPValue::FieldTable(table)
        }
    }
}
