// src/rabbitmq/mock.rs
//
// In-memory broker for unit tests. Records every call and can be told to fail
// at each step or to drop the connection from the broker side.

use async_trait::async_trait;
use lapin::{
    options::{BasicPublishOptions, ExchangeDeclareOptions},
    types::FieldTable,
    BasicProperties, ChannelState, ConnectionState, Error as LapinError, ExchangeKind,
};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

use super::broker::{Broker, BrokerChannel, BrokerConnection};
use super::options::Message;

#[derive(Debug, Clone)]
pub enum Event {
    Dial(String),
    OpenChannel,
    Declare {
        exchange: String,
        kind: ExchangeKind,
        options: ExchangeDeclareOptions,
        args: FieldTable,
    },
    Publish {
        exchange: String,
        routing_key: String,
        options: BasicPublishOptions,
        body: Vec<u8>,
        properties: BasicProperties,
    },
    CloseChannel,
    CloseConnection,
}

#[derive(Default)]
struct State {
    events: Vec<Event>,
    fail_dial: bool,
    fail_channel: bool,
    fail_declare: bool,
    fail_publish_at: Option<usize>,
    publish_attempts: usize,
    broken: bool,
    close_watchers: Vec<oneshot::Sender<LapinError>>,
    published: Option<mpsc::UnboundedSender<Message>>,
}

#[derive(Clone, Default)]
pub struct MockBroker {
    state: Arc<Mutex<State>>,
}

pub struct MockConnection {
    state: Arc<Mutex<State>>,
}

pub struct MockChannel {
    state: Arc<Mutex<State>>,
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn closed_by_broker() -> LapinError {
    LapinError::InvalidConnectionState(ConnectionState::Error)
}

fn watch(state: &Mutex<State>) -> oneshot::Receiver<LapinError> {
    let (tx, rx) = oneshot::channel();
    let mut state = lock(state);
    if state.broken {
        let _ = tx.send(closed_by_broker());
    } else {
        state.close_watchers.push(tx);
    }
    rx
}

impl MockBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_dial(self) -> Self {
        lock(&self.state).fail_dial = true;
        self
    }

    pub fn fail_channel(self) -> Self {
        lock(&self.state).fail_channel = true;
        self
    }

    pub fn fail_declare(self) -> Self {
        lock(&self.state).fail_declare = true;
        self
    }

    /// Fail the publish attempt with this zero-based index
    pub fn fail_publish_at(self, attempt: usize) -> Self {
        lock(&self.state).fail_publish_at = Some(attempt);
        self
    }

    pub fn events(&self) -> Vec<Event> {
        lock(&self.state).events.clone()
    }

    pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        lock(&self.state).events.iter().filter(|e| pred(*e)).count()
    }

    /// Stream of successfully published messages, in publish order
    pub fn published(&self) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.state).published = Some(tx);
        rx
    }

    /// Tear the connection down as if the broker or network did it
    pub fn close_from_broker(&self) {
        let mut state = lock(&self.state);
        state.broken = true;
        for watcher in state.close_watchers.drain(..) {
            let _ = watcher.send(closed_by_broker());
        }
    }

    /// Poll the recorded events until `pred` holds
    pub async fn wait_until(&self, pred: impl Fn(&[Event]) -> bool) {
        for _ in 0..400 {
            if pred(lock(&self.state).events.as_slice()) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("timed out waiting on mock broker, events: {:?}", self.events());
    }

    pub async fn wait_for_shutdown(&self) {
        self.wait_until(|events| events.iter().any(|e| matches!(e, Event::CloseConnection)))
            .await
    }
}

#[async_trait]
impl Broker for MockBroker {
    type Connection = MockConnection;
    type Channel = MockChannel;

    async fn dial(&self, uri: &str) -> Result<MockConnection, LapinError> {
        let mut state = lock(&self.state);
        state.events.push(Event::Dial(uri.to_string()));
        if state.fail_dial {
            return Err(LapinError::IOError(Arc::new(io::Error::from(
                io::ErrorKind::ConnectionRefused,
            ))));
        }
        state.broken = false;
        Ok(MockConnection {
            state: self.state.clone(),
        })
    }
}

#[async_trait]
impl BrokerConnection for MockConnection {
    type Channel = MockChannel;

    async fn open_channel(&self) -> Result<MockChannel, LapinError> {
        let mut state = lock(&self.state);
        state.events.push(Event::OpenChannel);
        if state.fail_channel {
            return Err(LapinError::InvalidConnectionState(ConnectionState::Closed));
        }
        Ok(MockChannel {
            state: self.state.clone(),
        })
    }

    fn notify_close(&self) -> oneshot::Receiver<LapinError> {
        watch(&self.state)
    }

    async fn close(&self) -> Result<(), LapinError> {
        let mut state = lock(&self.state);
        state.events.push(Event::CloseConnection);
        // Watchers of a locally closed connection never fire
        state.close_watchers.clear();
        if state.broken {
            return Err(LapinError::InvalidConnectionState(ConnectionState::Error));
        }
        Ok(())
    }
}

#[async_trait]
impl BrokerChannel for MockChannel {
    async fn exchange_declare(
        &self,
        exchange: &str,
        kind: ExchangeKind,
        options: ExchangeDeclareOptions,
        arguments: FieldTable,
    ) -> Result<(), LapinError> {
        let mut state = lock(&self.state);
        state.events.push(Event::Declare {
            exchange: exchange.to_string(),
            kind,
            options,
            args: arguments,
        });
        if state.fail_declare {
            return Err(LapinError::InvalidChannelState(ChannelState::Error));
        }
        Ok(())
    }

    async fn basic_publish(
        &self,
        exchange: &str,
        routing_key: &str,
        options: BasicPublishOptions,
        payload: &[u8],
        properties: BasicProperties,
    ) -> Result<(), LapinError> {
        let mut state = lock(&self.state);
        let attempt = state.publish_attempts;
        state.publish_attempts += 1;
        if state.broken || state.fail_publish_at == Some(attempt) {
            return Err(LapinError::InvalidChannelState(ChannelState::Closed));
        }
        state.events.push(Event::Publish {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            options,
            body: payload.to_vec(),
            properties,
        });
        if let Some(published) = &state.published {
            let _ = published.send(Message::new(payload.to_vec(), routing_key));
        }
        Ok(())
    }

    fn notify_close(&self) -> oneshot::Receiver<LapinError> {
        watch(&self.state)
    }

    async fn close(&self) -> Result<(), LapinError> {
        let mut state = lock(&self.state);
        state.events.push(Event::CloseChannel);
        if state.broken {
            return Err(LapinError::InvalidChannelState(ChannelState::Closed));
        }
        Ok(())
    }
}
