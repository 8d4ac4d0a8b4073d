// src/rabbitmq/sender.rs

use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::amqp_client::AmqpBroker;
use super::broker::Broker;
use super::connection;
use super::errors::{Result, SenderError};
use super::monitor::{self, Session};
use super::options::{ExchangeOptions, Message};
use super::publisher::Outbound;
use crate::config::SenderConfig;

/// No buffering: [`Sender::send`] returns once the publish loop has taken the message.
pub const DEFAULT_QUEUE_CAPACITY: usize = 0;

/// Publishes messages to a single exchange over one broker connection.
///
/// Nothing is dialled until [`Sender::connect`]. Messages passed to [`Sender::send`] are
/// published in call order by a background task, and the one terminal error of each
/// connected session shows up on [`Sender::next_error`].
pub struct Sender<B: Broker = AmqpBroker> {
    broker: B,

    pub uri: String,
    pub exchange: String,

    /// Declare the exchange on connect
    pub declare_exchange: bool,

    pub exchange_options: ExchangeOptions,

    outbound: mpsc::Sender<Outbound>,
    queue: Arc<Mutex<mpsc::Receiver<Outbound>>>,
    handoff: bool,
    errors_tx: mpsc::Sender<SenderError>,
    errors_rx: Mutex<mpsc::Receiver<SenderError>>,
    session: Mutex<Option<JoinHandle<()>>>,
}

impl Sender<AmqpBroker> {
    /// Durable direct exchange, declared on connect
    pub fn new(uri: &str, exchange: &str) -> Self {
        Self::with_broker(AmqpBroker::new(), uri, exchange)
    }

    pub fn from_config(config: SenderConfig) -> Self {
        Self::with_config(AmqpBroker::new(), config)
    }
}

impl<B: Broker> Sender<B> {
    pub fn with_broker(broker: B, uri: &str, exchange: &str) -> Self {
        Self::build(
            broker,
            uri.to_string(),
            exchange.to_string(),
            true,
            ExchangeOptions::default(),
            DEFAULT_QUEUE_CAPACITY,
        )
    }

    pub fn with_config(broker: B, config: SenderConfig) -> Self {
        Self::build(
            broker,
            config.uri,
            config.exchange,
            config.declare_exchange,
            config.exchange_options,
            config.queue_capacity,
        )
    }

    fn build(
        broker: B,
        uri: String,
        exchange: String,
        declare_exchange: bool,
        exchange_options: ExchangeOptions,
        queue_capacity: usize,
    ) -> Self {
        // A zero-capacity hand-off still needs one slot to park the message in
        let (outbound, queue) = mpsc::channel(queue_capacity.max(1));
        let (errors_tx, errors_rx) = mpsc::channel(1);

        debug!(exchange = %exchange, capacity = queue_capacity, "Creating sender");

        Self {
            broker,
            uri,
            exchange,
            declare_exchange,
            exchange_options,
            outbound,
            queue: Arc::new(Mutex::new(queue)),
            handoff: queue_capacity == 0,
            errors_tx,
            errors_rx: Mutex::new(errors_rx),
            session: Mutex::new(None),
        }
    }

    /// Dial the broker, open a channel, declare the exchange if configured, then start
    /// publishing in the background.
    ///
    /// Setup failures are returned here and start nothing. Fails with
    /// [`SenderError::AlreadyConnected`] while a previous session is still running.
    pub async fn connect(&self) -> Result<()> {
        let queue = claim_queue(&self.queue)?;

        let (connection, channel) = connection::connect(
            &self.broker,
            &self.uri,
            &self.exchange,
            self.declare_exchange,
            &self.exchange_options,
        )
        .await?;

        let handle = monitor::spawn(
            Session {
                connection,
                channel,
                exchange: self.exchange.clone(),
                queue,
            },
            self.errors_tx.clone(),
        );
        *self.session.lock().await = Some(handle);

        info!(exchange = %self.exchange, "Sender connected");
        Ok(())
    }

    /// Hand a message to the publish loop.
    ///
    /// By default this waits until a running session has taken the message, so with no
    /// session it waits until the next successful [`Sender::connect`], possibly forever.
    /// With a positive `queue_capacity` it only waits for room in the queue.
    ///
    /// Cancelling a pending hand-off withdraws the message; it is never published.
    pub async fn send(&self, body: impl Into<Vec<u8>>, routing_key: &str) {
        let message = Message::new(body, routing_key);

        if !self.handoff {
            if self.outbound.send(Outbound::buffered(message)).await.is_err() {
                // The receiver lives as long as `self`, so this only happens mid-drop
                warn!(exchange = %self.exchange, "Outbound queue closed, message dropped");
            }
            return;
        }

        let (outbound, accepted) = Outbound::handoff(message);
        if self.outbound.send(outbound).await.is_err() {
            warn!(exchange = %self.exchange, "Outbound queue closed, message dropped");
            return;
        }
        if accepted.await.is_err() {
            warn!(exchange = %self.exchange, "Outbound queue closed before the message was taken");
        }
    }

    /// Wait for the next terminal error: a failed publish or the broker closing the connection.
    pub async fn next_error(&self) -> Option<SenderError> {
        self.errors_rx.lock().await.recv().await
    }

    /// Stop accepting messages, let the running session publish what is already queued,
    /// and wait for it to close the channel and connection.
    ///
    /// Any terminal error that was never read is discarded.
    pub async fn close(self) {
        let Self {
            outbound,
            errors_rx,
            session,
            ..
        } = self;
        drop(outbound);
        drop(errors_rx);

        if let Some(handle) = session.into_inner() {
            if let Err(e) = handle.await {
                warn!("Sender session task failed: {}", e);
            }
        }
    }
}

/// Take the outbound queue for a new session, or fail if one already holds it
fn claim_queue(
    queue: &Arc<Mutex<mpsc::Receiver<Outbound>>>,
) -> Result<OwnedMutexGuard<mpsc::Receiver<Outbound>>> {
    queue
        .clone()
        .try_lock_owned()
        .map_err(|_| SenderError::AlreadyConnected)
}
