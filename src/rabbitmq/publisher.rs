// src/rabbitmq/publisher.rs

use lapin::{options::BasicPublishOptions, BasicProperties};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

use super::broker::BrokerChannel;
use super::errors::{Result, SenderError};
use super::options::Message;

pub const CONTENT_TYPE: &str = "text/plain";

/// A message on the outbound queue.
///
/// `accepted` is set when the caller waits for the publish loop to take the message.
#[derive(Debug)]
pub struct Outbound {
    pub message: Message,
    accepted: Option<oneshot::Sender<()>>,
}

impl Outbound {
    /// Fire and forget: the caller only waits for room in the queue.
    pub fn buffered(message: Message) -> Self {
        Self {
            message,
            accepted: None,
        }
    }

    /// Hand-off the caller waits on; the receiver resolves once the loop takes the message.
    pub fn handoff(message: Message) -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                message,
                accepted: Some(tx),
            },
            rx,
        )
    }

    /// Tell a waiting caller the message was taken.
    /// False if that caller already gave up, in which case the message was never sent.
    fn accept(&mut self) -> bool {
        match self.accepted.take() {
            Some(tx) => tx.send(()).is_ok(),
            None => true,
        }
    }
}

/// Drain `queue` in order, publishing every message to `exchange`.
///
/// Returns `Ok(())` once the queue is closed and empty, or the first publish error.
pub async fn run<H: BrokerChannel>(
    channel: &H,
    exchange: &str,
    queue: &mut mpsc::Receiver<Outbound>,
) -> Result<()> {
    let options = BasicPublishOptions {
        mandatory: false,
        immediate: false,
    };

    while let Some(mut outbound) = queue.recv().await {
        if !outbound.accept() {
            debug!(
                exchange = %exchange,
                routing_key = %outbound.message.routing_key,
                "Sender gave up on message, skipping"
            );
            continue;
        }

        let message = outbound.message;
        let properties = BasicProperties::default().with_content_type(CONTENT_TYPE.into());

        if let Err(err) = channel
            .basic_publish(exchange, &message.routing_key, options, &message.body, properties)
            .await
        {
            error!(
                exchange = %exchange,
                routing_key = %message.routing_key,
                "Failed to publish message: {}", err
            );
            return Err(SenderError::Publish(err));
        }

        debug!(
            exchange = %exchange,
            routing_key = %message.routing_key,
            bytes = message.body.len(),
            "Published message"
        );
    }

    debug!(exchange = %exchange, "Outbound queue closed");
    Ok(())
}
