// src/rabbitmq/connection.rs

use lapin::options::ExchangeDeclareOptions;
use tracing::{debug, info, warn};

use super::amqp_client::{exchange_kind, field_table};
use super::broker::{Broker, BrokerChannel, BrokerConnection};
use super::errors::{Result, SenderError};
use super::options::ExchangeOptions;

/// Dial the broker, open a channel and optionally declare the exchange.
///
/// Nothing is left open on failure: a failed channel open closes the connection, and a
/// failed declare closes the channel and then the connection.
pub async fn connect<B: Broker>(
    broker: &B,
    uri: &str,
    exchange: &str,
    declare: bool,
    options: &ExchangeOptions,
) -> Result<(B::Connection, B::Channel)> {
    info!(exchange = %exchange, "Connecting to RabbitMQ");
    let connection = broker.dial(uri).await.map_err(SenderError::Connection)?;
    debug!("Successfully connected to RabbitMQ");

    let channel = match connection.open_channel().await {
        Ok(channel) => channel,
        Err(err) => {
            close_connection(&connection).await;
            return Err(SenderError::Channel(err));
        }
    };

    if declare {
        debug!(exchange = %exchange, kind = %options.kind, durable = options.durable, "Declaring exchange");
        let declared = channel
            .exchange_declare(
                exchange,
                exchange_kind(&options.kind),
                ExchangeDeclareOptions {
                    durable: options.durable,
                    auto_delete: options.auto_delete,
                    internal: options.internal,
                    nowait: options.no_wait,
                    ..ExchangeDeclareOptions::default()
                },
                field_table(&options.args),
            )
            .await;

        if let Err(err) = declared {
            close_channel(&channel).await;
            close_connection(&connection).await;
            return Err(SenderError::Declare(err));
        }
    }

    info!(exchange = %exchange, "Connection and channel ready");
    Ok((connection, channel))
}

pub(crate) async fn close_channel<H: BrokerChannel>(channel: &H) {
    if let Err(err) = channel.close().await {
        warn!("Failed to close channel: {}", err);
    }
}

pub(crate) async fn close_connection<C: BrokerConnection>(connection: &C) {
    if let Err(err) = connection.close().await {
        warn!("Failed to close connection: {}", err);
    }
}
