// src/rabbitmq/monitor.rs

use lapin::Error as LapinError;
use tokio::sync::{mpsc, oneshot, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::broker::{BrokerChannel, BrokerConnection};
use super::connection::{close_channel, close_connection};
use super::errors::SenderError;
use super::publisher::{self, Outbound};

/// Everything a live session owns, handed over by the sender after a successful connect.
pub struct Session<C, H> {
    pub connection: C,
    pub channel: H,
    pub exchange: String,
    pub queue: OwnedMutexGuard<mpsc::Receiver<Outbound>>,
}

/// Register the broker close notifications and spawn the session task.
///
/// The task races the publish loop against the broker closing the connection or channel.
/// Whichever resolves first decides the outcome: the channel and connection are closed, then
/// at most one error is written to `errors`. A clean stop of the publish loop reports nothing.
pub fn spawn<C, H>(session: Session<C, H>, errors: mpsc::Sender<SenderError>) -> JoinHandle<()>
where
    C: BrokerConnection<Channel = H>,
    H: BrokerChannel,
{
    // Registered before spawning so a close that races the spawn is not missed
    let connection_closed = session.connection.notify_close();
    let channel_closed = session.channel.notify_close();

    tokio::spawn(supervise(session, connection_closed, channel_closed, errors))
}

async fn supervise<C, H>(
    session: Session<C, H>,
    connection_closed: oneshot::Receiver<LapinError>,
    channel_closed: oneshot::Receiver<LapinError>,
    errors: mpsc::Sender<SenderError>,
) where
    C: BrokerConnection<Channel = H>,
    H: BrokerChannel,
{
    let Session {
        connection,
        channel,
        exchange,
        mut queue,
    } = session;

    let session_id = Uuid::new_v4();
    info!(session = %session_id, exchange = %exchange, "Sender session running");

    let outcome = tokio::select! {
        err = closed(connection_closed) => Some(SenderError::BrokerClose(err)),
        err = closed(channel_closed) => Some(SenderError::BrokerClose(err)),
        result = publisher::run(&channel, &exchange, &mut queue) => result.err(),
    };

    close_channel(&channel).await;
    close_connection(&connection).await;
    // Hand the outbound queue back for the next connect
    drop(queue);

    match outcome {
        Some(err) => {
            error!(session = %session_id, exchange = %exchange, "Sender session terminated: {}", err);
            if errors.send(err).await.is_err() {
                warn!(session = %session_id, "Error receiver dropped, terminal error discarded");
            }
        }
        None => debug!(session = %session_id, exchange = %exchange, "Sender session stopped cleanly"),
    }
}

/// Resolve with the close error, or never if the notifier goes away without one
async fn closed(notifier: oneshot::Receiver<LapinError>) -> LapinError {
    match notifier.await {
        Ok(err) => err,
        Err(_) => std::future::pending().await,
    }
}
