use amqp_sender::{config, Sender, SenderConfig};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

// Publishes each line of stdin to the configured exchange.
// Usage: amqp-sender [routing-key]
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match config::load_config() {
        Ok(config) => config,
        Err(e) => {
            info!("No config file used ({}), reading environment", e);
            SenderConfig::from_env().context("Failed to load sender configuration")?
        }
    };

    let routing_key = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("AMQP_ROUTING_KEY").ok())
        .unwrap_or_default();

    let sender = Arc::new(Sender::from_config(config));
    sender.connect().await.context("Failed to connect to RabbitMQ")?;

    let publisher = sender.clone();
    let mut input = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await? {
            publisher.send(line, &routing_key).await;
        }
        Ok::<_, std::io::Error>(())
    });

    let input_finished = tokio::select! {
        err = sender.next_error() => {
            if let Some(err) = err {
                error!("Sender stopped: {}", err);
                return Err(err.into());
            }
            false
        }
        result = &mut input => {
            result.context("stdin reader panicked")?.context("Failed to read stdin")?;
            true
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, shutting down");
            false
        }
    };

    if input_finished {
        info!("End of input, flushing queued messages");
        if let Ok(sender) = Arc::try_unwrap(sender) {
            sender.close().await;
        }
    }

    Ok(())
}
