// src/config.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::rabbitmq::options::ExchangeOptions;
use crate::rabbitmq::sender::DEFAULT_QUEUE_CAPACITY;

const CONFIG_FILE_NAME: &str = "amqp-sender.json";

/// Construction-time settings for a [`crate::Sender`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SenderConfig {
    pub uri: String,
    pub exchange: String,
    #[serde(default = "default_declare")]
    pub declare_exchange: bool,
    #[serde(default)]
    pub exchange_options: ExchangeOptions,
    #[serde(default = "default_queue_capacity")]
    /// 0 hands each message straight to the publish loop; more buffers that many
    pub queue_capacity: usize,
}

// Default values
fn default_declare() -> bool { true }
fn default_queue_capacity() -> usize { DEFAULT_QUEUE_CAPACITY }

impl SenderConfig {
    pub fn new(uri: &str, exchange: &str) -> Self {
        Self {
            uri: uri.to_string(),
            exchange: exchange.to_string(),
            declare_exchange: default_declare(),
            exchange_options: ExchangeOptions::default(),
            queue_capacity: default_queue_capacity(),
        }
    }

    /// Load from the process environment, reading `.env` first if present.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary variable source.
    ///
    /// `AMQP_ADDR` and `AMQP_EXCHANGE` are required. `AMQP_EXCHANGE_KIND`,
    /// `AMQP_EXCHANGE_DURABLE`, `AMQP_EXCHANGE_DECLARE` and `AMQP_QUEUE_CAPACITY` are optional.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let uri = lookup("AMQP_ADDR").context("AMQP_ADDR is not set")?;
        let exchange = lookup("AMQP_EXCHANGE").context("AMQP_EXCHANGE is not set")?;
        let mut config = Self::new(&uri, &exchange);

        if let Some(kind) = lookup("AMQP_EXCHANGE_KIND") {
            config.exchange_options.kind = kind;
        }
        if let Some(durable) = lookup("AMQP_EXCHANGE_DURABLE") {
            config.exchange_options.durable = durable
                .parse()
                .context("AMQP_EXCHANGE_DURABLE must be true or false")?;
        }
        if let Some(declare) = lookup("AMQP_EXCHANGE_DECLARE") {
            config.declare_exchange = declare
                .parse()
                .context("AMQP_EXCHANGE_DECLARE must be true or false")?;
        }
        if let Some(capacity) = lookup("AMQP_QUEUE_CAPACITY") {
            config.queue_capacity = capacity
                .parse()
                .context("AMQP_QUEUE_CAPACITY must be a non-negative integer")?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.uri.is_empty() {
            return Err(anyhow!("Configuration error: uri cannot be empty"));
        }
        if self.exchange.is_empty() {
            return Err(anyhow!("Configuration error: exchange cannot be empty"));
        }
        Ok(())
    }
}

pub fn find_config_file() -> Result<PathBuf> {
    // Check various locations
    let locations = [
        ("Current directory", PathBuf::from(CONFIG_FILE_NAME)),
        ("Config directory", Path::new("config").join(CONFIG_FILE_NAME)),
    ];

    for (location_name, path) in locations.iter() {
        if path.exists() {
            debug!("Found config file in {}: {}", location_name, path.display());
            return Ok(path.clone());
        }
    }

    if let Some(home_dir) = home::home_dir() {
        let home_config = home_dir.join(format!(".{}", CONFIG_FILE_NAME));
        if home_config.exists() {
            debug!("Found config file in home directory: {}", home_config.display());
            return Ok(home_config);
        }
    }

    Err(anyhow!(
        "Could not find {} in the current directory, ./config or the home directory",
        CONFIG_FILE_NAME
    ))
}

pub fn load_config() -> Result<SenderConfig> {
    let config_path = find_config_file()?;
    load_config_from(&config_path)
}

pub fn load_config_from(path: &Path) -> Result<SenderConfig> {
    let content = fs::read_to_string(path)
        .context(format!("Failed to read config file at {}", path.display()))?;

    let config: SenderConfig = serde_json::from_str(&content)
        .context("Configuration file contains invalid JSON or missing required fields")?;

    config.validate()?;
    info!("Loaded sender configuration from {}", path.display());
    Ok(config)
}
