//! Aggregator configuration
//!
//! Contract addresses and the chain endpoint are explicit configuration
//! owned by whoever constructs the aggregator, not module-level singletons.

use std::env;
use std::time::Duration;

#[derive(Debug)]
pub enum ConfigError {
    MissingVariable(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingVariable(var) => write!(f, "Missing environment variable: {}", var),
            ConfigError::InvalidValue(msg) => write!(f, "Invalid configuration value: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Chain endpoint URL (http(s) or ws(s)).
    pub endpoint_url: String,
    /// Pool manager contract address.
    pub manager_address: String,
    /// ERC20 token contract address.
    pub token_address: String,
    /// Confirmations required before a transaction counts as settled.
    pub confirmation_threshold: u32,
    /// Delay between confirmation polls.
    pub poll_interval: Duration,
}

fn is_hex_address(value: &str) -> bool {
    match value.strip_prefix("0x") {
        Some(body) => body.len() == 40 && hex::decode(body).is_ok(),
        None => false,
    }
}

impl AggregatorConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let endpoint_url = env::var("POOLFLOW_ENDPOINT_URL")
            .map_err(|_| ConfigError::MissingVariable("POOLFLOW_ENDPOINT_URL".to_string()))?;
        let manager_address = env::var("POOLFLOW_MANAGER_ADDRESS")
            .map_err(|_| ConfigError::MissingVariable("POOLFLOW_MANAGER_ADDRESS".to_string()))?;
        let token_address = env::var("POOLFLOW_TOKEN_ADDRESS")
            .map_err(|_| ConfigError::MissingVariable("POOLFLOW_TOKEN_ADDRESS".to_string()))?;

        let confirmation_threshold = env::var("POOLFLOW_CONFIRMATION_THRESHOLD")
            .unwrap_or_else(|_| "1".to_string())
            .parse::<u32>()
            .unwrap_or(1);

        let poll_interval_ms = env::var("POOLFLOW_POLL_INTERVAL_MS")
            .unwrap_or_else(|_| "1000".to_string())
            .parse::<u64>()
            .unwrap_or(1000);

        let config = AggregatorConfig {
            endpoint_url,
            manager_address,
            token_address,
            confirmation_threshold,
            poll_interval: Duration::from_millis(poll_interval_ms),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = &self.endpoint_url;
        if !(url.starts_with("http://")
            || url.starts_with("https://")
            || url.starts_with("ws://")
            || url.starts_with("wss://"))
        {
            return Err(ConfigError::InvalidValue(
                "endpoint_url must start with http(s):// or ws(s)://".to_string(),
            ));
        }

        if !is_hex_address(&self.manager_address) {
            return Err(ConfigError::InvalidValue(format!(
                "manager_address is not a 20-byte hex address: {}",
                self.manager_address
            )));
        }

        if !is_hex_address(&self.token_address) {
            return Err(ConfigError::InvalidValue(format!(
                "token_address is not a 20-byte hex address: {}",
                self.token_address
            )));
        }

        Ok(())
    }
}
