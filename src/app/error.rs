use thiserror::Error;

use crate::config::ConfigError;
use crate::mailer::DeliveryError;

#[derive(Error, Debug)]
pub enum CourierError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Token refresh failed: {0}")]
    Auth(String),

    #[error("Feed fetch failed: {0}")]
    Fetch(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Delivery failed: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache format error: {0}")]
    CacheFormat(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CourierError>;
