//! Self-healing real-time price feed client
//!
//! Keeps one logical subscription to a WebSocket price feed alive:
//! exponential-backoff reconnect, heartbeat liveness/latency probes and
//! ordered delivery of decoded price batches to a single consumer.

pub mod backoff;
pub mod client;
pub mod core;
pub mod dispatch;
pub mod infrastructure;
pub mod ws;

#[cfg(test)]
pub mod test_utils;

// Re-export commonly used types
pub use backoff::BackoffPolicy;
pub use client::{FeedClient, FeedStatus, StatusHandle};
pub use core::{PriceBatch, PriceBoard, PriceUpdate};
pub use infrastructure::config::{ApiConfig, Config, FeedConfig};
pub use ws::{CloseReason, ConnectionState};

use thiserror::Error;

/// Main error type for the feed client
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Configuration error: {0}")]
    Config(#[from] infrastructure::config::ConfigError),

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, FeedError>;
