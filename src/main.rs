//! Streaming price feed client
//!
//! # Architecture
//! - **client**: FeedClient composition root and session task
//! - **ws**: transport, connection state machine, heartbeat prober
//! - **dispatch**: frame decoding and ordered delivery
//! - **core**: price types and the latest-price board
//! - **infrastructure**: Cold path (logging, metrics, config, api)

use anyhow::Context;
use std::sync::Arc;
use ticker_feed::infrastructure::api::{start_server, AppState};
use ticker_feed::infrastructure::{config::Config, logging};
use ticker_feed::{FeedClient, PriceBoard};

/// Main application state
pub struct FeedApp {
    config: Config,
}

impl FeedApp {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run until Ctrl-C or until the feed gives up
    pub async fn run(self) -> anyhow::Result<()> {
        tracing::info!(url = %self.config.feed.url, "Starting price feed client...");

        // 1. Latest-price board fed by the consumer callback
        let board = Arc::new(PriceBoard::new());
        let board_for_feed = board.clone();
        let client = FeedClient::new(self.config.feed.clone(), move |batch| {
            let updated = board_for_feed.apply(&batch);
            tracing::debug!(symbols = updated, "prices applied");
        })
        .context("invalid feed configuration")?;

        // 2. Start API Server (Cold Path)
        if self.config.api.enabled {
            let state = AppState {
                status: client.subscribe(),
                board: board.clone(),
                metrics: client.metrics(),
            };
            let port = self.config.api.port;
            tokio::spawn(async move {
                if let Err(e) = start_server(state, port).await {
                    tracing::error!("API Server failed: {}", e);
                }
            });
        }

        // 3. Connect and follow status until shutdown
        let mut status = client.subscribe();
        client.start()?;

        loop {
            tokio::select! {
                signal = tokio::signal::ctrl_c() => {
                    signal.context("failed to listen for ctrl-c")?;
                    tracing::info!("Shutdown requested");
                    client.stop();
                    break;
                }
                changed = status.changed() => {
                    let Some(current) = changed else { break };
                    tracing::info!(
                        state = current.state.as_str(),
                        latency_ms = current.latency_ms,
                        retry = current.retry_attempt,
                        symbols = board.len(),
                        "feed status"
                    );
                    if current.is_exhausted() {
                        anyhow::bail!(
                            "price feed unavailable after {} retries",
                            self.config.feed.max_retries
                        );
                    }
                }
            }
        }

        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _guards = logging::init_logging().context("failed to initialize logging")?;

    let config = Config::load().context("failed to load configuration")?;

    FeedApp::new(config).run().await
}
