//! meshink-peer: join a topic and replicate a canvas with every peer on it.
//!
//! The canvas here is headless; shapes arrive from and are kept in step with
//! the other peers. A drawing front end embeds [`meshink_peer::Node`] instead.

use anyhow::Result;
use clap::Parser;
use meshink_core::SharedCanvas;
use meshink_peer::{Node, PeerConfig};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config = PeerConfig::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_filter().into()),
        )
        .init();

    let canvas = Arc::new(SharedCanvas::new());
    let node = Node::start(config, canvas.clone()).await?;

    info!("joined topic: {}", node.topic());
    info!("other peers can run: meshink-peer {} --peer {}", node.topic(), node.url());

    tokio::signal::ctrl_c().await?;
    info!("shutting down with {} shapes on the canvas", canvas.len());
    node.shutdown().await;
    Ok(())
}
