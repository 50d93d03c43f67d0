//! Command-line and environment configuration for a peer.

use anyhow::{Context, Result};
use clap::Parser;
use meshink_core::Topic;
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(name = "meshink-peer")]
#[command(about = "Join a shared canvas topic and replicate it with every peer found")]
pub struct PeerConfig {
    /// Topic to join, as 64 hex characters. A fresh random topic is created if omitted.
    pub topic: Option<String>,

    /// Address to accept peer connections on
    #[arg(short, long, env = "MESHINK_LISTEN", default_value = "127.0.0.1:0")]
    pub listen: SocketAddr,

    /// Bootstrap peer to dial, e.g. ws://10.0.0.2:7400 (repeatable)
    #[arg(long = "peer", env = "MESHINK_PEERS", value_delimiter = ',')]
    pub peers: Vec<String>,

    /// Frames queued per connection before that peer is dropped
    #[arg(long, default_value_t = 64, value_parser = clap::value_parser!(u32).range(1..))]
    pub outbound_queue: u32,

    /// Give up on a socket write after this many milliseconds
    #[arg(long, default_value_t = 5000)]
    pub write_timeout_ms: u64,

    /// Peer ID announced in the handshake (generated if not provided)
    #[arg(long)]
    pub peer_id: Option<String>,

    /// Enable verbose logging
    #[arg(long)]
    pub verbose: bool,
}

impl PeerConfig {
    /// Loopback-only config with defaults, for embedding and tests.
    pub fn local(topic: Topic) -> Self {
        Self {
            topic: Some(topic.to_hex()),
            listen: SocketAddr::from(([127, 0, 0, 1], 0)),
            peers: Vec::new(),
            outbound_queue: 64,
            write_timeout_ms: 5000,
            peer_id: None,
            verbose: false,
        }
    }

    /// The configured topic, or a random one.
    pub fn topic(&self) -> Result<Topic> {
        match &self.topic {
            Some(hex) => hex
                .parse()
                .with_context(|| format!("invalid topic {:?}", hex)),
            None => Ok(Topic::random()),
        }
    }

    pub fn peer_id(&self) -> String {
        self.peer_id
            .clone()
            .unwrap_or_else(|| hex::encode(rand::random::<[u8; 16]>()))
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn log_filter(&self) -> &'static str {
        if self.verbose {
            "meshink_peer=debug,meshink_core=debug"
        } else {
            "meshink_peer=info,meshink_core=info"
        }
    }
}
