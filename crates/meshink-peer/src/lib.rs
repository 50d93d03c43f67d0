//! MeshInk peer process.
//!
//! Binds a [`meshink_core::ReplicationEngine`] to real WebSocket connections:
//! nodes meet on a shared topic, exchange a hello, and from then on stream
//! canvas snapshots to each other.

pub mod config;
pub mod link;
pub mod rendezvous;

#[cfg(test)]
mod test_support;

pub use config::PeerConfig;
pub use link::ChannelLink;
pub use rendezvous::Node;
