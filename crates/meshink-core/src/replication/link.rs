//! Outbound side of a peer connection, as seen by the engine.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum LinkError {
    #[error("connection closed")]
    Closed,
    #[error("outbound queue full ({0} frames pending)")]
    QueueFull(usize),
    #[error("write failed: {0}")]
    Io(String),
}

/// A live duplex stream to exactly one remote peer.
///
/// `write` must not block: implementations queue the frame and report
/// failure immediately if the connection cannot take it. Inbound data and
/// close signals are delivered by the transport calling
/// [`ReplicationEngine::ingest`](super::ReplicationEngine::ingest) and
/// [`ReplicationEngine::detach`](super::ReplicationEngine::detach).
pub trait PeerLink: Send + Sync {
    /// Identity of the remote peer (hex public key or equivalent).
    fn remote_id(&self) -> &str;

    /// Queue one frame for delivery.
    fn write(&self, frame: &[u8]) -> Result<(), LinkError>;
}
