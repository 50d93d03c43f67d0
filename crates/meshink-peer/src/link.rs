//! Queue-backed [`PeerLink`] with a dedicated writer task per connection.

use futures_util::{Sink, SinkExt};
use meshink_core::{ConnectionId, LinkError, PeerLink, ReplicationEngine};
use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::timeout;
use tracing::{debug, warn};

/// Outbound half of a connection as seen by the engine.
///
/// `write` only enqueues. A full queue means the remote is not keeping up,
/// and the frame is refused so the engine drops the connection.
pub struct ChannelLink {
    remote: String,
    capacity: usize,
    tx: mpsc::Sender<Vec<u8>>,
}

impl ChannelLink {
    pub fn new(remote: impl Into<String>, capacity: usize) -> (Self, mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel(capacity);
        let link = Self {
            remote: remote.into(),
            capacity,
            tx,
        };
        (link, rx)
    }
}

impl PeerLink for ChannelLink {
    fn remote_id(&self) -> &str {
        &self.remote
    }

    fn write(&self, frame: &[u8]) -> Result<(), LinkError> {
        self.tx.try_send(frame.to_vec()).map_err(|e| match e {
            TrySendError::Full(_) => LinkError::QueueFull(self.capacity),
            TrySendError::Closed(_) => LinkError::Closed,
        })
    }
}

/// Drain queued frames into `sink` until the queue closes or a send fails.
///
/// On failure the connection is detached; dropping `rx` makes every later
/// `write` on the link fail. Closing the sink is bounded by `write_timeout`
/// too, so the task always ends once the link is gone.
pub async fn run_writer<S>(
    engine: Arc<ReplicationEngine>,
    id: ConnectionId,
    mut rx: mpsc::Receiver<Vec<u8>>,
    mut sink: S,
    write_timeout: Duration,
) where
    S: Sink<Vec<u8>> + Unpin,
    S::Error: StdError + Send + Sync + 'static,
{
    while let Some(frame) = rx.recv().await {
        match timeout(write_timeout, sink.send(frame)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!("write to {} failed: {:#}", id, anyhow::Error::new(e));
                break;
            }
            Err(_) => {
                warn!("write to {} timed out after {:?}", id, write_timeout);
                break;
            }
        }
    }
    rx.close();
    engine.detach(id);
    match timeout(write_timeout, sink.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!("closing {} failed: {:#}", id, anyhow::Error::new(e)),
        Err(_) => debug!("closing {} timed out", id),
    }
    debug!("writer for {} finished", id);
}
