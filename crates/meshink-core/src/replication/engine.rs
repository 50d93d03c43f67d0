//! Broadcast of local snapshots and application of remote ones.

use super::guard::EchoGuard;
use super::link::PeerLink;
use super::registry::{ConnectionId, ConnectionRegistry};
use super::sanitize::SanitizePolicy;
use crate::canvas::{CanvasError, CanvasHost, Snapshot};
use crate::shapes::Shape;
use crate::wire::{self, Message, WireError};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngressError {
    #[error("dropped undecodable frame")]
    Decode(#[from] WireError),
    #[error("canvas refused snapshot")]
    Apply(#[from] CanvasError),
}

/// What happened to one inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngressOutcome {
    /// The snapshot replaced local state.
    Applied { shapes: usize, sanitized: usize },
    /// A message kind this peer does not handle.
    Ignored { kind: String },
}

/// What happened to one broadcast request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastOutcome {
    /// A remote snapshot is being applied; nothing was sent.
    Suppressed,
    /// The snapshot could not be serialized; nothing was sent.
    NotEncoded,
    /// Frame handed to every registered link; `failed` links were dropped.
    Sent { delivered: usize, failed: usize },
}

/// Keeps one local canvas in step with every connected peer.
///
/// Local changes go out as whole snapshots to all links. Remote snapshots
/// overwrite the canvas; the most recently applied one wins.
pub struct ReplicationEngine {
    canvas: Arc<dyn CanvasHost>,
    registry: ConnectionRegistry,
    guard: Arc<EchoGuard>,
    policy: SanitizePolicy,
}

impl ReplicationEngine {
    pub fn new(canvas: Arc<dyn CanvasHost>) -> Arc<Self> {
        Self::build(canvas, Arc::new(EchoGuard::new()), SanitizePolicy::default())
    }

    pub fn with_policy(canvas: Arc<dyn CanvasHost>, policy: SanitizePolicy) -> Arc<Self> {
        Self::build(canvas, Arc::new(EchoGuard::new()), policy)
    }

    /// Use a guard shared with other components, e.g. a UI that also
    /// needs to know when a remote apply is in progress.
    pub fn with_guard(canvas: Arc<dyn CanvasHost>, guard: Arc<EchoGuard>) -> Arc<Self> {
        Self::build(canvas, guard, SanitizePolicy::default())
    }

    fn build(canvas: Arc<dyn CanvasHost>, guard: Arc<EchoGuard>, policy: SanitizePolicy) -> Arc<Self> {
        Arc::new(Self {
            canvas,
            registry: ConnectionRegistry::new(),
            guard,
            policy,
        })
    }

    /// Broadcast on every local change the canvas reports.
    ///
    /// The hook holds a weak reference; once the engine is dropped it does nothing.
    pub fn listen_for_local_changes(self: &Arc<Self>) {
        let engine = Arc::downgrade(self);
        self.canvas.on_local_change(Box::new(move || {
            if let Some(engine) = engine.upgrade() {
                engine.broadcast_local_change();
            }
        }));
    }

    pub fn canvas(&self) -> &Arc<dyn CanvasHost> {
        &self.canvas
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn guard(&self) -> &Arc<EchoGuard> {
        &self.guard
    }

    pub fn policy(&self) -> SanitizePolicy {
        self.policy
    }

    /// Register an open connection.
    pub fn attach(&self, link: Arc<dyn PeerLink>) -> ConnectionId {
        let remote = link.remote_id().to_string();
        let id = self.registry.register(link);
        log::info!("peer {} connected as {} ({} open)", remote, id, self.registry.len());
        id
    }

    /// Forget a connection after it closed or errored. Safe to call repeatedly.
    pub fn detach(&self, id: ConnectionId) -> bool {
        let removed = self.registry.unregister(id);
        if removed {
            log::info!("{} disconnected ({} open)", id, self.registry.len());
        }
        removed
    }

    /// Serialize the canvas and broadcast it, unless a remote apply is in progress.
    pub fn broadcast_local_change(&self) -> BroadcastOutcome {
        if self.guard.is_applying() {
            log::debug!("local change raised by remote apply, not rebroadcasting");
            return BroadcastOutcome::Suppressed;
        }
        self.broadcast(&self.canvas.serialize_state())
    }

    /// Send `snapshot` to every registered connection.
    pub fn broadcast(&self, snapshot: &Snapshot) -> BroadcastOutcome {
        if self.guard.is_applying() {
            log::debug!("broadcast suppressed while applying a remote snapshot");
            return BroadcastOutcome::Suppressed;
        }

        let frame = match wire::encode_snapshot(snapshot) {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("not broadcasting snapshot: {}", e);
                return BroadcastOutcome::NotEncoded;
            }
        };

        let mut delivered = 0;
        let mut failed = 0;
        for (id, link) in self.registry.all() {
            match link.write(&frame) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    log::warn!("dropping {} ({}): {}", id, link.remote_id(), e);
                    self.detach(id);
                    failed += 1;
                }
            }
        }
        log::debug!(
            "broadcast {} shapes ({} bytes) to {} peers, {} failed",
            snapshot.len(),
            frame.len(),
            delivered,
            failed
        );
        BroadcastOutcome::Sent { delivered, failed }
    }

    /// Handle one inbound frame from connection `from`.
    ///
    /// The transport must await this before feeding the next frame from the
    /// same connection. Errors are per-frame; the connection stays open.
    pub async fn ingest(&self, from: ConnectionId, frame: &[u8]) -> Result<IngressOutcome, IngressError> {
        let snapshot = match wire::decode(frame) {
            Ok(Message::CanvasState(snapshot)) => snapshot,
            Ok(Message::Unknown { kind }) => {
                log::debug!("ignoring {:?} message from {}", kind, from);
                return Ok(IngressOutcome::Ignored { kind });
            }
            Err(e) => {
                log::warn!("malformed frame from {} ({} bytes): {}", from, frame.len(), e);
                return Err(e.into());
            }
        };
        let shapes = snapshot.len();

        // Held until the load has completed and the sanitize pass has run,
        // since both raise local-change events of their own.
        let token = self.guard.enter().await;
        let applied = self.canvas.load_state(snapshot).await;
        let result = match applied {
            Ok(()) => {
                let policy = self.policy;
                let sanitized = self.canvas.for_each_shape_mut(&mut |shape: &mut Shape| policy.apply(shape));
                if sanitized > 0 {
                    log::debug!("sanitized {} shapes from {}", sanitized, from);
                }
                Ok(IngressOutcome::Applied { shapes, sanitized })
            }
            Err(e) => {
                log::warn!("snapshot from {} not applied: {}", from, e);
                Err(e.into())
            }
        };
        drop(token);
        result
    }
}
