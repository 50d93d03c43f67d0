//! MeshInk Core Library
//!
//! Shape model, canvas document and the runtime-agnostic replication engine
//! that keeps one canvas in step across a mesh of peers.

pub mod canvas;
pub mod replication;
pub mod shapes;
pub mod wire;

pub use canvas::{CanvasDocument, CanvasError, CanvasHost, SharedCanvas, Snapshot};
pub use replication::{
    BroadcastOutcome, ConnectionId, EchoGuard, IngressError, IngressOutcome, LinkError, PeerLink,
    ReplicationEngine, SanitizePolicy,
};
pub use shapes::{Shape, ShapeId, ShapeStyle};
pub use wire::{Message, Topic, WireError};
