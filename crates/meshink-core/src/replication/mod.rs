//! Peer-to-peer replication of canvas snapshots.
//!
//! Every local change is sent to all connected peers as a whole snapshot;
//! every snapshot received replaces the local canvas. The [`EchoGuard`]
//! keeps the apply of a remote snapshot from being broadcast back out.

pub mod engine;
pub mod guard;
pub mod link;
pub mod registry;
pub mod sanitize;

#[cfg(test)]
pub(crate) mod test_support;

pub use engine::{BroadcastOutcome, IngressError, IngressOutcome, ReplicationEngine};
pub use guard::{ApplyToken, EchoGuard};
pub use link::{LinkError, PeerLink};
pub use registry::{ConnectionId, ConnectionRegistry};
pub use sanitize::SanitizePolicy;
