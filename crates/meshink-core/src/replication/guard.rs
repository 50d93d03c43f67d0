//! Echo guard: marks the window in which a remote snapshot is being applied.
//!
//! Applying a snapshot makes the canvas raise its local-change event. While
//! the guard is held, the engine drops those notifications instead of
//! broadcasting them back to the mesh.

use futures_util::lock::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicBool, Ordering};

/// `Idle` / `Applying` state machine shared by broadcast and ingress.
#[derive(Debug, Default)]
pub struct EchoGuard {
    applying: AtomicBool,
    // Serializes applies; the flag mirrors whether it is held.
    slot: Mutex<()>,
}

impl EchoGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while a remote snapshot is being applied.
    pub fn is_applying(&self) -> bool {
        self.applying.load(Ordering::Acquire)
    }

    /// Enter `Applying` if currently idle.
    pub fn try_enter(&self) -> Option<ApplyToken<'_>> {
        let slot = self.slot.try_lock()?;
        Some(self.activate(slot))
    }

    /// Enter `Applying`, waiting for any apply in progress to finish first.
    pub async fn enter(&self) -> ApplyToken<'_> {
        let slot = self.slot.lock().await;
        self.activate(slot)
    }

    fn activate<'a>(&'a self, slot: MutexGuard<'a, ()>) -> ApplyToken<'a> {
        self.applying.store(true, Ordering::Release);
        ApplyToken {
            applying: &self.applying,
            _slot: slot,
        }
    }
}

/// Proof that an apply is in progress. Dropping it returns the guard to idle,
/// on success, error and unwind alike.
#[must_use = "the guard returns to idle as soon as the token is dropped"]
pub struct ApplyToken<'a> {
    applying: &'a AtomicBool,
    _slot: MutexGuard<'a, ()>,
}

impl Drop for ApplyToken<'_> {
    fn drop(&mut self) {
        // Cleared before `_slot` is released, so a waiter never sees a stale flag.
        self.applying.store(false, Ordering::Release);
    }
}
