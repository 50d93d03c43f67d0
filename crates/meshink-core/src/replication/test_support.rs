//! In-memory link used by the engine tests.

use super::link::{LinkError, PeerLink};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Records every frame written to it; can be switched to fail.
pub(crate) struct RecordingLink {
    remote: String,
    frames: Mutex<Vec<Vec<u8>>>,
    failing: AtomicBool,
}

impl RecordingLink {
    pub(crate) fn new(remote: &str) -> Arc<Self> {
        Arc::new(Self {
            remote: remote.to_string(),
            frames: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
        })
    }

    pub(crate) fn fail_writes(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub(crate) fn frames(&self) -> Vec<Vec<u8>> {
        self.frames.lock().unwrap().clone()
    }

    pub(crate) fn take_frames(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut *self.frames.lock().unwrap())
    }
}

impl PeerLink for RecordingLink {
    fn remote_id(&self) -> &str {
        &self.remote
    }

    fn write(&self, frame: &[u8]) -> Result<(), LinkError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(LinkError::Closed);
        }
        self.frames.lock().unwrap().push(frame.to_vec());
        Ok(())
    }
}
