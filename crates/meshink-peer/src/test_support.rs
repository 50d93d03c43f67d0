//! In-memory sink for driving the writer and connection tasks in tests.

use futures_util::Sink;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

/// Accepts up to `accept` frames, then stalls: sends and close never complete.
/// A broken sink fails every send instead.
#[derive(Clone)]
pub(crate) struct GatedSink {
    accept: usize,
    broken: bool,
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl GatedSink {
    pub(crate) fn open() -> Self {
        Self::accepting(usize::MAX)
    }

    pub(crate) fn accepting(accept: usize) -> Self {
        Self {
            accept,
            broken: false,
            sent: Arc::default(),
        }
    }

    pub(crate) fn broken() -> Self {
        Self {
            broken: true,
            ..Self::accepting(0)
        }
    }

    pub(crate) fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().unwrap().clone()
    }

    fn stalled(&self) -> bool {
        self.sent.lock().unwrap().len() >= self.accept
    }
}

impl Sink<Vec<u8>> for GatedSink {
    type Error = io::Error;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), io::Error>> {
        if self.broken {
            Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "socket gone")))
        } else if self.stalled() {
            Poll::Pending
        } else {
            Poll::Ready(Ok(()))
        }
    }

    fn start_send(self: Pin<&mut Self>, frame: Vec<u8>) -> Result<(), io::Error> {
        self.sent.lock().unwrap().push(frame);
        Ok(())
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), io::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), io::Error>> {
        if !self.broken && self.stalled() {
            Poll::Pending
        } else {
            Poll::Ready(Ok(()))
        }
    }
}
