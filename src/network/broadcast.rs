//! Frame Fan-out
//!
//! The session never addresses a single observer with steady-state frames;
//! it hands each frame to a [`Broadcaster`], which forwards the bytes
//! verbatim to everyone listening.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::debug;

/// Default number of frames a slow observer may fall behind.
pub const DEFAULT_BROADCAST_CAPACITY: usize = 256;

/// Forwards outbound frames to every connected observer.
pub trait Broadcaster: Send + Sync {
    /// Forward a frame. Must not block.
    fn broadcast(&self, frame: &[u8]);
}

impl<F> Broadcaster for F
where
    F: Fn(&[u8]) + Send + Sync,
{
    fn broadcast(&self, frame: &[u8]) {
        self(frame)
    }
}

/// Broadcaster backed by a Tokio broadcast channel. Each transport task
/// subscribes and writes what it receives to its socket.
#[derive(Debug, Clone)]
pub struct ChannelBroadcaster {
    tx: broadcast::Sender<Arc<[u8]>>,
}

impl ChannelBroadcaster {
    /// Create with a per-observer backlog.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Attach a new observer.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<[u8]>> {
        self.tx.subscribe()
    }

    /// Number of attached observers.
    pub fn observer_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ChannelBroadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_BROADCAST_CAPACITY)
    }
}

impl Broadcaster for ChannelBroadcaster {
    fn broadcast(&self, frame: &[u8]) {
        if self.tx.send(Arc::from(frame)).is_err() {
            debug!("No observers, dropping {} byte frame", frame.len());
        }
    }
}
