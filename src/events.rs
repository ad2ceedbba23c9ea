//! Lifecycle event notification.
//!
//! Components announce state changes through an injected [`Notifier`].
//! Events carry no payload: observers re-fetch whatever they display.
//! Broadcasting is fire-and-forget and must never block or fail the caller.

use std::fmt;

use tokio::sync::broadcast;

/// Events announced by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    /// Playlist or track state changed
    PlaylistsUpdated,
    /// A history entry was written
    DownloadHistoryUpdated,
}

impl Event {
    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            Event::PlaylistsUpdated => "playlists-updated",
            Event::DownloadHistoryUpdated => "download-history-updated",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Best-effort event sink.
pub trait Notifier: Send + Sync {
    fn broadcast(&self, event: Event);
}

/// Default channel capacity for [`BroadcastNotifier`].
const CHANNEL_CAPACITY: usize = 256;

/// In-process notifier backed by a `tokio` broadcast channel.
///
/// Transports (websocket, SSE, desktop IPC) subscribe and forward events.
/// Slow subscribers lag and lose old events rather than blocking senders.
#[derive(Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<Event>,
}

impl BroadcastNotifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier for BroadcastNotifier {
    fn broadcast(&self, event: Event) {
        // No receivers is fine
        let _ = self.tx.send(event);
        tracing::trace!(target: "events", event = event.name(), "Broadcast");
    }
}

/// Notifier that drops everything. Used by one-shot CLI commands.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn broadcast(&self, _event: Event) {}
}

/// Notifier that records events for assertions.
#[cfg(test)]
#[derive(Default)]
pub struct RecordingNotifier {
    events: parking_lot::Mutex<Vec<Event>>,
}

#[cfg(test)]
impl RecordingNotifier {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn count(&self, event: Event) -> usize {
        self.events.lock().iter().filter(|e| **e == event).count()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

#[cfg(test)]
impl Notifier for RecordingNotifier {
    fn broadcast(&self, event: Event) {
        self.events.lock().push(event);
    }
}
