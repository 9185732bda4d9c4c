//! Progress channel between the stage workers and whoever renders them.
//!
//! Stages never block on a missing listener: with no receiver attached,
//! events fall on the floor.

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};

use super::Event;

/// Handle the hash, lookup and action stages report through. Cheap to
/// clone; each worker holds its own.
#[derive(Clone)]
pub struct EventSender {
    inner: Sender<Event>,
}

impl EventSender {
    /// Report an event. A dropped receiver is not an error.
    pub fn send(&self, event: Event) {
        let _ = self.inner.send(event);
    }
}

/// Listening end, usually owned by the CLI's progress thread.
pub struct EventReceiver {
    inner: Receiver<Event>,
}

impl EventReceiver {
    /// `None` once every sender is gone
    pub fn recv(&self) -> Option<Event> {
        self.inner.recv().ok()
    }

    pub fn try_recv(&self) -> Option<Event> {
        self.inner.try_recv().ok()
    }

    /// Ends when the pipeline and every other sender have been dropped
    pub fn iter(&self) -> impl Iterator<Item = Event> + '_ {
        self.inner.iter()
    }

    /// Events already queued, without waiting for more
    pub fn drain(&self) -> Vec<Event> {
        self.inner.try_iter().collect()
    }
}

pub struct EventChannel;

impl EventChannel {
    pub fn new() -> (EventSender, EventReceiver) {
        let (sender, receiver) = unbounded();
        (
            EventSender { inner: sender },
            EventReceiver { inner: receiver },
        )
    }

    /// At most `capacity` undelivered events; past that the reporting
    /// stage waits for the listener.
    pub fn bounded(capacity: usize) -> (EventSender, EventReceiver) {
        let (sender, receiver) = bounded(capacity);
        (
            EventSender { inner: sender },
            EventReceiver { inner: receiver },
        )
    }
}

/// Sender for pipelines built without a listener
pub fn null_sender() -> EventSender {
    let (sender, _receiver) = EventChannel::new();
    sender
}
