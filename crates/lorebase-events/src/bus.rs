//! In-process pub/sub fan-out.
//!
//! One broadcast channel per topic, bounded at 256 events per subscriber.
//! Publishers never block; a subscriber that falls behind loses the oldest
//! events and sees how many were dropped, so UI clients can trigger a full
//! refresh instead of trusting a gapped stream.

use tokio::sync::broadcast;
use tracing::trace;

use crate::wire::{Event, Topic};

/// Default per-subscriber buffer.
pub const BUFFER_CAPACITY: usize = 256;

/// What a subscriber pulls off the bus.
#[derive(Debug, Clone, PartialEq)]
pub enum BusMessage {
    Event(Event),
    /// `n` events were dropped for this subscriber since the last recv.
    Lagged(u64),
}

/// Typed pub/sub bus.
pub struct EventBus {
    filesystem: broadcast::Sender<Event>,
    index: broadcast::Sender<Event>,
    sync: broadcast::Sender<Event>,
    connect: broadcast::Sender<Event>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(BUFFER_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (filesystem, _) = broadcast::channel(capacity);
        let (index, _) = broadcast::channel(capacity);
        let (sync, _) = broadcast::channel(capacity);
        let (connect, _) = broadcast::channel(capacity);
        Self {
            filesystem,
            index,
            sync,
            connect,
        }
    }

    fn sender(&self, topic: Topic) -> &broadcast::Sender<Event> {
        match topic {
            Topic::Filesystem => &self.filesystem,
            Topic::Index => &self.index,
            Topic::Sync => &self.sync,
            Topic::Connect => &self.connect,
        }
    }

    /// Publish to the event's topic. Never blocks; an event with no
    /// subscribers is dropped.
    pub fn publish(&self, event: Event) {
        trace!(?event, "publish");
        let _ = self.sender(event.topic()).send(event);
    }

    /// Subscribe to one topic.
    pub fn subscribe(&self, topic: Topic) -> Subscriber {
        Subscriber {
            rx: self.sender(topic).subscribe(),
            dropped: 0,
        }
    }

    /// Subscribe to every topic at once (the WebSocket fan-out path).
    pub fn subscribe_all(&self) -> AllTopics {
        AllTopics {
            subs: [
                self.subscribe(Topic::Filesystem),
                self.subscribe(Topic::Index),
                self.subscribe(Topic::Sync),
                self.subscribe(Topic::Connect),
            ],
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// A single-topic subscription with a bounded buffer.
pub struct Subscriber {
    rx: broadcast::Receiver<Event>,
    dropped: u64,
}

impl Subscriber {
    /// Next message, or `None` when the bus is gone.
    pub async fn recv(&mut self) -> Option<BusMessage> {
        match self.rx.recv().await {
            Ok(event) => Some(BusMessage::Event(event)),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                self.dropped += n;
                Some(BusMessage::Lagged(n))
            }
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }

    /// Non-blocking variant; `None` when empty or closed.
    pub fn try_recv(&mut self) -> Option<BusMessage> {
        match self.rx.try_recv() {
            Ok(event) => Some(BusMessage::Event(event)),
            Err(broadcast::error::TryRecvError::Lagged(n)) => {
                self.dropped += n;
                Some(BusMessage::Lagged(n))
            }
            _ => None,
        }
    }

    /// Total events this subscriber has lost.
    pub fn drop_count(&self) -> u64 {
        self.dropped
    }
}

/// All four topics merged; per-topic ordering preserved, no cross-topic
/// ordering implied.
pub struct AllTopics {
    subs: [Subscriber; 4],
}

impl AllTopics {
    pub async fn recv(&mut self) -> Option<BusMessage> {
        let [a, b, c, d] = &mut self.subs;
        tokio::select! {
            m = a.recv() => m,
            m = b.recv() => m,
            m = c.recv() => m,
            m = d.recv() => m,
        }
    }

    pub fn drop_count(&self) -> u64 {
        self.subs.iter().map(Subscriber::drop_count).sum()
    }
}
