/// Lifecycle and progress notifications.
///
/// The bus is constructed at application start and handed to whoever needs
/// it; there is no global emitter. Subscribing returns a receiver;
/// unsubscribing is dropping it. Slow subscribers lag and lose the oldest
/// events rather than blocking the pipeline.
use tokio::sync::broadcast;

/// Phases a file passes through while being indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexPhase {
    Scanning,
    Chunking,
    Extracting,
    Embedding,
    Storing,
    Complete,
    Error,
}

impl IndexPhase {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexPhase::Scanning => "scanning",
            IndexPhase::Chunking => "chunking",
            IndexPhase::Extracting => "extracting",
            IndexPhase::Embedding => "embedding",
            IndexPhase::Storing => "storing",
            IndexPhase::Complete => "complete",
            IndexPhase::Error => "error",
        }
    }
}

#[derive(Debug, Clone)]
pub enum IndexEvent {
    SymbolAdded {
        id: String,
        name: String,
    },
    SymbolsRemoved {
        path: String,
        count: usize,
    },
    BatchAdded {
        count: usize,
    },
    Phase {
        path: String,
        phase: IndexPhase,
    },
}

/// Broadcast bus for [`IndexEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<IndexEvent>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to events. Dropping the receiver unsubscribes.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<IndexEvent> {
        self.tx.subscribe()
    }

    /// Emit an event. With no live subscribers this is a no-op.
    pub fn emit(&self, event: IndexEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscriber_receives_events() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.emit(IndexEvent::Phase {
            path: "/a.ts".to_string(),
            phase: IndexPhase::Chunking,
        });

        match rx.recv().await.unwrap() {
            IndexEvent::Phase { path, phase } => {
                assert_eq!(path, "/a.ts");
                assert_eq!(phase, IndexPhase::Chunking);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_emit_without_subscribers_is_noop() {
        let bus = EventBus::new(16);
        bus.emit(IndexEvent::BatchAdded { count: 3 });
    }

    #[tokio::test]
    async fn test_dropped_receiver_unsubscribes() {
        let bus = EventBus::new(16);
        let rx = bus.subscribe();
        drop(rx);
        bus.emit(IndexEvent::BatchAdded { count: 1 });

        let mut rx2 = bus.subscribe();
        bus.emit(IndexEvent::BatchAdded { count: 2 });
        match rx2.recv().await.unwrap() {
            IndexEvent::BatchAdded { count } => assert_eq!(count, 2),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
