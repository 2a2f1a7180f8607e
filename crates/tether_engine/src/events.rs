//! Typed observability events.
//!
//! Events are a closed enum over a broadcast channel. They exist for
//! observability (UI badges, diagnostics), never for correctness: emission is
//! lossy when no subscriber keeps up, and nothing in the engine waits on a
//! subscriber.

use tether_protocol::{ResourceKind, Table};
use tokio::sync::broadcast;

/// Events emitted by the sync engine.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// A queued task finished successfully.
    TaskCompleted {
        /// Task label (usually a table name).
        label: String,
    },
    /// A queued task failed.
    TaskFailed {
        /// Task label.
        label: String,
        /// Failure message.
        message: String,
    },
    /// Both sides modified a hub record since the last sync.
    ConflictDetected {
        /// Affected table.
        table: Table,
        /// Affected record.
        record_id: String,
    },
    /// A concurrent peer modification was persisted for manual resolution.
    PeerConflict {
        /// Affected resource kind.
        resource_type: ResourceKind,
        /// Affected resource.
        resource_id: String,
        /// Id of the persisted conflict record.
        conflict_id: String,
    },
    /// Measured clock offset exceeded the warning threshold.
    ClockSkew {
        /// Measured offset, milliseconds.
        offset_ms: i64,
    },
    /// An incoming record was skipped because required fields were missing.
    RecordSkipped {
        /// Affected table.
        table: Table,
        /// Record id (may be empty if the id itself was missing).
        record_id: String,
        /// Names of the missing fields.
        missing: Vec<String>,
    },
    /// A remote deletion was skipped to protect a never-synced local row.
    DeletionSkipped {
        /// Affected table.
        table: Table,
        /// Protected record.
        record_id: String,
    },
    /// The backend rejected our credentials; the user must re-authenticate.
    ReauthRequired,
    /// An offline-queue item exhausted its retry budget.
    QueueItemFailed {
        /// Queue item id.
        item_id: String,
        /// Attempts made.
        retry_count: u32,
    },
}

/// A cloneable handle for emitting and subscribing to [`SyncEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SyncEvent>,
}

impl EventBus {
    /// Creates a bus that buffers up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribes to future events.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    /// Emits an event. Dropped silently when nobody is listening.
    pub fn emit(&self, event: SyncEvent) {
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
    async fn subscribers_see_events() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.emit(SyncEvent::ReauthRequired);
        bus.emit(SyncEvent::ClockSkew { offset_ms: 400_000 });

        assert!(matches!(rx.recv().await.unwrap(), SyncEvent::ReauthRequired));
        assert!(matches!(
            rx.recv().await.unwrap(),
            SyncEvent::ClockSkew { offset_ms: 400_000 }
        ));
    }

    #[test]
    fn emit_without_subscribers_is_fine() {
        let bus = EventBus::default();
        bus.emit(SyncEvent::ReauthRequired);
    }
}
