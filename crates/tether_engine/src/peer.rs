//! Peer-to-peer synchronization with vector-clock conflict detection.
//!
//! Every local mutation ticks this device's entry in the resource's vector
//! clock and marks the resource pending. A sync pass broadcasts pending
//! changes to the organization and drains the durable offline queue left by
//! earlier transport failures. Incoming changes are ordered against the local
//! clock: strictly-ahead remote changes apply, echoes are ignored, and
//! concurrent changes go through the configured resolution strategy.
//!
//! There is no distributed lock anywhere in this path; conflict resolution
//! is the concurrency control.

use crate::clock::ServerClock;
use crate::config::PeerConfig;
use crate::error::{SyncError, SyncResult};
use crate::events::{EventBus, SyncEvent};
use crate::peers::{IdentityProvider, PeerTransport};
use std::sync::Arc;
use tether_protocol::{
    ChangeAction, ChangeMessage, ClockOrdering, ConflictChoice, ResolutionStrategy, ResourceKind,
    SyncStatus,
};
use tether_store::{
    ConflictRecord, ConflictStore, OfflineQueueStore, QueueItem, QueueItemStatus, ResourceStore,
    SyncState, SyncStateStore,
};
use tokio::task::JoinHandle;

/// What a `Synced` status means on the peer path.
///
/// A resource is marked synced once its change was handed to the transport.
/// No peer acknowledgement is collected; a peer that was offline converges
/// later through its own sync passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryGuarantee {
    /// Transmitted to the transport, not acknowledged by any peer.
    TransmittedNotAcked,
}

/// How one incoming change was handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The remote change was strictly ahead and was applied.
    Applied,
    /// The change was an echo or stale; nothing happened.
    Ignored,
    /// Concurrent under a manual strategy; a conflict record with this id
    /// now awaits resolution.
    ConflictRecorded(String),
    /// Concurrent under LWW; the local version won and stays pending.
    LwwLocalWins,
    /// Concurrent under LWW; the remote version won and was applied.
    LwwRemoteWins,
}

/// Result of one sync pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerSyncOutcome {
    /// True when the pass was skipped because another was running.
    pub skipped: bool,
    /// Pending resources broadcast this pass.
    pub pushed: usize,
    /// Queue items completed this pass.
    pub drained: usize,
    /// Broadcasts and queue items that failed this pass.
    pub failed: usize,
}

impl PeerSyncOutcome {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

/// Counts describing an organization's sync health.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerSyncStats {
    /// Tracked resources.
    pub total: usize,
    /// Resources awaiting push.
    pub pending: usize,
    /// Resources in sync.
    pub synced: usize,
    /// Resources blocked on conflict resolution.
    pub conflicts: usize,
    /// Non-terminal offline-queue items.
    pub queue_depth: usize,
}

/// Synchronizes one device with its organization peers.
pub struct PeerSyncEngine<S, P, I> {
    config: PeerConfig,
    store: Arc<S>,
    transport: Arc<P>,
    identity: Arc<I>,
    events: EventBus,
    guard: Arc<tokio::sync::Mutex<()>>,
    timers: parking_lot::Mutex<Vec<JoinHandle<()>>>,
}

impl<S, P, I> PeerSyncEngine<S, P, I>
where
    S: SyncStateStore + ConflictStore + OfflineQueueStore + ResourceStore + 'static,
    P: PeerTransport + 'static,
    I: IdentityProvider + 'static,
{
    /// The delivery contract of the peer path.
    pub const DELIVERY: DeliveryGuarantee = DeliveryGuarantee::TransmittedNotAcked;

    /// Creates an engine over a store, transport, and identity.
    pub fn new(config: PeerConfig, store: Arc<S>, transport: Arc<P>, identity: Arc<I>) -> Self {
        Self {
            config,
            store,
            transport,
            identity,
            events: EventBus::default(),
            guard: Arc::new(tokio::sync::Mutex::new(())),
            timers: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// The engine's event bus.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// True while a sync pass or queue drain holds the engine.
    pub fn is_syncing(&self) -> bool {
        self.guard.try_lock().is_err()
    }

    /// Registers a local mutation: bumps the resource's version and clock,
    /// stores the payload, and marks it pending for the next push.
    pub async fn record_local_change(
        &self,
        org_id: &str,
        resource_type: ResourceKind,
        resource_id: &str,
        action: ChangeAction,
        data: serde_json::Value,
    ) -> SyncResult<()> {
        let did = self.identity.default_did()?;
        let mut state = self
            .store
            .get_state(org_id, resource_type, resource_id)
            .await?
            .unwrap_or_else(|| SyncState::new(org_id, resource_type, resource_id));
        state.record_local_change(&did);

        match action {
            ChangeAction::Delete => {
                self.store
                    .delete_resource(org_id, resource_type, resource_id)
                    .await?;
            }
            ChangeAction::Create | ChangeAction::Update => {
                self.store
                    .put_resource(org_id, resource_type, resource_id, data)
                    .await?;
            }
        }
        self.store.put_state(state).await?;
        Ok(())
    }

    /// Broadcasts every pending resource. Failures enqueue the change into
    /// the durable offline queue and leave the resource pending.
    pub async fn push_pending(&self, org_id: &str) -> SyncResult<(usize, usize)> {
        let did = self.identity.default_did()?;
        let pending = self
            .store
            .states_by_status(org_id, SyncStatus::Pending)
            .await?;

        let mut pushed = 0;
        let mut failed = 0;
        for mut state in pending {
            let now = ServerClock::now_ms();
            let data = self
                .store
                .get_resource(org_id, state.resource_type, &state.resource_id)
                .await?;
            let (action, payload) = match data {
                Some(value) => (ChangeAction::Update, value),
                None => (ChangeAction::Delete, serde_json::json!({})),
            };
            let message = ChangeMessage::new(
                org_id,
                state.resource_type,
                state.resource_id.clone(),
                action,
                payload.clone(),
                state.local_version,
                state.vector_clock.clone(),
                did.clone(),
                now,
            );

            match self.transport.broadcast_to_org(org_id, &message).await {
                Ok(()) => {
                    // Transmitted, not acknowledged (Self::DELIVERY).
                    state.mark_synced(now);
                    self.store.put_state(state).await?;
                    pushed += 1;
                }
                Err(err) => {
                    tracing::debug!(
                        resource_id = %state.resource_id,
                        error = %err,
                        "broadcast failed, queueing change"
                    );
                    let item = QueueItem::new(
                        org_id,
                        action,
                        state.resource_type,
                        state.resource_id.clone(),
                        payload,
                        state.local_version,
                        now,
                    );
                    self.store.enqueue_item(item).await?;
                    failed += 1;
                }
            }
        }
        Ok((pushed, failed))
    }

    /// Handles a change received from a peer.
    pub async fn apply_remote_change(&self, message: &ChangeMessage) -> SyncResult<ApplyOutcome> {
        if !message.verify_signature() {
            return Err(SyncError::Validation {
                reason: "change message failed signature verification".into(),
                missing: Vec::new(),
            });
        }

        let mut state = self
            .store
            .get_state(&message.org_id, message.resource_type, &message.resource_id)
            .await?
            .unwrap_or_else(|| {
                SyncState::new(
                    message.org_id.clone(),
                    message.resource_type,
                    message.resource_id.clone(),
                )
            });

        match state.vector_clock.compare(&message.vector_clock) {
            ClockOrdering::Equal | ClockOrdering::LocalAhead => Ok(ApplyOutcome::Ignored),
            ClockOrdering::RemoteAhead => {
                self.apply_remote_data(message, &mut state).await?;
                Ok(ApplyOutcome::Applied)
            }
            ClockOrdering::Concurrent => self.resolve_concurrent(message, state).await,
        }
    }

    async fn resolve_concurrent(
        &self,
        message: &ChangeMessage,
        mut state: SyncState,
    ) -> SyncResult<ApplyOutcome> {
        let now = ServerClock::now_ms();
        match self.config.strategy_for(message.resource_type) {
            ResolutionStrategy::Manual => {
                let local_data = self
                    .store
                    .get_resource(&message.org_id, message.resource_type, &message.resource_id)
                    .await?
                    .unwrap_or(serde_json::Value::Null);
                let conflict = ConflictRecord::new(
                    message.org_id.clone(),
                    message.resource_type,
                    message.resource_id.clone(),
                    state.local_version,
                    message.version,
                    local_data,
                    message.data.clone(),
                    state.vector_clock.clone(),
                    message.vector_clock.clone(),
                    ResolutionStrategy::Manual,
                    now,
                );
                let conflict_id = conflict.id.clone();
                self.store.insert_conflict(conflict).await?;

                state.sync_status = SyncStatus::Conflict;
                self.store.put_state(state).await?;

                self.events.emit(SyncEvent::PeerConflict {
                    resource_type: message.resource_type,
                    resource_id: message.resource_id.clone(),
                    conflict_id: conflict_id.clone(),
                });
                Ok(ApplyOutcome::ConflictRecorded(conflict_id))
            }
            ResolutionStrategy::Lww => {
                // Strictly newer than our last sync point wins; ties keep
                // the local version.
                if message.timestamp > state.last_synced_at.unwrap_or(0) {
                    self.apply_remote_data(message, &mut state).await?;
                    Ok(ApplyOutcome::LwwRemoteWins)
                } else {
                    // Absorb the remote history so this exact change is not
                    // re-detected; the local payload stays and re-pushes.
                    state.vector_clock.merge(&message.vector_clock);
                    state.remote_version = state.remote_version.max(message.version);
                    state.sync_status = SyncStatus::Pending;
                    self.store.put_state(state).await?;
                    Ok(ApplyOutcome::LwwLocalWins)
                }
            }
        }
    }

    /// Applies a remote payload and advances the state's causal history.
    async fn apply_remote_data(
        &self,
        message: &ChangeMessage,
        state: &mut SyncState,
    ) -> SyncResult<()> {
        match message.action {
            ChangeAction::Delete => {
                self.store
                    .delete_resource(&message.org_id, message.resource_type, &message.resource_id)
                    .await?;
            }
            ChangeAction::Create | ChangeAction::Update => {
                self.store
                    .put_resource(
                        &message.org_id,
                        message.resource_type,
                        &message.resource_id,
                        message.data.clone(),
                    )
                    .await?;
            }
        }
        state.record_remote_change(
            message.version,
            &message.vector_clock,
            ServerClock::now_ms(),
        );
        self.store.put_state(state.clone()).await?;
        Ok(())
    }

    /// Resolves a recorded conflict. Idempotent: resolving an already
    /// resolved conflict does nothing.
    pub async fn resolve_conflict(
        &self,
        conflict_id: &str,
        choice: ConflictChoice,
        resolver_did: &str,
    ) -> SyncResult<()> {
        let mut conflict = self
            .store
            .get_conflict(conflict_id)
            .await?
            .ok_or_else(|| SyncError::NotFound(format!("conflict {conflict_id}")))?;
        if conflict.resolved {
            return Ok(());
        }

        let now = ServerClock::now_ms();
        let mut state = self
            .store
            .get_state(&conflict.org_id, conflict.resource_type, &conflict.resource_id)
            .await?
            .unwrap_or_else(|| {
                SyncState::new(
                    conflict.org_id.clone(),
                    conflict.resource_type,
                    conflict.resource_id.clone(),
                )
            });

        match choice {
            ConflictChoice::KeepLocal => {
                // The kept local version becomes a fresh change so peers
                // receive it on the next push.
                state.record_local_change(resolver_did);
            }
            ConflictChoice::AcceptRemote => {
                self.store
                    .put_resource(
                        &conflict.org_id,
                        conflict.resource_type,
                        &conflict.resource_id,
                        conflict.remote_data.clone(),
                    )
                    .await?;
                state.record_remote_change(
                    conflict.remote_version,
                    &conflict.remote_vector_clock,
                    now,
                );
            }
        }

        conflict.mark_resolved(choice, resolver_did, now);
        self.store.update_conflict(conflict).await?;
        self.store.put_state(state).await?;
        Ok(())
    }

    /// Appends a change to the durable offline queue. Returns the item id.
    pub async fn add_to_queue(
        &self,
        org_id: &str,
        action: ChangeAction,
        resource_type: ResourceKind,
        resource_id: &str,
        data: serde_json::Value,
        version: u64,
    ) -> SyncResult<String> {
        let item = QueueItem::new(
            org_id,
            action,
            resource_type,
            resource_id,
            data,
            version,
            ServerClock::now_ms(),
        );
        let id = item.id.clone();
        self.store.enqueue_item(item).await?;
        Ok(id)
    }

    /// Retries every pending queue item once. Items that exhaust their
    /// retry budget become terminally failed and raise
    /// [`SyncEvent::QueueItemFailed`].
    pub async fn drain_queue(&self, org_id: &str) -> SyncResult<(usize, usize)> {
        let did = self.identity.default_did()?;
        let items = self.store.pending_queue_items(org_id).await?;

        let mut completed = 0;
        let mut failed = 0;
        for mut item in items {
            item.status = QueueItemStatus::Processing;
            self.store.update_queue_item(item.clone()).await?;

            let clock = self
                .store
                .get_state(org_id, item.resource_type, &item.resource_id)
                .await?
                .map(|s| s.vector_clock)
                .unwrap_or_default();
            let now = ServerClock::now_ms();
            let message = ChangeMessage::new(
                org_id,
                item.resource_type,
                item.resource_id.clone(),
                item.action,
                item.data.clone(),
                item.version,
                clock,
                did.clone(),
                now,
            );

            match self.transport.broadcast_to_org(org_id, &message).await {
                Ok(()) => {
                    item.status = QueueItemStatus::Completed;
                    self.store.update_queue_item(item.clone()).await?;
                    if let Some(mut state) = self
                        .store
                        .get_state(org_id, item.resource_type, &item.resource_id)
                        .await?
                    {
                        state.mark_synced(now);
                        self.store.put_state(state).await?;
                    }
                    completed += 1;
                }
                Err(err) => {
                    item.record_failure(self.config.max_retry_count, now);
                    let terminal = item.status == QueueItemStatus::Failed;
                    if terminal {
                        self.events.emit(SyncEvent::QueueItemFailed {
                            item_id: item.id.clone(),
                            retry_count: item.retry_count,
                        });
                    }
                    tracing::debug!(
                        item_id = %item.id,
                        retry_count = item.retry_count,
                        terminal,
                        error = %err,
                        "queue item transmission failed"
                    );
                    self.store.update_queue_item(item).await?;
                    failed += 1;
                }
            }
        }
        Ok((completed, failed))
    }

    /// One full sync pass: push pending resources, then drain the queue.
    /// Skipped (not queued) when another pass is already running.
    pub async fn sync(&self, org_id: &str) -> SyncResult<PeerSyncOutcome> {
        let Ok(_guard) = self.guard.try_lock() else {
            return Ok(PeerSyncOutcome::skipped());
        };

        let (pushed, push_failed) = self.push_pending(org_id).await?;
        let (drained, drain_failed) = self.drain_queue(org_id).await?;
        Ok(PeerSyncOutcome {
            skipped: false,
            pushed,
            drained,
            failed: push_failed + drain_failed,
        })
    }

    /// Starts the periodic sync and queue-drain timers. The timers share
    /// the engine's guard, so they never overlap a manual [`sync`](Self::sync).
    pub fn start_auto_sync(self: &Arc<Self>, org_id: &str) {
        let mut timers = self.timers.lock();
        if !timers.is_empty() {
            return;
        }

        let engine = Arc::clone(self);
        let org = org_id.to_string();
        timers.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(engine.config.sync_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if let Err(err) = engine.sync(&org).await {
                    tracing::warn!(org_id = %org, error = %err, "periodic sync failed");
                }
            }
        }));

        let engine = Arc::clone(self);
        let org = org_id.to_string();
        timers.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(engine.config.queue_drain_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let Ok(_guard) = engine.guard.try_lock() else {
                    continue;
                };
                if let Err(err) = engine.drain_queue(&org).await {
                    tracing::warn!(org_id = %org, error = %err, "queue drain failed");
                }
            }
        }));
    }

    /// Stops the periodic timers. In-flight passes finish on their own.
    pub fn stop_auto_sync(&self) {
        for handle in self.timers.lock().drain(..) {
            handle.abort();
        }
    }

    /// Counts describing the organization's sync health.
    pub async fn sync_stats(&self, org_id: &str) -> SyncResult<PeerSyncStats> {
        let states = self.store.all_states(org_id).await?;
        let mut stats = PeerSyncStats {
            total: states.len(),
            queue_depth: self.store.queue_depth(org_id).await?,
            ..PeerSyncStats::default()
        };
        for state in states {
            match state.sync_status {
                SyncStatus::Pending => stats.pending += 1,
                SyncStatus::Synced => stats.synced += 1,
                SyncStatus::Conflict => stats.conflicts += 1,
                SyncStatus::Error => {}
            }
        }
        Ok(stats)
    }
}

impl<S, P, I> Drop for PeerSyncEngine<S, P, I> {
    fn drop(&mut self) {
        for handle in self.timers.lock().drain(..) {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peers::{MockPeerTransport, StaticIdentity};
    use serde_json::json;
    use tether_protocol::VectorClock;
    use tether_store::MemoryStore;

    type Engine = PeerSyncEngine<MemoryStore, MockPeerTransport, StaticIdentity>;

    fn engine(did: &str) -> (Arc<Engine>, Arc<MemoryStore>, Arc<MockPeerTransport>) {
        let store = Arc::new(MemoryStore::new());
        let transport = Arc::new(MockPeerTransport::new());
        let engine = Arc::new(PeerSyncEngine::new(
            PeerConfig::new().with_max_retry_count(2),
            Arc::clone(&store),
            Arc::clone(&transport),
            Arc::new(StaticIdentity::new(did)),
        ));
        (engine, store, transport)
    }

    fn remote_message(
        org: &str,
        kind: ResourceKind,
        id: &str,
        data: serde_json::Value,
        clock: VectorClock,
        timestamp: i64,
    ) -> ChangeMessage {
        ChangeMessage::new(
            org,
            kind,
            id,
            ChangeAction::Update,
            data,
            1,
            clock,
            "did:peer:remote",
            timestamp,
        )
    }

    #[tokio::test]
    async fn local_change_then_push_marks_synced() {
        let (engine, store, transport) = engine("did:peer:a");
        engine
            .record_local_change(
                "org-1",
                ResourceKind::Member,
                "m-1",
                ChangeAction::Create,
                json!({"name": "ada"}),
            )
            .await
            .unwrap();

        let (pushed, failed) = engine.push_pending("org-1").await.unwrap();
        assert_eq!((pushed, failed), (1, 0));
        assert_eq!(transport.broadcasts().len(), 1);

        let state = store
            .get_state("org-1", ResourceKind::Member, "m-1")
            .await
            .unwrap()
            .unwrap();
        // Synced means transmitted, nothing more.
        assert_eq!(state.sync_status, SyncStatus::Synced);
        assert_eq!(state.vector_clock.get("did:peer:a"), 1);
    }

    #[tokio::test]
    async fn strictly_ahead_remote_change_applies() {
        let (engine, store, _) = engine("did:peer:a");

        let mut clock = VectorClock::new();
        clock.increment("did:peer:remote");
        let message = remote_message(
            "org-1",
            ResourceKind::Member,
            "m-1",
            json!({"name": "remote"}),
            clock,
            1_000,
        );

        let outcome = engine.apply_remote_change(&message).await.unwrap();
        assert_eq!(outcome, ApplyOutcome::Applied);

        let data = store
            .get_resource("org-1", ResourceKind::Member, "m-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(data, json!({"name": "remote"}));

        // The same message again is an echo.
        let outcome = engine.apply_remote_change(&message).await.unwrap();
        assert_eq!(outcome, ApplyOutcome::Ignored);
    }

    #[tokio::test]
    async fn tampered_message_is_rejected() {
        let (engine, _, _) = engine("did:peer:a");
        let mut message = remote_message(
            "org-1",
            ResourceKind::Member,
            "m-1",
            json!({"name": "x"}),
            VectorClock::new(),
            1_000,
        );
        message.data = json!({"name": "tampered"});

        let result = engine.apply_remote_change(&message).await;
        assert!(matches!(result, Err(SyncError::Validation { .. })));
    }

    #[tokio::test]
    async fn concurrent_manual_strategy_records_conflict() {
        let (engine, store, _) = engine("did:peer:a");
        let mut events = engine.events().subscribe();

        // Knowledge resolves manually. Make a local change first.
        engine
            .record_local_change(
                "org-1",
                ResourceKind::Knowledge,
                "k-1",
                ChangeAction::Update,
                json!({"title": "local"}),
            )
            .await
            .unwrap();

        // Remote clock saw neither side's change: concurrent.
        let mut clock = VectorClock::new();
        clock.increment("did:peer:remote");
        let message = remote_message(
            "org-1",
            ResourceKind::Knowledge,
            "k-1",
            json!({"title": "remote"}),
            clock,
            1_000,
        );

        let outcome = engine.apply_remote_change(&message).await.unwrap();
        let conflict_id = match outcome {
            ApplyOutcome::ConflictRecorded(id) => id,
            other => panic!("expected conflict, got {other:?}"),
        };

        let conflict = store.get_conflict(&conflict_id).await.unwrap().unwrap();
        assert!(!conflict.resolved);
        assert_eq!(conflict.local_data, json!({"title": "local"}));
        assert_eq!(conflict.remote_data, json!({"title": "remote"}));

        let state = store
            .get_state("org-1", ResourceKind::Knowledge, "k-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(state.sync_status, SyncStatus::Conflict);
        // Local data untouched.
        let data = store
            .get_resource("org-1", ResourceKind::Knowledge, "k-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(data, json!({"title": "local"}));

        assert!(matches!(
            events.recv().await.unwrap(),
            SyncEvent::PeerConflict { .. }
        ));
    }

    #[tokio::test]
    async fn resolving_keep_local_requeues_the_local_version() {
        let (engine, store, transport) = engine("did:peer:a");
        engine
            .record_local_change(
                "org-1",
                ResourceKind::Knowledge,
                "k-1",
                ChangeAction::Update,
                json!({"title": "local"}),
            )
            .await
            .unwrap();
        let mut clock = VectorClock::new();
        clock.increment("did:peer:remote");
        let message = remote_message(
            "org-1",
            ResourceKind::Knowledge,
            "k-1",
            json!({"title": "remote"}),
            clock,
            1_000,
        );
        let ApplyOutcome::ConflictRecorded(conflict_id) =
            engine.apply_remote_change(&message).await.unwrap()
        else {
            panic!("expected conflict");
        };

        engine
            .resolve_conflict(&conflict_id, ConflictChoice::KeepLocal, "did:peer:a")
            .await
            .unwrap();

        let conflict = store.get_conflict(&conflict_id).await.unwrap().unwrap();
        assert!(conflict.resolved);
        assert_eq!(conflict.resolution, Some(ConflictChoice::KeepLocal));

        // The kept version pushes on the next pass.
        let (pushed, _) = engine.push_pending("org-1").await.unwrap();
        assert_eq!(pushed, 1);
        assert_eq!(
            transport.broadcasts()[0].1.data,
            json!({"title": "local"})
        );

        // Second resolution is a no-op.
        engine
            .resolve_conflict(&conflict_id, ConflictChoice::AcceptRemote, "did:peer:b")
            .await
            .unwrap();
        let conflict = store.get_conflict(&conflict_id).await.unwrap().unwrap();
        assert_eq!(conflict.resolution, Some(ConflictChoice::KeepLocal));
    }

    #[tokio::test]
    async fn resolving_accept_remote_applies_the_snapshot() {
        let (engine, store, _) = engine("did:peer:a");
        engine
            .record_local_change(
                "org-1",
                ResourceKind::Knowledge,
                "k-1",
                ChangeAction::Update,
                json!({"title": "local"}),
            )
            .await
            .unwrap();
        let mut clock = VectorClock::new();
        clock.increment("did:peer:remote");
        let message = remote_message(
            "org-1",
            ResourceKind::Knowledge,
            "k-1",
            json!({"title": "remote"}),
            clock,
            1_000,
        );
        let ApplyOutcome::ConflictRecorded(conflict_id) =
            engine.apply_remote_change(&message).await.unwrap()
        else {
            panic!("expected conflict");
        };

        engine
            .resolve_conflict(&conflict_id, ConflictChoice::AcceptRemote, "did:peer:a")
            .await
            .unwrap();

        let data = store
            .get_resource("org-1", ResourceKind::Knowledge, "k-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(data, json!({"title": "remote"}));
        let state = store
            .get_state("org-1", ResourceKind::Knowledge, "k-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(state.sync_status, SyncStatus::Synced);
    }

    #[tokio::test]
    async fn concurrent_lww_newer_remote_wins_ties_stay_local() {
        let (engine, store, _) = engine("did:peer:a");

        // Members resolve by LWW. Local change, synced at a known time.
        engine
            .record_local_change(
                "org-1",
                ResourceKind::Member,
                "m-1",
                ChangeAction::Update,
                json!({"name": "local"}),
            )
            .await
            .unwrap();
        let mut state = store
            .get_state("org-1", ResourceKind::Member, "m-1")
            .await
            .unwrap()
            .unwrap();
        state.last_synced_at = Some(5_000);
        store.put_state(state).await.unwrap();

        let mut clock = VectorClock::new();
        clock.increment("did:peer:remote");

        // Tie with the sync point: local wins.
        let tie = remote_message(
            "org-1",
            ResourceKind::Member,
            "m-1",
            json!({"name": "tie"}),
            clock.clone(),
            5_000,
        );
        let outcome = engine.apply_remote_change(&tie).await.unwrap();
        assert_eq!(outcome, ApplyOutcome::LwwLocalWins);
        let data = store
            .get_resource("org-1", ResourceKind::Member, "m-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(data, json!({"name": "local"}));

        // Strictly newer remote wins. A fresh remote tick keeps it
        // concurrent with the (merged) local history.
        clock.increment("did:peer:remote");
        let newer = remote_message(
            "org-1",
            ResourceKind::Member,
            "m-1",
            json!({"name": "newer"}),
            clock,
            6_000,
        );
        let outcome = engine.apply_remote_change(&newer).await.unwrap();
        assert_eq!(outcome, ApplyOutcome::LwwRemoteWins);
        let data = store
            .get_resource("org-1", ResourceKind::Member, "m-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(data, json!({"name": "newer"}));
    }

    #[tokio::test]
    async fn failed_broadcast_queues_and_drains_later() {
        let (engine, store, transport) = engine("did:peer:a");
        engine
            .record_local_change(
                "org-1",
                ResourceKind::Settings,
                "s-1",
                ChangeAction::Update,
                json!({"theme": "dark"}),
            )
            .await
            .unwrap();

        transport.fail_next(SyncError::Network("offline".into()));
        let (pushed, failed) = engine.push_pending("org-1").await.unwrap();
        assert_eq!((pushed, failed), (0, 1));
        assert_eq!(store.queue_depth("org-1").await.unwrap(), 1);

        // Back online: the drain transmits and settles state.
        let (completed, drain_failed) = engine.drain_queue("org-1").await.unwrap();
        assert_eq!((completed, drain_failed), (1, 0));
        assert_eq!(store.queue_depth("org-1").await.unwrap(), 0);
        assert_eq!(transport.broadcasts().len(), 1);

        let state = store
            .get_state("org-1", ResourceKind::Settings, "s-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(state.sync_status, SyncStatus::Synced);
    }

    #[tokio::test]
    async fn queue_item_fails_terminally_after_budget() {
        let (engine, store, transport) = engine("did:peer:a");
        let mut events = engine.events().subscribe();

        let item_id = engine
            .add_to_queue(
                "org-1",
                ChangeAction::Update,
                ResourceKind::Settings,
                "s-1",
                json!({"theme": "dark"}),
                1,
            )
            .await
            .unwrap();

        // Budget is 2 in this fixture.
        transport.fail_next(SyncError::Network("offline".into()));
        engine.drain_queue("org-1").await.unwrap();
        transport.fail_next(SyncError::Network("offline".into()));
        engine.drain_queue("org-1").await.unwrap();

        assert_eq!(store.queue_depth("org-1").await.unwrap(), 0);
        loop {
            if let SyncEvent::QueueItemFailed {
                item_id: failed_id,
                retry_count,
            } = events.recv().await.unwrap()
            {
                assert_eq!(failed_id, item_id);
                assert_eq!(retry_count, 2);
                break;
            }
        }
    }

    #[tokio::test]
    async fn overlapping_sync_is_skipped() {
        let (engine, _, _) = engine("did:peer:a");
        let guard = engine.guard.clone();
        let held = guard.lock().await;
        assert!(engine.is_syncing());

        let outcome = engine.sync("org-1").await.unwrap();
        assert!(outcome.skipped);

        drop(held);
        let outcome = engine.sync("org-1").await.unwrap();
        assert!(!outcome.skipped);
    }

    #[tokio::test]
    async fn sync_stats_counts_by_status() {
        let (engine, _, transport) = engine("did:peer:a");
        engine
            .record_local_change(
                "org-1",
                ResourceKind::Member,
                "m-1",
                ChangeAction::Create,
                json!({"name": "a"}),
            )
            .await
            .unwrap();
        engine
            .record_local_change(
                "org-1",
                ResourceKind::Member,
                "m-2",
                ChangeAction::Create,
                json!({"name": "b"}),
            )
            .await
            .unwrap();

        // Push one successfully, queue the other.
        transport.fail_next(SyncError::Network("offline".into()));
        engine.push_pending("org-1").await.unwrap();

        let stats = engine.sync_stats("org-1").await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.synced + stats.pending, 2);
        assert_eq!(stats.queue_depth, 1);
    }
}
