//! Hub-spoke orchestration: N local tables reconciled against one backend.
//!
//! Each registered table gets a typed worker that uploads pending rows and
//! applies incremental downloads. Workers run through the shared
//! [`SyncQueue`], higher-priority tables first, with per-table failures
//! isolated into the run report.
//!
//! All timestamp comparisons happen after clock-offset correction: outgoing
//! rows shift into the server time base, incoming rows shift back into the
//! local one, and `synced_at` is kept server-adjusted so it can serve as the
//! download cursor.

use crate::backend::BackendApi;
use crate::clock::ServerClock;
use crate::config::HubConfig;
use crate::error::{SyncError, SyncResult};
use crate::events::{EventBus, SyncEvent};
use crate::queue::SyncQueue;
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::marker::PhantomData;
use std::sync::Arc;
use tether_protocol::{
    validate_required, ConflictChoice, LocalRecord, SyncStatus, Table, ToLocalOptions,
};
use tether_store::RecordStore;
use uuid::Uuid;

/// Outcome of syncing one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableReport {
    /// The table this report covers.
    pub table: Table,
    /// Rows uploaded and accepted.
    pub uploaded: u32,
    /// Incoming rows applied locally.
    pub applied: u32,
    /// Remote deletions applied locally.
    pub deleted: u32,
    /// Rows left in conflict (upload rejections and concurrent edits).
    pub conflicts: u32,
    /// Rows skipped for failing validation or deletion protection.
    pub skipped: u32,
    /// Rows that failed to upload after retries.
    pub failed: u32,
    /// Table-level failure, if the pass aborted.
    pub error: Option<String>,
}

impl TableReport {
    fn new(table: Table) -> Self {
        Self {
            table,
            uploaded: 0,
            applied: 0,
            deleted: 0,
            conflicts: 0,
            skipped: 0,
            failed: 0,
            error: None,
        }
    }
}

/// Outcome of a full orchestrator pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HubSyncReport {
    /// One report per table that ran, in completion order.
    pub tables: Vec<TableReport>,
}

impl HubSyncReport {
    /// Number of tables that completed without a table-level error.
    pub fn success_count(&self) -> usize {
        self.tables.iter().filter(|t| t.error.is_none()).count()
    }

    /// Number of tables that aborted.
    pub fn failure_count(&self) -> usize {
        self.tables.len() - self.success_count()
    }

    /// Total rows left in conflict across all tables.
    pub fn conflict_count(&self) -> u32 {
        self.tables.iter().map(|t| t.conflicts).sum()
    }

    /// True when every table completed and nothing conflicted.
    pub fn is_clean(&self) -> bool {
        self.failure_count() == 0 && self.conflict_count() == 0
    }
}

/// Object-safe handle to one table's typed sync worker.
#[async_trait]
trait TableWorker: Send + Sync {
    fn table(&self) -> Table;
    async fn count_pending(&self) -> usize;
    async fn sync(&self) -> TableReport;
}

/// Typed per-table worker. One exists per registered table, closed over its
/// repository and record type.
struct TableSync<R, S, B> {
    store: Arc<S>,
    backend: Arc<B>,
    clock: Arc<ServerClock>,
    retry: Arc<RetryPolicy>,
    events: EventBus,
    device_id: String,
    _record: PhantomData<fn() -> R>,
}

impl<R, S, B> TableSync<R, S, B>
where
    R: LocalRecord,
    S: RecordStore<R> + 'static,
    B: BackendApi + 'static,
{
    /// Uploads every pending row, one at a time so a rejected row never
    /// poisons its siblings.
    async fn upload(&self, report: &mut TableReport) -> SyncResult<()> {
        let pending = self.store.pending().await?;
        if pending.is_empty() {
            return Ok(());
        }

        let offset = self.clock.offset_ms();
        for record in pending {
            let validation = validate_required(&record);
            if !validation.valid {
                report.skipped += 1;
                self.events.emit(SyncEvent::RecordSkipped {
                    table: R::TABLE,
                    record_id: record.id().to_string(),
                    missing: validation.missing.iter().map(|s| s.to_string()).collect(),
                });
                continue;
            }

            let mut outgoing = record.clone();
            outgoing.shift_timestamps(-offset);
            let payload = serde_json::to_value(outgoing.to_backend()?)?;
            let request_id = Uuid::new_v4().to_string();

            let backend = Arc::clone(&self.backend);
            let device_id = self.device_id.clone();
            let context = format!("upload {}", R::TABLE);
            let result = self
                .retry
                .run(&context, || {
                    let backend = Arc::clone(&backend);
                    let payload = payload.clone();
                    let device_id = device_id.clone();
                    let request_id = request_id.clone();
                    async move {
                        backend
                            .upload_batch(R::TABLE, vec![payload], &device_id, &request_id)
                            .await
                    }
                })
                .await;

            match result {
                Ok(outcome) if outcome.conflict_count > 0 => {
                    report.conflicts += 1;
                    self.store
                        .set_status(record.id(), SyncStatus::Conflict, None)
                        .await?;
                    self.events.emit(SyncEvent::ConflictDetected {
                        table: R::TABLE,
                        record_id: record.id().to_string(),
                    });
                }
                Ok(outcome) if outcome.success_count > 0 => {
                    report.uploaded += 1;
                    let synced_at = self.clock.to_server_time(ServerClock::now_ms());
                    self.store
                        .set_status(record.id(), SyncStatus::Synced, Some(synced_at))
                        .await?;
                }
                Ok(_) => {
                    // Neither accepted nor conflicting: the server dropped the
                    // row. Mark it so the failure stays visible locally.
                    tracing::warn!(table = %R::TABLE, record_id = record.id(), "upload not accepted");
                    report.failed += 1;
                    self.store
                        .set_status(record.id(), SyncStatus::Error, None)
                        .await?;
                }
                Err(err @ SyncError::Authorization(_)) => return Err(err),
                Err(err) => {
                    tracing::warn!(table = %R::TABLE, record_id = record.id(), error = %err, "upload failed");
                    report.failed += 1;
                    self.store
                        .set_status(record.id(), SyncStatus::Error, None)
                        .await?;
                }
            }
        }
        Ok(())
    }

    /// Applies incremental changes since the table's download cursor.
    async fn download(&self, report: &mut TableReport) -> SyncResult<()> {
        let since = self.store.latest_synced_at().await?;

        let backend = Arc::clone(&self.backend);
        let device_id = self.device_id.clone();
        let context = format!("download {}", R::TABLE);
        let changes = self
            .retry
            .run(&context, || {
                let backend = Arc::clone(&backend);
                let device_id = device_id.clone();
                async move {
                    backend
                        .download_incremental(R::TABLE, since, &device_id)
                        .await
                }
            })
            .await?;

        if changes.is_empty() {
            return Ok(());
        }

        let offset = self.clock.offset_ms();
        for value in changes
            .new_records
            .iter()
            .chain(changes.updated_records.iter())
        {
            let backend_record: R::Backend = serde_json::from_value(value.clone())?;
            let candidate = R::from_backend(&backend_record, &ToLocalOptions::default())?;

            let validation = validate_required(&candidate);
            if !validation.valid {
                report.skipped += 1;
                self.events.emit(SyncEvent::RecordSkipped {
                    table: R::TABLE,
                    record_id: candidate.id().to_string(),
                    missing: validation.missing.iter().map(|s| s.to_string()).collect(),
                });
                continue;
            }

            // Remote timestamps arrive in server time.
            let remote_updated = self.clock.to_local_time(candidate.sync().updated_at);
            let existing = self.store.get(candidate.id()).await?;

            match existing {
                None => {
                    self.apply_incoming(&backend_record, None, offset).await?;
                    report.applied += 1;
                }
                Some(local) => {
                    let synced_at = local.sync().synced_at.unwrap_or(0);
                    let local_dirty = local.sync().updated_at > synced_at;
                    let remote_advanced = candidate.sync().updated_at > synced_at;

                    if local_dirty && remote_advanced {
                        // Both sides moved since the last sync point.
                        report.conflicts += 1;
                        self.store
                            .set_status(local.id(), SyncStatus::Conflict, None)
                            .await?;
                        self.events.emit(SyncEvent::ConflictDetected {
                            table: R::TABLE,
                            record_id: local.id().to_string(),
                        });
                    } else if remote_updated > local.sync().updated_at {
                        self.apply_incoming(&backend_record, Some(&local), offset)
                            .await?;
                        report.applied += 1;
                    }
                    // Otherwise the local row is current; nothing to do.
                }
            }
        }

        for id in &changes.deleted_ids {
            match self.store.get(id).await? {
                Some(local) if local.sync().needs_upload() && local.sync().never_synced() => {
                    // A never-uploaded local row must not vanish because the
                    // server deleted an unrelated ancestor of the id space.
                    report.skipped += 1;
                    self.events.emit(SyncEvent::DeletionSkipped {
                        table: R::TABLE,
                        record_id: id.clone(),
                    });
                }
                Some(_) => {
                    self.store.soft_delete(id).await?;
                    report.deleted += 1;
                }
                None => {}
            }
        }

        Ok(())
    }

    /// Maps an incoming backend record to a local row in local wall-clock
    /// time. Existing rows keep their sync status and cursor stamp; brand-new
    /// rows are marked synced with a server-adjusted one.
    async fn apply_incoming(
        &self,
        backend_record: &R::Backend,
        existing: Option<&R>,
        offset: i64,
    ) -> SyncResult<()> {
        let mut incoming = match existing {
            Some(local) => R::from_backend(backend_record, &ToLocalOptions::preserving(local))?,
            None => R::from_backend(backend_record, &ToLocalOptions::forcing(SyncStatus::Synced))?,
        };
        incoming.shift_timestamps(offset);
        if existing.is_none() {
            incoming.sync_mut().synced_at = Some(self.clock.to_server_time(ServerClock::now_ms()));
        }
        self.store.upsert(incoming).await?;
        Ok(())
    }
}

#[async_trait]
impl<R, S, B> TableWorker for TableSync<R, S, B>
where
    R: LocalRecord,
    S: RecordStore<R> + 'static,
    B: BackendApi + 'static,
{
    fn table(&self) -> Table {
        R::TABLE
    }

    async fn count_pending(&self) -> usize {
        self.store.count_pending().await.unwrap_or(0)
    }

    async fn sync(&self) -> TableReport {
        let mut report = TableReport::new(R::TABLE);

        if let Err(err) = self.upload(&mut report).await {
            if matches!(err, SyncError::Authorization(_)) {
                self.events.emit(SyncEvent::ReauthRequired);
            }
            report.error = Some(err.to_string());
            return report;
        }

        if let Err(err) = self.download(&mut report).await {
            if matches!(err, SyncError::Authorization(_)) {
                self.events.emit(SyncEvent::ReauthRequired);
            }
            report.error = Some(err.to_string());
        }

        report
    }
}

/// Reconciles registered tables against the centralized backend.
pub struct HubSyncOrchestrator<B: BackendApi + 'static> {
    config: HubConfig,
    backend: Arc<B>,
    clock: Arc<ServerClock>,
    queue: SyncQueue,
    retry: Arc<RetryPolicy>,
    events: EventBus,
    auth_token: RwLock<Option<String>>,
    workers: Vec<Arc<dyn TableWorker>>,
}

impl<B: BackendApi + 'static> HubSyncOrchestrator<B> {
    /// Creates an orchestrator with no tables registered.
    pub fn new(config: HubConfig, backend: Arc<B>) -> Self {
        let events = EventBus::default();
        let queue = SyncQueue::new(config.queue_concurrency, events.clone());
        let retry = Arc::new(RetryPolicy::new(config.retry.clone()));
        Self {
            config,
            backend,
            clock: Arc::new(ServerClock::new()),
            queue,
            retry,
            events,
            auth_token: RwLock::new(None),
            workers: Vec::new(),
        }
    }

    /// Registers a table. Registration order is priority order: earlier
    /// tables run first when the queue is contended.
    pub fn register_table<R, S>(&mut self, store: Arc<S>)
    where
        R: LocalRecord,
        S: RecordStore<R> + 'static,
    {
        self.workers.push(Arc::new(TableSync::<R, S, B> {
            store,
            backend: Arc::clone(&self.backend),
            clock: Arc::clone(&self.clock),
            retry: Arc::clone(&self.retry),
            events: self.events.clone(),
            device_id: self.config.device_id.clone(),
            _record: PhantomData,
        }));
    }

    /// The orchestrator's event bus.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// The calibrated server clock.
    pub fn clock(&self) -> &ServerClock {
        &self.clock
    }

    /// Stores the auth token production transports attach to backend calls.
    pub fn set_auth_token(&self, token: impl Into<String>) {
        *self.auth_token.write() = Some(token.into());
    }

    /// Drops the stored auth token.
    pub fn clear_auth_token(&self) {
        *self.auth_token.write() = None;
    }

    /// True when an auth token is stored.
    pub fn has_auth(&self) -> bool {
        self.auth_token.read().is_some()
    }

    /// Calibrates the clock offset against the backend. Large skew raises a
    /// [`SyncEvent::ClockSkew`] warning but never blocks syncing.
    pub async fn initialize(&self) -> SyncResult<()> {
        let backend = Arc::clone(&self.backend);
        let t1 = ServerClock::now_ms();
        let server_time = self
            .retry
            .run("get server time", || {
                let backend = Arc::clone(&backend);
                async move { backend.get_server_time().await }
            })
            .await?;
        let t2 = ServerClock::now_ms();

        self.clock.calibrate(server_time.timestamp, t1, t2);
        if self.clock.skew_exceeds(self.config.skew_warn_threshold) {
            let offset_ms = self.clock.offset_ms();
            tracing::warn!(offset_ms, "local clock skew exceeds threshold");
            self.events.emit(SyncEvent::ClockSkew { offset_ms });
        }
        Ok(())
    }

    /// Full pass: every registered table, uploads then downloads.
    pub async fn sync_after_login(&self) -> HubSyncReport {
        let workers = self.workers.clone();
        self.run_workers(workers).await
    }

    /// Incremental pass: only tables with rows awaiting upload.
    pub async fn sync_incremental(&self) -> HubSyncReport {
        let mut dirty = Vec::new();
        for worker in &self.workers {
            if worker.count_pending().await > 0 {
                dirty.push(Arc::clone(worker));
            }
        }
        self.run_workers(dirty).await
    }

    /// Total rows awaiting upload across all tables.
    pub async fn pending_total(&self) -> usize {
        let mut total = 0;
        for worker in &self.workers {
            total += worker.count_pending().await;
        }
        total
    }

    /// Cancels every table task that has not started. Returns the number
    /// cancelled.
    pub fn cancel_pending(&self) -> usize {
        self.queue.clear()
    }

    /// Reads the server's view of this device's sync progress.
    pub async fn server_sync_status(&self) -> SyncResult<tether_protocol::SyncStatusReport> {
        let backend = Arc::clone(&self.backend);
        let device_id = self.config.device_id.clone();
        self.retry
            .run("get sync status", || {
                let backend = Arc::clone(&backend);
                let device_id = device_id.clone();
                async move { backend.get_sync_status(&device_id).await }
            })
            .await
    }

    /// Reports an upload-conflict resolution back to the backend.
    pub async fn resolve_conflict(
        &self,
        conflict_id: &str,
        choice: ConflictChoice,
    ) -> SyncResult<()> {
        let backend = Arc::clone(&self.backend);
        let conflict_id = conflict_id.to_string();
        self.retry
            .run("resolve conflict", || {
                let backend = Arc::clone(&backend);
                let conflict_id = conflict_id.clone();
                async move { backend.resolve_conflict(&conflict_id, choice).await }
            })
            .await
    }

    async fn run_workers(&self, workers: Vec<Arc<dyn TableWorker>>) -> HubSyncReport {
        if workers.is_empty() {
            return HubSyncReport::default();
        }

        let results: Arc<Mutex<Vec<TableReport>>> = Arc::new(Mutex::new(Vec::new()));
        let total = workers.len() as i64;
        let mut receivers = Vec::new();

        for (index, worker) in workers.into_iter().enumerate() {
            let results = Arc::clone(&results);
            let label = worker.table().to_string();
            let priority = total - index as i64;
            receivers.push(self.queue.enqueue(label, priority, async move {
                let report = worker.sync().await;
                let error = report.error.clone();
                results.lock().push(report);
                match error {
                    Some(message) => Err(SyncError::Unknown(message)),
                    None => Ok(()),
                }
            }));
        }

        for rx in receivers {
            // A cancelled or failed task already left its trace in the
            // results (or was settled with Cancelled before starting).
            let _ = rx.await;
        }

        let tables = std::mem::take(&mut *results.lock());
        HubSyncReport { tables }
    }
}
