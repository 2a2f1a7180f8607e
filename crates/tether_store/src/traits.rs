//! Storage traits consumed by the sync engine.
//!
//! Everything is async because real backends sit on sqlite/IPC boundaries;
//! the in-memory implementation resolves immediately. Per-table access goes
//! through the typed [`RecordStore`] repository instead of string-built
//! queries, so field access is checked at compile time.

use crate::error::StoreResult;
use crate::model::{ConflictRecord, QueueItem, SyncState};
use async_trait::async_trait;
use tether_protocol::{LocalRecord, ResourceKind, SyncStatus};

/// Access to persisted [`SyncState`] rows (peer path bookkeeping).
#[async_trait]
pub trait SyncStateStore: Send + Sync {
    /// Loads the state for one resource, if it exists.
    async fn get_state(
        &self,
        org_id: &str,
        resource_type: ResourceKind,
        resource_id: &str,
    ) -> StoreResult<Option<SyncState>>;

    /// Inserts or replaces a state row.
    async fn put_state(&self, state: SyncState) -> StoreResult<()>;

    /// Lists states with the given status for an organization.
    async fn states_by_status(
        &self,
        org_id: &str,
        status: SyncStatus,
    ) -> StoreResult<Vec<SyncState>>;

    /// Lists every state for an organization.
    async fn all_states(&self, org_id: &str) -> StoreResult<Vec<SyncState>>;
}

/// Access to persisted [`ConflictRecord`] rows.
#[async_trait]
pub trait ConflictStore: Send + Sync {
    /// Inserts a new conflict record.
    async fn insert_conflict(&self, record: ConflictRecord) -> StoreResult<()>;

    /// Loads a conflict by id.
    async fn get_conflict(&self, id: &str) -> StoreResult<Option<ConflictRecord>>;

    /// Lists unresolved conflicts for an organization, oldest first.
    async fn unresolved_conflicts(&self, org_id: &str) -> StoreResult<Vec<ConflictRecord>>;

    /// Replaces an existing conflict record (used to mark resolution).
    async fn update_conflict(&self, record: ConflictRecord) -> StoreResult<()>;
}

/// Access to the durable offline queue.
#[async_trait]
pub trait OfflineQueueStore: Send + Sync {
    /// Appends an item to the queue.
    async fn enqueue_item(&self, item: QueueItem) -> StoreResult<()>;

    /// Lists pending items for an organization, oldest first.
    async fn pending_queue_items(&self, org_id: &str) -> StoreResult<Vec<QueueItem>>;

    /// Replaces an existing queue item.
    async fn update_queue_item(&self, item: QueueItem) -> StoreResult<()>;

    /// Number of non-terminal items for an organization.
    async fn queue_depth(&self, org_id: &str) -> StoreResult<usize>;
}

/// Access to peer-synced resource payloads.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Loads a resource payload.
    async fn get_resource(
        &self,
        org_id: &str,
        resource_type: ResourceKind,
        resource_id: &str,
    ) -> StoreResult<Option<serde_json::Value>>;

    /// Inserts or replaces a resource payload.
    async fn put_resource(
        &self,
        org_id: &str,
        resource_type: ResourceKind,
        resource_id: &str,
        data: serde_json::Value,
    ) -> StoreResult<()>;

    /// Removes a resource payload (tombstoning is tracked in [`SyncState`]).
    async fn delete_resource(
        &self,
        org_id: &str,
        resource_type: ResourceKind,
        resource_id: &str,
    ) -> StoreResult<()>;
}

/// Typed repository over one syncable table (hub path).
#[async_trait]
pub trait RecordStore<R: LocalRecord>: Send + Sync {
    /// Loads a row by id.
    async fn get(&self, id: &str) -> StoreResult<Option<R>>;

    /// Rows that still need uploading (`pending` status or never marked).
    async fn pending(&self) -> StoreResult<Vec<R>>;

    /// Inserts or replaces a row, keyed by id.
    async fn upsert(&self, record: R) -> StoreResult<()>;

    /// Updates just the sync status (and optionally synced_at) of a row.
    async fn set_status(
        &self,
        id: &str,
        status: SyncStatus,
        synced_at: Option<i64>,
    ) -> StoreResult<()>;

    /// Marks a row soft-deleted.
    async fn soft_delete(&self, id: &str) -> StoreResult<()>;

    /// The most recent synced_at across the table (the download cursor).
    async fn latest_synced_at(&self) -> StoreResult<Option<i64>>;

    /// Number of rows that still need uploading.
    async fn count_pending(&self) -> StoreResult<usize>;
}
