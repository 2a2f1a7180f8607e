//! In-memory reference implementation of every storage trait.
//!
//! Backed by `parking_lot` mutexes over plain maps. Locks are never held
//! across an await point. Used by the engine's tests and usable as a scratch
//! store for tooling.

use crate::error::{StoreError, StoreResult};
use crate::model::{ConflictRecord, QueueItem, QueueItemStatus, SyncState};
use crate::traits::{
    ConflictStore, OfflineQueueStore, RecordStore, ResourceStore, SyncStateStore,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use tether_protocol::{LocalRecord, ResourceKind, SyncStatus};

/// An in-memory store implementing all Tether storage traits.
#[derive(Default)]
pub struct MemoryStore {
    states: Mutex<HashMap<String, SyncState>>,
    conflicts: Mutex<Vec<ConflictRecord>>,
    queue: Mutex<Vec<QueueItem>>,
    resources: Mutex<HashMap<String, serde_json::Value>>,
    // One ordered map of JSON rows per table; typed records pass through
    // serde at this seam.
    tables: Mutex<HashMap<&'static str, BTreeMap<String, serde_json::Value>>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn resource_key(org_id: &str, resource_type: ResourceKind, resource_id: &str) -> String {
        format!("{org_id}:{resource_type}:{resource_id}")
    }

    fn decode_row<R: LocalRecord>(id: &str, value: &serde_json::Value) -> StoreResult<R> {
        serde_json::from_value(value.clone()).map_err(|source| StoreError::Corrupt {
            entity: R::TABLE.as_str(),
            id: id.to_string(),
            source,
        })
    }

    fn encode_row<R: LocalRecord>(record: &R) -> StoreResult<serde_json::Value> {
        serde_json::to_value(record).map_err(|source| StoreError::Corrupt {
            entity: R::TABLE.as_str(),
            id: record.id().to_string(),
            source,
        })
    }
}

#[async_trait]
impl SyncStateStore for MemoryStore {
    async fn get_state(
        &self,
        org_id: &str,
        resource_type: ResourceKind,
        resource_id: &str,
    ) -> StoreResult<Option<SyncState>> {
        let key = SyncState::key(org_id, resource_type, resource_id);
        Ok(self.states.lock().get(&key).cloned())
    }

    async fn put_state(&self, state: SyncState) -> StoreResult<()> {
        self.states.lock().insert(state.id.clone(), state);
        Ok(())
    }

    async fn states_by_status(
        &self,
        org_id: &str,
        status: SyncStatus,
    ) -> StoreResult<Vec<SyncState>> {
        let mut out: Vec<SyncState> = self
            .states
            .lock()
            .values()
            .filter(|s| s.org_id == org_id && s.sync_status == status)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }

    async fn all_states(&self, org_id: &str) -> StoreResult<Vec<SyncState>> {
        let mut out: Vec<SyncState> = self
            .states
            .lock()
            .values()
            .filter(|s| s.org_id == org_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }
}

#[async_trait]
impl ConflictStore for MemoryStore {
    async fn insert_conflict(&self, record: ConflictRecord) -> StoreResult<()> {
        self.conflicts.lock().push(record);
        Ok(())
    }

    async fn get_conflict(&self, id: &str) -> StoreResult<Option<ConflictRecord>> {
        Ok(self.conflicts.lock().iter().find(|c| c.id == id).cloned())
    }

    async fn unresolved_conflicts(&self, org_id: &str) -> StoreResult<Vec<ConflictRecord>> {
        let mut out: Vec<ConflictRecord> = self
            .conflicts
            .lock()
            .iter()
            .filter(|c| c.org_id == org_id && !c.resolved)
            .cloned()
            .collect();
        out.sort_by_key(|c| c.created_at);
        Ok(out)
    }

    async fn update_conflict(&self, record: ConflictRecord) -> StoreResult<()> {
        let mut conflicts = self.conflicts.lock();
        match conflicts.iter_mut().find(|c| c.id == record.id) {
            Some(slot) => {
                *slot = record;
                Ok(())
            }
            None => Err(StoreError::not_found("sync_conflicts", record.id)),
        }
    }
}

#[async_trait]
impl OfflineQueueStore for MemoryStore {
    async fn enqueue_item(&self, item: QueueItem) -> StoreResult<()> {
        self.queue.lock().push(item);
        Ok(())
    }

    async fn pending_queue_items(&self, org_id: &str) -> StoreResult<Vec<QueueItem>> {
        Ok(self
            .queue
            .lock()
            .iter()
            .filter(|i| i.org_id == org_id && i.status == QueueItemStatus::Pending)
            .cloned()
            .collect())
    }

    async fn update_queue_item(&self, item: QueueItem) -> StoreResult<()> {
        let mut queue = self.queue.lock();
        match queue.iter_mut().find(|i| i.id == item.id) {
            Some(slot) => {
                *slot = item;
                Ok(())
            }
            None => Err(StoreError::not_found("sync_queue", item.id)),
        }
    }

    async fn queue_depth(&self, org_id: &str) -> StoreResult<usize> {
        Ok(self
            .queue
            .lock()
            .iter()
            .filter(|i| {
                i.org_id == org_id
                    && matches!(i.status, QueueItemStatus::Pending | QueueItemStatus::Processing)
            })
            .count())
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn get_resource(
        &self,
        org_id: &str,
        resource_type: ResourceKind,
        resource_id: &str,
    ) -> StoreResult<Option<serde_json::Value>> {
        let key = Self::resource_key(org_id, resource_type, resource_id);
        Ok(self.resources.lock().get(&key).cloned())
    }

    async fn put_resource(
        &self,
        org_id: &str,
        resource_type: ResourceKind,
        resource_id: &str,
        data: serde_json::Value,
    ) -> StoreResult<()> {
        let key = Self::resource_key(org_id, resource_type, resource_id);
        self.resources.lock().insert(key, data);
        Ok(())
    }

    async fn delete_resource(
        &self,
        org_id: &str,
        resource_type: ResourceKind,
        resource_id: &str,
    ) -> StoreResult<()> {
        let key = Self::resource_key(org_id, resource_type, resource_id);
        self.resources.lock().remove(&key);
        Ok(())
    }
}

#[async_trait]
impl<R: LocalRecord> RecordStore<R> for MemoryStore {
    async fn get(&self, id: &str) -> StoreResult<Option<R>> {
        let tables = self.tables.lock();
        let Some(rows) = tables.get(R::TABLE.as_str()) else {
            return Ok(None);
        };
        rows.get(id).map(|v| Self::decode_row(id, v)).transpose()
    }

    async fn pending(&self) -> StoreResult<Vec<R>> {
        let tables = self.tables.lock();
        let Some(rows) = tables.get(R::TABLE.as_str()) else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        for (id, value) in rows {
            let record: R = Self::decode_row(id, value)?;
            if record.sync().needs_upload() {
                out.push(record);
            }
        }
        Ok(out)
    }

    async fn upsert(&self, record: R) -> StoreResult<()> {
        let value = Self::encode_row(&record)?;
        self.tables
            .lock()
            .entry(R::TABLE.as_str())
            .or_default()
            .insert(record.id().to_string(), value);
        Ok(())
    }

    async fn set_status(
        &self,
        id: &str,
        status: SyncStatus,
        synced_at: Option<i64>,
    ) -> StoreResult<()> {
        let mut tables = self.tables.lock();
        let rows = tables.entry(R::TABLE.as_str()).or_default();
        let Some(value) = rows.get(id) else {
            return Err(StoreError::not_found(R::TABLE.as_str(), id));
        };
        let mut record: R = Self::decode_row(id, value)?;
        record.sync_mut().sync_status = Some(status);
        if synced_at.is_some() {
            record.sync_mut().synced_at = synced_at;
        }
        let value = Self::encode_row(&record)?;
        rows.insert(id.to_string(), value);
        Ok(())
    }

    async fn soft_delete(&self, id: &str) -> StoreResult<()> {
        let mut tables = self.tables.lock();
        let rows = tables.entry(R::TABLE.as_str()).or_default();
        let Some(value) = rows.get(id) else {
            return Err(StoreError::not_found(R::TABLE.as_str(), id));
        };
        let mut record: R = Self::decode_row(id, value)?;
        record.sync_mut().deleted = true;
        let value = Self::encode_row(&record)?;
        rows.insert(id.to_string(), value);
        Ok(())
    }

    async fn latest_synced_at(&self) -> StoreResult<Option<i64>> {
        let tables = self.tables.lock();
        let Some(rows) = tables.get(R::TABLE.as_str()) else {
            return Ok(None);
        };
        let mut latest = None;
        for (id, value) in rows {
            let record: R = Self::decode_row(id, value)?;
            if let Some(synced_at) = record.sync().synced_at {
                latest = Some(latest.map_or(synced_at, |l: i64| l.max(synced_at)));
            }
        }
        Ok(latest)
    }

    async fn count_pending(&self) -> StoreResult<usize> {
        Ok(RecordStore::<R>::pending(self).await?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tether_protocol::{ChangeAction, ProjectRecord};

    #[tokio::test]
    async fn sync_state_roundtrip() {
        let store = MemoryStore::new();
        let mut state = SyncState::new("org-1", ResourceKind::Knowledge, "k-1");
        state.record_local_change("did:peer:a");
        store.put_state(state.clone()).await.unwrap();

        let loaded = store
            .get_state("org-1", ResourceKind::Knowledge, "k-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded, state);

        let pending = store
            .states_by_status("org-1", SyncStatus::Pending)
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert!(store
            .states_by_status("org-2", SyncStatus::Pending)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn conflict_update_requires_existing_row() {
        let store = MemoryStore::new();
        let record = ConflictRecord::new(
            "org-1",
            ResourceKind::Role,
            "r-1",
            1,
            1,
            json!({}),
            json!({}),
            Default::default(),
            Default::default(),
            tether_protocol::ResolutionStrategy::Manual,
            1_000,
        );

        assert!(store.update_conflict(record.clone()).await.is_err());
        store.insert_conflict(record.clone()).await.unwrap();

        let mut resolved = record.clone();
        resolved.mark_resolved(tether_protocol::ConflictChoice::KeepLocal, "did:a", 2_000);
        store.update_conflict(resolved).await.unwrap();
        assert!(store.unresolved_conflicts("org-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn queue_depth_counts_non_terminal() {
        let store = MemoryStore::new();
        let mut item = QueueItem::new(
            "org-1",
            ChangeAction::Create,
            ResourceKind::Member,
            "m-1",
            json!({}),
            1,
            1_000,
        );
        store.enqueue_item(item.clone()).await.unwrap();
        assert_eq!(store.queue_depth("org-1").await.unwrap(), 1);

        item.status = QueueItemStatus::Completed;
        store.update_queue_item(item).await.unwrap();
        assert_eq!(store.queue_depth("org-1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn record_store_pending_and_status() {
        let store = MemoryStore::new();
        let record = ProjectRecord::new("p-1", "demo");
        store.upsert(record).await.unwrap();

        let pending: Vec<ProjectRecord> = store.pending().await.unwrap();
        assert_eq!(pending.len(), 1);

        RecordStore::<ProjectRecord>::set_status(&store, "p-1", SyncStatus::Synced, Some(5_000))
            .await
            .unwrap();
        let pending: Vec<ProjectRecord> = store.pending().await.unwrap();
        assert!(pending.is_empty());

        let latest = RecordStore::<ProjectRecord>::latest_synced_at(&store)
            .await
            .unwrap();
        assert_eq!(latest, Some(5_000));
    }

    #[tokio::test]
    async fn soft_delete_sets_tombstone() {
        let store = MemoryStore::new();
        store.upsert(ProjectRecord::new("p-1", "demo")).await.unwrap();
        RecordStore::<ProjectRecord>::soft_delete(&store, "p-1")
            .await
            .unwrap();
        let record: ProjectRecord = store.get("p-1").await.unwrap().unwrap();
        assert!(record.sync.deleted);
    }
}
