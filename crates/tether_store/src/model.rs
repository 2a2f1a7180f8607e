//! Persisted sync bookkeeping models.

use serde::{Deserialize, Serialize};
use tether_protocol::{ChangeAction, ConflictChoice, ResolutionStrategy, ResourceKind, SyncStatus, VectorClock};
use uuid::Uuid;

/// Per-resource synchronization progress.
///
/// Identity is the (org, resource kind, resource id) triple; `id` is the
/// derived storage key. Created lazily on first local mutation, updated after
/// every successful push or applied pull, never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    /// Storage key, derived from the identity triple.
    pub id: String,
    /// Owning organization.
    pub org_id: String,
    /// Resource kind.
    pub resource_type: ResourceKind,
    /// Resource id.
    pub resource_id: String,
    /// Monotonic local version; bumps only on local mutation.
    pub local_version: u64,
    /// Highest remote version applied locally.
    pub remote_version: u64,
    /// Per-actor causal history.
    pub vector_clock: VectorClock,
    /// Current sync status.
    pub sync_status: SyncStatus,
    /// Last successful sync, epoch milliseconds.
    pub last_synced_at: Option<i64>,
}

impl SyncState {
    /// Derives the storage key for an identity triple.
    pub fn key(org_id: &str, resource_type: ResourceKind, resource_id: &str) -> String {
        format!("{org_id}:{resource_type}:{resource_id}")
    }

    /// Creates a fresh state for a resource that has never synced.
    pub fn new(
        org_id: impl Into<String>,
        resource_type: ResourceKind,
        resource_id: impl Into<String>,
    ) -> Self {
        let org_id = org_id.into();
        let resource_id = resource_id.into();
        Self {
            id: Self::key(&org_id, resource_type, &resource_id),
            org_id,
            resource_type,
            resource_id,
            local_version: 0,
            remote_version: 0,
            vector_clock: VectorClock::new(),
            sync_status: SyncStatus::Pending,
            last_synced_at: None,
        }
    }

    /// Registers a locally-originated change: bumps the local version,
    /// ticks the owning actor's clock entry exactly once, and marks the
    /// resource pending.
    pub fn record_local_change(&mut self, author_did: &str) {
        self.local_version += 1;
        self.vector_clock.increment(author_did);
        self.sync_status = SyncStatus::Pending;
    }

    /// Registers a successfully applied remote change.
    pub fn record_remote_change(&mut self, remote_version: u64, remote_clock: &VectorClock, now_ms: i64) {
        self.remote_version = self.remote_version.max(remote_version);
        self.vector_clock.merge(remote_clock);
        self.sync_status = SyncStatus::Synced;
        self.last_synced_at = Some(now_ms);
    }

    /// Marks the resource synced after a successful push.
    pub fn mark_synced(&mut self, now_ms: i64) {
        self.sync_status = SyncStatus::Synced;
        self.last_synced_at = Some(now_ms);
    }
}

/// A persisted concurrent-modification conflict awaiting (or past) resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictRecord {
    /// Generated id.
    pub id: String,
    /// Owning organization.
    pub org_id: String,
    /// Resource kind.
    pub resource_type: ResourceKind,
    /// Resource id.
    pub resource_id: String,
    /// Local version at detection time.
    pub local_version: u64,
    /// Remote version at detection time.
    pub remote_version: u64,
    /// Local data snapshot.
    pub local_data: serde_json::Value,
    /// Remote data snapshot.
    pub remote_data: serde_json::Value,
    /// Local vector clock at detection time.
    pub local_vector_clock: VectorClock,
    /// Remote vector clock at detection time.
    pub remote_vector_clock: VectorClock,
    /// Strategy that was in force when the conflict was recorded.
    pub resolution_strategy: ResolutionStrategy,
    /// True once resolved; terminal.
    pub resolved: bool,
    /// Detection time, epoch milliseconds.
    pub created_at: i64,
    /// Resolution time, epoch milliseconds.
    pub resolved_at: Option<i64>,
    /// DID of the resolving actor.
    pub resolved_by_did: Option<String>,
    /// The choice applied on resolution.
    pub resolution: Option<ConflictChoice>,
}

impl ConflictRecord {
    /// Creates an unresolved conflict record with a generated id.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        org_id: impl Into<String>,
        resource_type: ResourceKind,
        resource_id: impl Into<String>,
        local_version: u64,
        remote_version: u64,
        local_data: serde_json::Value,
        remote_data: serde_json::Value,
        local_vector_clock: VectorClock,
        remote_vector_clock: VectorClock,
        resolution_strategy: ResolutionStrategy,
        created_at: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            org_id: org_id.into(),
            resource_type,
            resource_id: resource_id.into(),
            local_version,
            remote_version,
            local_data,
            remote_data,
            local_vector_clock,
            remote_vector_clock,
            resolution_strategy,
            resolved: false,
            created_at,
            resolved_at: None,
            resolved_by_did: None,
            resolution: None,
        }
    }

    /// Marks the conflict resolved. Terminal: has no effect on an already
    /// resolved record.
    pub fn mark_resolved(&mut self, choice: ConflictChoice, resolved_by: &str, now_ms: i64) {
        if self.resolved {
            return;
        }
        self.resolved = true;
        self.resolution = Some(choice);
        self.resolved_at = Some(now_ms);
        self.resolved_by_did = Some(resolved_by.to_string());
    }
}

/// Lifecycle of a durable offline-queue item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueItemStatus {
    /// Waiting for the next drain.
    Pending,
    /// Currently being transmitted.
    Processing,
    /// Successfully transmitted; terminal.
    Completed,
    /// Retry budget exhausted; terminal.
    Failed,
}

/// A locally-originated change that could not be pushed immediately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    /// Generated id.
    pub id: String,
    /// Owning organization.
    pub org_id: String,
    /// The mutation kind.
    pub action: ChangeAction,
    /// Resource kind.
    pub resource_type: ResourceKind,
    /// Resource id.
    pub resource_id: String,
    /// Full resource payload.
    pub data: serde_json::Value,
    /// Local version at enqueue time.
    pub version: u64,
    /// Queue lifecycle status.
    pub status: QueueItemStatus,
    /// Transmission attempts so far.
    pub retry_count: u32,
    /// Enqueue time, epoch milliseconds.
    pub created_at: i64,
    /// Last attempt time, epoch milliseconds.
    pub last_retry_at: Option<i64>,
}

impl QueueItem {
    /// Creates a pending queue item with a generated id.
    pub fn new(
        org_id: impl Into<String>,
        action: ChangeAction,
        resource_type: ResourceKind,
        resource_id: impl Into<String>,
        data: serde_json::Value,
        version: u64,
        created_at: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            org_id: org_id.into(),
            action,
            resource_type,
            resource_id: resource_id.into(),
            data,
            version,
            status: QueueItemStatus::Pending,
            retry_count: 0,
            created_at,
            last_retry_at: None,
        }
    }

    /// Records a failed transmission attempt. The item goes back to pending
    /// until the retry budget is exhausted, then becomes terminally failed.
    pub fn record_failure(&mut self, max_retry_count: u32, now_ms: i64) {
        self.retry_count += 1;
        self.last_retry_at = Some(now_ms);
        self.status = if self.retry_count >= max_retry_count {
            QueueItemStatus::Failed
        } else {
            QueueItemStatus::Pending
        };
    }
}
