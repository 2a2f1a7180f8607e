//! Typed per-table records for the hub-spoke path.
//!
//! Every syncable table has a local struct (snake_case, epoch-millisecond
//! timestamps) and a backend struct (camelCase, RFC 3339 timestamps). The
//! [`LocalRecord`] trait ties the pair together and drives the generic
//! per-table sync workers in the engine crate.

use crate::error::ProtocolResult;
use crate::mapper::{
    blank, millis_to_rfc3339, opt_millis_to_rfc3339, opt_rfc3339_to_millis,
    resolve_incoming_status, ToLocalOptions,
};
use crate::resource::{SyncStatus, Table};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Sync bookkeeping columns shared by every local row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncColumns {
    /// Row sync status; `None` is treated as pending (never uploaded).
    pub sync_status: Option<SyncStatus>,
    /// Last successful sync, epoch milliseconds (server-adjusted).
    pub synced_at: Option<i64>,
    /// Row creation time, epoch milliseconds.
    pub created_at: i64,
    /// Last local modification, epoch milliseconds.
    pub updated_at: i64,
    /// Soft-delete tombstone flag.
    pub deleted: bool,
}

impl SyncColumns {
    /// True when the row still needs uploading (`pending` or never marked).
    pub fn needs_upload(&self) -> bool {
        matches!(self.sync_status, None | Some(SyncStatus::Pending))
    }

    /// True when the row has never completed a sync.
    pub fn never_synced(&self) -> bool {
        self.synced_at.unwrap_or(0) == 0
    }

    /// Shifts the record's wall-clock fields by `delta_ms`.
    ///
    /// `synced_at` is excluded: it is sync bookkeeping already kept in
    /// server-adjusted time, not record content.
    pub fn shift(&mut self, delta_ms: i64) {
        self.created_at += delta_ms;
        self.updated_at += delta_ms;
    }
}

/// A local row belonging to one syncable table.
///
/// Implementations tie the local shape to its backend counterpart and expose
/// the pieces the generic table workers need: identity, sync columns,
/// required-field checks, and the two mapping directions.
pub trait LocalRecord:
    Clone + Send + Sync + Serialize + DeserializeOwned + 'static
{
    /// Backend-facing counterpart of this record.
    type Backend: Clone + Send + Sync + Serialize + DeserializeOwned + 'static;

    /// The table this record belongs to.
    const TABLE: Table;

    /// Record id.
    fn id(&self) -> &str;

    /// Shared sync columns.
    fn sync(&self) -> &SyncColumns;

    /// Mutable shared sync columns.
    fn sync_mut(&mut self) -> &mut SyncColumns;

    /// Names of fields that must be present and non-empty.
    fn required_fields() -> &'static [&'static str];

    /// Required fields currently missing from this record.
    fn missing_required(&self) -> Vec<&'static str>;

    /// Shifts every wall-clock field by `delta_ms` (clock-offset correction).
    fn shift_timestamps(&mut self, delta_ms: i64) {
        self.sync_mut().shift(delta_ms);
    }

    /// Maps to the backend shape.
    fn to_backend(&self) -> ProtocolResult<Self::Backend>;

    /// Maps from the backend shape, resolving sync status per `opts`.
    fn from_backend(
        backend: &Self::Backend,
        opts: &ToLocalOptions<'_, Self>,
    ) -> ProtocolResult<Self>;
}

// ---------------------------------------------------------------------------
// projects
// ---------------------------------------------------------------------------

/// A project row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectRecord {
    /// Project id.
    pub id: String,
    /// Owning user, if known.
    pub user_id: Option<String>,
    /// Display name.
    pub name: String,
    /// Free-form description.
    pub description: Option<String>,
    /// Project type tag.
    pub project_type: Option<String>,
    /// Application-level status.
    pub status: Option<String>,
    /// Root path on the originating device.
    pub root_path: Option<String>,
    /// Number of files, if indexed.
    pub file_count: Option<i64>,
    /// Total size in bytes, if indexed.
    pub total_size: Option<i64>,
    /// Device that created the row.
    pub device_id: Option<String>,
    /// Sync bookkeeping.
    #[serde(flatten)]
    pub sync: SyncColumns,
}

impl ProjectRecord {
    /// Creates a project with the required fields set.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Backend shape of a project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackendProject {
    /// Project id.
    pub id: String,
    /// Owning user.
    pub user_id: Option<String>,
    /// Display name.
    pub name: String,
    /// Free-form description.
    pub description: Option<String>,
    /// Project type tag.
    pub project_type: Option<String>,
    /// Application-level status.
    pub status: Option<String>,
    /// Root path on the originating device.
    pub root_path: Option<String>,
    /// Number of files.
    pub file_count: Option<i64>,
    /// Total size in bytes.
    pub total_size: Option<i64>,
    /// Sync status as last seen by the server.
    pub sync_status: Option<SyncStatus>,
    /// Last sync time, RFC 3339.
    pub synced_at: Option<String>,
    /// Device that created the row.
    pub device_id: Option<String>,
    /// Soft-delete flag.
    pub deleted: bool,
    /// Creation time, RFC 3339.
    pub created_at: Option<String>,
    /// Last modification, RFC 3339.
    pub updated_at: Option<String>,
}

impl LocalRecord for ProjectRecord {
    type Backend = BackendProject;
    const TABLE: Table = Table::Projects;

    fn id(&self) -> &str {
        &self.id
    }

    fn sync(&self) -> &SyncColumns {
        &self.sync
    }

    fn sync_mut(&mut self) -> &mut SyncColumns {
        &mut self.sync
    }

    fn required_fields() -> &'static [&'static str] {
        &["id", "name"]
    }

    fn missing_required(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if blank(&self.id) {
            missing.push("id");
        }
        if blank(&self.name) {
            missing.push("name");
        }
        missing
    }

    fn to_backend(&self) -> ProtocolResult<Self::Backend> {
        Ok(BackendProject {
            id: self.id.clone(),
            user_id: self.user_id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            project_type: self.project_type.clone(),
            status: self.status.clone(),
            root_path: self.root_path.clone(),
            file_count: self.file_count,
            total_size: self.total_size,
            sync_status: self.sync.sync_status,
            synced_at: opt_millis_to_rfc3339(self.sync.synced_at)?,
            device_id: self.device_id.clone(),
            deleted: self.sync.deleted,
            created_at: Some(millis_to_rfc3339(self.sync.created_at)?),
            updated_at: Some(millis_to_rfc3339(self.sync.updated_at)?),
        })
    }

    fn from_backend(
        backend: &Self::Backend,
        opts: &ToLocalOptions<'_, Self>,
    ) -> ProtocolResult<Self> {
        let (sync_status, synced_at) = resolve_incoming_status(opts);
        Ok(Self {
            id: backend.id.clone(),
            user_id: backend.user_id.clone(),
            name: backend.name.clone(),
            description: backend.description.clone(),
            project_type: backend.project_type.clone(),
            status: backend.status.clone(),
            root_path: backend.root_path.clone(),
            file_count: backend.file_count,
            total_size: backend.total_size,
            device_id: backend.device_id.clone(),
            sync: SyncColumns {
                sync_status,
                synced_at,
                created_at: opt_rfc3339_to_millis(backend.created_at.as_deref())?.unwrap_or(0),
                updated_at: opt_rfc3339_to_millis(backend.updated_at.as_deref())?.unwrap_or(0),
                deleted: backend.deleted,
            },
        })
    }
}

// ---------------------------------------------------------------------------
// project_files
// ---------------------------------------------------------------------------

/// A file row belonging to a project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectFileRecord {
    /// File id.
    pub id: String,
    /// Owning project id.
    pub project_id: String,
    /// Path relative to the project root.
    pub path: String,
    /// File name, if split out from the path.
    pub file_name: Option<String>,
    /// File type tag.
    pub file_type: Option<String>,
    /// Size in bytes.
    pub size: Option<i64>,
    /// Content hash for change detection.
    pub content_hash: Option<String>,
    /// Sync bookkeeping.
    #[serde(flatten)]
    pub sync: SyncColumns,
}

impl ProjectFileRecord {
    /// Creates a file row with the required fields set.
    pub fn new(
        id: impl Into<String>,
        project_id: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            project_id: project_id.into(),
            path: path.into(),
            ..Self::default()
        }
    }
}

/// Backend shape of a project file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackendProjectFile {
    /// File id.
    pub id: String,
    /// Owning project id.
    pub project_id: String,
    /// Path relative to the project root.
    pub path: String,
    /// File name.
    pub file_name: Option<String>,
    /// File type tag.
    pub file_type: Option<String>,
    /// Size in bytes.
    pub size: Option<i64>,
    /// Content hash.
    pub content_hash: Option<String>,
    /// Sync status as last seen by the server.
    pub sync_status: Option<SyncStatus>,
    /// Last sync time, RFC 3339.
    pub synced_at: Option<String>,
    /// Soft-delete flag.
    pub deleted: bool,
    /// Creation time, RFC 3339.
    pub created_at: Option<String>,
    /// Last modification, RFC 3339.
    pub updated_at: Option<String>,
}

impl LocalRecord for ProjectFileRecord {
    type Backend = BackendProjectFile;
    const TABLE: Table = Table::ProjectFiles;

    fn id(&self) -> &str {
        &self.id
    }

    fn sync(&self) -> &SyncColumns {
        &self.sync
    }

    fn sync_mut(&mut self) -> &mut SyncColumns {
        &mut self.sync
    }

    fn required_fields() -> &'static [&'static str] {
        &["id", "project_id", "path"]
    }

    fn missing_required(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if blank(&self.id) {
            missing.push("id");
        }
        if blank(&self.project_id) {
            missing.push("project_id");
        }
        if blank(&self.path) {
            missing.push("path");
        }
        missing
    }

    fn to_backend(&self) -> ProtocolResult<Self::Backend> {
        Ok(BackendProjectFile {
            id: self.id.clone(),
            project_id: self.project_id.clone(),
            path: self.path.clone(),
            file_name: self.file_name.clone(),
            file_type: self.file_type.clone(),
            size: self.size,
            content_hash: self.content_hash.clone(),
            sync_status: self.sync.sync_status,
            synced_at: opt_millis_to_rfc3339(self.sync.synced_at)?,
            deleted: self.sync.deleted,
            created_at: Some(millis_to_rfc3339(self.sync.created_at)?),
            updated_at: Some(millis_to_rfc3339(self.sync.updated_at)?),
        })
    }

    fn from_backend(
        backend: &Self::Backend,
        opts: &ToLocalOptions<'_, Self>,
    ) -> ProtocolResult<Self> {
        let (sync_status, synced_at) = resolve_incoming_status(opts);
        Ok(Self {
            id: backend.id.clone(),
            project_id: backend.project_id.clone(),
            path: backend.path.clone(),
            file_name: backend.file_name.clone(),
            file_type: backend.file_type.clone(),
            size: backend.size,
            content_hash: backend.content_hash.clone(),
            sync: SyncColumns {
                sync_status,
                synced_at,
                created_at: opt_rfc3339_to_millis(backend.created_at.as_deref())?.unwrap_or(0),
                updated_at: opt_rfc3339_to_millis(backend.updated_at.as_deref())?.unwrap_or(0),
                deleted: backend.deleted,
            },
        })
    }
}

// ---------------------------------------------------------------------------
// conversations
// ---------------------------------------------------------------------------

/// A conversation row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationRecord {
    /// Conversation id.
    pub id: String,
    /// Owning project, if any.
    pub project_id: Option<String>,
    /// Conversation title.
    pub title: String,
    /// Model used for the conversation.
    pub model: Option<String>,
    /// Sync bookkeeping.
    #[serde(flatten)]
    pub sync: SyncColumns,
}

impl ConversationRecord {
    /// Creates a conversation with the required fields set.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            ..Self::default()
        }
    }
}

/// Backend shape of a conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackendConversation {
    /// Conversation id.
    pub id: String,
    /// Owning project.
    pub project_id: Option<String>,
    /// Conversation title.
    pub title: String,
    /// Model used.
    pub model: Option<String>,
    /// Sync status as last seen by the server.
    pub sync_status: Option<SyncStatus>,
    /// Soft-delete flag.
    pub deleted: bool,
    /// Creation time, RFC 3339.
    pub created_at: Option<String>,
    /// Last modification, RFC 3339.
    pub updated_at: Option<String>,
}

impl LocalRecord for ConversationRecord {
    type Backend = BackendConversation;
    const TABLE: Table = Table::Conversations;

    fn id(&self) -> &str {
        &self.id
    }

    fn sync(&self) -> &SyncColumns {
        &self.sync
    }

    fn sync_mut(&mut self) -> &mut SyncColumns {
        &mut self.sync
    }

    fn required_fields() -> &'static [&'static str] {
        &["id", "title"]
    }

    fn missing_required(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if blank(&self.id) {
            missing.push("id");
        }
        if blank(&self.title) {
            missing.push("title");
        }
        missing
    }

    fn to_backend(&self) -> ProtocolResult<Self::Backend> {
        Ok(BackendConversation {
            id: self.id.clone(),
            project_id: self.project_id.clone(),
            title: self.title.clone(),
            model: self.model.clone(),
            sync_status: self.sync.sync_status,
            deleted: self.sync.deleted,
            created_at: Some(millis_to_rfc3339(self.sync.created_at)?),
            updated_at: Some(millis_to_rfc3339(self.sync.updated_at)?),
        })
    }

    fn from_backend(
        backend: &Self::Backend,
        opts: &ToLocalOptions<'_, Self>,
    ) -> ProtocolResult<Self> {
        let (sync_status, synced_at) = resolve_incoming_status(opts);
        Ok(Self {
            id: backend.id.clone(),
            project_id: backend.project_id.clone(),
            title: backend.title.clone(),
            model: backend.model.clone(),
            sync: SyncColumns {
                sync_status,
                synced_at,
                created_at: opt_rfc3339_to_millis(backend.created_at.as_deref())?.unwrap_or(0),
                updated_at: opt_rfc3339_to_millis(backend.updated_at.as_deref())?.unwrap_or(0),
                deleted: backend.deleted,
            },
        })
    }
}

// ---------------------------------------------------------------------------
// messages
// ---------------------------------------------------------------------------

/// A message row inside a conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageRecord {
    /// Message id.
    pub id: String,
    /// Owning conversation id.
    pub conversation_id: String,
    /// Author role (user/assistant/system).
    pub role: String,
    /// Message body.
    pub content: String,
    /// Message time, epoch milliseconds.
    pub timestamp: i64,
    /// Sync bookkeeping.
    #[serde(flatten)]
    pub sync: SyncColumns,
}

impl MessageRecord {
    /// Creates a message with the required fields set.
    pub fn new(
        id: impl Into<String>,
        conversation_id: impl Into<String>,
        role: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            conversation_id: conversation_id.into(),
            role: role.into(),
            content: content.into(),
            ..Self::default()
        }
    }
}

/// Backend shape of a message. Messages are append-only, so the backend
/// whitelist is narrower than for the other tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackendMessage {
    /// Message id.
    pub id: String,
    /// Owning conversation id.
    pub conversation_id: String,
    /// Author role.
    pub role: String,
    /// Message body.
    pub content: String,
    /// Message time, RFC 3339.
    pub timestamp: Option<String>,
    /// Sync status as last seen by the server.
    pub sync_status: Option<SyncStatus>,
}

impl LocalRecord for MessageRecord {
    type Backend = BackendMessage;
    const TABLE: Table = Table::Messages;

    fn id(&self) -> &str {
        &self.id
    }

    fn sync(&self) -> &SyncColumns {
        &self.sync
    }

    fn sync_mut(&mut self) -> &mut SyncColumns {
        &mut self.sync
    }

    fn required_fields() -> &'static [&'static str] {
        &["id", "conversation_id", "role", "content"]
    }

    fn missing_required(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if blank(&self.id) {
            missing.push("id");
        }
        if blank(&self.conversation_id) {
            missing.push("conversation_id");
        }
        if blank(&self.role) {
            missing.push("role");
        }
        if blank(&self.content) {
            missing.push("content");
        }
        missing
    }

    fn shift_timestamps(&mut self, delta_ms: i64) {
        self.timestamp += delta_ms;
        self.sync.shift(delta_ms);
    }

    fn to_backend(&self) -> ProtocolResult<Self::Backend> {
        Ok(BackendMessage {
            id: self.id.clone(),
            conversation_id: self.conversation_id.clone(),
            role: self.role.clone(),
            content: self.content.clone(),
            timestamp: Some(millis_to_rfc3339(self.timestamp)?),
            sync_status: self.sync.sync_status,
        })
    }

    fn from_backend(
        backend: &Self::Backend,
        opts: &ToLocalOptions<'_, Self>,
    ) -> ProtocolResult<Self> {
        let (sync_status, synced_at) = resolve_incoming_status(opts);
        let timestamp = opt_rfc3339_to_millis(backend.timestamp.as_deref())?.unwrap_or(0);
        Ok(Self {
            id: backend.id.clone(),
            conversation_id: backend.conversation_id.clone(),
            role: backend.role.clone(),
            content: backend.content.clone(),
            timestamp,
            sync: SyncColumns {
                sync_status,
                synced_at,
                created_at: timestamp,
                updated_at: timestamp,
                deleted: false,
            },
        })
    }
}

// ---------------------------------------------------------------------------
// knowledge_items
// ---------------------------------------------------------------------------

/// A knowledge base item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeItemRecord {
    /// Item id.
    pub id: String,
    /// Owning project, if any.
    pub project_id: Option<String>,
    /// Item title.
    pub title: String,
    /// Item body.
    pub content: String,
    /// Comma-separated tags.
    pub tags: Option<String>,
    /// Where the item came from.
    pub source: Option<String>,
    /// Sync bookkeeping.
    #[serde(flatten)]
    pub sync: SyncColumns,
}

impl KnowledgeItemRecord {
    /// Creates a knowledge item with the required fields set.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            content: content.into(),
            ..Self::default()
        }
    }
}

/// Backend shape of a knowledge item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackendKnowledgeItem {
    /// Item id.
    pub id: String,
    /// Owning project.
    pub project_id: Option<String>,
    /// Item title.
    pub title: String,
    /// Item body.
    pub content: String,
    /// Comma-separated tags.
    pub tags: Option<String>,
    /// Where the item came from.
    pub source: Option<String>,
    /// Sync status as last seen by the server.
    pub sync_status: Option<SyncStatus>,
    /// Soft-delete flag.
    pub deleted: bool,
    /// Creation time, RFC 3339.
    pub created_at: Option<String>,
    /// Last modification, RFC 3339.
    pub updated_at: Option<String>,
}

impl LocalRecord for KnowledgeItemRecord {
    type Backend = BackendKnowledgeItem;
    const TABLE: Table = Table::KnowledgeItems;

    fn id(&self) -> &str {
        &self.id
    }

    fn sync(&self) -> &SyncColumns {
        &self.sync
    }

    fn sync_mut(&mut self) -> &mut SyncColumns {
        &mut self.sync
    }

    fn required_fields() -> &'static [&'static str] {
        &["id", "title", "content"]
    }

    fn missing_required(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if blank(&self.id) {
            missing.push("id");
        }
        if blank(&self.title) {
            missing.push("title");
        }
        if blank(&self.content) {
            missing.push("content");
        }
        missing
    }

    fn to_backend(&self) -> ProtocolResult<Self::Backend> {
        Ok(BackendKnowledgeItem {
            id: self.id.clone(),
            project_id: self.project_id.clone(),
            title: self.title.clone(),
            content: self.content.clone(),
            tags: self.tags.clone(),
            source: self.source.clone(),
            sync_status: self.sync.sync_status,
            deleted: self.sync.deleted,
            created_at: Some(millis_to_rfc3339(self.sync.created_at)?),
            updated_at: Some(millis_to_rfc3339(self.sync.updated_at)?),
        })
    }

    fn from_backend(
        backend: &Self::Backend,
        opts: &ToLocalOptions<'_, Self>,
    ) -> ProtocolResult<Self> {
        let (sync_status, synced_at) = resolve_incoming_status(opts);
        Ok(Self {
            id: backend.id.clone(),
            project_id: backend.project_id.clone(),
            title: backend.title.clone(),
            content: backend.content.clone(),
            tags: backend.tags.clone(),
            source: backend.source.clone(),
            sync: SyncColumns {
                sync_status,
                synced_at,
                created_at: opt_rfc3339_to_millis(backend.created_at.as_deref())?.unwrap_or(0),
                updated_at: opt_rfc3339_to_millis(backend.updated_at.as_deref())?.unwrap_or(0),
                deleted: backend.deleted,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::validate_required;

    fn columns(created: i64, updated: i64) -> SyncColumns {
        SyncColumns {
            sync_status: Some(SyncStatus::Pending),
            synced_at: Some(1_700_000_000_000),
            created_at: created,
            updated_at: updated,
            deleted: false,
        }
    }

    #[test]
    fn project_roundtrip_preserves_fields() {
        let mut local = ProjectRecord::new("p-1", "demo");
        local.user_id = Some("u-1".into());
        local.description = Some("a project".into());
        local.file_count = Some(12);
        local.device_id = Some("dev-1".into());
        local.sync = columns(1_700_000_000_000, 1_700_000_100_000);

        let backend = local.to_backend().unwrap();
        assert_eq!(backend.file_count, Some(12));
        assert!(backend.updated_at.as_deref().unwrap().ends_with('Z'));

        let opts = ToLocalOptions::preserving(&local);
        let back = ProjectRecord::from_backend(&backend, &opts).unwrap();
        assert_eq!(back, local);
    }

    #[test]
    fn message_roundtrip_preserves_timestamp() {
        let mut local = MessageRecord::new("m-1", "c-1", "user", "hello");
        local.timestamp = 1_700_000_000_500;
        local.sync = SyncColumns {
            sync_status: Some(SyncStatus::Pending),
            synced_at: None,
            created_at: local.timestamp,
            updated_at: local.timestamp,
            deleted: false,
        };

        let backend = local.to_backend().unwrap();
        let opts = ToLocalOptions::preserving(&local);
        let back = MessageRecord::from_backend(&backend, &opts).unwrap();
        assert_eq!(back, local);
    }

    #[test]
    fn file_and_knowledge_roundtrip() {
        let mut file = ProjectFileRecord::new("f-1", "p-1", "src/main.rs");
        file.size = Some(1024);
        file.sync = columns(1_000, 2_000);
        let back =
            ProjectFileRecord::from_backend(&file.to_backend().unwrap(), &ToLocalOptions::preserving(&file))
                .unwrap();
        assert_eq!(back, file);

        let mut item = KnowledgeItemRecord::new("k-1", "title", "body");
        item.tags = Some("a,b".into());
        item.sync = columns(1_000, 2_000);
        let back = KnowledgeItemRecord::from_backend(
            &item.to_backend().unwrap(),
            &ToLocalOptions::preserving(&item),
        )
        .unwrap();
        assert_eq!(back, item);

        let mut convo = ConversationRecord::new("c-1", "chat");
        convo.sync = columns(1_000, 2_000);
        convo.sync.synced_at = None;
        let back = ConversationRecord::from_backend(
            &convo.to_backend().unwrap(),
            &ToLocalOptions::preserving(&convo),
        )
        .unwrap();
        assert_eq!(back, convo);
    }

    #[test]
    fn absent_optionals_stay_none() {
        let backend = BackendProject {
            id: "p-1".into(),
            name: "demo".into(),
            ..Default::default()
        };
        let local =
            ProjectRecord::from_backend(&backend, &ToLocalOptions::default()).unwrap();
        assert_eq!(local.description, None);
        assert_eq!(local.file_count, None);
        assert_eq!(local.total_size, None);
    }

    #[test]
    fn validation_flags_missing_and_empty() {
        let record = MessageRecord::new("m-1", "", "user", "hi");
        let report = validate_required(&record);
        assert!(!report.valid);
        assert_eq!(report.missing, vec!["conversation_id"]);

        let record = MessageRecord::new("m-1", "c-1", "user", "hi");
        assert!(validate_required(&record).valid);
    }

    #[test]
    fn validation_covers_every_table() {
        assert!(!validate_required(&ProjectRecord::default()).valid);
        assert!(!validate_required(&ProjectFileRecord::default()).valid);
        assert!(!validate_required(&ConversationRecord::default()).valid);
        assert!(!validate_required(&MessageRecord::default()).valid);
        assert!(!validate_required(&KnowledgeItemRecord::default()).valid);

        assert!(validate_required(&ProjectRecord::new("p", "n")).valid);
        assert!(validate_required(&ProjectFileRecord::new("f", "p", "x")).valid);
        assert!(validate_required(&ConversationRecord::new("c", "t")).valid);
        assert!(validate_required(&KnowledgeItemRecord::new("k", "t", "c")).valid);
    }

    #[test]
    fn shift_moves_wall_clock_fields_but_not_synced_at() {
        let mut message = MessageRecord::new("m-1", "c-1", "user", "hi");
        message.timestamp = 1_000;
        message.sync = columns(1_000, 2_000);
        message.shift_timestamps(-250);
        assert_eq!(message.timestamp, 750);
        assert_eq!(message.sync.created_at, 750);
        assert_eq!(message.sync.updated_at, 1_750);
        assert_eq!(message.sync.synced_at, Some(1_700_000_000_000));
    }

    #[test]
    fn needs_upload_treats_null_as_pending() {
        let mut columns = SyncColumns::default();
        assert!(columns.needs_upload());
        columns.sync_status = Some(SyncStatus::Pending);
        assert!(columns.needs_upload());
        columns.sync_status = Some(SyncStatus::Synced);
        assert!(!columns.needs_upload());
    }
}
