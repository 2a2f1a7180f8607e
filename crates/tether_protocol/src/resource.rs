//! Resource identification for both sync paths.

use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A syncable table on the hub-spoke path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    /// Top-level projects.
    Projects,
    /// Files belonging to a project.
    ProjectFiles,
    /// Chat conversations.
    Conversations,
    /// Messages inside a conversation.
    Messages,
    /// Knowledge base items.
    KnowledgeItems,
}

impl Table {
    /// All syncable tables in priority order (earlier syncs first).
    pub const ALL: [Table; 5] = [
        Table::Projects,
        Table::ProjectFiles,
        Table::Conversations,
        Table::Messages,
        Table::KnowledgeItems,
    ];

    /// Returns the table's wire/storage name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Projects => "projects",
            Table::ProjectFiles => "project_files",
            Table::Conversations => "conversations",
            Table::Messages => "messages",
            Table::KnowledgeItems => "knowledge_items",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Table {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "projects" => Ok(Table::Projects),
            "project_files" => Ok(Table::ProjectFiles),
            "conversations" => Ok(Table::Conversations),
            "messages" => Ok(Table::Messages),
            "knowledge_items" => Ok(Table::KnowledgeItems),
            other => Err(ProtocolError::UnknownCode {
                field: "table",
                value: other.into(),
            }),
        }
    }
}

/// A resource kind on the peer-to-peer path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Shared knowledge entries.
    Knowledge,
    /// Organization membership.
    Member,
    /// Organization roles.
    Role,
    /// Organization-wide settings.
    Settings,
    /// Shared projects.
    Project,
}

impl ResourceKind {
    /// All peer-synced resource kinds.
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::Knowledge,
        ResourceKind::Member,
        ResourceKind::Role,
        ResourceKind::Settings,
        ResourceKind::Project,
    ];

    /// Returns the kind's wire/storage name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Knowledge => "knowledge",
            ResourceKind::Member => "member",
            ResourceKind::Role => "role",
            ResourceKind::Settings => "settings",
            ResourceKind::Project => "project",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "knowledge" => Ok(ResourceKind::Knowledge),
            "member" => Ok(ResourceKind::Member),
            "role" => Ok(ResourceKind::Role),
            "settings" => Ok(ResourceKind::Settings),
            "project" => Ok(ResourceKind::Project),
            other => Err(ProtocolError::UnknownCode {
                field: "resource_kind",
                value: other.into(),
            }),
        }
    }
}

/// Synchronization status of a resource or row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Locally modified, not yet pushed.
    Pending,
    /// In sync with the remote authority.
    Synced,
    /// A conflict was detected and awaits resolution.
    Conflict,
    /// The last sync attempt failed.
    Error,
}

impl SyncStatus {
    /// Returns the status's storage code.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Synced => "synced",
            SyncStatus::Conflict => "conflict",
            SyncStatus::Error => "error",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SyncStatus::Pending),
            "synced" => Ok(SyncStatus::Synced),
            "conflict" => Ok(SyncStatus::Conflict),
            "error" => Ok(SyncStatus::Error),
            other => Err(ProtocolError::UnknownCode {
                field: "sync_status",
                value: other.into(),
            }),
        }
    }
}
