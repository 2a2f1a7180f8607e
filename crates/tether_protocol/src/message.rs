//! Change messages and hub request/response DTOs.

use crate::clock::VectorClock;
use crate::error::ProtocolError;
use crate::resource::ResourceKind;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// The kind of mutation carried by a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    /// A new resource.
    Create,
    /// An update to an existing resource.
    Update,
    /// A (soft) deletion.
    Delete,
}

impl ChangeAction {
    /// Returns the action's wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeAction::Create => "create",
            ChangeAction::Update => "update",
            ChangeAction::Delete => "delete",
        }
    }
}

impl fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeAction {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(ChangeAction::Create),
            "update" => Ok(ChangeAction::Update),
            "delete" => Ok(ChangeAction::Delete),
            other => Err(ProtocolError::UnknownCode {
                field: "action",
                value: other.into(),
            }),
        }
    }
}

/// Strategy for resolving a detected conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    /// Persist the conflict and wait for an explicit resolution call.
    Manual,
    /// Last write wins by adjusted timestamp.
    Lww,
}

/// An explicit choice made when resolving a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictChoice {
    /// Keep the local version and discard the remote one.
    KeepLocal,
    /// Accept the remote version and discard the local one.
    AcceptRemote,
}

/// A peer-originated change, broadcast to every device in the organization.
///
/// The `signature` is a hex SHA-256 of the message's identifying fields and
/// payload. It is an integrity check against accidental corruption only; it
/// is not an authentication mechanism and carries no key material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeMessage {
    /// Organization the change belongs to.
    pub org_id: String,
    /// Kind of the mutated resource.
    pub resource_type: ResourceKind,
    /// Id of the mutated resource.
    pub resource_id: String,
    /// The mutation kind.
    pub action: ChangeAction,
    /// Full resource payload (empty object for deletions).
    pub data: serde_json::Value,
    /// Local version of the resource at send time.
    pub version: u64,
    /// Vector clock of the resource at send time.
    pub vector_clock: VectorClock,
    /// DID of the authoring device.
    pub author_did: String,
    /// Author wall-clock time of the change, epoch milliseconds.
    pub timestamp: i64,
    /// Placeholder content hash (see type docs).
    pub signature: String,
}

impl ChangeMessage {
    /// Builds a change message and computes its content signature.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        org_id: impl Into<String>,
        resource_type: ResourceKind,
        resource_id: impl Into<String>,
        action: ChangeAction,
        data: serde_json::Value,
        version: u64,
        vector_clock: VectorClock,
        author_did: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        let mut message = Self {
            org_id: org_id.into(),
            resource_type,
            resource_id: resource_id.into(),
            action,
            data,
            version,
            vector_clock,
            author_did: author_did.into(),
            timestamp,
            signature: String::new(),
        };
        message.signature = message.content_hash();
        message
    }

    /// Computes the hex SHA-256 content hash of the message.
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.org_id.as_bytes());
        hasher.update(b"|");
        hasher.update(self.resource_type.as_str().as_bytes());
        hasher.update(b"|");
        hasher.update(self.resource_id.as_bytes());
        hasher.update(b"|");
        hasher.update(self.action.as_str().as_bytes());
        hasher.update(b"|");
        hasher.update(self.version.to_le_bytes());
        hasher.update(self.timestamp.to_le_bytes());
        // serde_json maps are BTree-backed, so this rendering is canonical.
        hasher.update(self.data.to_string().as_bytes());

        let digest = hasher.finalize();
        let mut out = String::with_capacity(digest.len() * 2);
        for byte in digest {
            use std::fmt::Write;
            let _ = write!(out, "{byte:02x}");
        }
        out
    }

    /// Checks the content hash against the carried signature.
    pub fn verify_signature(&self) -> bool {
        self.signature == self.content_hash()
    }
}

/// Server wall-clock reading, used for clock-offset calibration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerTime {
    /// Server time in epoch milliseconds.
    pub timestamp: i64,
}

/// One rejected record inside an upload batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadConflict {
    /// Id of the conflicting record.
    pub id: String,
    /// Server-provided reason.
    pub reason: String,
}

/// Backend response to an upload batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UploadReport {
    /// Number of records accepted.
    pub success_count: u32,
    /// Number of records rejected as conflicting.
    pub conflict_count: u32,
    /// Details for each conflicting record.
    pub conflicts: Vec<UploadConflict>,
}

impl UploadReport {
    /// A report where every record was accepted.
    pub fn accepted(count: u32) -> Self {
        Self {
            success_count: count,
            ..Self::default()
        }
    }

    /// A report where a record was rejected as conflicting.
    pub fn conflicting(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            success_count: 0,
            conflict_count: 1,
            conflicts: vec![UploadConflict {
                id: id.into(),
                reason: reason.into(),
            }],
        }
    }
}

/// Backend response to an incremental download request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IncrementalChanges {
    /// Records created on the server since the cursor.
    pub new_records: Vec<serde_json::Value>,
    /// Records updated on the server since the cursor.
    pub updated_records: Vec<serde_json::Value>,
    /// Ids deleted on the server since the cursor.
    pub deleted_ids: Vec<String>,
}

impl IncrementalChanges {
    /// Returns true if nothing changed.
    pub fn is_empty(&self) -> bool {
        self.new_records.is_empty() && self.updated_records.is_empty() && self.deleted_ids.is_empty()
    }
}

/// Server-side view of a device's sync progress.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncStatusReport {
    /// Device the report is about.
    pub device_id: String,
    /// Records awaiting upload according to the server.
    pub pending: u64,
    /// Last time the device completed a sync, epoch milliseconds.
    pub last_synced_at: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_message() -> ChangeMessage {
        let mut clock = VectorClock::new();
        clock.increment("did:peer:a");
        ChangeMessage::new(
            "org-1",
            ResourceKind::Knowledge,
            "k-1",
            ChangeAction::Update,
            json!({"title": "notes", "content": "hello"}),
            3,
            clock,
            "did:peer:a",
            1_700_000_000_000,
        )
    }

    #[test]
    fn signature_verifies() {
        let message = sample_message();
        assert!(!message.signature.is_empty());
        assert!(message.verify_signature());
    }

    #[test]
    fn tampered_payload_fails_verification() {
        let mut message = sample_message();
        message.data = json!({"title": "notes", "content": "tampered"});
        assert!(!message.verify_signature());
    }

    #[test]
    fn signature_is_key_order_independent() {
        let a = sample_message();
        let mut b = sample_message();
        b.data = json!({"content": "hello", "title": "notes"});
        b.signature = b.content_hash();
        assert_eq!(a.signature, b.signature);
    }

    #[test]
    fn message_serde_roundtrip() {
        let message = sample_message();
        let json = serde_json::to_string(&message).unwrap();
        let back: ChangeMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, message);
        assert!(back.verify_signature());
    }

    #[test]
    fn upload_report_helpers() {
        let ok = UploadReport::accepted(1);
        assert_eq!(ok.success_count, 1);
        assert_eq!(ok.conflict_count, 0);

        let bad = UploadReport::conflicting("r-1", "version mismatch");
        assert_eq!(bad.conflict_count, 1);
        assert_eq!(bad.conflicts[0].id, "r-1");
    }

    #[test]
    fn incremental_changes_empty() {
        assert!(IncrementalChanges::default().is_empty());
        let changes = IncrementalChanges {
            deleted_ids: vec!["x".into()],
            ..Default::default()
        };
        assert!(!changes.is_empty());
    }

    #[test]
    fn action_roundtrip() {
        for action in [ChangeAction::Create, ChangeAction::Update, ChangeAction::Delete] {
            assert_eq!(action.as_str().parse::<ChangeAction>().unwrap(), action);
        }
    }
}
