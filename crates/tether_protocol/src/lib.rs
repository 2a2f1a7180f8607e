//! # Tether Sync Protocol
//!
//! Protocol types shared by the hub-spoke and peer-to-peer sync paths.
//!
//! This crate provides:
//! - Per-actor vector clocks with causal comparison
//! - Peer change messages with a placeholder content signature
//! - Hub request/response DTOs (server time, upload reports, incremental
//!   change sets)
//! - Typed per-table record structs with bidirectional local ↔ backend
//!   mapping and required-field validation
//!
//! ## Key Invariants
//!
//! - Vector-clock comparison is symmetric: swapping operands mirrors the
//!   ahead/behind verdicts and preserves concurrency
//! - Field mapping round-trips: `from_backend(to_backend(x))` preserves every
//!   mapped field
//! - Absent optional fields map to `None`, never to zero or an empty string

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod clock;
mod error;
mod mapper;
mod message;
mod records;
mod resource;

pub use clock::{ClockOrdering, VectorClock};
pub use error::{ProtocolError, ProtocolResult};
pub use mapper::{
    millis_to_rfc3339, opt_millis_to_rfc3339, opt_rfc3339_to_millis, rfc3339_to_millis,
    resolve_incoming_status, validate_required, FieldValidation, ToLocalOptions,
};
pub use message::{
    ChangeAction, ChangeMessage, ConflictChoice, IncrementalChanges, ResolutionStrategy,
    ServerTime, SyncStatusReport, UploadConflict, UploadReport,
};
pub use records::{
    BackendConversation, BackendKnowledgeItem, BackendMessage, BackendProject, BackendProjectFile,
    ConversationRecord, KnowledgeItemRecord, LocalRecord, MessageRecord, ProjectFileRecord,
    ProjectRecord, SyncColumns,
};
pub use resource::{ResourceKind, SyncStatus, Table};
