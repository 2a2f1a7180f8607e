//! # Tether Sync Engine
//!
//! Keeps a local embedded data store consistent with two authorities: a
//! centralized backend (hub-spoke) and a mesh of peer devices in the same
//! organization (peer-to-peer).
//!
//! This crate provides:
//! - [`RetryPolicy`]: exponential backoff with jitter for any fallible async
//!   operation
//! - [`SyncQueue`]: priority-ordered, bounded-concurrency task scheduler
//! - [`ServerClock`]: round-trip clock-offset correction against the backend
//! - [`HubSyncOrchestrator`]: reconciles N local tables against one backend
//!   with timestamp/LWW semantics
//! - [`PeerSyncEngine`]: vector-clock conflict detection and resolution
//!   across peers, with a durable offline queue
//!
//! ## Key Invariants
//!
//! - Conflict resolution is the only concurrency control; there is no
//!   distributed lock
//! - Per-record and per-table failures are isolated; one failure never
//!   aborts a sibling
//! - The peer path's `Synced` status means *transmitted*, not acknowledged
//!   by all peers ([`DeliveryGuarantee::TransmittedNotAcked`])
//! - At most `max_concurrency` network operations run at once

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod clock;
mod config;
mod error;
mod events;
mod hub;
mod peer;
mod peers;
mod queue;
mod retry;

pub use backend::{BackendApi, MockBackend, RecordedUpload};
pub use clock::ServerClock;
pub use config::{HubConfig, PeerConfig, RetryConfig};
pub use error::{SyncError, SyncResult};
pub use events::{EventBus, SyncEvent};
pub use hub::{HubSyncOrchestrator, HubSyncReport, TableReport};
pub use peer::{ApplyOutcome, DeliveryGuarantee, PeerSyncEngine, PeerSyncOutcome, PeerSyncStats};
pub use peers::{IdentityProvider, MockPeerTransport, PeerTransport, StaticIdentity};
pub use queue::SyncQueue;
pub use retry::{RetryHooks, RetryPolicy, RetryStats};
