//! # Tether Store
//!
//! Persisted sync bookkeeping for the Tether engine.
//!
//! This crate provides:
//! - The [`SyncState`], [`ConflictRecord`], and [`QueueItem`] models
//! - Async storage traits: typed per-table record repositories for the
//!   hub-spoke path and the sync-state/conflict/offline-queue stores for the
//!   peer path
//! - An in-memory reference implementation used throughout the engine tests
//!
//! ## Key Invariants
//!
//! - `SyncState.local_version` increases only on local mutation
//! - Sync states are never deleted; tombstoning happens through status
//! - A resolved [`ConflictRecord`] is terminal

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod memory;
mod model;
mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use model::{ConflictRecord, QueueItem, QueueItemStatus, SyncState};
pub use traits::{
    ConflictStore, OfflineQueueStore, RecordStore, ResourceStore, SyncStateStore,
};
