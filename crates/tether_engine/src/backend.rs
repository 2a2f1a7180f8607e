//! Backend transport seam for the hub-spoke path.
//!
//! [`BackendApi`] is the five-call surface the orchestrator needs from the
//! centralized backend. [`MockBackend`] is an in-memory scriptable
//! implementation for tests; production transports implement the same trait
//! over HTTP or whatever the deployment uses.

use crate::error::SyncResult;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use tether_protocol::{
    ConflictChoice, IncrementalChanges, ServerTime, SyncStatusReport, Table, UploadReport,
};

/// Transport to the centralized backend.
#[async_trait]
pub trait BackendApi: Send + Sync {
    /// Reads the server's wall clock, for offset calibration.
    async fn get_server_time(&self) -> SyncResult<ServerTime>;

    /// Uploads a batch of records for one table. `request_id` makes the call
    /// identifiable for server-side idempotency.
    async fn upload_batch(
        &self,
        table: Table,
        records: Vec<serde_json::Value>,
        device_id: &str,
        request_id: &str,
    ) -> SyncResult<UploadReport>;

    /// Downloads changes for one table since the given server-time cursor.
    /// `None` means "from the beginning".
    async fn download_incremental(
        &self,
        table: Table,
        since: Option<i64>,
        device_id: &str,
    ) -> SyncResult<IncrementalChanges>;

    /// Tells the backend how an upload conflict was resolved.
    async fn resolve_conflict(&self, conflict_id: &str, choice: ConflictChoice) -> SyncResult<()>;

    /// Reads the server's view of this device's sync progress.
    async fn get_sync_status(&self, device_id: &str) -> SyncResult<SyncStatusReport>;
}

/// An upload call recorded by [`MockBackend`].
#[derive(Debug, Clone)]
pub struct RecordedUpload {
    /// Table the batch targeted.
    pub table: Table,
    /// The uploaded payloads.
    pub records: Vec<serde_json::Value>,
    /// Device id sent with the call.
    pub device_id: String,
    /// Request id sent with the call.
    pub request_id: String,
}

/// A scriptable in-memory backend for tests.
///
/// Upload responses are scripted as a queue: each `upload_batch` call pops
/// the next scripted result, and an empty queue accepts the whole batch.
/// Download responses are scripted per table the same way, defaulting to no
/// changes.
#[derive(Default)]
pub struct MockBackend {
    server_time: Mutex<i64>,
    upload_script: Mutex<VecDeque<SyncResult<UploadReport>>>,
    download_script: Mutex<HashMap<Table, VecDeque<SyncResult<IncrementalChanges>>>>,
    uploads: Mutex<Vec<RecordedUpload>>,
    resolved: Mutex<Vec<(String, ConflictChoice)>>,
    status: Mutex<SyncStatusReport>,
}

impl MockBackend {
    /// Creates a mock whose server clock reads `server_time_ms`.
    pub fn new(server_time_ms: i64) -> Self {
        Self {
            server_time: Mutex::new(server_time_ms),
            ..Self::default()
        }
    }

    /// Moves the mock's server clock.
    pub fn set_server_time(&self, server_time_ms: i64) {
        *self.server_time.lock() = server_time_ms;
    }

    /// Scripts the next upload response.
    pub fn script_upload(&self, result: SyncResult<UploadReport>) {
        self.upload_script.lock().push_back(result);
    }

    /// Scripts the next download response for a table.
    pub fn script_download(&self, table: Table, result: SyncResult<IncrementalChanges>) {
        self.download_script
            .lock()
            .entry(table)
            .or_default()
            .push_back(result);
    }

    /// Sets the response to `get_sync_status`.
    pub fn set_status(&self, status: SyncStatusReport) {
        *self.status.lock() = status;
    }

    /// All uploads received so far.
    pub fn uploads(&self) -> Vec<RecordedUpload> {
        self.uploads.lock().clone()
    }

    /// All conflict resolutions received so far.
    pub fn resolutions(&self) -> Vec<(String, ConflictChoice)> {
        self.resolved.lock().clone()
    }
}

#[async_trait]
impl BackendApi for MockBackend {
    async fn get_server_time(&self) -> SyncResult<ServerTime> {
        Ok(ServerTime {
            timestamp: *self.server_time.lock(),
        })
    }

    async fn upload_batch(
        &self,
        table: Table,
        records: Vec<serde_json::Value>,
        device_id: &str,
        request_id: &str,
    ) -> SyncResult<UploadReport> {
        let count = records.len() as u32;
        self.uploads.lock().push(RecordedUpload {
            table,
            records,
            device_id: device_id.to_string(),
            request_id: request_id.to_string(),
        });
        match self.upload_script.lock().pop_front() {
            Some(result) => result,
            None => Ok(UploadReport::accepted(count)),
        }
    }

    async fn download_incremental(
        &self,
        table: Table,
        _since: Option<i64>,
        _device_id: &str,
    ) -> SyncResult<IncrementalChanges> {
        let next = self
            .download_script
            .lock()
            .get_mut(&table)
            .and_then(VecDeque::pop_front);
        match next {
            Some(result) => result,
            None => Ok(IncrementalChanges::default()),
        }
    }

    async fn resolve_conflict(&self, conflict_id: &str, choice: ConflictChoice) -> SyncResult<()> {
        self.resolved.lock().push((conflict_id.to_string(), choice));
        Ok(())
    }

    async fn get_sync_status(&self, _device_id: &str) -> SyncResult<SyncStatusReport> {
        Ok(self.status.lock().clone())
    }
}

impl std::fmt::Debug for MockBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockBackend")
            .field("server_time", &*self.server_time.lock())
            .field("recorded_uploads", &self.uploads.lock().len())
            .finish()
    }
}
