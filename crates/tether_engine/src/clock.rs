//! Clock-offset correction against the backend.
//!
//! The local wall clock and the backend's clock drift apart. A calibration
//! round-trip measures the offset so hub timestamp comparisons happen in one
//! time base. The correction is symmetric: `to_local_time(to_server_time(t))
//! == t`.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;

/// Measured offset between the local clock and the backend clock.
///
/// Offset is `local - server`: positive means the local clock runs ahead.
/// Before the first calibration the offset is zero and conversions are
/// identity.
#[derive(Debug, Default)]
pub struct ServerClock {
    offset_ms: AtomicI64,
    calibrated: AtomicBool,
}

impl ServerClock {
    /// Creates an uncalibrated clock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current local wall-clock time in milliseconds since the Unix epoch.
    pub fn now_ms() -> i64 {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }

    /// Records a calibration round trip.
    ///
    /// `t1`/`t2` are the local times the request left and the response
    /// arrived; `server_ts` is the server time in the response. Half the
    /// round trip is attributed to each direction.
    pub fn calibrate(&self, server_ts: i64, t1: i64, t2: i64) {
        let rtt = (t2 - t1).max(0);
        let adjusted_server = server_ts + rtt / 2;
        self.offset_ms.store(t2 - adjusted_server, Ordering::SeqCst);
        self.calibrated.store(true, Ordering::SeqCst);
    }

    /// True once at least one calibration has been recorded.
    pub fn is_calibrated(&self) -> bool {
        self.calibrated.load(Ordering::SeqCst)
    }

    /// The measured offset in milliseconds (`local - server`).
    pub fn offset_ms(&self) -> i64 {
        self.offset_ms.load(Ordering::SeqCst)
    }

    /// Converts a local timestamp to the server time base.
    pub fn to_server_time(&self, local_ms: i64) -> i64 {
        local_ms - self.offset_ms()
    }

    /// Converts a server timestamp to the local time base.
    pub fn to_local_time(&self, server_ms: i64) -> i64 {
        server_ms + self.offset_ms()
    }

    /// True when the absolute offset exceeds `threshold`.
    pub fn skew_exceeds(&self, threshold: Duration) -> bool {
        self.offset_ms().unsigned_abs() > threshold.as_millis() as u64
    }
}
