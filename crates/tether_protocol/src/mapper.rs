//! Bidirectional field mapping helpers.
//!
//! Local rows carry snake_case fields with epoch-millisecond timestamps;
//! backend records carry camelCase fields with RFC 3339 timestamps. The
//! per-table conversions live on the record structs in [`crate::records`];
//! this module holds the shared timestamp conversion, the incoming
//! sync-status resolution, and required-field validation.

use crate::error::{ProtocolError, ProtocolResult};
use crate::records::LocalRecord;
use crate::resource::SyncStatus;
use chrono::{DateTime, SecondsFormat, Utc};

/// Converts epoch milliseconds to an RFC 3339 string.
pub fn millis_to_rfc3339(ms: i64) -> ProtocolResult<String> {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
        .ok_or_else(|| ProtocolError::InvalidTimestamp {
            value: ms.to_string(),
            reason: "out of range for a datetime".into(),
        })
}

/// Converts an RFC 3339 string to epoch milliseconds.
pub fn rfc3339_to_millis(value: &str) -> ProtocolResult<i64> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc).timestamp_millis())
        .map_err(|e| ProtocolError::InvalidTimestamp {
            value: value.into(),
            reason: e.to_string(),
        })
}

/// Optional-aware variant of [`millis_to_rfc3339`]; `None` stays `None`.
pub fn opt_millis_to_rfc3339(ms: Option<i64>) -> ProtocolResult<Option<String>> {
    ms.map(millis_to_rfc3339).transpose()
}

/// Optional-aware variant of [`rfc3339_to_millis`]; `None` stays `None`.
pub fn opt_rfc3339_to_millis(value: Option<&str>) -> ProtocolResult<Option<i64>> {
    value.map(rfc3339_to_millis).transpose()
}

/// Options controlling how an incoming backend record maps to a local row.
#[derive(Debug, Clone, Copy)]
pub struct ToLocalOptions<'a, R> {
    /// The local row being replaced, if one exists.
    pub existing: Option<&'a R>,
    /// Keep the existing row's status and synced_at instead of marking the
    /// row synced. Used on incoming updates so a local pending/conflict/error
    /// state is not clobbered.
    pub preserve_local_status: bool,
    /// Explicit status override; wins over everything else.
    pub force_sync_status: Option<SyncStatus>,
}

impl<R> Default for ToLocalOptions<'_, R> {
    fn default() -> Self {
        Self {
            existing: None,
            preserve_local_status: false,
            force_sync_status: None,
        }
    }
}

impl<'a, R> ToLocalOptions<'a, R> {
    /// Options that keep the existing row's sync status.
    pub fn preserving(existing: &'a R) -> Self {
        Self {
            existing: Some(existing),
            preserve_local_status: true,
            force_sync_status: None,
        }
    }

    /// Options that force a specific status.
    pub fn forcing(status: SyncStatus) -> Self {
        Self {
            existing: None,
            preserve_local_status: false,
            force_sync_status: Some(status),
        }
    }
}

/// Resolves the (status, synced_at) pair for an incoming record.
///
/// Priority: forced status, then preserved local status when an existing row
/// is supplied, then the default of `Synced` stamped now.
pub fn resolve_incoming_status<R: LocalRecord>(
    opts: &ToLocalOptions<'_, R>,
) -> (Option<SyncStatus>, Option<i64>) {
    if let Some(forced) = opts.force_sync_status {
        return (Some(forced), Some(now_ms()));
    }
    if opts.preserve_local_status {
        if let Some(existing) = opts.existing {
            return (existing.sync().sync_status, existing.sync().synced_at);
        }
    }
    (Some(SyncStatus::Synced), Some(now_ms()))
}

/// Result of checking a record against its required-field table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldValidation {
    /// True when no required field is missing.
    pub valid: bool,
    /// Names of missing required fields.
    pub missing: Vec<&'static str>,
}

/// Checks a record's required fields.
///
/// A field counts as missing when it is `None` or an empty string.
pub fn validate_required<R: LocalRecord>(record: &R) -> FieldValidation {
    let missing = record.missing_required();
    FieldValidation {
        valid: missing.is_empty(),
        missing,
    }
}

/// True when a required string field is missing.
pub(crate) fn blank(value: &str) -> bool {
    value.is_empty()
}

/// Current wall-clock time in epoch milliseconds.
pub(crate) fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::ProjectRecord;

    #[test]
    fn millis_roundtrip() {
        let ms = 1_700_000_000_123;
        let iso = millis_to_rfc3339(ms).unwrap();
        assert!(iso.ends_with('Z'));
        assert_eq!(rfc3339_to_millis(&iso).unwrap(), ms);
    }

    #[test]
    fn rejects_garbage_timestamps() {
        assert!(rfc3339_to_millis("yesterday").is_err());
        assert!(millis_to_rfc3339(i64::MAX).is_err());
    }

    #[test]
    fn optional_conversion_keeps_none() {
        assert_eq!(opt_millis_to_rfc3339(None).unwrap(), None);
        assert_eq!(opt_rfc3339_to_millis(None).unwrap(), None);
    }

    #[test]
    fn forced_status_wins() {
        let mut existing = ProjectRecord::new("p-1", "demo");
        existing.sync.sync_status = Some(SyncStatus::Pending);

        let opts = ToLocalOptions {
            existing: Some(&existing),
            preserve_local_status: true,
            force_sync_status: Some(SyncStatus::Conflict),
        };
        let (status, _) = resolve_incoming_status(&opts);
        assert_eq!(status, Some(SyncStatus::Conflict));
    }

    #[test]
    fn preserved_status_beats_default() {
        let mut existing = ProjectRecord::new("p-1", "demo");
        existing.sync.sync_status = Some(SyncStatus::Pending);
        existing.sync.synced_at = Some(42);

        let opts = ToLocalOptions::preserving(&existing);
        let (status, synced_at) = resolve_incoming_status(&opts);
        assert_eq!(status, Some(SyncStatus::Pending));
        assert_eq!(synced_at, Some(42));
    }

    #[test]
    fn default_is_synced_now() {
        let opts = ToLocalOptions::<ProjectRecord>::default();
        let (status, synced_at) = resolve_incoming_status(&opts);
        assert_eq!(status, Some(SyncStatus::Synced));
        assert!(synced_at.unwrap() > 0);
    }

    #[test]
    fn preserve_without_existing_falls_through() {
        let opts = ToLocalOptions::<ProjectRecord> {
            existing: None,
            preserve_local_status: true,
            force_sync_status: None,
        };
        let (status, _) = resolve_incoming_status(&opts);
        assert_eq!(status, Some(SyncStatus::Synced));
    }
}
