//! Persisted record types. Field names on the wire are camelCase to match
//! the state-store key table.

use serde::{Deserialize, Serialize};

/// Per-event reconciliation state, one record per tenant × event key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventState {
    pub sequence: u64,
    pub content_hash: String,
    /// Millisecond wall-clock timestamp of the last observation.
    pub last_seen: i64,
}

/// The set of event keys observed on the most recent successful run, used to
/// detect disappearances.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotKeys {
    pub event_keys: Vec<String>,
    pub generated_at: i64,
}

/// Tenant registration record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantConfig {
    pub source_url: String,
    pub created_at: i64,
    /// Default IANA zone for floating datetimes; falls back to
    /// [`crate::constants::DEFAULT_TIMEZONE`] when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}
