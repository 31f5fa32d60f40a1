//! Snapshot model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A backup of the deployed tree and its runtime state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Backup slot path on the target host
    pub path: String,

    /// When the snapshot was taken
    pub taken_at: DateTime<Utc>,

    /// Revision that was live when the snapshot was taken
    pub source_revision: String,

    /// Revision whose deploy triggered the snapshot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replaced_by: Option<String>,
}
