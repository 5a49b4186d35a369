// SPDX-License-Identifier: MIT OR Apache-2.0
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Whether a backup file mirrors a single stub or a batch of stubs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum BackupId {
    /// A single-stub backup, identified by the stub's fingerprint hex.
    Single(String),
    /// A batch backup, identified by a generated batch id.
    Batch(String),
}

/// A record of one backup write, as reported by the backup store (C9).
///
/// Lifecycle: created on stub apply; the underlying file is deleted by the
/// retention sweep once older than `retention_days`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BackupRecord {
    /// When the backup was written.
    pub timestamp: DateTime<Utc>,
    /// Identifies the single stub or batch this record mirrors.
    pub id: BackupId,
    /// Size of the written (possibly compressed) payload, in bytes.
    pub bytes: u64,
    /// File path relative to the backup store's root, for a later
    /// [`crate`]-external caller to resolve back into a full path to restore.
    pub relative_path: String,
}
