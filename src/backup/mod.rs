//! Point-in-time snapshots of mutable site state
//!
//! Every implementation step is preceded by a snapshot, and every rollback
//! by another one. Snapshots are soft-deleted only.

mod payload;
mod store;

pub use payload::{ContentSnapshot, SettingsSnapshot, SnapshotDocument, FORMAT_VERSION};
pub use store::{BackupPolicy, BackupStore, DEFAULT_META_PREFIXES, DEFAULT_OPTION_PREFIX};

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// What a backup captures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupKind {
    /// Posts, pages and their SEO metadata
    Content,
    /// Plugin configuration and provider settings
    Settings,
    /// Content, settings and site identity
    Full,
}

impl BackupKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupKind::Content => "content",
            BackupKind::Settings => "settings",
            BackupKind::Full => "full",
        }
    }

    fn includes_content(&self) -> bool {
        matches!(self, BackupKind::Content | BackupKind::Full)
    }

    fn includes_settings(&self) -> bool {
        matches!(self, BackupKind::Settings | BackupKind::Full)
    }
}

impl std::fmt::Display for BackupKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackupKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "content" => Ok(BackupKind::Content),
            "settings" => Ok(BackupKind::Settings),
            "full" => Ok(BackupKind::Full),
            other => Err(PipelineError::InvalidType(format!(
                "unknown backup type '{}' (expected content, settings or full)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupStatus {
    Active,
    Deleted,
}

impl BackupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupStatus::Active => "active",
            BackupStatus::Deleted => "deleted",
        }
    }
}

impl std::fmt::Display for BackupStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackupStatus {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(BackupStatus::Active),
            "deleted" => Ok(BackupStatus::Deleted),
            other => Err(PipelineError::Validation(format!(
                "unknown backup status '{}'",
                other
            ))),
        }
    }
}

/// Listing view of a backup, without its payload
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackupSummary {
    pub id: i64,
    pub name: String,
    pub kind: BackupKind,
    pub size: usize,
    pub checksum: String,
    pub description: String,
    pub status: BackupStatus,
    pub created_at: String,
}

/// A stored backup with its serialised payload
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Backup {
    #[serde(flatten)]
    pub summary: BackupSummary,
    pub data: String,
}

/// Result of creating a backup
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreatedBackup {
    pub id: i64,
    pub name: String,
    pub size: usize,
}

/// Entity ids a scoped content backup is limited to
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackupScope {
    pub entity_ids: Vec<i64>,
    /// Meta keys captured for the scoped entities regardless of prefix
    pub extra_meta_keys: Vec<String>,
}

impl BackupScope {
    pub fn entities(ids: impl IntoIterator<Item = i64>) -> Self {
        Self {
            entity_ids: ids.into_iter().collect(),
            extra_meta_keys: Vec::new(),
        }
    }

    pub fn with_meta_key(mut self, key: &str) -> Self {
        self.extra_meta_keys.push(key.to_string());
        self
    }
}

/// One row that could not be restored
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RestoreRowFailure {
    /// Row label, e.g. `entity 5` or `option blogname`
    pub row: String,
    pub error: String,
}

/// Outcome of a rollback
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RollbackReport {
    pub backup_id: i64,
    pub backup_kind: BackupKind,
    pub pre_rollback_backup_id: i64,
    pub restored_rows: usize,
    pub failed_rows: Vec<RestoreRowFailure>,
}

impl RollbackReport {
    pub fn is_complete(&self) -> bool {
        self.failed_rows.is_empty()
    }
}
