//! Versioned snapshot document stored in `backups.backup_data`

use super::BackupKind;
use crate::error::{PipelineError, Result};
use crate::site::{Entity, MetaRow, SiteIdentity};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Current snapshot format; older versions stay readable
pub const FORMAT_VERSION: u32 = 1;

/// Serialised form of one backup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotDocument {
    pub format_version: u32,
    pub kind: BackupKind,
    pub captured_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<ContentSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<SettingsSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site: Option<SiteIdentity>,
}

/// Entities and their prefix-filtered metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentSnapshot {
    pub entities: Vec<Entity>,
    pub meta: Vec<MetaRow>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsSnapshot {
    pub options: BTreeMap<String, serde_json::Value>,
}

impl SnapshotDocument {
    pub fn new(kind: BackupKind, captured_at: String) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            kind,
            captured_at,
            content: None,
            settings: None,
            site: None,
        }
    }

    /// Number of rows a restore would write
    pub fn row_count(&self) -> usize {
        let content = self
            .content
            .as_ref()
            .map(|c| c.entities.len() + c.meta.len())
            .unwrap_or(0);
        let settings = self.settings.as_ref().map(|s| s.options.len()).unwrap_or(0);
        content + settings
    }

    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a stored payload, refusing formats newer than this build
    pub fn decode(raw: &str) -> Result<Self> {
        let doc: SnapshotDocument = serde_json::from_str(raw)
            .map_err(|e| PipelineError::RestoreFailure(format!("unreadable snapshot: {}", e)))?;

        if doc.format_version == 0 || doc.format_version > FORMAT_VERSION {
            return Err(PipelineError::RestoreFailure(format!(
                "unsupported snapshot format version {} (this build reads up to {})",
                doc.format_version, FORMAT_VERSION
            )));
        }
        Ok(doc)
    }
}

/// Hex SHA-256 of a payload
pub fn checksum(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::site::EntityKind;

    #[test]
    fn test_decode_rejects_future_version() {
        let mut doc = SnapshotDocument::new(BackupKind::Content, "t".into());
        doc.format_version = FORMAT_VERSION + 1;
        let raw = serde_json::to_string(&doc).unwrap();

        assert!(matches!(
            SnapshotDocument::decode(&raw),
            Err(PipelineError::RestoreFailure(_))
        ));
        assert!(SnapshotDocument::decode("not json").is_err());
    }

    #[test]
    fn test_row_count() {
        let mut doc = SnapshotDocument::new(BackupKind::Full, "t".into());
        doc.content = Some(ContentSnapshot {
            entities: vec![Entity::new(1, EntityKind::Post, "A")],
            meta: vec![MetaRow {
                entity_id: 1,
                key: "_yoast_wpseo_title".into(),
                value: "A".into(),
            }],
        });
        doc.settings = Some(SettingsSnapshot {
            options: BTreeMap::from([("blogname".to_string(), serde_json::json!("x"))]),
        });
        assert_eq!(doc.row_count(), 3);

        let decoded = SnapshotDocument::decode(&doc.encode().unwrap()).unwrap();
        assert_eq!(decoded, doc);
    }

    #[test]
    fn test_checksum_is_stable_hex() {
        let sum = checksum("payload");
        assert_eq!(sum.len(), 64);
        assert_eq!(sum, checksum("payload"));
        assert_ne!(sum, checksum("payload2"));
    }
}
