//! Backup creation, listing and rollback

use super::payload::{checksum, ContentSnapshot, SettingsSnapshot, SnapshotDocument};
use super::{
    Backup, BackupKind, BackupScope, BackupSummary, CreatedBackup, RestoreRowFailure,
    RollbackReport,
};
use crate::audit::{AuditLog, AuditStatus, NewAuditEntry};
use crate::error::{not_found_error, validation_error, PipelineError, Result};
use crate::site::{ContentStore, EntityKind, MetaRow, ProviderRegistry};
use crate::storage::{now_timestamp, timestamp_days_ago, Database};
use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use std::collections::{BTreeMap, HashSet};

/// Meta key prefixes captured by content backups unless configured otherwise
pub const DEFAULT_META_PREFIXES: &[&str] = &["_seopilot_", "_wp_attachment_image_alt"];

/// Default prefix of the plugin's own site options
pub const DEFAULT_OPTION_PREFIX: &str = "seopilot_";

/// What a backup captures from the content store
#[derive(Debug, Clone, PartialEq)]
pub struct BackupPolicy {
    /// Metadata keys are captured only when they start with one of these
    pub meta_prefixes: Vec<String>,
    /// Site options with this prefix belong to the plugin
    pub option_prefix: String,
    /// Extra options captured by settings backups
    pub settings_options: Vec<String>,
}

impl Default for BackupPolicy {
    fn default() -> Self {
        Self {
            meta_prefixes: DEFAULT_META_PREFIXES.iter().map(|p| p.to_string()).collect(),
            option_prefix: DEFAULT_OPTION_PREFIX.to_string(),
            settings_options: Vec::new(),
        }
    }
}

impl BackupPolicy {
    /// Add the key namespaces and settings options of registered providers
    pub fn with_providers(mut self, providers: &ProviderRegistry) -> Self {
        for prefix in providers.meta_prefixes() {
            if !self.meta_prefixes.contains(&prefix) {
                self.meta_prefixes.push(prefix);
            }
        }
        for option in providers.settings_options() {
            if !self.settings_options.contains(&option) {
                self.settings_options.push(option);
            }
        }
        self
    }
}

const SUMMARY_COLUMNS: &str =
    "id, backup_name, backup_type, backup_size, checksum, description, status, created_at";

/// Snapshot store over the `backups` table
pub struct BackupStore<'a> {
    db: &'a Database,
    store: &'a dyn ContentStore,
    policy: BackupPolicy,
    audit: AuditLog<'a>,
}

impl<'a> BackupStore<'a> {
    pub fn new(db: &'a Database, store: &'a dyn ContentStore, policy: BackupPolicy) -> Self {
        Self {
            db,
            store,
            policy,
            audit: AuditLog::new(db),
        }
    }

    pub fn policy(&self) -> &BackupPolicy {
        &self.policy
    }

    // ==================== Creation ====================

    /// Capture and store a snapshot of the given kind
    pub fn create_backup(&self, kind: BackupKind, description: &str) -> Result<CreatedBackup> {
        let doc = self.capture(kind, None)?;
        self.persist(&doc, description)
    }

    /// Content backup limited to the entities in `scope`
    pub fn create_scoped_backup(&self, scope: &BackupScope, description: &str) -> Result<CreatedBackup> {
        let doc = self.capture(BackupKind::Content, Some(scope))?;
        self.persist(&doc, description)
    }

    fn capture(&self, kind: BackupKind, scope: Option<&BackupScope>) -> Result<SnapshotDocument> {
        let mut doc = SnapshotDocument::new(kind, now_timestamp());

        if kind.includes_content() {
            doc.content = Some(match scope {
                Some(scope) => self.capture_scoped_content(scope)?,
                None => self.capture_content()?,
            });
        }
        if kind.includes_settings() {
            doc.settings = Some(self.capture_settings()?);
        }
        if kind == BackupKind::Full {
            doc.site = Some(self.store.site_identity()?);
        }

        Ok(doc)
    }

    fn capture_content(&self) -> Result<ContentSnapshot> {
        Ok(ContentSnapshot {
            entities: self
                .store
                .list_entities(&[EntityKind::Post, EntityKind::Page])?,
            meta: self.store.list_meta(&self.policy.meta_prefixes)?,
        })
    }

    fn capture_scoped_content(&self, scope: &BackupScope) -> Result<ContentSnapshot> {
        let mut entities = Vec::new();
        for &id in &scope.entity_ids {
            match self.store.get_entity(id) {
                Ok(entity) => entities.push(entity),
                // Missing targets surface later as NotFound from the updater
                Err(PipelineError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }

        let ids: HashSet<i64> = scope.entity_ids.iter().copied().collect();
        let mut meta: Vec<_> = self
            .store
            .list_meta(&self.policy.meta_prefixes)?
            .into_iter()
            .filter(|row| ids.contains(&row.entity_id))
            .collect();

        for key in &scope.extra_meta_keys {
            for &id in &scope.entity_ids {
                if meta.iter().any(|row| row.entity_id == id && &row.key == key) {
                    continue;
                }
                if let Some(value) = self.store.get_meta(id, key)? {
                    meta.push(MetaRow {
                        entity_id: id,
                        key: key.clone(),
                        value,
                    });
                }
            }
        }

        Ok(ContentSnapshot { entities, meta })
    }

    fn capture_settings(&self) -> Result<SettingsSnapshot> {
        let mut options: BTreeMap<String, serde_json::Value> = self
            .store
            .list_options(&self.policy.option_prefix)?
            .into_iter()
            .collect();

        for name in &self.policy.settings_options {
            if let Some(value) = self.store.get_option(name)? {
                options.insert(name.clone(), value);
            }
        }

        Ok(SettingsSnapshot { options })
    }

    fn persist(&self, doc: &SnapshotDocument, description: &str) -> Result<CreatedBackup> {
        let data = doc.encode()?;
        let size = data.len();
        let sum = checksum(&data);
        let name = format!(
            "seopilot_backup_{}_{}",
            doc.kind,
            Utc::now().format("%Y-%m-%d_%H-%M-%S")
        );

        let id = self.db.transaction(|tx| {
            tx.execute(
                r#"
                INSERT INTO backups (
                    backup_name, backup_type, backup_data, backup_size,
                    checksum, description, status, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'active', ?7)
                "#,
                params![
                    name,
                    doc.kind.as_str(),
                    data,
                    size as i64,
                    sum,
                    description,
                    now_timestamp(),
                ],
            )?;
            let id = tx.last_insert_rowid();

            self.audit.log_change(
                NewAuditEntry::new(
                    "backup_created",
                    id,
                    AuditStatus::Success,
                    &format!("Created {} backup {} ({} bytes)", doc.kind, name, size),
                )
                .with_field(Some("backup".to_string())),
            )?;
            Ok(id)
        })?;

        tracing::info!(id, kind = %doc.kind, size, rows = doc.row_count(), "Created backup");
        Ok(CreatedBackup { id, name, size })
    }

    // ==================== Rollback ====================

    /// Restore the state captured by an active backup.
    ///
    /// A "pre-rollback" backup is taken first. It is a full capture widened
    /// to every row the restore is about to overwrite, so it can undo the
    /// rollback even when the restored backup was scoped. Rows are restored
    /// one by one; failures are collected in the report instead of aborting.
    /// Fails with `RestoreFailure` only when no row could be restored.
    pub fn rollback_to_backup(&self, backup_id: i64) -> Result<RollbackReport> {
        let backup = self.get_active(backup_id)?;

        if checksum(&backup.data) != backup.summary.checksum {
            return Err(PipelineError::RestoreFailure(format!(
                "Backup {} failed its checksum",
                backup_id
            )));
        }
        let doc = SnapshotDocument::decode(&backup.data)?;

        let pre_doc = self.capture_overwritten(&doc)?;
        let pre = self.persist(
            &pre_doc,
            &format!("Pre-rollback backup (restoring backup {})", backup_id),
        )?;

        let mut report = RollbackReport {
            backup_id,
            backup_kind: backup.summary.kind,
            pre_rollback_backup_id: pre.id,
            restored_rows: 0,
            failed_rows: Vec::new(),
        };
        self.restore(&doc, &mut report);

        let status = if report.is_complete() {
            AuditStatus::Success
        } else {
            AuditStatus::Failed
        };
        self.audit.log_change(
            NewAuditEntry::new(
                "rollback_performed",
                backup_id,
                status,
                &format!(
                    "Rolled back to {} backup {}: {} rows restored, {} failed",
                    backup.summary.kind,
                    backup_id,
                    report.restored_rows,
                    report.failed_rows.len()
                ),
            )
            .with_field(Some("backup".to_string())),
        )?;

        if report.restored_rows == 0 && !report.failed_rows.is_empty() {
            return Err(PipelineError::RestoreFailure(format!(
                "No rows of backup {} could be restored ({} failed)",
                backup_id,
                report.failed_rows.len()
            )));
        }

        if report.is_complete() {
            tracing::info!(backup_id, rows = report.restored_rows, "Rollback complete");
        } else {
            tracing::warn!(
                backup_id,
                restored = report.restored_rows,
                failed = report.failed_rows.len(),
                "Rollback partially failed"
            );
        }
        Ok(report)
    }

    /// Full capture plus the current value of every row `doc` restores
    fn capture_overwritten(&self, doc: &SnapshotDocument) -> Result<SnapshotDocument> {
        let mut pre = self.capture(BackupKind::Full, None)?;

        if let Some(ref content) = doc.content {
            let current = pre.content.get_or_insert_with(ContentSnapshot::default);
            for entity in &content.entities {
                if current.entities.iter().any(|e| e.id == entity.id) {
                    continue;
                }
                match self.store.get_entity(entity.id) {
                    Ok(found) => current.entities.push(found),
                    Err(PipelineError::NotFound(_)) => continue,
                    Err(e) => return Err(e),
                }
            }
            for row in &content.meta {
                if current
                    .meta
                    .iter()
                    .any(|m| m.entity_id == row.entity_id && m.key == row.key)
                {
                    continue;
                }
                if let Some(value) = self.store.get_meta(row.entity_id, &row.key)? {
                    current.meta.push(MetaRow {
                        entity_id: row.entity_id,
                        key: row.key.clone(),
                        value,
                    });
                }
            }
        }

        if let Some(ref settings) = doc.settings {
            let current = pre.settings.get_or_insert_with(SettingsSnapshot::default);
            for name in settings.options.keys() {
                if current.options.contains_key(name) {
                    continue;
                }
                if let Some(value) = self.store.get_option(name)? {
                    current.options.insert(name.clone(), value);
                }
            }
        }

        Ok(pre)
    }

    fn restore(&self, doc: &SnapshotDocument, report: &mut RollbackReport) {
        let mut record = |row: String, outcome: Result<()>| match outcome {
            Ok(()) => report.restored_rows += 1,
            Err(e) => report.failed_rows.push(RestoreRowFailure {
                row,
                error: e.to_string(),
            }),
        };

        if let Some(ref content) = doc.content {
            for entity in &content.entities {
                record(format!("entity {}", entity.id), self.store.restore_entity(entity));
            }
            for meta in &content.meta {
                record(
                    format!("meta {}/{}", meta.entity_id, meta.key),
                    self.store.set_meta(meta.entity_id, &meta.key, &meta.value),
                );
            }
        }

        if let Some(ref settings) = doc.settings {
            for (name, value) in &settings.options {
                record(format!("option {}", name), self.store.set_option(name, value));
            }
        }
    }

    // ==================== Queries ====================

    /// Get a backup by id, whatever its status
    pub fn get_backup(&self, id: i64) -> Result<Backup> {
        let sql = format!(
            "SELECT {}, backup_data FROM backups WHERE id = ?1",
            SUMMARY_COLUMNS
        );
        let row = self
            .db
            .conn()
            .query_row(&sql, params![id], |row| {
                Ok((BackupRow::from_row(row)?, row.get::<_, String>(8)?))
            })
            .optional()?;

        match row {
            Some((summary, data)) => Ok(Backup {
                summary: summary.into_summary()?,
                data,
            }),
            None => Err(not_found_error(format!("Backup {} not found", id))),
        }
    }

    fn get_active(&self, id: i64) -> Result<Backup> {
        let backup = self.get_backup(id)?;
        if backup.summary.status != super::BackupStatus::Active {
            return Err(not_found_error(format!("Backup {} has been deleted", id)));
        }
        Ok(backup)
    }

    /// Active backups, newest first
    pub fn get_backups(&self, limit: usize, offset: usize) -> Result<Vec<BackupSummary>> {
        let sql = format!(
            r#"
            SELECT {} FROM backups
            WHERE status = 'active'
            ORDER BY created_at DESC, id DESC
            LIMIT ?1 OFFSET ?2
            "#,
            SUMMARY_COLUMNS
        );
        let mut stmt = self.db.conn().prepare(&sql)?;
        let rows = stmt.query_map(params![limit as i64, offset as i64], BackupRow::from_row)?;

        let mut backups = Vec::new();
        for row in rows {
            backups.push(row?.into_summary()?);
        }
        Ok(backups)
    }

    /// Number of active backups
    pub fn backup_count(&self) -> Result<usize> {
        let n: i64 = self.db.conn().query_row(
            "SELECT COUNT(*) FROM backups WHERE status = 'active'",
            [],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }

    /// Whether the stored payload still matches its checksum
    pub fn verify_backup(&self, id: i64) -> Result<bool> {
        let backup = self.get_backup(id)?;
        Ok(checksum(&backup.data) == backup.summary.checksum)
    }

    // ==================== Retention ====================

    /// Soft-delete one backup
    pub fn delete_backup(&self, id: i64) -> Result<()> {
        let updated = self.db.conn().execute(
            "UPDATE backups SET status = 'deleted' WHERE id = ?1 AND status = 'active'",
            params![id],
        )?;
        if updated == 0 {
            return Err(not_found_error(format!("No active backup {}", id)));
        }
        tracing::info!(id, "Deleted backup");
        Ok(())
    }

    /// Soft-delete active backups older than `days` days; `days` must be positive
    pub fn cleanup_old_backups(&self, days: u32) -> Result<usize> {
        if days == 0 {
            return Err(validation_error(
                "Backup retention must be at least 1 day",
            ));
        }
        let cutoff = timestamp_days_ago(days);
        let deleted = self.db.conn().execute(
            "UPDATE backups SET status = 'deleted' WHERE status = 'active' AND created_at < ?1",
            params![cutoff],
        )?;
        tracing::info!(deleted, days, "Cleaned up old backups");
        Ok(deleted)
    }
}

// Internal row type for database mapping

struct BackupRow {
    id: i64,
    name: String,
    kind: String,
    size: i64,
    checksum: String,
    description: String,
    status: String,
    created_at: String,
}

impl BackupRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            kind: row.get(2)?,
            size: row.get(3)?,
            checksum: row.get(4)?,
            description: row.get(5)?,
            status: row.get(6)?,
            created_at: row.get(7)?,
        })
    }

    fn into_summary(self) -> Result<BackupSummary> {
        Ok(BackupSummary {
            id: self.id,
            name: self.name,
            kind: self.kind.parse()?,
            size: self.size as usize,
            checksum: self.checksum,
            description: self.description,
            status: self.status.parse()?,
            created_at: self.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::site::testing::FaultyStore;
    use crate::site::{Entity, EntityField, MetaKeyProvider, SqliteContentStore};

    fn seed(db: &Database) {
        let store = SqliteContentStore::new(db);
        store
            .upsert_entity(&Entity::new(1, EntityKind::Post, "Old Post").with_body("<p>Body</p>"))
            .unwrap();
        store
            .upsert_entity(&Entity::new(2, EntityKind::Page, "About"))
            .unwrap();
        store
            .upsert_entity(&Entity::new(3, EntityKind::Attachment, "hero.png"))
            .unwrap();
        store.set_meta(1, "_yoast_wpseo_metadesc", "Old description").unwrap();
        store.set_meta(1, "_edit_lock", "1700000000:1").unwrap();
        store.set_meta(3, "_wp_attachment_image_alt", "hero").unwrap();
        store
            .set_option("seopilot_automation_enabled", &serde_json::json!(true))
            .unwrap();
        store
            .set_option("wpseo_titles", &serde_json::json!({"separator": "-"}))
            .unwrap();
        store
            .set_option("blogname", &serde_json::json!("Example"))
            .unwrap();
    }

    fn policy() -> BackupPolicy {
        let mut providers = ProviderRegistry::new();
        providers.register(Box::new(MetaKeyProvider::yoast()));
        BackupPolicy::default().with_providers(&providers)
    }

    fn decode(backups: &BackupStore<'_>, id: i64) -> SnapshotDocument {
        SnapshotDocument::decode(&backups.get_backup(id).unwrap().data).unwrap()
    }

    #[test]
    fn test_content_backup_filters_meta() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);
        let store = SqliteContentStore::new(&db);
        let backups = BackupStore::new(&db, &store, policy());

        let created = backups.create_backup(BackupKind::Content, "test").unwrap();
        assert!(created.name.starts_with("seopilot_backup_content_"));
        assert!(created.size > 0);

        let doc = decode(&backups, created.id);
        let content = doc.content.unwrap();
        let ids: Vec<i64> = content.entities.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert!(content.meta.iter().any(|m| m.key == "_yoast_wpseo_metadesc"));
        assert!(content.meta.iter().all(|m| m.key != "_edit_lock"));
        assert!(doc.settings.is_none());
        assert!(doc.site.is_none());
    }

    #[test]
    fn test_settings_and_full_backups() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);
        let store = SqliteContentStore::new(&db);
        let backups = BackupStore::new(&db, &store, policy());

        let settings = backups.create_backup(BackupKind::Settings, "").unwrap();
        let options = decode(&backups, settings.id).settings.unwrap().options;
        assert!(options.contains_key("seopilot_automation_enabled"));
        assert!(options.contains_key("wpseo_titles"));
        assert!(!options.contains_key("blogname"));

        let full = backups.create_backup(BackupKind::Full, "").unwrap();
        let doc = decode(&backups, full.id);
        assert!(doc.content.is_some());
        assert!(doc.settings.is_some());
        assert_eq!(doc.site.unwrap().name, "Example");
    }

    #[test]
    fn test_scoped_backup() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);
        let store = SqliteContentStore::new(&db);
        store.set_meta(1, "subtitle", "kept").unwrap();
        let backups = BackupStore::new(&db, &store, policy());

        let scope = BackupScope::entities([1, 3, 99]).with_meta_key("subtitle");
        let created = backups.create_scoped_backup(&scope, "scoped").unwrap();
        let content = decode(&backups, created.id).content.unwrap();

        let ids: Vec<i64> = content.entities.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert!(content.meta.iter().all(|m| m.entity_id == 1 || m.entity_id == 3));
        assert!(content.meta.iter().any(|m| m.key == "_wp_attachment_image_alt"));
        assert!(content.meta.iter().any(|m| m.key == "subtitle"));
    }

    #[test]
    fn test_round_trip_restores_exact_values() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);
        let store = SqliteContentStore::new(&db);
        let backups = BackupStore::new(&db, &store, policy());

        let before = store.get_entity(1).unwrap();
        let created = backups.create_backup(BackupKind::Content, "").unwrap();

        store
            .update_entity_field(1, EntityField::Title, "Changed")
            .unwrap();
        store
            .update_entity_field(1, EntityField::Body, "<p>Other</p>")
            .unwrap();
        store.set_meta(1, "_yoast_wpseo_metadesc", "Changed").unwrap();

        let report = backups.rollback_to_backup(created.id).unwrap();
        assert!(report.is_complete());
        assert_eq!(store.get_entity(1).unwrap(), before);
        assert_eq!(
            store.get_meta(1, "_yoast_wpseo_metadesc").unwrap().as_deref(),
            Some("Old description")
        );
    }

    #[test]
    fn test_rollback_takes_pre_rollback_backup() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);
        let store = SqliteContentStore::new(&db);
        let backups = BackupStore::new(&db, &store, policy());

        let created = backups.create_backup(BackupKind::Content, "").unwrap();
        let report = backups.rollback_to_backup(created.id).unwrap();

        assert_eq!(backups.backup_count().unwrap(), 2);
        let pre = backups.get_backup(report.pre_rollback_backup_id).unwrap();
        assert_eq!(pre.summary.kind, BackupKind::Full);
        assert!(pre.summary.description.starts_with("Pre-rollback backup"));
        assert!(pre.summary.id > created.id);

        let events = AuditLog::new(&db)
            .get_changes_by_type("rollback_performed", 10)
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].target_id, created.id);
    }

    #[test]
    fn test_pre_rollback_backup_undoes_scoped_rollback() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);
        let store = SqliteContentStore::new(&db);
        let backups = BackupStore::new(&db, &store, policy());

        store.set_meta(1, "subtitle", "original").unwrap();
        store.set_meta(3, "caption", "old caption").unwrap();
        let scope = BackupScope::entities([1, 3])
            .with_meta_key("subtitle")
            .with_meta_key("caption");
        let scoped = backups.create_scoped_backup(&scope, "scoped").unwrap();

        store.set_meta(1, "subtitle", "later edit").unwrap();
        store.set_meta(3, "caption", "new caption").unwrap();
        store
            .update_entity_field(3, EntityField::Title, "hero-final.png")
            .unwrap();

        let report = backups.rollback_to_backup(scoped.id).unwrap();
        assert!(report.is_complete());
        assert_eq!(store.get_meta(1, "subtitle").unwrap().as_deref(), Some("original"));
        assert_eq!(store.get_entity(3).unwrap().title, "hero.png");

        // Undo the rollback
        let undo = backups
            .rollback_to_backup(report.pre_rollback_backup_id)
            .unwrap();
        assert!(undo.is_complete());
        assert_eq!(
            store.get_meta(1, "subtitle").unwrap().as_deref(),
            Some("later edit")
        );
        assert_eq!(
            store.get_meta(3, "caption").unwrap().as_deref(),
            Some("new caption")
        );
        assert_eq!(store.get_entity(3).unwrap().title, "hero-final.png");
    }

    #[test]
    fn test_pre_rollback_backup_covers_restored_options() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);
        let store = SqliteContentStore::new(&db);
        let backups = BackupStore::new(&db, &store, policy());

        let settings = backups.create_backup(BackupKind::Settings, "").unwrap();
        store
            .set_option("wpseo_titles", &serde_json::json!({"separator": "|"}))
            .unwrap();

        let report = backups.rollback_to_backup(settings.id).unwrap();
        let pre = decode(&backups, report.pre_rollback_backup_id);
        assert_eq!(
            pre.settings.unwrap().options["wpseo_titles"],
            serde_json::json!({"separator": "|"})
        );
    }

    #[test]
    fn test_failed_entity_restore_leaves_row_untouched() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);
        let store = SqliteContentStore::new(&db);
        let backups = BackupStore::new(&db, &store, policy());

        let created = backups.create_backup(BackupKind::Content, "").unwrap();
        store
            .update_entity_field(1, EntityField::Title, "Edited")
            .unwrap();
        store
            .update_entity_field(1, EntityField::Slug, "edited")
            .unwrap();
        db.conn()
            .execute_batch(
                r#"
                CREATE TRIGGER lock_slug BEFORE UPDATE ON entities
                WHEN NEW.id = 1 AND NEW.slug <> OLD.slug
                BEGIN SELECT RAISE(ABORT, 'slug locked'); END;
                "#,
            )
            .unwrap();

        let report = backups.rollback_to_backup(created.id).unwrap();
        assert_eq!(report.failed_rows.len(), 1);
        assert_eq!(report.failed_rows[0].row, "entity 1");

        let entity = store.get_entity(1).unwrap();
        assert_eq!(entity.title, "Edited");
        assert_eq!(entity.slug, "edited");
    }

    #[test]
    fn test_rollback_missing_or_deleted() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);
        let store = SqliteContentStore::new(&db);
        let backups = BackupStore::new(&db, &store, policy());

        assert!(matches!(
            backups.rollback_to_backup(42),
            Err(PipelineError::NotFound(_))
        ));

        let created = backups.create_backup(BackupKind::Content, "").unwrap();
        backups.delete_backup(created.id).unwrap();
        assert!(matches!(
            backups.rollback_to_backup(created.id),
            Err(PipelineError::NotFound(_))
        ));
        // No pre-rollback backup was taken
        assert_eq!(backups.backup_count().unwrap(), 0);
    }

    #[test]
    fn test_partial_restore_is_reported() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);
        let mut store = FaultyStore::new(&db);
        let created = BackupStore::new(&db, &store, policy())
            .create_backup(BackupKind::Content, "")
            .unwrap();

        store.fail_update_for = Some(2);
        let backups = BackupStore::new(&db, &store, policy());
        let report = backups.rollback_to_backup(created.id).unwrap();

        assert_eq!(report.failed_rows.len(), 1);
        assert_eq!(report.failed_rows[0].row, "entity 2");
        assert!(report.restored_rows >= 2);
    }

    #[test]
    fn test_total_restore_failure() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);
        let mut store = FaultyStore::new(&db);
        let created = BackupStore::new(&db, &store, policy())
            .create_backup(BackupKind::Content, "")
            .unwrap();

        store.fail_all_updates = true;
        store.fail_meta_writes = true;
        let backups = BackupStore::new(&db, &store, policy());
        assert!(matches!(
            backups.rollback_to_backup(created.id),
            Err(PipelineError::RestoreFailure(_))
        ));
    }

    #[test]
    fn test_delete_and_cleanup_are_soft() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);
        let store = SqliteContentStore::new(&db);
        let backups = BackupStore::new(&db, &store, policy());

        let old = backups.create_backup(BackupKind::Settings, "old").unwrap();
        let fresh = backups.create_backup(BackupKind::Settings, "fresh").unwrap();
        db.conn()
            .execute(
                "UPDATE backups SET created_at = '2000-01-01T00:00:00.000000Z' WHERE id = ?1",
                params![old.id],
            )
            .unwrap();

        assert!(matches!(
            backups.cleanup_old_backups(0),
            Err(PipelineError::Validation(_))
        ));
        assert_eq!(backups.backup_count().unwrap(), 2);

        assert_eq!(backups.cleanup_old_backups(30).unwrap(), 1);
        assert_eq!(backups.backup_count().unwrap(), 1);
        assert_eq!(
            backups.get_backup(old.id).unwrap().summary.status,
            super::super::BackupStatus::Deleted
        );

        backups.delete_backup(fresh.id).unwrap();
        assert!(matches!(
            backups.delete_backup(fresh.id),
            Err(PipelineError::NotFound(_))
        ));
        let rows: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM backups", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 2);
    }

    #[test]
    fn test_listing_and_verification() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);
        let store = SqliteContentStore::new(&db);
        let backups = BackupStore::new(&db, &store, policy());

        let first = backups.create_backup(BackupKind::Content, "").unwrap();
        let second = backups.create_backup(BackupKind::Settings, "").unwrap();

        let listed = backups.get_backups(10, 0).unwrap();
        assert_eq!(listed[0].id, second.id);
        assert_eq!(listed[1].id, first.id);

        assert!(backups.verify_backup(first.id).unwrap());
        db.conn()
            .execute(
                "UPDATE backups SET backup_data = '{}' WHERE id = ?1",
                params![first.id],
            )
            .unwrap();
        assert!(!backups.verify_backup(first.id).unwrap());
        assert!(matches!(
            backups.rollback_to_backup(first.id),
            Err(PipelineError::RestoreFailure(_))
        ));
    }

    #[test]
    fn test_creation_is_audited() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);
        let store = SqliteContentStore::new(&db);
        let backups = BackupStore::new(&db, &store, policy());

        let created = backups.create_backup(BackupKind::Full, "").unwrap();
        let events = AuditLog::new(&db)
            .get_changes_by_type("backup_created", 10)
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].target_id, created.id);
        assert_eq!(events[0].field.as_deref(), Some("backup"));
    }
}
