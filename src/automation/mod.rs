//! Backup-guarded implementation of approved changes
//!
//! Each change in a batch gets its own backup and its own fate:
//!
//! 1. scoped content backup of the target (skip and fail if this fails)
//! 2. dispatch through the [`ContentUpdater`]
//! 3. mark implemented with the backup id, or mark failed
//!
//! Failed changes are never rolled back automatically. Their backup stays
//! active for an operator-triggered rollback.

use crate::backup::{BackupPolicy, BackupScope, BackupStore};
use crate::error::{PipelineError, Result};
use crate::review::{ApprovalWorkflow, Change, ChangeWithRecommendation};
use crate::site::{Actor, ContentStore, ProviderRegistry};
use crate::storage::Database;
use crate::updater::{sanitize, ChangeDescriptor, ChangeKind, ContentUpdater};
use serde::Serialize;

/// Default number of approved changes pulled per invocation
pub const DEFAULT_BATCH_LIMIT: usize = 50;

/// Outcome of one change in a batch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeResult {
    pub change_id: i64,
    pub recommendation_id: i64,
    pub change_type: String,
    pub target_id: i64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Machine-readable error kind
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    pub backup_id: Option<i64>,
}

impl ChangeResult {
    fn new(change: &Change) -> Self {
        Self {
            change_id: change.id,
            recommendation_id: change.recommendation_id,
            change_type: change.change_type.clone(),
            target_id: change.target_id,
            success: false,
            message: None,
            error: None,
            error_kind: None,
            backup_id: None,
        }
    }

    fn succeeded(mut self, message: String) -> Self {
        self.success = true;
        self.message = Some(message);
        self
    }

    fn failed(mut self, error: &PipelineError) -> Self {
        self.success = false;
        self.error = Some(error.to_string());
        self.error_kind = Some(error.kind().to_string());
        self
    }
}

/// Aggregate result of one batch
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImplementationReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub results: Vec<ChangeResult>,
}

impl ImplementationReport {
    fn push(&mut self, result: ChangeResult) {
        self.attempted += 1;
        if result.success {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        self.results.push(result);
    }

    /// Nothing was attempted
    pub fn is_empty(&self) -> bool {
        self.attempted == 0
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }

    pub fn all_failed(&self) -> bool {
        self.attempted > 0 && self.succeeded == 0
    }
}

/// Implements approved changes one at a time
pub struct AutomationEngine<'a> {
    workflow: ApprovalWorkflow<'a>,
    backups: BackupStore<'a>,
    updater: ContentUpdater<'a>,
    batch_limit: usize,
}

impl<'a> AutomationEngine<'a> {
    pub fn new(
        db: &'a Database,
        store: &'a dyn ContentStore,
        providers: &'a ProviderRegistry,
        policy: BackupPolicy,
        actor: Actor,
    ) -> Self {
        Self {
            workflow: ApprovalWorkflow::new(db, actor),
            backups: BackupStore::new(db, store, policy),
            updater: ContentUpdater::new(db, store, providers, actor),
            batch_limit: DEFAULT_BATCH_LIMIT,
        }
    }

    /// Bound the number of changes one invocation pulls
    pub fn with_batch_limit(mut self, limit: usize) -> Self {
        self.batch_limit = limit.max(1);
        self
    }

    /// Implement approved, pending changes oldest first.
    ///
    /// `change_ids` restricts the batch. An empty queue is a normal,
    /// successful outcome.
    pub fn implement_approved_changes(&self, change_ids: Option<&[i64]>) -> Result<ImplementationReport> {
        let queue = match change_ids {
            Some(ids) => self
                .workflow
                .get_approved_changes_by_id(ids, self.batch_limit)?,
            None => self.workflow.get_approved_changes(self.batch_limit, 0)?,
        };

        let mut report = ImplementationReport::default();
        if queue.is_empty() {
            tracing::info!("No approved changes to implement");
            return Ok(report);
        }

        tracing::info!(count = queue.len(), "Implementing approved changes");
        for item in &queue {
            report.push(self.implement_one(item));
        }

        tracing::info!(
            attempted = report.attempted,
            succeeded = report.succeeded,
            failed = report.failed,
            "Batch finished"
        );
        Ok(report)
    }

    fn implement_one(&self, item: &ChangeWithRecommendation) -> ChangeResult {
        let change = &item.change;
        let result = ChangeResult::new(change);
        let descriptor = ChangeDescriptor::from_change(change, &item.recommendation);

        let backup = match self.backups.create_scoped_backup(
            &backup_scope(change, descriptor.as_ref().ok()),
            &format!("Before implementing change {}", change.id),
        ) {
            Ok(backup) => backup,
            Err(e) => {
                let error = PipelineError::BackupFailure(format!("change {} skipped: {}", change.id, e));
                self.mark_failed(change.id, &error, None);
                return result.failed(&error);
            }
        };
        let result = ChangeResult {
            backup_id: Some(backup.id),
            ..result
        };

        let applied = match descriptor {
            Ok(descriptor) => self.updater.apply(&descriptor),
            Err(e) => {
                if let Err(log_err) = self.updater.record_rejection(
                    &change.change_type,
                    change.target_id,
                    &change.old_value,
                    &change.new_value,
                    &e,
                ) {
                    tracing::error!(change = change.id, error = %log_err, "Could not audit rejected change");
                }
                Err(e)
            }
        };

        match applied {
            Ok(applied) => match self.workflow.mark_change_implemented(change.id, Some(backup.id)) {
                Ok(()) => {
                    tracing::info!(change = change.id, backup = backup.id, "Change implemented");
                    result.succeeded(format!(
                        "Applied {} to entity {}",
                        applied.kind, applied.target_id
                    ))
                }
                Err(e) => {
                    // Leave the queue so the next run does not apply it twice
                    let message = format!(
                        "applied to entity {} but could not be marked implemented: {}",
                        applied.target_id, e
                    );
                    tracing::error!(change = change.id, error = %e, "Change applied but could not be marked");
                    self.record_failure(change.id, &message, Some(backup.id));
                    ChangeResult {
                        error: Some(message),
                        ..result.failed(&e)
                    }
                }
            },
            Err(e) => {
                self.mark_failed(change.id, &e, Some(backup.id));
                result.failed(&e)
            }
        }
    }

    fn mark_failed(&self, change_id: i64, error: &PipelineError, backup_id: Option<i64>) {
        self.record_failure(change_id, &error.to_string(), backup_id);
    }

    fn record_failure(&self, change_id: i64, message: &str, backup_id: Option<i64>) {
        if let Err(e) = self.workflow.record_failure(change_id, message, backup_id) {
            tracing::error!(change = change_id, error = %e, "Could not record change failure");
        }
    }
}

/// Entities and meta keys a change may touch
fn backup_scope(change: &Change, descriptor: Option<&ChangeDescriptor>) -> BackupScope {
    let mut scope = BackupScope::entities([change.target_id]);
    if let Some(d) = descriptor {
        if d.kind == ChangeKind::ImageAlt {
            if let Some(image_id) = d.image_id {
                scope.entity_ids.push(image_id);
            }
        }
        if d.kind == ChangeKind::CustomField {
            let key = sanitize::key(d.field.as_deref().unwrap_or_default());
            if !key.is_empty() {
                scope = scope.with_meta_key(&key);
            }
        }
    }
    scope
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditFilter, AuditLog, AuditStatus};
    use crate::backup::BackupStatus;
    use crate::review::{ImplementationStatus, NewRecommendation, RecommendationRepository};
    use crate::site::testing::FaultyStore;
    use crate::site::{Entity, EntityKind, SqliteContentStore};

    fn seed(db: &Database) {
        let store = SqliteContentStore::new(db);
        store
            .upsert_entity(&Entity::new(1, EntityKind::Post, "Old Post"))
            .unwrap();
        store
            .upsert_entity(&Entity::new(2, EntityKind::Post, "Second Post"))
            .unwrap();
        store
            .upsert_entity(&Entity::new(3, EntityKind::Attachment, "hero.png"))
            .unwrap();
    }

    fn approve(db: &Database, kind: &str, target_id: i64, current: &str, suggested: &str) -> i64 {
        approve_with_details(db, kind, target_id, current, suggested, "")
    }

    fn approve_with_details(
        db: &Database,
        kind: &str,
        target_id: i64,
        current: &str,
        suggested: &str,
        details: &str,
    ) -> i64 {
        let rec_id = RecommendationRepository::new(db)
            .create(&NewRecommendation {
                recommendation_type: kind.into(),
                target_id,
                target_type: "post".into(),
                current_value: current.into(),
                suggested_value: suggested.into(),
                reasoning: "test".into(),
                confidence_score: 0.85,
                implementation_details: details.into(),
                ..Default::default()
            })
            .unwrap();
        ApprovalWorkflow::new(db, Actor::administrator())
            .approve(rec_id, Some("approved by reviewer notes"))
            .unwrap()
    }

    fn engine<'a>(
        db: &'a Database,
        store: &'a dyn ContentStore,
        providers: &'a ProviderRegistry,
    ) -> AutomationEngine<'a> {
        AutomationEngine::new(
            db,
            store,
            providers,
            BackupPolicy::default().with_providers(providers),
            Actor::administrator(),
        )
    }

    #[test]
    fn test_empty_queue_is_success() {
        let db = Database::open_in_memory().unwrap();
        let store = SqliteContentStore::new(&db);
        let providers = ProviderRegistry::new();

        let report = engine(&db, &store, &providers)
            .implement_approved_changes(None)
            .unwrap();
        assert!(report.is_empty());
        assert!(report.results.is_empty());
    }

    #[test]
    fn test_title_scenario() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);
        let store = SqliteContentStore::new(&db);
        let providers = ProviderRegistry::new();
        let change_id = approve(&db, "title", 1, "Old Post", "Old Post - Complete Guide");

        let report = engine(&db, &store, &providers)
            .implement_approved_changes(None)
            .unwrap();
        assert_eq!(report.attempted, 1);
        assert!(report.all_succeeded());

        let result = &report.results[0];
        assert!(result.success);
        assert_eq!(result.change_id, change_id);

        assert_eq!(store.get_entity(1).unwrap().title, "Old Post - Complete Guide");

        let workflow = ApprovalWorkflow::new(&db, Actor::administrator());
        let change = workflow.get_change(change_id).unwrap();
        assert_eq!(change.implementation_status, ImplementationStatus::Implemented);
        assert_eq!(change.backup_id, result.backup_id);

        let backups = BackupStore::new(&db, &store, BackupPolicy::default());
        let backup = backups.get_backup(change.backup_id.unwrap()).unwrap();
        let audit = AuditLog::new(&db);
        let entries = audit.get_changes_by_type("post_title", 10).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, AuditStatus::Success);
        assert!(backup.summary.created_at <= entries[0].applied_at);
    }

    #[test]
    fn test_failure_is_isolated_and_not_rolled_back() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);
        let mut store = FaultyStore::new(&db);
        store.fail_update_for = Some(1);
        let providers = ProviderRegistry::new();

        let x = approve(&db, "title", 1, "Old Post", "Broken");
        let y = approve(&db, "title", 2, "Second Post", "Second Post, Revised");

        let report = engine(&db, &store, &providers)
            .implement_approved_changes(None)
            .unwrap();
        assert_eq!(report.attempted, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.succeeded, 1);

        let workflow = ApprovalWorkflow::new(&db, Actor::administrator());
        let failed = workflow.get_change(x).unwrap();
        assert_eq!(failed.implementation_status, ImplementationStatus::Failed);
        assert!(failed.error_message.unwrap().contains("injected failure"));

        let backup_id = report.results[0].backup_id.unwrap();
        assert_eq!(failed.backup_id, Some(backup_id));
        let backups = BackupStore::new(&db, &store, BackupPolicy::default());
        assert_eq!(
            backups.get_backup(backup_id).unwrap().summary.status,
            BackupStatus::Active
        );

        assert_eq!(
            workflow.get_change(y).unwrap().implementation_status,
            ImplementationStatus::Implemented
        );
        assert_eq!(store.get_entity(2).unwrap().title, "Second Post, Revised");

        let failures = AuditLog::new(&db)
            .get_logs(
                1,
                20,
                &AuditFilter {
                    change_type: Some("post_title".into()),
                    status: Some(AuditStatus::Failed),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(failures.total, 1);
    }

    #[test]
    fn test_unrecorded_success_leaves_the_queue() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);
        let store = SqliteContentStore::new(&db);
        let providers = ProviderRegistry::new();
        let change_id = approve(&db, "title", 1, "Old Post", "Applied Once");

        db.conn()
            .execute_batch(
                r#"
                CREATE TRIGGER refuse_implemented BEFORE UPDATE ON changes
                WHEN NEW.implementation_status = 'implemented'
                BEGIN SELECT RAISE(ABORT, 'changes table locked'); END;
                "#,
            )
            .unwrap();

        let report = engine(&db, &store, &providers)
            .implement_approved_changes(None)
            .unwrap();
        assert!(report.all_failed());
        let result = &report.results[0];
        assert!(!result.success);
        assert_eq!(result.error_kind.as_deref(), Some("STORAGE_FAILURE"));
        assert!(result
            .error
            .as_deref()
            .unwrap()
            .contains("could not be marked implemented"));
        assert_eq!(store.get_entity(1).unwrap().title, "Applied Once");

        let change = ApprovalWorkflow::new(&db, Actor::administrator())
            .get_change(change_id)
            .unwrap();
        assert_eq!(change.implementation_status, ImplementationStatus::Failed);
        assert_eq!(change.backup_id, result.backup_id);

        let failures = AuditLog::new(&db)
            .get_changes_by_type("implementation_failed", 10)
            .unwrap();
        assert_eq!(failures.len(), 1);
        assert!(failures[0].message.contains("could not be marked implemented"));

        let rerun = engine(&db, &store, &providers)
            .implement_approved_changes(None)
            .unwrap();
        assert!(rerun.is_empty());
        assert!(!rerun.all_failed());
    }

    #[test]
    fn test_backup_failure_skips_mutation() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);
        let mut store = FaultyStore::new(&db);
        store.fail_listing = true;
        let providers = ProviderRegistry::new();
        let change_id = approve(&db, "title", 1, "Old Post", "Never Applied");

        let report = engine(&db, &store, &providers)
            .implement_approved_changes(None)
            .unwrap();
        let result = &report.results[0];
        assert!(!result.success);
        assert!(result.backup_id.is_none());
        assert_eq!(result.error_kind.as_deref(), Some("STORAGE_FAILURE"));

        assert_eq!(store.get_entity(1).unwrap().title, "Old Post");
        let change = ApprovalWorkflow::new(&db, Actor::administrator())
            .get_change(change_id)
            .unwrap();
        assert_eq!(change.implementation_status, ImplementationStatus::Failed);
        assert!(AuditLog::new(&db)
            .get_changes_by_type("post_title", 10)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_unknown_change_type() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);
        let store = SqliteContentStore::new(&db);
        let providers = ProviderRegistry::new();
        let change_id = approve(&db, "teleport", 1, "", "elsewhere");

        let report = engine(&db, &store, &providers)
            .implement_approved_changes(None)
            .unwrap();
        assert_eq!(report.results[0].error_kind.as_deref(), Some("UNKNOWN_CHANGE_TYPE"));

        let change = ApprovalWorkflow::new(&db, Actor::administrator())
            .get_change(change_id)
            .unwrap();
        assert_eq!(change.implementation_status, ImplementationStatus::Failed);

        let rejected = AuditLog::new(&db).get_changes_by_type("teleport", 10).unwrap();
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].status, AuditStatus::Failed);
    }

    #[test]
    fn test_image_alt_from_details() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);
        let store = SqliteContentStore::new(&db);
        let providers = ProviderRegistry::new();
        approve_with_details(&db, "image_alt_optimization", 1, "", "A hero image", r#"{"image_id": 3}"#);

        let report = engine(&db, &store, &providers)
            .implement_approved_changes(None)
            .unwrap();
        assert!(report.all_succeeded());
        assert_eq!(
            store
                .get_meta(3, crate::updater::IMAGE_ALT_KEY)
                .unwrap()
                .as_deref(),
            Some("A hero image")
        );

        let backups = BackupStore::new(&db, &store, BackupPolicy::default());
        let backup = backups.get_backup(report.results[0].backup_id.unwrap()).unwrap();
        let doc = crate::backup::SnapshotDocument::decode(&backup.data).unwrap();
        let ids: Vec<i64> = doc.content.unwrap().entities.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn test_id_filter_and_batch_limit() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);
        let store = SqliteContentStore::new(&db);
        let providers = ProviderRegistry::new();
        let first = approve(&db, "title", 1, "Old Post", "First");
        let second = approve(&db, "title", 2, "Second Post", "Second");

        let report = engine(&db, &store, &providers)
            .implement_approved_changes(Some(&[second]))
            .unwrap();
        assert_eq!(report.attempted, 1);
        assert_eq!(report.results[0].change_id, second);

        // Already implemented changes are not picked up again
        let report = engine(&db, &store, &providers)
            .implement_approved_changes(Some(&[second]))
            .unwrap();
        assert!(report.is_empty());

        let third = approve(&db, "title", 2, "Second", "Third");
        let report = engine(&db, &store, &providers)
            .with_batch_limit(1)
            .implement_approved_changes(None)
            .unwrap();
        assert_eq!(report.attempted, 1);
        assert_eq!(report.results[0].change_id, first);

        let report = engine(&db, &store, &providers)
            .implement_approved_changes(None)
            .unwrap();
        assert_eq!(report.results[0].change_id, third);
    }
}
