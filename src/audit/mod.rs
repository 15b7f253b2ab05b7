//! Append-only audit log
//!
//! One row per field-level mutation attempt, plus rows for recommendation,
//! change and backup lifecycle events. Rows are never cascaded from the
//! entities they describe. The only in-place mutation is
//! [`AuditLog::update_log_status`]; retention is a hard delete.

use crate::error::{not_found_error, validation_error, Result};
use crate::storage::{now_timestamp, timestamp_days_ago, Database};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Upper bound on any page or "recent N" request
pub const MAX_PAGE_SIZE: usize = 100;

/// Outcome recorded for an audit entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    Pending,
    Success,
    Failed,
    Skipped,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Pending => "pending",
            AuditStatus::Success => "success",
            AuditStatus::Failed => "failed",
            AuditStatus::Skipped => "skipped",
        }
    }

    /// Human-readable label
    pub fn label(&self) -> &'static str {
        match self {
            AuditStatus::Pending => "Pending",
            AuditStatus::Success => "Success",
            AuditStatus::Failed => "Failed",
            AuditStatus::Skipped => "Skipped",
        }
    }
}

impl std::fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditStatus {
    type Err = crate::error::PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(AuditStatus::Pending),
            "success" => Ok(AuditStatus::Success),
            "failed" => Ok(AuditStatus::Failed),
            "skipped" => Ok(AuditStatus::Skipped),
            other => Err(validation_error(format!("unknown audit status '{}'", other))),
        }
    }
}

/// Input for [`AuditLog::log_change`]
#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    /// Correlation id; generated when `None`
    pub change_id: Option<String>,
    pub change_type: String,
    pub target_id: i64,
    pub old_value: String,
    pub new_value: String,
    pub status: AuditStatus,
    pub message: String,
    pub image_id: Option<i64>,
    pub field: Option<String>,
}

impl NewAuditEntry {
    /// Create an entry with empty values
    pub fn new(change_type: &str, target_id: i64, status: AuditStatus, message: &str) -> Self {
        Self {
            change_id: None,
            change_type: change_type.to_string(),
            target_id,
            old_value: String::new(),
            new_value: String::new(),
            status,
            message: message.to_string(),
            image_id: None,
            field: None,
        }
    }

    /// Set old and new values
    pub fn with_values(mut self, old_value: &str, new_value: &str) -> Self {
        self.old_value = old_value.to_string();
        self.new_value = new_value.to_string();
        self
    }

    pub fn with_image(mut self, image_id: Option<i64>) -> Self {
        self.image_id = image_id;
        self
    }

    pub fn with_field(mut self, field: Option<String>) -> Self {
        self.field = field;
        self
    }
}

/// A stored audit entry
#[derive(Debug, Clone, Serialize)]
pub struct AuditLogEntry {
    pub id: i64,
    pub change_id: String,
    pub change_type: String,
    pub target_id: i64,
    pub old_value: String,
    pub new_value: String,
    pub status: AuditStatus,
    pub message: String,
    pub image_id: Option<i64>,
    pub field: Option<String>,
    pub applied_at: String,
    pub created_at: String,
}

/// Filters for [`AuditLog::get_logs`]
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub change_type: Option<String>,
    pub status: Option<AuditStatus>,
    pub target_id: Option<i64>,
    /// Inclusive lower bound on `applied_at`
    pub date_from: Option<String>,
    /// Inclusive upper bound on `applied_at`
    pub date_to: Option<String>,
}

impl AuditFilter {
    /// Build the WHERE clause and its bound values
    fn where_clause(&self) -> (String, Vec<Value>) {
        let mut conditions = Vec::new();
        let mut values = Vec::new();

        if let Some(ref change_type) = self.change_type {
            conditions.push("change_type = ?");
            values.push(Value::Text(change_type.clone()));
        }
        if let Some(status) = self.status {
            conditions.push("status = ?");
            values.push(Value::Text(status.as_str().to_string()));
        }
        if let Some(target_id) = self.target_id {
            conditions.push("target_id = ?");
            values.push(Value::Integer(target_id));
        }
        if let Some(ref from) = self.date_from {
            conditions.push("applied_at >= ?");
            values.push(Value::Text(from.clone()));
        }
        if let Some(ref to) = self.date_to {
            conditions.push("applied_at <= ?");
            values.push(Value::Text(to.clone()));
        }

        if conditions.is_empty() {
            (String::new(), values)
        } else {
            (format!("WHERE {}", conditions.join(" AND ")), values)
        }
    }
}

/// One page of audit entries
#[derive(Debug, Clone, Serialize)]
pub struct AuditPage {
    pub logs: Vec<AuditLogEntry>,
    pub total: usize,
    pub page: usize,
    pub per_page: usize,
    pub total_pages: usize,
}

/// Count of entries for one type × status cell
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeStatusCount {
    pub change_type: String,
    pub status: String,
    pub count: usize,
}

/// Aggregate statistics over a trailing window
#[derive(Debug, Clone, Default, Serialize)]
pub struct AuditStatistics {
    pub days: u32,
    pub total_changes: usize,
    pub successful_changes: usize,
    pub failed_changes: usize,
    pub by_type: BTreeMap<String, usize>,
    pub by_status: BTreeMap<String, usize>,
    pub matrix: Vec<TypeStatusCount>,
}

const ENTRY_COLUMNS: &str = "id, change_id, change_type, target_id, old_value, new_value, \
     status, message, image_id, field, applied_at, created_at";

/// Audit log over the `audit_log` table
pub struct AuditLog<'a> {
    db: &'a Database,
}

impl<'a> AuditLog<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Append an entry; returns its row id
    pub fn log_change(&self, entry: NewAuditEntry) -> Result<i64> {
        let change_id = entry.change_id.unwrap_or_else(generate_change_id);
        let now = now_timestamp();

        self.db.conn().execute(
            r#"
            INSERT INTO audit_log (
                change_id, change_type, target_id, old_value, new_value,
                status, message, image_id, field, applied_at, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
            "#,
            params![
                change_id,
                entry.change_type,
                entry.target_id,
                entry.old_value,
                entry.new_value,
                entry.status.as_str(),
                entry.message,
                entry.image_id,
                entry.field,
                now,
            ],
        )?;

        Ok(self.db.conn().last_insert_rowid())
    }

    /// Append a lifecycle event with no old/new values
    pub fn record_event(
        &self,
        event: &str,
        target_id: i64,
        status: AuditStatus,
        message: &str,
    ) -> Result<i64> {
        self.log_change(NewAuditEntry::new(event, target_id, status, message))
    }

    /// Get one entry by row id
    pub fn get_entry(&self, id: i64) -> Result<AuditLogEntry> {
        let sql = format!("SELECT {} FROM audit_log WHERE id = ?1", ENTRY_COLUMNS);
        let mut entries = self.query(&sql, vec![Value::Integer(id)])?;
        entries
            .pop()
            .ok_or_else(|| not_found_error(format!("Audit entry {} not found", id)))
    }

    /// Entries sharing a correlation id
    pub fn get_by_change_id(&self, change_id: &str) -> Result<Vec<AuditLogEntry>> {
        let sql = format!(
            "SELECT {} FROM audit_log WHERE change_id = ?1 ORDER BY id",
            ENTRY_COLUMNS
        );
        self.query(&sql, vec![Value::Text(change_id.to_string())])
    }

    /// Paginated, filtered listing, newest first
    pub fn get_logs(&self, page: usize, per_page: usize, filter: &AuditFilter) -> Result<AuditPage> {
        let page = page.max(1);
        let per_page = per_page.clamp(1, MAX_PAGE_SIZE);
        let offset = (page - 1) * per_page;

        let (where_sql, mut values) = filter.where_clause();

        let total: i64 = self.db.conn().query_row(
            &format!("SELECT COUNT(*) FROM audit_log {}", where_sql),
            params_from_iter(values.iter()),
            |row| row.get(0),
        )?;
        let total = total as usize;

        let sql = format!(
            "SELECT {} FROM audit_log {} ORDER BY applied_at DESC, id DESC LIMIT ? OFFSET ?",
            ENTRY_COLUMNS, where_sql
        );
        values.push(Value::Integer(per_page as i64));
        values.push(Value::Integer(offset as i64));
        let logs = self.query(&sql, values)?;

        Ok(AuditPage {
            logs,
            total,
            page,
            per_page,
            total_pages: total.div_ceil(per_page),
        })
    }

    /// Most recent entries
    pub fn get_recent_changes(&self, limit: usize) -> Result<Vec<AuditLogEntry>> {
        let sql = format!(
            "SELECT {} FROM audit_log ORDER BY applied_at DESC, id DESC LIMIT ?1",
            ENTRY_COLUMNS
        );
        self.query(&sql, vec![clamp_limit(limit)])
    }

    /// History of one target entity
    pub fn get_changes_by_target(&self, target_id: i64, limit: usize) -> Result<Vec<AuditLogEntry>> {
        let sql = format!(
            "SELECT {} FROM audit_log WHERE target_id = ?1 ORDER BY applied_at DESC, id DESC LIMIT ?2",
            ENTRY_COLUMNS
        );
        self.query(&sql, vec![Value::Integer(target_id), clamp_limit(limit)])
    }

    /// History of one change type
    pub fn get_changes_by_type(&self, change_type: &str, limit: usize) -> Result<Vec<AuditLogEntry>> {
        let sql = format!(
            "SELECT {} FROM audit_log WHERE change_type = ?1 ORDER BY applied_at DESC, id DESC LIMIT ?2",
            ENTRY_COLUMNS
        );
        self.query(
            &sql,
            vec![Value::Text(change_type.to_string()), clamp_limit(limit)],
        )
    }

    /// Counts by type × status over the last `days` days
    pub fn get_statistics(&self, days: u32) -> Result<AuditStatistics> {
        let days = days.max(1);
        let cutoff = timestamp_days_ago(days);

        let mut stmt = self.db.conn().prepare(
            r#"
            SELECT change_type, status, COUNT(*)
            FROM audit_log
            WHERE applied_at >= ?1
            GROUP BY change_type, status
            ORDER BY change_type, status
            "#,
        )?;
        let rows = stmt.query_map(params![cutoff], |row| {
            Ok(TypeStatusCount {
                change_type: row.get(0)?,
                status: row.get(1)?,
                count: row.get::<_, i64>(2)? as usize,
            })
        })?;

        let mut stats = AuditStatistics {
            days,
            ..Default::default()
        };
        for row in rows {
            let cell = row?;
            stats.total_changes += cell.count;
            if cell.status == AuditStatus::Success.as_str() {
                stats.successful_changes += cell.count;
            } else if cell.status == AuditStatus::Failed.as_str() {
                stats.failed_changes += cell.count;
            }
            *stats.by_type.entry(cell.change_type.clone()).or_default() += cell.count;
            *stats.by_status.entry(cell.status.clone()).or_default() += cell.count;
            stats.matrix.push(cell);
        }

        Ok(stats)
    }

    /// Post-hoc status correction for entries sharing `change_id`.
    ///
    /// The only mutation allowed on the log.
    pub fn update_log_status(&self, change_id: &str, status: AuditStatus, message: &str) -> Result<usize> {
        let updated = self.db.conn().execute(
            "UPDATE audit_log SET status = ?1, message = ?2 WHERE change_id = ?3",
            params![status.as_str(), message, change_id],
        )?;
        if updated == 0 {
            return Err(not_found_error(format!(
                "No audit entry with change id {}",
                change_id
            )));
        }
        Ok(updated)
    }

    /// Hard-delete entries applied more than `days` days ago; `days` must be positive
    pub fn cleanup_old_logs(&self, days: u32) -> Result<usize> {
        if days == 0 {
            return Err(validation_error("Audit retention must be at least 1 day"));
        }
        let cutoff = timestamp_days_ago(days);
        let deleted = self
            .db
            .conn()
            .execute("DELETE FROM audit_log WHERE applied_at < ?1", params![cutoff])?;
        tracing::info!(deleted, days, "Cleaned up old audit entries");
        Ok(deleted)
    }

    /// Distinct change types with display labels
    pub fn change_types(&self) -> Result<Vec<(String, String)>> {
        let mut stmt = self
            .db
            .conn()
            .prepare("SELECT DISTINCT change_type FROM audit_log ORDER BY change_type")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut types = Vec::new();
        for row in rows {
            let change_type = row?;
            let label = change_type_label(&change_type);
            types.push((change_type, label));
        }
        Ok(types)
    }

    /// Distinct statuses present in the log
    pub fn statuses(&self) -> Result<Vec<AuditStatus>> {
        let mut stmt = self
            .db
            .conn()
            .prepare("SELECT DISTINCT status FROM audit_log ORDER BY status")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut statuses = Vec::new();
        for row in rows {
            statuses.push(row?.parse()?);
        }
        Ok(statuses)
    }

    fn query(&self, sql: &str, values: Vec<Value>) -> Result<Vec<AuditLogEntry>> {
        let mut stmt = self.db.conn().prepare(sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), AuditRow::from_row)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?.into_entry()?);
        }
        Ok(entries)
    }
}

/// Fresh correlation id for one mutation attempt
pub fn generate_change_id() -> String {
    format!("change_{}", uuid::Uuid::new_v4().simple())
}

fn clamp_limit(limit: usize) -> Value {
    Value::Integer(limit.clamp(1, MAX_PAGE_SIZE) as i64)
}

/// Display label for a change type
pub fn change_type_label(change_type: &str) -> String {
    let known = match change_type {
        "post_title" => Some("Post Title"),
        "post_content" => Some("Post Content"),
        "post_excerpt" => Some("Post Excerpt"),
        "meta_description" => Some("Meta Description"),
        "meta_title" => Some("Meta Title"),
        "focus_keyword" => Some("Focus Keyword"),
        "image_alt" => Some("Image Alt Text"),
        "internal_link" => Some("Internal Link"),
        "schema_markup" => Some("Schema Markup"),
        "custom_field" => Some("Custom Field"),
        _ => None,
    };
    if let Some(label) = known {
        return label.to_string();
    }

    let spaced = change_type.replace(['_', '-'], " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

// Internal row type for database mapping

struct AuditRow {
    id: i64,
    change_id: String,
    change_type: String,
    target_id: i64,
    old_value: String,
    new_value: String,
    status: String,
    message: String,
    image_id: Option<i64>,
    field: Option<String>,
    applied_at: String,
    created_at: String,
}

impl AuditRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            change_id: row.get(1)?,
            change_type: row.get(2)?,
            target_id: row.get(3)?,
            old_value: row.get(4)?,
            new_value: row.get(5)?,
            status: row.get(6)?,
            message: row.get(7)?,
            image_id: row.get(8)?,
            field: row.get(9)?,
            applied_at: row.get(10)?,
            created_at: row.get(11)?,
        })
    }

    fn into_entry(self) -> Result<AuditLogEntry> {
        Ok(AuditLogEntry {
            id: self.id,
            change_id: self.change_id,
            change_type: self.change_type,
            target_id: self.target_id,
            old_value: self.old_value,
            new_value: self.new_value,
            status: self.status.parse()?,
            message: self.message,
            image_id: self.image_id,
            field: self.field,
            applied_at: self.applied_at,
            created_at: self.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;

    fn entry(change_type: &str, target: i64, status: AuditStatus) -> NewAuditEntry {
        NewAuditEntry::new(change_type, target, status, "test").with_values("old", "new")
    }

    #[test]
    fn test_log_and_read_back() {
        let db = Database::open_in_memory().unwrap();
        let audit = AuditLog::new(&db);

        let id = audit
            .log_change(entry("post_title", 3, AuditStatus::Success).with_field(Some("x".into())))
            .unwrap();
        let stored = audit.get_entry(id).unwrap();

        assert!(stored.change_id.starts_with("change_"));
        assert_eq!(stored.old_value, "old");
        assert_eq!(stored.status, AuditStatus::Success);
        assert_eq!(stored.field.as_deref(), Some("x"));
    }

    #[test]
    fn test_generated_ids_are_distinct() {
        assert_ne!(generate_change_id(), generate_change_id());
    }

    #[test]
    fn test_filtered_pagination() {
        let db = Database::open_in_memory().unwrap();
        let audit = AuditLog::new(&db);

        for i in 0..5 {
            audit.log_change(entry("post_title", i, AuditStatus::Success)).unwrap();
        }
        audit.log_change(entry("meta_description", 1, AuditStatus::Failed)).unwrap();

        let filter = AuditFilter {
            change_type: Some("post_title".into()),
            ..Default::default()
        };
        let page = audit.get_logs(1, 2, &filter).unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.logs.len(), 2);
        // Newest first
        assert_eq!(page.logs[0].target_id, 4);

        let failed = AuditFilter {
            status: Some(AuditStatus::Failed),
            target_id: Some(1),
            ..Default::default()
        };
        assert_eq!(audit.get_logs(1, 20, &failed).unwrap().total, 1);
    }

    #[test]
    fn test_history_queries() {
        let db = Database::open_in_memory().unwrap();
        let audit = AuditLog::new(&db);

        audit.log_change(entry("post_title", 1, AuditStatus::Success)).unwrap();
        audit.log_change(entry("post_title", 2, AuditStatus::Success)).unwrap();
        audit.log_change(entry("focus_keyword", 1, AuditStatus::Skipped)).unwrap();

        assert_eq!(audit.get_recent_changes(2).unwrap().len(), 2);
        assert_eq!(audit.get_changes_by_target(1, 10).unwrap().len(), 2);
        assert_eq!(audit.get_changes_by_type("post_title", 10).unwrap().len(), 2);
    }

    #[test]
    fn test_statistics() {
        let db = Database::open_in_memory().unwrap();
        let audit = AuditLog::new(&db);

        audit.log_change(entry("post_title", 1, AuditStatus::Success)).unwrap();
        audit.log_change(entry("post_title", 2, AuditStatus::Failed)).unwrap();
        audit.log_change(entry("image_alt", 3, AuditStatus::Success)).unwrap();

        let stats = audit.get_statistics(30).unwrap();
        assert_eq!(stats.total_changes, 3);
        assert_eq!(stats.successful_changes, 2);
        assert_eq!(stats.failed_changes, 1);
        assert_eq!(stats.by_type["post_title"], 2);
        assert_eq!(stats.by_status["success"], 2);
        assert_eq!(stats.matrix.len(), 3);
    }

    #[test]
    fn test_update_log_status() {
        let db = Database::open_in_memory().unwrap();
        let audit = AuditLog::new(&db);

        let mut pending = entry("post_title", 1, AuditStatus::Pending);
        pending.change_id = Some("change_fixed".into());
        let id = audit.log_change(pending).unwrap();

        audit
            .update_log_status("change_fixed", AuditStatus::Success, "verified")
            .unwrap();
        let stored = audit.get_entry(id).unwrap();
        assert_eq!(stored.status, AuditStatus::Success);
        assert_eq!(stored.message, "verified");

        assert!(matches!(
            audit.update_log_status("change_missing", AuditStatus::Failed, ""),
            Err(PipelineError::NotFound(_))
        ));
    }

    #[test]
    fn test_cleanup_hard_deletes() {
        let db = Database::open_in_memory().unwrap();
        let audit = AuditLog::new(&db);

        let old = audit.log_change(entry("post_title", 1, AuditStatus::Success)).unwrap();
        audit.log_change(entry("post_title", 2, AuditStatus::Success)).unwrap();
        db.conn()
            .execute(
                "UPDATE audit_log SET applied_at = '2000-01-01T00:00:00.000000Z' WHERE id = ?1",
                params![old],
            )
            .unwrap();

        assert!(matches!(
            audit.cleanup_old_logs(0),
            Err(PipelineError::Validation(_))
        ));
        assert_eq!(audit.get_recent_changes(10).unwrap().len(), 2);

        assert_eq!(audit.cleanup_old_logs(90).unwrap(), 1);
        assert!(audit.get_entry(old).is_err());
        assert_eq!(audit.get_recent_changes(10).unwrap().len(), 1);
    }

    #[test]
    fn test_distinct_types_and_statuses() {
        let db = Database::open_in_memory().unwrap();
        let audit = AuditLog::new(&db);
        assert!(audit.change_types().unwrap().is_empty());

        audit.log_change(entry("post_title", 1, AuditStatus::Success)).unwrap();
        audit.log_change(entry("post_title", 2, AuditStatus::Failed)).unwrap();
        audit
            .record_event("recommendation_rejected", 3, AuditStatus::Success, "rejected")
            .unwrap();

        assert_eq!(
            audit.change_types().unwrap(),
            vec![
                ("post_title".to_string(), "Post Title".to_string()),
                (
                    "recommendation_rejected".to_string(),
                    "Recommendation rejected".to_string()
                ),
            ]
        );
        assert_eq!(
            audit.statuses().unwrap(),
            vec![AuditStatus::Failed, AuditStatus::Success]
        );

        let event = &audit.get_changes_by_type("recommendation_rejected", 1).unwrap()[0];
        assert_eq!(event.old_value, "");
        assert_eq!(event.new_value, "");
    }

    #[test]
    fn test_labels() {
        assert_eq!(change_type_label("image_alt"), "Image Alt Text");
        assert_eq!(change_type_label("backup_created"), "Backup created");
        assert_eq!(AuditStatus::Skipped.label(), "Skipped");
    }
}
