//! Change persistence

use super::recommendations::{RecommendationRow, RECOMMENDATION_COLUMNS};
use super::{Change, ChangeWithRecommendation, ImplementationStatus, Recommendation};
use crate::error::{not_found_error, PipelineError, Result};
use crate::storage::{now_timestamp, Database};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, OptionalExtension};

const CHANGE_COLUMNS: &str = "c.id, c.recommendation_id, c.change_type, c.target_id, \
     c.target_type, c.old_value, c.new_value, c.implementation_status, c.implemented_at, \
     c.implemented_by, c.backup_id, c.error_message, c.created_at";

/// Number of columns in [`CHANGE_COLUMNS`]
const CHANGE_WIDTH: usize = 13;

/// Repository over the `changes` table
pub struct ChangeRepository<'a> {
    db: &'a Database,
}

impl<'a> ChangeRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Materialise the change for a just-approved recommendation.
    ///
    /// Must run in the same transaction as the approval.
    pub(super) fn insert_for(&self, rec: &Recommendation) -> Result<i64> {
        self.db.conn().execute(
            r#"
            INSERT INTO changes (
                recommendation_id, change_type, target_id, target_type,
                old_value, new_value, implementation_status, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', ?7)
            "#,
            params![
                rec.id,
                rec.recommendation_type,
                rec.target_id,
                rec.target_type,
                rec.current_value,
                rec.suggested_value,
                now_timestamp(),
            ],
        )?;
        Ok(self.db.conn().last_insert_rowid())
    }

    /// Get a change by id
    pub fn get(&self, id: i64) -> Result<Change> {
        let sql = format!("SELECT {} FROM changes c WHERE c.id = ?1", CHANGE_COLUMNS);
        let row = self
            .db
            .conn()
            .query_row(&sql, params![id], |row| ChangeRow::from_row(row, 0))
            .optional()?;

        match row {
            Some(row) => row.into_change(),
            None => Err(not_found_error(format!("Change {} not found", id))),
        }
    }

    /// The change created when `recommendation_id` was approved
    pub fn get_for_recommendation(&self, recommendation_id: i64) -> Result<Option<Change>> {
        let sql = format!(
            "SELECT {} FROM changes c WHERE c.recommendation_id = ?1",
            CHANGE_COLUMNS
        );
        let row = self
            .db
            .conn()
            .query_row(&sql, params![recommendation_id], |row| {
                ChangeRow::from_row(row, 0)
            })
            .optional()?;

        row.map(ChangeRow::into_change).transpose()
    }

    /// Unimplemented changes, newest first
    pub fn list_pending(&self, limit: usize, offset: usize) -> Result<Vec<ChangeWithRecommendation>> {
        self.query_joined(
            "c.implementation_status = 'pending'",
            Vec::new(),
            "c.created_at DESC, c.id DESC",
            limit,
            offset,
        )
    }

    /// Unimplemented changes of approved recommendations, oldest first.
    ///
    /// `ids` restricts the result to those change ids.
    pub fn list_approved(
        &self,
        ids: Option<&[i64]>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ChangeWithRecommendation>> {
        let mut condition =
            String::from("c.implementation_status = 'pending' AND r.status = 'approved'");
        let mut values = Vec::new();

        if let Some(ids) = ids {
            if ids.is_empty() {
                return Ok(Vec::new());
            }
            let placeholders = vec!["?"; ids.len()].join(", ");
            condition.push_str(&format!(" AND c.id IN ({})", placeholders));
            values.extend(ids.iter().map(|id| Value::Integer(*id)));
        }

        self.query_joined(
            &condition,
            values,
            "c.created_at ASC, c.id ASC",
            limit,
            offset,
        )
    }

    /// Changes in one implementation status, newest first
    pub fn list_by_status(
        &self,
        status: ImplementationStatus,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ChangeWithRecommendation>> {
        self.query_joined(
            "c.implementation_status = ?",
            vec![Value::Text(status.as_str().to_string())],
            "c.created_at DESC, c.id DESC",
            limit,
            offset,
        )
    }

    // ==================== Terminal transitions ====================

    /// pending → implemented
    pub(super) fn mark_implemented(
        &self,
        id: i64,
        backup_id: Option<i64>,
        implemented_by: i64,
    ) -> Result<()> {
        let updated = self.db.conn().execute(
            r#"
            UPDATE changes
            SET implementation_status = 'implemented', implemented_at = ?1,
                implemented_by = ?2, backup_id = ?3, error_message = NULL
            WHERE id = ?4 AND implementation_status = 'pending'
            "#,
            params![now_timestamp(), implemented_by, backup_id, id],
        )?;

        if updated == 0 {
            return Err(self.not_pending(id));
        }
        Ok(())
    }

    /// pending → failed
    pub(super) fn mark_failed(&self, id: i64, message: &str, backup_id: Option<i64>) -> Result<()> {
        let updated = self.db.conn().execute(
            r#"
            UPDATE changes
            SET implementation_status = 'failed', error_message = ?1,
                backup_id = COALESCE(?2, backup_id)
            WHERE id = ?3 AND implementation_status = 'pending'
            "#,
            params![message, backup_id, id],
        )?;

        if updated == 0 {
            return Err(self.not_pending(id));
        }
        Ok(())
    }

    fn not_pending(&self, id: i64) -> PipelineError {
        match self.get(id) {
            Ok(change) => PipelineError::InvalidState(format!(
                "Change {} is {}, not pending",
                id, change.implementation_status
            )),
            Err(e) => e,
        }
    }

    fn query_joined(
        &self,
        condition: &str,
        mut values: Vec<Value>,
        order: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ChangeWithRecommendation>> {
        let sql = format!(
            r#"
            SELECT {}, {}
            FROM changes c
            JOIN recommendations r ON r.id = c.recommendation_id
            WHERE {}
            ORDER BY {}
            LIMIT ? OFFSET ?
            "#,
            CHANGE_COLUMNS, RECOMMENDATION_COLUMNS, condition, order
        );
        values.push(Value::Integer(limit as i64));
        values.push(Value::Integer(offset as i64));

        let mut stmt = self.db.conn().prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), |row| {
            Ok((
                ChangeRow::from_row(row, 0)?,
                RecommendationRow::from_row(row, CHANGE_WIDTH)?,
            ))
        })?;

        let mut joined = Vec::new();
        for row in rows {
            let (change, recommendation) = row?;
            joined.push(ChangeWithRecommendation {
                change: change.into_change()?,
                recommendation: recommendation.into_recommendation()?,
            });
        }
        Ok(joined)
    }
}

// Internal row type for database mapping

struct ChangeRow {
    id: i64,
    recommendation_id: i64,
    change_type: String,
    target_id: i64,
    target_type: String,
    old_value: String,
    new_value: String,
    implementation_status: String,
    implemented_at: Option<String>,
    implemented_by: Option<i64>,
    backup_id: Option<i64>,
    error_message: Option<String>,
    created_at: String,
}

impl ChangeRow {
    fn from_row(row: &rusqlite::Row<'_>, base: usize) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(base)?,
            recommendation_id: row.get(base + 1)?,
            change_type: row.get(base + 2)?,
            target_id: row.get(base + 3)?,
            target_type: row.get(base + 4)?,
            old_value: row.get(base + 5)?,
            new_value: row.get(base + 6)?,
            implementation_status: row.get(base + 7)?,
            implemented_at: row.get(base + 8)?,
            implemented_by: row.get(base + 9)?,
            backup_id: row.get(base + 10)?,
            error_message: row.get(base + 11)?,
            created_at: row.get(base + 12)?,
        })
    }

    fn into_change(self) -> Result<Change> {
        Ok(Change {
            id: self.id,
            recommendation_id: self.recommendation_id,
            change_type: self.change_type,
            target_id: self.target_id,
            target_type: self.target_type,
            old_value: self.old_value,
            new_value: self.new_value,
            implementation_status: self.implementation_status.parse()?,
            implemented_at: self.implemented_at,
            implemented_by: self.implemented_by,
            backup_id: self.backup_id,
            error_message: self.error_message,
            created_at: self.created_at,
        })
    }
}
