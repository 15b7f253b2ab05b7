//! Recommendation persistence

use super::{Modifications, NewRecommendation, Recommendation, RecommendationStatus};
use crate::audit::{AuditLog, AuditStatus, NewAuditEntry};
use crate::error::{not_found_error, PipelineError, Result};
use crate::storage::{now_timestamp, Database};
use rusqlite::{params, OptionalExtension};

pub(super) const RECOMMENDATION_COLUMNS: &str = "r.id, r.recommendation_type, r.target_id, \
     r.target_type, r.current_value, r.suggested_value, r.reasoning, r.confidence_score, \
     r.impact_analysis, r.risk_assessment, r.implementation_details, r.status, r.created_at, \
     r.reviewed_at, r.reviewed_by, r.review_notes";

/// Repository over the `recommendations` table.
///
/// Status only changes through [`super::ApprovalWorkflow`].
pub struct RecommendationRepository<'a> {
    db: &'a Database,
}

impl<'a> RecommendationRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Validate and store a new pending recommendation
    pub fn create(&self, data: &NewRecommendation) -> Result<i64> {
        data.validate()?;

        let id = self.db.transaction(|tx| {
            tx.execute(
                r#"
                INSERT INTO recommendations (
                    recommendation_type, target_id, target_type, current_value,
                    suggested_value, reasoning, confidence_score, impact_analysis,
                    risk_assessment, implementation_details, status, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 'pending', ?11)
                "#,
                params![
                    data.recommendation_type,
                    data.target_id,
                    data.target_type,
                    data.current_value,
                    data.suggested_value,
                    data.reasoning,
                    data.confidence_score,
                    data.impact_analysis,
                    data.risk_assessment,
                    data.implementation_details,
                    now_timestamp(),
                ],
            )?;
            let id = tx.last_insert_rowid();

            AuditLog::new(self.db).log_change(
                NewAuditEntry::new(
                    "recommendation_created",
                    data.target_id,
                    AuditStatus::Success,
                    &format!(
                        "Recommendation {} ({}) created",
                        id, data.recommendation_type
                    ),
                )
                .with_values(&data.current_value, &data.suggested_value),
            )?;

            Ok(id)
        })?;

        tracing::debug!(id, kind = %data.recommendation_type, "Stored recommendation");
        Ok(id)
    }

    /// Get a recommendation by id
    pub fn get(&self, id: i64) -> Result<Recommendation> {
        let sql = format!(
            "SELECT {} FROM recommendations r WHERE r.id = ?1",
            RECOMMENDATION_COLUMNS
        );
        let row = self
            .db
            .conn()
            .query_row(&sql, params![id], |row| RecommendationRow::from_row(row, 0))
            .optional()?;

        match row {
            Some(row) => row.into_recommendation(),
            None => Err(not_found_error(format!("Recommendation {} not found", id))),
        }
    }

    /// Pending recommendations, newest first
    pub fn list_pending(&self, limit: usize, offset: usize) -> Result<Vec<Recommendation>> {
        self.list_by_status(RecommendationStatus::Pending, limit, offset)
    }

    /// Recommendations in one status, newest first
    pub fn list_by_status(
        &self,
        status: RecommendationStatus,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Recommendation>> {
        let sql = format!(
            r#"
            SELECT {} FROM recommendations r
            WHERE r.status = ?1
            ORDER BY r.created_at DESC, r.id DESC
            LIMIT ?2 OFFSET ?3
            "#,
            RECOMMENDATION_COLUMNS
        );
        let mut stmt = self.db.conn().prepare(&sql)?;
        let rows = stmt.query_map(
            params![status.as_str(), limit as i64, offset as i64],
            |row| RecommendationRow::from_row(row, 0),
        )?;

        let mut recommendations = Vec::new();
        for row in rows {
            recommendations.push(row?.into_recommendation()?);
        }
        Ok(recommendations)
    }

    /// Number of recommendations awaiting review
    pub fn pending_count(&self) -> Result<usize> {
        let n: i64 = self.db.conn().query_row(
            "SELECT COUNT(*) FROM recommendations WHERE status = 'pending'",
            [],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }

    // ==================== Workflow transitions ====================

    /// Move a pending recommendation to `to`.
    ///
    /// The update is conditional on `status = 'pending'`, so of two racing
    /// reviewers exactly one wins.
    pub(super) fn review(
        &self,
        id: i64,
        to: RecommendationStatus,
        reviewer: i64,
        notes: Option<&str>,
    ) -> Result<()> {
        let updated = self.db.conn().execute(
            r#"
            UPDATE recommendations
            SET status = ?1, reviewed_at = ?2, reviewed_by = ?3, review_notes = ?4
            WHERE id = ?5 AND status = 'pending'
            "#,
            params![to.as_str(), now_timestamp(), reviewer, notes, id],
        )?;

        if updated == 0 {
            return Err(self.not_pending(id));
        }
        Ok(())
    }

    /// Overwrite whitelisted fields of a pending recommendation
    pub(super) fn apply_modifications(&self, id: i64, modifications: &Modifications) -> Result<()> {
        let updated = self.db.conn().execute(
            r#"
            UPDATE recommendations
            SET suggested_value = COALESCE(?1, suggested_value),
                reasoning = COALESCE(?2, reasoning),
                implementation_details = COALESCE(?3, implementation_details)
            WHERE id = ?4 AND status = 'pending'
            "#,
            params![
                modifications.suggested_value,
                modifications.reasoning,
                modifications.implementation_details,
                id
            ],
        )?;

        if updated == 0 {
            return Err(self.not_pending(id));
        }
        Ok(())
    }

    fn not_pending(&self, id: i64) -> PipelineError {
        match self.get(id) {
            Ok(rec) => PipelineError::InvalidState(format!(
                "Recommendation {} is {}, not pending",
                id, rec.status
            )),
            Err(e) => e,
        }
    }
}

// Internal row type for database mapping

pub(super) struct RecommendationRow {
    id: i64,
    recommendation_type: String,
    target_id: i64,
    target_type: String,
    current_value: String,
    suggested_value: String,
    reasoning: String,
    confidence_score: f64,
    impact_analysis: String,
    risk_assessment: String,
    implementation_details: String,
    status: String,
    created_at: String,
    reviewed_at: Option<String>,
    reviewed_by: Option<i64>,
    review_notes: Option<String>,
}

impl RecommendationRow {
    /// Read the recommendation columns starting at `base`
    pub(super) fn from_row(row: &rusqlite::Row<'_>, base: usize) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(base)?,
            recommendation_type: row.get(base + 1)?,
            target_id: row.get(base + 2)?,
            target_type: row.get(base + 3)?,
            current_value: row.get(base + 4)?,
            suggested_value: row.get(base + 5)?,
            reasoning: row.get(base + 6)?,
            confidence_score: row.get(base + 7)?,
            impact_analysis: row.get(base + 8)?,
            risk_assessment: row.get(base + 9)?,
            implementation_details: row.get(base + 10)?,
            status: row.get(base + 11)?,
            created_at: row.get(base + 12)?,
            reviewed_at: row.get(base + 13)?,
            reviewed_by: row.get(base + 14)?,
            review_notes: row.get(base + 15)?,
        })
    }

    pub(super) fn into_recommendation(self) -> Result<Recommendation> {
        Ok(Recommendation {
            id: self.id,
            recommendation_type: self.recommendation_type,
            target_id: self.target_id,
            target_type: self.target_type,
            current_value: self.current_value,
            suggested_value: self.suggested_value,
            reasoning: self.reasoning,
            confidence_score: self.confidence_score,
            impact_analysis: self.impact_analysis,
            risk_assessment: self.risk_assessment,
            implementation_details: self.implementation_details,
            status: self.status.parse()?,
            created_at: self.created_at,
            reviewed_at: self.reviewed_at,
            reviewed_by: self.reviewed_by,
            review_notes: self.review_notes,
        })
    }
}
