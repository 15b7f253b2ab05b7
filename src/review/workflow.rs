//! Approval workflow state machine

use super::{
    Change, ChangeRepository, ChangeWithRecommendation, Modifications, Recommendation,
    RecommendationRepository, RecommendationStatus,
};
use crate::audit::{AuditLog, AuditStatus, NewAuditEntry};
use crate::error::{PipelineError, Result};
use crate::site::Actor;
use crate::storage::Database;

/// Drives recommendations through review and changes through implementation
pub struct ApprovalWorkflow<'a> {
    db: &'a Database,
    actor: Actor,
    recommendations: RecommendationRepository<'a>,
    changes: ChangeRepository<'a>,
    audit: AuditLog<'a>,
}

impl<'a> ApprovalWorkflow<'a> {
    /// Create a workflow acting on behalf of `actor`
    pub fn new(db: &'a Database, actor: Actor) -> Self {
        Self {
            db,
            actor,
            recommendations: RecommendationRepository::new(db),
            changes: ChangeRepository::new(db),
            audit: AuditLog::new(db),
        }
    }

    pub fn actor(&self) -> Actor {
        self.actor
    }

    // ==================== Review ====================

    /// Approve a pending recommendation and create its change.
    ///
    /// Returns the new change id. The status flip and the change insert
    /// commit together or not at all. The change is built from the row as
    /// it stands inside the transaction, after the pending guard has won.
    pub fn approve(&self, recommendation_id: i64, notes: Option<&str>) -> Result<i64> {
        self.ensure_reviewer()?;

        let (rec, change_id) = self.db.transaction(|_tx| {
            self.recommendations.review(
                recommendation_id,
                RecommendationStatus::Approved,
                self.actor.id,
                notes,
            )?;
            let rec = self.recommendations.get(recommendation_id)?;
            let change_id = self.changes.insert_for(&rec)?;

            self.audit.log_change(
                NewAuditEntry::new(
                    "recommendation_approved",
                    rec.target_id,
                    AuditStatus::Success,
                    &format!(
                        "Recommendation {} approved by user {}, change {} created",
                        rec.id, self.actor.id, change_id
                    ),
                )
                .with_values(&rec.current_value, &rec.suggested_value),
            )?;

            Ok((rec, change_id))
        })?;

        tracing::info!(
            recommendation = rec.id,
            change = change_id,
            reviewer = self.actor.id,
            "Approved recommendation"
        );
        Ok(change_id)
    }

    /// Reject a pending recommendation; no change is created
    pub fn reject(&self, recommendation_id: i64, reason: Option<&str>) -> Result<()> {
        self.ensure_reviewer()?;
        let rec = self.pending_recommendation(recommendation_id)?;

        self.db.transaction(|_tx| {
            self.recommendations.review(
                rec.id,
                RecommendationStatus::Rejected,
                self.actor.id,
                reason,
            )?;

            self.audit.record_event(
                "recommendation_rejected",
                rec.target_id,
                AuditStatus::Success,
                &format!(
                    "Recommendation {} rejected by user {}: {}",
                    rec.id,
                    self.actor.id,
                    reason.unwrap_or("no reason given")
                ),
            )?;
            Ok(())
        })?;

        tracing::info!(recommendation = rec.id, "Rejected recommendation");
        Ok(())
    }

    /// Edit whitelisted fields of a pending recommendation.
    ///
    /// Status stays pending, so it can still be approved or rejected.
    pub fn modify(&self, recommendation_id: i64, modifications: &Modifications) -> Result<Recommendation> {
        self.ensure_reviewer()?;
        if modifications.is_empty() {
            return Err(PipelineError::NoOp(format!(
                "No modifications given for recommendation {}",
                recommendation_id
            )));
        }
        let rec = self.pending_recommendation(recommendation_id)?;

        self.db.transaction(|_tx| {
            self.recommendations
                .apply_modifications(rec.id, modifications)?;

            let new_value = modifications
                .suggested_value
                .as_deref()
                .unwrap_or(&rec.suggested_value);
            self.audit.log_change(
                NewAuditEntry::new(
                    "recommendation_modified",
                    rec.target_id,
                    AuditStatus::Success,
                    &format!(
                        "Recommendation {} modified by user {}",
                        rec.id, self.actor.id
                    ),
                )
                .with_values(&rec.suggested_value, new_value),
            )?;
            Ok(())
        })?;

        tracing::info!(recommendation = rec.id, "Modified recommendation");
        self.recommendations.get(rec.id)
    }

    // ==================== Change queues ====================

    /// Changes awaiting implementation, newest first
    pub fn get_pending_changes(&self, limit: usize, offset: usize) -> Result<Vec<ChangeWithRecommendation>> {
        self.changes.list_pending(limit, offset)
    }

    /// Approved changes awaiting implementation, oldest first
    pub fn get_approved_changes(&self, limit: usize, offset: usize) -> Result<Vec<ChangeWithRecommendation>> {
        self.changes.list_approved(None, limit, offset)
    }

    /// Approved changes restricted to `ids`, oldest first
    pub fn get_approved_changes_by_id(
        &self,
        ids: &[i64],
        limit: usize,
    ) -> Result<Vec<ChangeWithRecommendation>> {
        self.changes.list_approved(Some(ids), limit, 0)
    }

    pub fn get_change(&self, change_id: i64) -> Result<Change> {
        self.changes.get(change_id)
    }

    pub fn get_change_for_recommendation(&self, recommendation_id: i64) -> Result<Option<Change>> {
        self.changes.get_for_recommendation(recommendation_id)
    }

    // ==================== Terminal transitions ====================

    /// Mark a pending change implemented
    pub fn mark_change_implemented(&self, change_id: i64, backup_id: Option<i64>) -> Result<()> {
        self.changes
            .mark_implemented(change_id, backup_id, self.actor.id)?;
        tracing::debug!(change = change_id, ?backup_id, "Change implemented");
        Ok(())
    }

    /// Mark a pending change failed. Never retried here.
    pub fn mark_change_failed(&self, change_id: i64, message: &str) -> Result<()> {
        self.record_failure(change_id, message, None)
    }

    /// Mark failed and keep the pre-attempt backup id on the change
    pub(crate) fn record_failure(
        &self,
        change_id: i64,
        message: &str,
        backup_id: Option<i64>,
    ) -> Result<()> {
        let change = self.changes.get(change_id)?;

        self.db.transaction(|_tx| {
            self.changes.mark_failed(change_id, message, backup_id)?;
            self.audit.log_change(
                NewAuditEntry::new(
                    "implementation_failed",
                    change.target_id,
                    AuditStatus::Failed,
                    &format!("Change {} failed: {}", change_id, message),
                )
                .with_values(&change.old_value, &change.new_value),
            )?;
            Ok(())
        })?;

        tracing::warn!(change = change_id, error = message, "Change failed");
        Ok(())
    }

    fn ensure_reviewer(&self) -> Result<()> {
        if self.actor.role.can_review() {
            Ok(())
        } else {
            Err(PipelineError::PermissionDenied(format!(
                "User {} ({}) may not review recommendations",
                self.actor.id, self.actor.role
            )))
        }
    }

    fn pending_recommendation(&self, id: i64) -> Result<Recommendation> {
        let rec = self.recommendations.get(id)?;
        if rec.status != RecommendationStatus::Pending {
            return Err(PipelineError::InvalidState(format!(
                "Recommendation {} is {}, not pending",
                id, rec.status
            )));
        }
        Ok(rec)
    }
}
