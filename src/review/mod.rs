//! Recommendation review and change tracking
//!
//! A [`Recommendation`] is a proposed edit awaiting human review. Approving
//! one materialises exactly one [`Change`], which the automation engine
//! later implements.
//!
//! ```text
//! Recommendation: pending ──approve──▶ approved  (+ Change: pending)
//!                    │
//!                    └────reject────▶ rejected
//!
//! Change: pending ──▶ implemented | failed
//! ```

mod changes;
mod recommendations;
mod workflow;

pub use changes::ChangeRepository;
pub use recommendations::RecommendationRepository;
pub use workflow::ApprovalWorkflow;

use crate::error::{validation_error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Review status of a recommendation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationStatus {
    Pending,
    Approved,
    Rejected,
}

impl RecommendationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendationStatus::Pending => "pending",
            RecommendationStatus::Approved => "approved",
            RecommendationStatus::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for RecommendationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecommendationStatus {
    type Err = crate::error::PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(RecommendationStatus::Pending),
            "approved" => Ok(RecommendationStatus::Approved),
            "rejected" => Ok(RecommendationStatus::Rejected),
            other => Err(validation_error(format!(
                "unknown recommendation status '{}'",
                other
            ))),
        }
    }
}

/// Implementation status of a change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImplementationStatus {
    Pending,
    Implemented,
    Failed,
}

impl ImplementationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImplementationStatus::Pending => "pending",
            ImplementationStatus::Implemented => "implemented",
            ImplementationStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ImplementationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImplementationStatus {
    type Err = crate::error::PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(ImplementationStatus::Pending),
            "implemented" => Ok(ImplementationStatus::Implemented),
            "failed" => Ok(ImplementationStatus::Failed),
            other => Err(validation_error(format!(
                "unknown implementation status '{}'",
                other
            ))),
        }
    }
}

/// Recommendation-shaped input from a suggestion source.
///
/// `confidence_score` has no default; a suggestion must state it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewRecommendation {
    #[serde(default)]
    pub recommendation_type: String,
    #[serde(default)]
    pub target_id: i64,
    #[serde(default)]
    pub target_type: String,
    #[serde(default)]
    pub current_value: String,
    #[serde(default)]
    pub suggested_value: String,
    #[serde(default)]
    pub reasoning: String,
    pub confidence_score: f64,
    #[serde(default)]
    pub impact_analysis: String,
    #[serde(default)]
    pub risk_assessment: String,
    #[serde(default)]
    pub implementation_details: String,
}

impl NewRecommendation {
    /// Check required fields and the confidence range
    pub fn validate(&self) -> Result<()> {
        if self.recommendation_type.trim().is_empty() {
            return Err(validation_error("recommendation_type must not be empty"));
        }
        if self.target_type.trim().is_empty() {
            return Err(validation_error("target_type must not be empty"));
        }
        if self.reasoning.trim().is_empty() {
            return Err(validation_error("reasoning must not be empty"));
        }
        // NaN fails the range check
        if !(0.0..=1.0).contains(&self.confidence_score) {
            return Err(validation_error(format!(
                "confidence_score must be within [0, 1], got {}",
                self.confidence_score
            )));
        }
        Ok(())
    }
}

/// A stored recommendation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub id: i64,
    pub recommendation_type: String,
    pub target_id: i64,
    pub target_type: String,
    pub current_value: String,
    pub suggested_value: String,
    pub reasoning: String,
    pub confidence_score: f64,
    pub impact_analysis: String,
    pub risk_assessment: String,
    pub implementation_details: String,
    pub status: RecommendationStatus,
    pub created_at: String,
    pub reviewed_at: Option<String>,
    pub reviewed_by: Option<i64>,
    pub review_notes: Option<String>,
}

impl Recommendation {
    /// `implementation_details` as a JSON object, if it is one
    pub fn details_object(&self) -> Option<serde_json::Map<String, serde_json::Value>> {
        match serde_json::from_str::<serde_json::Value>(&self.implementation_details) {
            Ok(serde_json::Value::Object(map)) => Some(map),
            _ => None,
        }
    }
}

/// Whitelisted edits allowed on a pending recommendation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Modifications {
    pub suggested_value: Option<String>,
    pub reasoning: Option<String>,
    pub implementation_details: Option<String>,
}

impl Modifications {
    pub fn is_empty(&self) -> bool {
        self.suggested_value.is_none()
            && self.reasoning.is_none()
            && self.implementation_details.is_none()
    }
}

/// A concrete old → new edit created by approval
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Change {
    pub id: i64,
    pub recommendation_id: i64,
    pub change_type: String,
    pub target_id: i64,
    pub target_type: String,
    pub old_value: String,
    pub new_value: String,
    pub implementation_status: ImplementationStatus,
    pub implemented_at: Option<String>,
    pub implemented_by: Option<i64>,
    pub backup_id: Option<i64>,
    pub error_message: Option<String>,
    pub created_at: String,
}

/// A change joined with the recommendation it came from
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeWithRecommendation {
    pub change: Change,
    pub recommendation: Recommendation,
}
