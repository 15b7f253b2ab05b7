//! Suggestion ingestion
//!
//! Recommendations are produced elsewhere (an analysis service, a model,
//! a person with a spreadsheet). A [`SuggestionSource`] hands them over as
//! [`NewRecommendation`]s and [`ingest`] stores the valid ones as pending.

use crate::error::{validation_error, PipelineError, Result};
use crate::review::{NewRecommendation, RecommendationRepository};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Anything that can produce recommendations
pub trait SuggestionSource {
    /// Human-readable origin, used in logs
    fn describe(&self) -> String;

    /// Produce the batch of suggestions
    fn suggestions(&self) -> Result<Vec<NewRecommendation>>;
}

/// Reads suggestions from a JSON file.
///
/// Accepts either a bare array or an object with a `recommendations` array.
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Parse suggestions from a JSON string.
    ///
    /// A malformed item fails the whole file, naming the item's position.
    pub fn parse(raw: &str) -> Result<Vec<NewRecommendation>> {
        let items = match serde_json::from_str::<Value>(raw)? {
            Value::Array(items) => items,
            Value::Object(mut file) => match file.remove("recommendations") {
                Some(Value::Array(items)) => items,
                _ => {
                    return Err(validation_error(
                        "expected a `recommendations` array in the suggestion file",
                    ))
                }
            },
            _ => return Err(validation_error("expected an array of suggestions")),
        };

        items
            .into_iter()
            .enumerate()
            .map(|(index, item)| {
                serde_json::from_value(item)
                    .map_err(|e| validation_error(format!("suggestion {}: {}", index, e)))
            })
            .collect()
    }
}

impl SuggestionSource for JsonFileSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn suggestions(&self) -> Result<Vec<NewRecommendation>> {
        let raw = std::fs::read_to_string(&self.path).map_err(|e| {
            PipelineError::Validation(format!("cannot read {}: {}", self.path.display(), e))
        })?;
        Self::parse(&raw)
    }
}

/// In-memory source, handy for embedding callers and tests
pub struct StaticSource {
    items: Vec<NewRecommendation>,
}

impl StaticSource {
    pub fn new(items: Vec<NewRecommendation>) -> Self {
        Self { items }
    }
}

impl SuggestionSource for StaticSource {
    fn describe(&self) -> String {
        format!("{} in-memory suggestion(s)", self.items.len())
    }

    fn suggestions(&self) -> Result<Vec<NewRecommendation>> {
        Ok(self.items.clone())
    }
}

/// A suggestion that was not stored
#[derive(Debug, Clone, Serialize)]
pub struct RejectedSuggestion {
    /// Position in the source batch
    pub index: usize,
    pub error: String,
    pub error_kind: String,
}

/// Outcome of [`ingest`]
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub created: Vec<i64>,
    pub rejected: Vec<RejectedSuggestion>,
}

/// Store every valid suggestion as a pending recommendation.
///
/// Invalid items are reported and skipped; a source that cannot be read at
/// all is an error.
pub fn ingest(
    source: &dyn SuggestionSource,
    repository: &RecommendationRepository<'_>,
) -> Result<IngestReport> {
    let items = source.suggestions()?;
    tracing::info!(source = %source.describe(), count = items.len(), "Ingesting suggestions");

    let mut report = IngestReport::default();
    for (index, item) in items.iter().enumerate() {
        match repository.create(item) {
            Ok(id) => report.created.push(id),
            Err(e) => {
                tracing::warn!(index, error = %e, "Suggestion rejected");
                report.rejected.push(RejectedSuggestion {
                    index,
                    error: e.to_string(),
                    error_kind: e.kind().to_string(),
                });
            }
        }
    }

    Ok(report)
}
