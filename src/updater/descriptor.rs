//! Change descriptors
//!
//! Changes arrive in two wire shapes:
//!
//! ```json
//! {"change_type": "post_title", "target_post_id": 12, "new_value": "..."}
//! {"type": "post_title", "post_id": 12, "field": "title", "new_value": "..."}
//! ```
//!
//! Both normalise into one [`ChangeDescriptor`] before dispatch.

use crate::error::{validation_error, PipelineError, Result};
use crate::review::{Change, Recommendation};
use serde::{Deserialize, Serialize};

/// Field-level mutation performed by the updater
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Title,
    Content,
    Excerpt,
    MetaDescription,
    MetaTitle,
    FocusKeyword,
    ImageAlt,
    InternalLink,
    SchemaMarkup,
    CustomField,
}

impl ChangeKind {
    /// Canonical name, as recorded in the audit log
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Title => "post_title",
            ChangeKind::Content => "post_content",
            ChangeKind::Excerpt => "post_excerpt",
            ChangeKind::MetaDescription => "meta_description",
            ChangeKind::MetaTitle => "meta_title",
            ChangeKind::FocusKeyword => "focus_keyword",
            ChangeKind::ImageAlt => "image_alt",
            ChangeKind::InternalLink => "internal_link",
            ChangeKind::SchemaMarkup => "schema_markup",
            ChangeKind::CustomField => "custom_field",
        }
    }

    /// Resolve a change type name or one of its aliases
    pub fn parse(name: &str) -> Result<Self> {
        let normalized = name.trim().to_ascii_lowercase().replace('-', "_");
        let kind = match normalized.as_str() {
            "title" | "post_title" | "title_optimization" => ChangeKind::Title,
            "content" | "post_content" | "content_expansion" => ChangeKind::Content,
            "excerpt" | "post_excerpt" | "summary" => ChangeKind::Excerpt,
            "meta_description" | "meta_description_optimization" => ChangeKind::MetaDescription,
            "meta_title" => ChangeKind::MetaTitle,
            "keyword" | "focus_keyword" | "focus_keyword_optimization" => ChangeKind::FocusKeyword,
            "image_alt" | "image_alt_optimization" => ChangeKind::ImageAlt,
            "internal_link" | "internal_linking" => ChangeKind::InternalLink,
            "schema_markup" => ChangeKind::SchemaMarkup,
            "custom_field" => ChangeKind::CustomField,
            _ => {
                return Err(PipelineError::UnknownChangeType(format!(
                    "Unknown change type: {}",
                    name
                )))
            }
        };
        Ok(kind)
    }
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalised change, ready for dispatch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeDescriptor {
    pub kind: ChangeKind,
    pub target_id: i64,
    pub old_value: String,
    pub new_value: String,
    /// Attachment referenced by image-alt changes
    pub image_id: Option<i64>,
    /// Meta key written by custom-field changes
    pub field: Option<String>,
}

impl ChangeDescriptor {
    pub fn new(kind: ChangeKind, target_id: i64, new_value: &str) -> Self {
        Self {
            kind,
            target_id,
            old_value: String::new(),
            new_value: new_value.to_string(),
            image_id: None,
            field: None,
        }
    }

    pub fn with_old_value(mut self, old_value: &str) -> Self {
        self.old_value = old_value.to_string();
        self
    }

    pub fn with_image(mut self, image_id: i64) -> Self {
        self.image_id = Some(image_id);
        self
    }

    pub fn with_field(mut self, field: &str) -> Self {
        self.field = Some(field.to_string());
        self
    }

    /// Build the descriptor for an approved change.
    ///
    /// Image and field references come from the recommendation's
    /// `implementation_details` when it is a JSON object.
    pub fn from_change(change: &Change, recommendation: &Recommendation) -> Result<Self> {
        let mut descriptor = Self::new(
            ChangeKind::parse(&change.change_type)?,
            change.target_id,
            &change.new_value,
        )
        .with_old_value(&change.old_value);

        if let Some(details) = recommendation.details_object() {
            descriptor.image_id = details.get("image_id").and_then(json_id);
            descriptor.field = details
                .get("field")
                .and_then(|v| v.as_str())
                .map(str::to_string);
        }

        Ok(descriptor)
    }
}

fn json_id(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Either wire shape of a change, as received
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawChange {
    // Newer shape
    pub change_type: Option<String>,
    pub target_post_id: Option<i64>,
    // Older shape
    #[serde(rename = "type")]
    pub legacy_type: Option<String>,
    pub post_id: Option<i64>,
    pub field: Option<String>,
    // Shared
    pub new_value: Option<String>,
    pub old_value: Option<String>,
    pub image_id: Option<i64>,
}

impl RawChange {
    /// Change type and target as given, for reporting rejected input
    pub fn declared(&self) -> (String, i64) {
        let change_type = self
            .change_type
            .clone()
            .or_else(|| self.legacy_type.clone())
            .unwrap_or_default();
        let target = self.target_post_id.or(self.post_id).unwrap_or(0);
        (change_type, target)
    }

    /// Normalise into a [`ChangeDescriptor`]
    pub fn normalize(&self) -> Result<ChangeDescriptor> {
        let (kind, target_id) = match self.change_type {
            Some(ref change_type) => {
                let target = self
                    .target_post_id
                    .ok_or_else(|| validation_error("Invalid change structure: missing target_post_id"))?;
                (ChangeKind::parse(change_type)?, target)
            }
            None => match (&self.legacy_type, self.post_id, &self.field) {
                (Some(legacy_type), Some(post_id), Some(_)) => {
                    (ChangeKind::parse(legacy_type)?, post_id)
                }
                _ => {
                    return Err(validation_error(
                        "Invalid change structure: expected change_type/target_post_id or type/post_id/field",
                    ))
                }
            },
        };

        Ok(ChangeDescriptor {
            kind,
            target_id,
            old_value: self.old_value.clone().unwrap_or_default(),
            new_value: self.new_value.clone().unwrap_or_default(),
            image_id: self.image_id,
            field: self.field.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aliases() {
        assert_eq!(ChangeKind::parse("title_optimization").unwrap(), ChangeKind::Title);
        assert_eq!(ChangeKind::parse("Meta-Description").unwrap(), ChangeKind::MetaDescription);
        assert_eq!(ChangeKind::parse("internal_linking").unwrap(), ChangeKind::InternalLink);
        assert_eq!(ChangeKind::parse("keyword").unwrap(), ChangeKind::FocusKeyword);
        assert!(matches!(
            ChangeKind::parse("rewrite_everything"),
            Err(PipelineError::UnknownChangeType(_))
        ));
    }

    #[test]
    fn test_both_shapes_normalize_alike() {
        let newer: RawChange = serde_json::from_str(
            r#"{"change_type": "post_title", "target_post_id": 12, "new_value": "New", "old_value": "Old"}"#,
        )
        .unwrap();
        let older: RawChange = serde_json::from_str(
            r#"{"type": "post_title", "post_id": 12, "field": "title", "new_value": "New", "old_value": "Old"}"#,
        )
        .unwrap();

        let a = newer.normalize().unwrap();
        let mut b = older.normalize().unwrap();
        assert_eq!(a.kind, ChangeKind::Title);
        assert_eq!(a.target_id, 12);
        b.field = None;
        assert_eq!(a, b);
    }

    #[test]
    fn test_malformed_shapes() {
        let missing_field: RawChange =
            serde_json::from_str(r#"{"type": "post_title", "post_id": 3}"#).unwrap();
        assert!(matches!(
            missing_field.normalize(),
            Err(PipelineError::Validation(_))
        ));

        let missing_target: RawChange =
            serde_json::from_str(r#"{"change_type": "post_title"}"#).unwrap();
        assert!(missing_target.normalize().is_err());
        assert_eq!(missing_target.declared(), ("post_title".to_string(), 0));
    }
}
