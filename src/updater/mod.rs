//! Single-change execution against the content store
//!
//! [`ContentUpdater`] verifies the target, checks the actor's rights,
//! sanitises the value and performs one field-level write. Every attempt,
//! successful or not, leaves exactly one audit entry.

mod descriptor;
pub mod sanitize;

pub use descriptor::{ChangeDescriptor, ChangeKind, RawChange};

use crate::audit::{generate_change_id, AuditLog, AuditStatus, NewAuditEntry};
use crate::error::{not_found_error, validation_error, PipelineError, Result};
use crate::site::{
    Actor, ContentStore, EntityField, EntityKind, MetadataProvider, ProviderRegistry,
    ProviderValues,
};
use crate::storage::Database;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Meta key holding an attachment's alt text
pub const IMAGE_ALT_KEY: &str = "_wp_attachment_image_alt";

/// Meta key holding structured data for an entity
pub const SCHEMA_MARKUP_KEY: &str = "_seopilot_schema_markup";

/// A successfully applied change
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedChange {
    /// Audit correlation id of this application
    pub change_id: String,
    pub kind: ChangeKind,
    pub target_id: i64,
    pub old_value: String,
    pub new_value: String,
    pub image_id: Option<i64>,
    pub field: Option<String>,
    /// Providers written to, for metadata changes
    pub providers: Vec<String>,
}

/// Result of [`ContentUpdater::apply_changes`]
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchOutcome {
    pub success: usize,
    pub failed: usize,
    pub errors: Vec<String>,
    pub changes: Vec<AppliedChange>,
}

/// Current SEO-relevant values of one entity
#[derive(Debug, Clone, Serialize)]
pub struct SeoValues {
    pub entity_id: i64,
    pub title: String,
    pub body: String,
    pub excerpt: String,
    pub providers: Vec<ProviderValues>,
}

/// Link inserted by an internal-link change
#[derive(Debug, Clone, Deserialize)]
struct LinkSpec {
    anchor: String,
    url: String,
}

static LINK_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<a[\s>]").expect("valid link regex"));
static LINK_CLOSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</a\s*>").expect("valid link regex"));

/// Applies normalised changes through a [`ContentStore`]
pub struct ContentUpdater<'a> {
    store: &'a dyn ContentStore,
    providers: &'a ProviderRegistry,
    actor: Actor,
    audit: AuditLog<'a>,
}

impl<'a> ContentUpdater<'a> {
    pub fn new(
        db: &'a Database,
        store: &'a dyn ContentStore,
        providers: &'a ProviderRegistry,
        actor: Actor,
    ) -> Self {
        Self {
            store,
            providers,
            actor,
            audit: AuditLog::new(db),
        }
    }

    /// Apply one change and record exactly one audit entry
    pub fn apply(&self, descriptor: &ChangeDescriptor) -> Result<AppliedChange> {
        let change_id = generate_change_id();

        match self.dispatch(descriptor, &change_id) {
            Ok(applied) => {
                self.audit.log_change(
                    NewAuditEntry {
                        change_id: Some(change_id),
                        ..NewAuditEntry::new(
                            applied.kind.as_str(),
                            applied.target_id,
                            AuditStatus::Success,
                            &format!(
                                "Applied {} change to entity {}",
                                applied.kind, applied.target_id
                            ),
                        )
                    }
                    .with_values(&applied.old_value, &applied.new_value)
                    .with_image(applied.image_id)
                    .with_field(applied.field.clone()),
                )?;
                tracing::debug!(kind = %applied.kind, target = applied.target_id, "Applied change");
                Ok(applied)
            }
            Err(e) => {
                self.audit.log_change(
                    NewAuditEntry {
                        change_id: Some(change_id),
                        ..NewAuditEntry::new(
                            descriptor.kind.as_str(),
                            descriptor.target_id,
                            AuditStatus::Failed,
                            &e.to_string(),
                        )
                    }
                    .with_values(&descriptor.old_value, &descriptor.new_value)
                    .with_image(descriptor.image_id)
                    .with_field(descriptor.field.clone()),
                )?;
                tracing::debug!(kind = %descriptor.kind, target = descriptor.target_id, error = %e, "Change rejected");
                Err(e)
            }
        }
    }

    /// Normalise and apply a change in either wire shape
    pub fn apply_raw(&self, raw: &RawChange) -> Result<AppliedChange> {
        match raw.normalize() {
            Ok(descriptor) => self.apply(&descriptor),
            Err(e) => {
                let (change_type, target_id) = raw.declared();
                self.record_rejection(
                    &change_type,
                    target_id,
                    raw.old_value.as_deref().unwrap_or_default(),
                    raw.new_value.as_deref().unwrap_or_default(),
                    &e,
                )?;
                Err(e)
            }
        }
    }

    /// Apply a batch; one failure does not stop the rest
    pub fn apply_changes(&self, changes: &[RawChange]) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        for raw in changes {
            match self.apply_raw(raw) {
                Ok(applied) => {
                    outcome.success += 1;
                    outcome.changes.push(applied);
                }
                Err(e) => {
                    outcome.failed += 1;
                    outcome.errors.push(e.to_string());
                }
            }
        }
        outcome
    }

    /// Audit a change that never reached dispatch
    pub fn record_rejection(
        &self,
        change_type: &str,
        target_id: i64,
        old_value: &str,
        new_value: &str,
        error: &PipelineError,
    ) -> Result<()> {
        let change_type = if change_type.is_empty() {
            "unknown"
        } else {
            change_type
        };
        self.audit.log_change(
            NewAuditEntry::new(change_type, target_id, AuditStatus::Failed, &error.to_string())
                .with_values(old_value, new_value),
        )?;
        Ok(())
    }

    /// Entity fields plus each registered provider's metadata
    pub fn current_seo_values(&self, id: i64) -> Result<SeoValues> {
        let entity = self.store.get_entity(id)?;

        let mut providers = Vec::new();
        for provider in self.providers.iter() {
            providers.push(provider.current_values(self.store, id)?);
        }

        Ok(SeoValues {
            entity_id: entity.id,
            title: entity.title,
            body: entity.body,
            excerpt: entity.excerpt,
            providers,
        })
    }

    // ==================== Dispatch ====================

    fn dispatch(&self, d: &ChangeDescriptor, change_id: &str) -> Result<AppliedChange> {
        let entity = self.store.get_entity(d.target_id)?;
        if !self.store.can_edit(&self.actor, d.target_id)? {
            return Err(PipelineError::PermissionDenied(format!(
                "User {} may not edit entity {}",
                self.actor.id, d.target_id
            )));
        }

        let mut applied = AppliedChange {
            change_id: change_id.to_string(),
            kind: d.kind,
            target_id: d.target_id,
            old_value: d.old_value.clone(),
            new_value: String::new(),
            image_id: None,
            field: None,
            providers: Vec::new(),
        };

        match d.kind {
            ChangeKind::Title => {
                let value = sanitize::text(&d.new_value);
                if value.is_empty() {
                    return Err(validation_error("Title must not be empty"));
                }
                self.store
                    .update_entity_field(d.target_id, EntityField::Title, &value)?;
                applied.old_value = or_current(&d.old_value, &entity.title);
                applied.new_value = value;
            }
            ChangeKind::Content => {
                let value = sanitize::html(&d.new_value);
                if value.is_empty() {
                    return Err(validation_error("Content must not be empty"));
                }
                self.store
                    .update_entity_field(d.target_id, EntityField::Body, &value)?;
                applied.old_value = or_current(&d.old_value, &entity.body);
                applied.new_value = value;
            }
            ChangeKind::Excerpt => {
                let value = sanitize::textarea(&d.new_value);
                self.store
                    .update_entity_field(d.target_id, EntityField::Excerpt, &value)?;
                applied.old_value = or_current(&d.old_value, &entity.excerpt);
                applied.new_value = value;
            }
            ChangeKind::MetaDescription => {
                let value = sanitize::textarea(&d.new_value);
                applied.providers = self.fan_out(|p| p.set_description(self.store, d.target_id, &value))?;
                applied.new_value = value;
            }
            ChangeKind::MetaTitle => {
                let value = sanitize::text(&d.new_value);
                applied.providers = self.fan_out(|p| p.set_title(self.store, d.target_id, &value))?;
                applied.new_value = value;
            }
            ChangeKind::FocusKeyword => {
                let value = sanitize::text(&d.new_value);
                applied.providers =
                    self.fan_out(|p| p.set_focus_keyword(self.store, d.target_id, &value))?;
                applied.new_value = value;
            }
            ChangeKind::ImageAlt => {
                let image_id = d.image_id.ok_or_else(|| {
                    PipelineError::InvalidImageChange(format!(
                        "Image alt change for entity {} has no image reference",
                        d.target_id
                    ))
                })?;
                let image = self.store.get_entity(image_id)?;
                if image.kind != EntityKind::Attachment {
                    return Err(not_found_error(format!("Image {} not found", image_id)));
                }
                let value = sanitize::text(&d.new_value);
                let current = self.store.get_meta(image_id, IMAGE_ALT_KEY)?;
                self.store.set_meta(image_id, IMAGE_ALT_KEY, &value)?;
                applied.old_value = or_current(&d.old_value, current.as_deref().unwrap_or_default());
                applied.new_value = value;
                applied.image_id = Some(image_id);
            }
            ChangeKind::InternalLink => {
                let link: LinkSpec = serde_json::from_str(&d.new_value).map_err(|e| {
                    validation_error(format!(
                        "Internal link must be {{\"anchor\", \"url\"}} JSON: {}",
                        e
                    ))
                })?;
                let anchor = sanitize::text(&link.anchor);
                if anchor.is_empty() {
                    return Err(validation_error("Internal link anchor must not be empty"));
                }
                if !is_link_target(&link.url) {
                    return Err(validation_error(format!(
                        "Internal link URL '{}' is not an http(s) or site-relative URL",
                        link.url
                    )));
                }
                let body = insert_link(&entity.body, &anchor, link.url.trim());
                self.store
                    .update_entity_field(d.target_id, EntityField::Body, &body)?;
                applied.old_value = entity.body;
                applied.new_value = body;
            }
            ChangeKind::SchemaMarkup => {
                let parsed: serde_json::Value = serde_json::from_str(&d.new_value)
                    .map_err(|e| validation_error(format!("Schema markup must be JSON: {}", e)))?;
                let value = serde_json::to_string(&parsed)?;
                let current = self.store.get_meta(d.target_id, SCHEMA_MARKUP_KEY)?;
                self.store.set_meta(d.target_id, SCHEMA_MARKUP_KEY, &value)?;
                applied.old_value = or_current(&d.old_value, current.as_deref().unwrap_or_default());
                applied.new_value = value;
            }
            ChangeKind::CustomField => {
                let key = sanitize::key(d.field.as_deref().unwrap_or_default());
                if key.is_empty() {
                    return Err(PipelineError::InvalidField(format!(
                        "Custom field change for entity {} has no valid field name",
                        d.target_id
                    )));
                }
                let value = sanitize::text(&d.new_value);
                let current = self.store.get_meta(d.target_id, &key)?;
                self.store.set_meta(d.target_id, &key, &value)?;
                applied.old_value = or_current(&d.old_value, current.as_deref().unwrap_or_default());
                applied.new_value = value;
                applied.field = Some(key);
            }
        }

        Ok(applied)
    }

    /// Write through every registered provider
    fn fan_out<F>(&self, write: F) -> Result<Vec<String>>
    where
        F: Fn(&dyn MetadataProvider) -> Result<()>,
    {
        if self.providers.is_empty() {
            return Err(PipelineError::InvalidState(
                "No metadata provider is registered".to_string(),
            ));
        }

        let mut written = Vec::with_capacity(self.providers.len());
        for provider in self.providers.iter() {
            write(provider)?;
            written.push(provider.name().to_string());
        }
        Ok(written)
    }
}

fn or_current(given: &str, current: &str) -> String {
    if given.is_empty() {
        current.to_string()
    } else {
        given.to_string()
    }
}

fn is_link_target(url: &str) -> bool {
    let url = url.trim();
    url.starts_with("https://")
        || url.starts_with("http://")
        || (url.starts_with('/') && !url.starts_with("//"))
}

/// Wrap the first plain-text occurrence of `anchor` in a link, or append a
/// paragraph with the link when there is none.
fn insert_link(body: &str, anchor: &str, url: &str) -> String {
    let link = format!(
        "<a href=\"{}\">{}</a>",
        sanitize::escape(url),
        sanitize::escape(anchor)
    );

    for (start, _) in body.match_indices(anchor) {
        let before = &body[..start];
        let inside_tag = match (before.rfind('<'), before.rfind('>')) {
            (Some(open), Some(close)) => open > close,
            (Some(_), None) => true,
            _ => false,
        };
        let inside_link = LINK_OPEN.find_iter(before).count() > LINK_CLOSE.find_iter(before).count();

        if !inside_tag && !inside_link {
            let end = start + anchor.len();
            return format!("{}{}{}", &body[..start], link, &body[end..]);
        }
    }

    if body.trim().is_empty() {
        format!("<p>{}</p>", link)
    } else {
        format!("{}\n<p>{}</p>", body.trim_end(), link)
    }
}
