//! Content store abstraction
//!
//! The pipeline never talks to a concrete CMS. It goes through:
//! - [`ContentStore`] for entity fields, metadata and site options
//! - [`MetadataProvider`] for third-party SEO key namespaces
//!
//! [`SqliteContentStore`] is the bundled implementation backed by the
//! workspace database.

mod providers;
mod sqlite;
#[cfg(test)]
pub(crate) mod testing;

pub use providers::{MetaKeyProvider, MetadataProvider, ProviderRegistry, ProviderValues};
pub use sqlite::{EntityFixture, SiteFixture, SqliteContentStore};

use crate::error::{validation_error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Kind of content entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Post,
    Page,
    Attachment,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Post => "post",
            EntityKind::Page => "page",
            EntityKind::Attachment => "attachment",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = crate::error::PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "post" => Ok(EntityKind::Post),
            "page" => Ok(EntityKind::Page),
            "attachment" => Ok(EntityKind::Attachment),
            other => Err(validation_error(format!("unknown entity kind '{}'", other))),
        }
    }
}

/// Mutable column of an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityField {
    Title,
    Body,
    Excerpt,
    Status,
    Slug,
}

impl EntityField {
    pub(crate) fn column(&self) -> &'static str {
        match self {
            EntityField::Title => "title",
            EntityField::Body => "body",
            EntityField::Excerpt => "excerpt",
            EntityField::Status => "status",
            EntityField::Slug => "slug",
        }
    }
}

/// A post, page or attachment held by the content store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: i64,
    pub kind: EntityKind,
    pub title: String,
    pub body: String,
    pub excerpt: String,
    pub status: String,
    pub slug: String,
    pub author_id: i64,
}

impl Entity {
    /// Create a published entity with empty fields
    pub fn new(id: i64, kind: EntityKind, title: &str) -> Self {
        Self {
            id,
            kind,
            title: title.to_string(),
            body: String::new(),
            excerpt: String::new(),
            status: "publish".to_string(),
            slug: String::new(),
            author_id: 0,
        }
    }

    /// Set the body
    pub fn with_body(mut self, body: &str) -> Self {
        self.body = body.to_string();
        self
    }

    /// Set the author
    pub fn with_author(mut self, author_id: i64) -> Self {
        self.author_id = author_id;
        self
    }
}

/// One metadata row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaRow {
    pub entity_id: i64,
    pub key: String,
    pub value: String,
}

/// Site identity facts captured by full backups
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteIdentity {
    pub site_url: String,
    pub name: String,
    pub description: String,
    pub version: String,
}

/// Role of the principal performing an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Administrator,
    Editor,
    Author,
    Viewer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Administrator => "administrator",
            Role::Editor => "editor",
            Role::Author => "author",
            Role::Viewer => "viewer",
        }
    }

    /// Whether this role may approve, reject or modify recommendations
    pub fn can_review(&self) -> bool {
        matches!(self, Role::Administrator | Role::Editor)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = crate::error::PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "administrator" | "admin" => Ok(Role::Administrator),
            "editor" => Ok(Role::Editor),
            "author" => Ok(Role::Author),
            "viewer" => Ok(Role::Viewer),
            other => Err(validation_error(format!("unknown role '{}'", other))),
        }
    }
}

/// The principal on whose behalf the pipeline acts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: i64,
    pub role: Role,
}

impl Actor {
    pub fn new(id: i64, role: Role) -> Self {
        Self { id, role }
    }

    /// Built-in administrator used by tests and first-run setups
    pub fn administrator() -> Self {
        Self::new(1, Role::Administrator)
    }
}

/// Read/update operations the pipeline needs from the host CMS
pub trait ContentStore {
    /// Fetch an entity; `NotFound` when missing
    fn get_entity(&self, id: i64) -> Result<Entity>;

    /// Overwrite one column of an entity
    fn update_entity_field(&self, id: i64, field: EntityField, value: &str) -> Result<()>;

    /// Write every editable column of `entity` back in one statement
    fn restore_entity(&self, entity: &Entity) -> Result<()>;

    /// Whether `actor` may mutate entity `id`
    fn can_edit(&self, actor: &Actor, id: i64) -> Result<bool>;

    fn get_meta(&self, id: i64, key: &str) -> Result<Option<String>>;

    fn set_meta(&self, id: i64, key: &str, value: &str) -> Result<()>;

    /// All entities of the given kinds, ordered by id
    fn list_entities(&self, kinds: &[EntityKind]) -> Result<Vec<Entity>>;

    /// Metadata rows whose key starts with any of `prefixes`
    fn list_meta(&self, prefixes: &[String]) -> Result<Vec<MetaRow>>;

    fn get_option(&self, name: &str) -> Result<Option<serde_json::Value>>;

    fn set_option(&self, name: &str, value: &serde_json::Value) -> Result<()>;

    /// Options whose name starts with `prefix`
    fn list_options(&self, prefix: &str) -> Result<Vec<(String, serde_json::Value)>>;

    fn site_identity(&self) -> Result<SiteIdentity>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parsing() {
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Administrator);
        assert_eq!("Editor".parse::<Role>().unwrap(), Role::Editor);
        assert!("root".parse::<Role>().is_err());
    }

    #[test]
    fn test_entity_kind_round_trip() {
        for kind in [EntityKind::Post, EntityKind::Page, EntityKind::Attachment] {
            assert_eq!(kind.as_str().parse::<EntityKind>().unwrap(), kind);
        }
    }
}
