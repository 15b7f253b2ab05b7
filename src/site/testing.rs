//! Fault-injecting content store for tests

use super::{
    Actor, ContentStore, Entity, EntityField, EntityKind, MetaRow, SiteIdentity,
    SqliteContentStore,
};
use crate::error::{PipelineError, Result};
use crate::storage::Database;

/// Wraps [`SqliteContentStore`] and fails selected operations
pub(crate) struct FaultyStore<'a> {
    inner: SqliteContentStore<'a>,
    /// Entity whose field updates fail
    pub fail_update_for: Option<i64>,
    /// Fail every field update
    pub fail_all_updates: bool,
    /// Fail every meta and option write
    pub fail_meta_writes: bool,
    /// Fail enumeration, which breaks backup capture
    pub fail_listing: bool,
}

impl<'a> FaultyStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self {
            inner: SqliteContentStore::new(db),
            fail_update_for: None,
            fail_all_updates: false,
            fail_meta_writes: false,
            fail_listing: false,
        }
    }

    fn injected(what: &str) -> PipelineError {
        PipelineError::Storage(rusqlite::Error::InvalidParameterName(format!(
            "injected failure: {}",
            what
        )))
    }
}

impl ContentStore for FaultyStore<'_> {
    fn get_entity(&self, id: i64) -> Result<Entity> {
        self.inner.get_entity(id)
    }

    fn update_entity_field(&self, id: i64, field: EntityField, value: &str) -> Result<()> {
        if self.fail_all_updates || self.fail_update_for == Some(id) {
            return Err(Self::injected("update_entity_field"));
        }
        self.inner.update_entity_field(id, field, value)
    }

    fn restore_entity(&self, entity: &Entity) -> Result<()> {
        if self.fail_all_updates || self.fail_update_for == Some(entity.id) {
            return Err(Self::injected("restore_entity"));
        }
        self.inner.restore_entity(entity)
    }

    fn can_edit(&self, actor: &Actor, id: i64) -> Result<bool> {
        self.inner.can_edit(actor, id)
    }

    fn get_meta(&self, id: i64, key: &str) -> Result<Option<String>> {
        self.inner.get_meta(id, key)
    }

    fn set_meta(&self, id: i64, key: &str, value: &str) -> Result<()> {
        if self.fail_meta_writes {
            return Err(Self::injected("set_meta"));
        }
        self.inner.set_meta(id, key, value)
    }

    fn list_entities(&self, kinds: &[EntityKind]) -> Result<Vec<Entity>> {
        if self.fail_listing {
            return Err(Self::injected("list_entities"));
        }
        self.inner.list_entities(kinds)
    }

    fn list_meta(&self, prefixes: &[String]) -> Result<Vec<MetaRow>> {
        if self.fail_listing {
            return Err(Self::injected("list_meta"));
        }
        self.inner.list_meta(prefixes)
    }

    fn get_option(&self, name: &str) -> Result<Option<serde_json::Value>> {
        self.inner.get_option(name)
    }

    fn set_option(&self, name: &str, value: &serde_json::Value) -> Result<()> {
        if self.fail_meta_writes {
            return Err(Self::injected("set_option"));
        }
        self.inner.set_option(name, value)
    }

    fn list_options(&self, prefix: &str) -> Result<Vec<(String, serde_json::Value)>> {
        self.inner.list_options(prefix)
    }

    fn site_identity(&self) -> Result<SiteIdentity> {
        self.inner.site_identity()
    }
}
