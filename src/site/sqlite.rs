//! Content store backed by the workspace SQLite database

use super::{Actor, ContentStore, Entity, EntityField, EntityKind, MetaRow, Role, SiteIdentity};
use crate::error::{not_found_error, Result};
use crate::storage::{now_timestamp, Database};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Importable description of a site, used to seed the local store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SiteFixture {
    #[serde(default)]
    pub entities: Vec<EntityFixture>,
    #[serde(default)]
    pub options: BTreeMap<String, serde_json::Value>,
}

/// One entity in a [`SiteFixture`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityFixture {
    pub id: i64,
    pub kind: EntityKind,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub excerpt: String,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub author_id: i64,
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
}

fn default_status() -> String {
    "publish".to_string()
}

/// [`ContentStore`] over the `entities`, `entity_meta` and `site_options` tables
pub struct SqliteContentStore<'a> {
    db: &'a Database,
}

impl<'a> SqliteContentStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Insert or replace an entity
    pub fn upsert_entity(&self, entity: &Entity) -> Result<()> {
        self.db.conn().execute(
            r#"
            INSERT INTO entities (id, kind, title, body, excerpt, status, slug, author_id, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(id) DO UPDATE SET
                kind = excluded.kind,
                title = excluded.title,
                body = excluded.body,
                excerpt = excluded.excerpt,
                status = excluded.status,
                slug = excluded.slug,
                author_id = excluded.author_id,
                updated_at = excluded.updated_at
            "#,
            params![
                entity.id,
                entity.kind.as_str(),
                entity.title,
                entity.body,
                entity.excerpt,
                entity.status,
                entity.slug,
                entity.author_id,
                now_timestamp(),
            ],
        )?;
        Ok(())
    }

    /// Load a fixture into the store; returns the number of entities written
    pub fn import(&self, fixture: &SiteFixture) -> Result<usize> {
        self.db.transaction(|_| {
            for item in &fixture.entities {
                let entity = Entity {
                    id: item.id,
                    kind: item.kind,
                    title: item.title.clone(),
                    body: item.body.clone(),
                    excerpt: item.excerpt.clone(),
                    status: item.status.clone(),
                    slug: item.slug.clone(),
                    author_id: item.author_id,
                };
                self.upsert_entity(&entity)?;
                for (key, value) in &item.meta {
                    self.set_meta(item.id, key, value)?;
                }
            }
            for (name, value) in &fixture.options {
                self.set_option(name, value)?;
            }
            Ok(fixture.entities.len())
        })
    }

    /// All metadata of one entity
    pub fn entity_meta(&self, id: i64) -> Result<Vec<MetaRow>> {
        let mut stmt = self.db.conn().prepare(
            "SELECT entity_id, meta_key, meta_value FROM entity_meta WHERE entity_id = ?1 ORDER BY meta_key",
        )?;
        let rows = stmt.query_map(params![id], |row| {
            Ok(MetaRow {
                entity_id: row.get(0)?,
                key: row.get(1)?,
                value: row.get(2)?,
            })
        })?;

        let mut meta = Vec::new();
        for row in rows {
            meta.push(row?);
        }
        Ok(meta)
    }
}

impl ContentStore for SqliteContentStore<'_> {
    fn get_entity(&self, id: i64) -> Result<Entity> {
        let row = self
            .db
            .conn()
            .query_row(
                r#"
                SELECT id, kind, title, body, excerpt, status, slug, author_id
                FROM entities WHERE id = ?1
                "#,
                params![id],
                EntityRow::from_row,
            )
            .optional()?;

        match row {
            Some(row) => row.into_entity(),
            None => Err(not_found_error(format!("Entity {} not found", id))),
        }
    }

    fn update_entity_field(&self, id: i64, field: EntityField, value: &str) -> Result<()> {
        // Column names come from a closed enum, never from input.
        let sql = format!(
            "UPDATE entities SET {} = ?1, updated_at = ?2 WHERE id = ?3",
            field.column()
        );
        let updated = self
            .db
            .conn()
            .execute(&sql, params![value, now_timestamp(), id])?;
        if updated == 0 {
            return Err(not_found_error(format!("Entity {} not found", id)));
        }
        Ok(())
    }

    fn restore_entity(&self, entity: &Entity) -> Result<()> {
        let updated = self.db.conn().execute(
            r#"
            UPDATE entities
            SET title = ?1, body = ?2, excerpt = ?3, status = ?4, slug = ?5, updated_at = ?6
            WHERE id = ?7
            "#,
            params![
                entity.title,
                entity.body,
                entity.excerpt,
                entity.status,
                entity.slug,
                now_timestamp(),
                entity.id,
            ],
        )?;
        if updated == 0 {
            return Err(not_found_error(format!("Entity {} not found", entity.id)));
        }
        Ok(())
    }

    fn can_edit(&self, actor: &Actor, id: i64) -> Result<bool> {
        let entity = self.get_entity(id)?;
        Ok(match actor.role {
            Role::Administrator | Role::Editor => true,
            Role::Author => entity.author_id == actor.id,
            Role::Viewer => false,
        })
    }

    fn get_meta(&self, id: i64, key: &str) -> Result<Option<String>> {
        let value = self
            .db
            .conn()
            .query_row(
                "SELECT meta_value FROM entity_meta WHERE entity_id = ?1 AND meta_key = ?2",
                params![id, key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set_meta(&self, id: i64, key: &str, value: &str) -> Result<()> {
        self.db.conn().execute(
            r#"
            INSERT INTO entity_meta (entity_id, meta_key, meta_value) VALUES (?1, ?2, ?3)
            ON CONFLICT(entity_id, meta_key) DO UPDATE SET meta_value = excluded.meta_value
            "#,
            params![id, key, value],
        )?;
        Ok(())
    }

    fn list_entities(&self, kinds: &[EntityKind]) -> Result<Vec<Entity>> {
        let mut stmt = self.db.conn().prepare(
            r#"
            SELECT id, kind, title, body, excerpt, status, slug, author_id
            FROM entities ORDER BY id
            "#,
        )?;
        let rows = stmt.query_map([], EntityRow::from_row)?;

        let mut entities = Vec::new();
        for row in rows {
            let entity = row?.into_entity()?;
            if kinds.contains(&entity.kind) {
                entities.push(entity);
            }
        }
        Ok(entities)
    }

    fn list_meta(&self, prefixes: &[String]) -> Result<Vec<MetaRow>> {
        let mut stmt = self.db.conn().prepare(
            "SELECT entity_id, meta_key, meta_value FROM entity_meta ORDER BY entity_id, meta_key",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(MetaRow {
                entity_id: row.get(0)?,
                key: row.get(1)?,
                value: row.get(2)?,
            })
        })?;

        let mut meta = Vec::new();
        for row in rows {
            let row = row?;
            if prefixes.iter().any(|p| row.key.starts_with(p.as_str())) {
                meta.push(row);
            }
        }
        Ok(meta)
    }

    fn get_option(&self, name: &str) -> Result<Option<serde_json::Value>> {
        let raw: Option<String> = self
            .db
            .conn()
            .query_row(
                "SELECT value FROM site_options WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;

        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    fn set_option(&self, name: &str, value: &serde_json::Value) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.db.conn().execute(
            r#"
            INSERT INTO site_options (name, value) VALUES (?1, ?2)
            ON CONFLICT(name) DO UPDATE SET value = excluded.value
            "#,
            params![name, raw],
        )?;
        Ok(())
    }

    fn list_options(&self, prefix: &str) -> Result<Vec<(String, serde_json::Value)>> {
        let mut stmt = self
            .db
            .conn()
            .prepare("SELECT name, value FROM site_options ORDER BY name")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut options = Vec::new();
        for row in rows {
            let (name, raw) = row?;
            if name.starts_with(prefix) {
                options.push((name, serde_json::from_str(&raw)?));
            }
        }
        Ok(options)
    }

    fn site_identity(&self) -> Result<SiteIdentity> {
        let text = |name: &str| -> Result<String> {
            Ok(match self.get_option(name)? {
                Some(serde_json::Value::String(s)) => s,
                Some(other) => other.to_string(),
                None => String::new(),
            })
        };

        Ok(SiteIdentity {
            site_url: text("siteurl")?,
            name: text("blogname")?,
            description: text("blogdescription")?,
            version: crate::VERSION.to_string(),
        })
    }
}

// Internal row type for database mapping

struct EntityRow {
    id: i64,
    kind: String,
    title: String,
    body: String,
    excerpt: String,
    status: String,
    slug: String,
    author_id: i64,
}

impl EntityRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            kind: row.get(1)?,
            title: row.get(2)?,
            body: row.get(3)?,
            excerpt: row.get(4)?,
            status: row.get(5)?,
            slug: row.get(6)?,
            author_id: row.get(7)?,
        })
    }

    fn into_entity(self) -> Result<Entity> {
        Ok(Entity {
            id: self.id,
            kind: self.kind.parse()?,
            title: self.title,
            body: self.body,
            excerpt: self.excerpt,
            status: self.status,
            slug: self.slug,
            author_id: self.author_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;

    #[test]
    fn test_entity_round_trip() {
        let db = Database::open_in_memory().unwrap();
        let store = SqliteContentStore::new(&db);

        store
            .upsert_entity(&Entity::new(10, EntityKind::Post, "Hello").with_body("<p>Hi</p>"))
            .unwrap();

        let entity = store.get_entity(10).unwrap();
        assert_eq!(entity.title, "Hello");
        assert_eq!(entity.body, "<p>Hi</p>");

        store
            .update_entity_field(10, EntityField::Title, "Hello again")
            .unwrap();
        assert_eq!(store.get_entity(10).unwrap().title, "Hello again");
    }

    #[test]
    fn test_missing_entity() {
        let db = Database::open_in_memory().unwrap();
        let store = SqliteContentStore::new(&db);

        assert!(matches!(store.get_entity(99), Err(PipelineError::NotFound(_))));
        assert!(matches!(
            store.update_entity_field(99, EntityField::Title, "x"),
            Err(PipelineError::NotFound(_))
        ));
        assert!(matches!(
            store.restore_entity(&Entity::new(99, EntityKind::Post, "x")),
            Err(PipelineError::NotFound(_))
        ));
    }

    #[test]
    fn test_permissions() {
        let db = Database::open_in_memory().unwrap();
        let store = SqliteContentStore::new(&db);
        store
            .upsert_entity(&Entity::new(1, EntityKind::Post, "Mine").with_author(7))
            .unwrap();

        assert!(store.can_edit(&Actor::new(7, Role::Author), 1).unwrap());
        assert!(!store.can_edit(&Actor::new(8, Role::Author), 1).unwrap());
        assert!(!store.can_edit(&Actor::new(7, Role::Viewer), 1).unwrap());
        assert!(store.can_edit(&Actor::new(8, Role::Editor), 1).unwrap());
    }

    #[test]
    fn test_meta_prefix_filter() {
        let db = Database::open_in_memory().unwrap();
        let store = SqliteContentStore::new(&db);
        store.set_meta(1, "_yoast_wpseo_title", "A").unwrap();
        store.set_meta(1, "_edit_lock", "123").unwrap();
        store.set_meta(2, "rank_math_title", "B").unwrap();

        let rows = store
            .list_meta(&["_yoast_".to_string(), "rank_math_".to_string()])
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.key != "_edit_lock"));
    }

    #[test]
    fn test_import_fixture() {
        let db = Database::open_in_memory().unwrap();
        let store = SqliteContentStore::new(&db);

        let fixture: SiteFixture = serde_json::from_str(
            r#"{
                "entities": [
                    {"id": 1, "kind": "post", "title": "Old Post", "meta": {"_yoast_wpseo_metadesc": "d"}},
                    {"id": 2, "kind": "attachment", "title": "hero.png"}
                ],
                "options": {"blogname": "Example", "seopilot_automation_enabled": true}
            }"#,
        )
        .unwrap();

        assert_eq!(store.import(&fixture).unwrap(), 2);
        assert_eq!(
            store.get_meta(1, "_yoast_wpseo_metadesc").unwrap().as_deref(),
            Some("d")
        );
        assert_eq!(store.site_identity().unwrap().name, "Example");
        assert_eq!(store.list_options("seopilot_").unwrap().len(), 1);
        assert_eq!(store.list_entities(&[EntityKind::Post]).unwrap().len(), 1);
    }
}
