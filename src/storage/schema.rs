//! Database schema definition

/// SQL schema for the SEOPilot database
pub const SCHEMA: &str = r#"
-- Proposed changes awaiting human review
CREATE TABLE IF NOT EXISTS recommendations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    recommendation_type TEXT NOT NULL,
    target_id INTEGER NOT NULL,
    target_type TEXT NOT NULL,
    current_value TEXT NOT NULL DEFAULT '',
    suggested_value TEXT NOT NULL DEFAULT '',
    reasoning TEXT NOT NULL,
    confidence_score REAL NOT NULL,
    impact_analysis TEXT NOT NULL DEFAULT '',
    risk_assessment TEXT NOT NULL DEFAULT '',
    implementation_details TEXT NOT NULL DEFAULT '',
    status TEXT NOT NULL DEFAULT 'pending',
    created_at TEXT NOT NULL,
    reviewed_at TEXT,
    reviewed_by INTEGER,
    review_notes TEXT
);

CREATE INDEX IF NOT EXISTS idx_recommendations_status ON recommendations(status);
CREATE INDEX IF NOT EXISTS idx_recommendations_target ON recommendations(target_id);
CREATE INDEX IF NOT EXISTS idx_recommendations_created ON recommendations(created_at);

-- Concrete diffs materialised from approved recommendations
CREATE TABLE IF NOT EXISTS changes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    recommendation_id INTEGER NOT NULL,
    change_type TEXT NOT NULL,
    target_id INTEGER NOT NULL,
    target_type TEXT NOT NULL,
    old_value TEXT NOT NULL DEFAULT '',
    new_value TEXT NOT NULL DEFAULT '',
    implementation_status TEXT NOT NULL DEFAULT 'pending',
    implemented_at TEXT,
    implemented_by INTEGER,
    backup_id INTEGER,
    error_message TEXT,
    created_at TEXT NOT NULL,
    FOREIGN KEY (recommendation_id) REFERENCES recommendations(id) ON DELETE CASCADE
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_changes_recommendation ON changes(recommendation_id);
CREATE INDEX IF NOT EXISTS idx_changes_status ON changes(implementation_status);
CREATE INDEX IF NOT EXISTS idx_changes_created ON changes(created_at);

-- Point-in-time snapshots, soft-deleted only
CREATE TABLE IF NOT EXISTS backups (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    backup_name TEXT NOT NULL,
    backup_type TEXT NOT NULL,
    backup_data TEXT NOT NULL,
    backup_size INTEGER NOT NULL,
    checksum TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    status TEXT NOT NULL DEFAULT 'active',
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_backups_type ON backups(backup_type);
CREATE INDEX IF NOT EXISTS idx_backups_status ON backups(status);
CREATE INDEX IF NOT EXISTS idx_backups_created ON backups(created_at);

-- Append-only history of applied mutations and lifecycle events
CREATE TABLE IF NOT EXISTS audit_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    change_id TEXT NOT NULL,
    change_type TEXT NOT NULL,
    target_id INTEGER NOT NULL,
    old_value TEXT NOT NULL DEFAULT '',
    new_value TEXT NOT NULL DEFAULT '',
    status TEXT NOT NULL DEFAULT 'pending',
    message TEXT NOT NULL DEFAULT '',
    image_id INTEGER,
    field TEXT,
    applied_at TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_audit_change ON audit_log(change_id);
CREATE INDEX IF NOT EXISTS idx_audit_type ON audit_log(change_type);
CREATE INDEX IF NOT EXISTS idx_audit_target ON audit_log(target_id);
CREATE INDEX IF NOT EXISTS idx_audit_status ON audit_log(status);
CREATE INDEX IF NOT EXISTS idx_audit_applied ON audit_log(applied_at);

-- Local content store: posts, pages and attachments
CREATE TABLE IF NOT EXISTS entities (
    id INTEGER PRIMARY KEY,
    kind TEXT NOT NULL,
    title TEXT NOT NULL DEFAULT '',
    body TEXT NOT NULL DEFAULT '',
    excerpt TEXT NOT NULL DEFAULT '',
    status TEXT NOT NULL DEFAULT 'publish',
    slug TEXT NOT NULL DEFAULT '',
    author_id INTEGER NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_entities_kind ON entities(kind);

-- Per-entity metadata in provider key namespaces
CREATE TABLE IF NOT EXISTS entity_meta (
    entity_id INTEGER NOT NULL,
    meta_key TEXT NOT NULL,
    meta_value TEXT NOT NULL,
    PRIMARY KEY (entity_id, meta_key)
);

CREATE INDEX IF NOT EXISTS idx_entity_meta_key ON entity_meta(meta_key);

-- Site-wide options, values stored as JSON
CREATE TABLE IF NOT EXISTS site_options (
    name TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;
