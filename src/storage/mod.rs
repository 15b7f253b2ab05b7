//! SQLite storage layer for SEOPilot
//!
//! This module owns the single connection every pipeline component borrows:
//! - Recommendations and the changes materialised from them
//! - Backup snapshots
//! - The audit log
//! - The local content store tables

mod schema;

pub use schema::SCHEMA;

use crate::error::Result;
use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, Transaction};
use std::path::Path;

/// Fixed-width timestamp layout; lexical order equals chronological order.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// Format a UTC instant the way every table stores it
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Current time in storage format
pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

/// Cutoff timestamp `days` days in the past
pub fn timestamp_days_ago(days: u32) -> String {
    format_timestamp(Utc::now() - Duration::days(i64::from(days)))
}

/// Database connection wrapper
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;

        let db = Self { conn };
        db.initialize()?;

        Ok(db)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;

        let db = Self { conn };
        db.initialize()?;

        Ok(db)
    }

    /// Initialize the database schema
    fn initialize(&self) -> Result<()> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Borrow the underlying connection
    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Run `f` inside a transaction; commits on `Ok`, rolls back on `Err`.
    ///
    /// Must not be nested: only top-level operations open transactions.
    pub(crate) fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T>,
    {
        let tx = self.conn.unchecked_transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    // ==================== Statistics ====================

    /// Get database statistics
    pub fn get_stats(&self) -> Result<DatabaseStats> {
        let count = |sql: &str| -> Result<usize> {
            let n: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
            Ok(n as usize)
        };

        Ok(DatabaseStats {
            recommendations: count("SELECT COUNT(*) FROM recommendations")?,
            pending_recommendations: count(
                "SELECT COUNT(*) FROM recommendations WHERE status = 'pending'",
            )?,
            changes: count("SELECT COUNT(*) FROM changes")?,
            pending_changes: count(
                "SELECT COUNT(*) FROM changes WHERE implementation_status = 'pending'",
            )?,
            implemented_changes: count(
                "SELECT COUNT(*) FROM changes WHERE implementation_status = 'implemented'",
            )?,
            failed_changes: count(
                "SELECT COUNT(*) FROM changes WHERE implementation_status = 'failed'",
            )?,
            active_backups: count("SELECT COUNT(*) FROM backups WHERE status = 'active'")?,
            audit_entries: count("SELECT COUNT(*) FROM audit_log")?,
            entities: count("SELECT COUNT(*) FROM entities")?,
        })
    }
}

/// Database statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct DatabaseStats {
    pub recommendations: usize,
    pub pending_recommendations: usize,
    pub changes: usize,
    pub pending_changes: usize,
    pub implemented_changes: usize,
    pub failed_changes: usize,
    pub active_backups: usize,
    pub audit_entries: usize,
    pub entities: usize,
}
