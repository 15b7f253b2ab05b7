//! seopilot - Approval, backup and rollback pipeline for content changes
//!
//! Recommendations for content and SEO edits are reviewed by a person,
//! turned into concrete changes on approval, and implemented only after a
//! backup of everything they touch has been taken. Every mutation lands in
//! an audit log, and any backup can be restored.

pub mod audit;
pub mod automation;
pub mod backup;
pub mod cli;
pub mod config;
pub mod error;
pub mod review;
pub mod site;
pub mod storage;
pub mod suggest;
pub mod updater;

/// Re-export commonly used types
pub use audit::{AuditLog, AuditStatus};
pub use automation::{AutomationEngine, ImplementationReport};
pub use backup::{BackupKind, BackupStore, RollbackReport};
pub use config::Config;
pub use error::{PipelineError, Result};
pub use review::{ApprovalWorkflow, RecommendationRepository};
pub use site::{Actor, ContentStore, Role, SqliteContentStore};
pub use storage::Database;
pub use updater::ContentUpdater;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const APP_NAME: &str = "seopilot";
