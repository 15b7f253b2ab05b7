//! CLI interface using clap
//!
//! Provides the operator surface for seopilot

mod commands;

pub use commands::*;

use clap::{Parser, Subcommand};

/// seopilot - Review, back up and apply content recommendations
#[derive(Parser, Debug)]
#[command(name = "seopilot")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the workspace (defaults to current directory)
    #[arg(short, long, global = true, default_value = ".")]
    pub path: String,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json)
    #[arg(short = 'o', long, global = true, default_value = "text")]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize seopilot in a directory
    Init(InitArgs),

    /// Inspect or seed the local content store
    Site(SiteArgs),

    /// Ingest recommendations from a JSON file
    Suggest(SuggestArgs),

    /// List recommendations awaiting review
    Pending(ListArgs),

    /// Show one recommendation and its change
    Show(ShowArgs),

    /// Approve a pending recommendation
    Approve(ApproveArgs),

    /// Reject a pending recommendation
    Reject(RejectArgs),

    /// Edit a pending recommendation before approval
    Modify(ModifyArgs),

    /// List changes
    Changes(ChangesArgs),

    /// Show the old and new value of a change as a diff
    Diff(DiffArgs),

    /// Implement approved changes now
    Implement(ImplementArgs),

    /// Implement approved changes periodically until interrupted
    Run(RunArgs),

    /// Manage backups
    Backup(BackupArgs),

    /// Query the audit log
    Audit(AuditArgs),

    /// Show workspace status
    Status,

    /// Show configuration
    Config(ConfigArgs),
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Arguments for init command
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Force re-initialization
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Parser, Debug)]
pub struct SiteArgs {
    #[command(subcommand)]
    pub command: SiteCommand,
}

#[derive(Subcommand, Debug)]
pub enum SiteCommand {
    /// Import entities, metadata and options from a JSON fixture
    Import {
        /// Fixture file
        file: String,
    },

    /// Show an entity with its metadata
    Show {
        /// Entity id
        id: i64,
    },
}

/// Arguments for suggest command
#[derive(Parser, Debug)]
pub struct SuggestArgs {
    /// JSON file holding an array of recommendations
    pub file: String,
}

/// Pagination shared by list commands
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Maximum number of rows
    #[arg(short, long, default_value = "20")]
    pub limit: usize,

    /// Rows to skip
    #[arg(long, default_value = "0")]
    pub offset: usize,
}

#[derive(Parser, Debug)]
pub struct ShowArgs {
    /// Recommendation id
    pub id: i64,
}

#[derive(Parser, Debug)]
pub struct ApproveArgs {
    /// Recommendation id
    pub id: i64,

    /// Review notes
    #[arg(short, long)]
    pub notes: Option<String>,
}

#[derive(Parser, Debug)]
pub struct RejectArgs {
    /// Recommendation id
    pub id: i64,

    /// Reason for rejecting
    #[arg(short, long)]
    pub reason: Option<String>,
}

#[derive(Parser, Debug)]
pub struct ModifyArgs {
    /// Recommendation id
    pub id: i64,

    /// Replacement suggested value
    #[arg(long)]
    pub value: Option<String>,

    /// Replacement reasoning
    #[arg(long)]
    pub reasoning: Option<String>,

    /// Replacement implementation details (JSON)
    #[arg(long)]
    pub details: Option<String>,
}

#[derive(Parser, Debug)]
pub struct ChangesArgs {
    /// Only approved changes waiting for implementation
    #[arg(short, long)]
    pub approved: bool,

    /// Filter by implementation status (pending, implemented, failed)
    #[arg(short, long)]
    pub status: Option<String>,

    #[command(flatten)]
    pub list: ListArgs,
}

#[derive(Parser, Debug)]
pub struct DiffArgs {
    /// Change id
    pub change_id: i64,
}

#[derive(Parser, Debug)]
pub struct ImplementArgs {
    /// Restrict the batch to these change ids
    pub ids: Vec<i64>,

    /// Override the configured batch limit
    #[arg(short, long)]
    pub limit: Option<usize>,
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Seconds between runs (defaults to automation.interval_secs)
    #[arg(short, long)]
    pub interval: Option<u64>,
}

#[derive(Parser, Debug)]
pub struct BackupArgs {
    #[command(subcommand)]
    pub command: BackupCommand,
}

#[derive(Subcommand, Debug)]
pub enum BackupCommand {
    /// Take a backup now
    Create {
        /// Backup type (content, settings, full)
        #[arg(short, long, default_value = "full")]
        kind: String,

        /// Description stored with the backup
        #[arg(short, long, default_value = "Manual backup")]
        description: String,
    },

    /// List active backups
    List(ListArgs),

    /// Show a backup
    Show {
        id: i64,

        /// Print the snapshot payload
        #[arg(long)]
        data: bool,
    },

    /// Restore a backup
    Restore { id: i64 },

    /// Delete a backup
    Delete { id: i64 },

    /// Delete backups older than the retention window
    Cleanup {
        /// Retention in days (defaults to backup.retention_days)
        #[arg(short, long)]
        days: Option<u32>,
    },

    /// Check a backup's checksum
    Verify { id: i64 },
}

#[derive(Parser, Debug)]
pub struct AuditArgs {
    #[command(subcommand)]
    pub command: AuditCommand,
}

#[derive(Subcommand, Debug)]
pub enum AuditCommand {
    /// Page through the audit log
    List {
        #[arg(long, default_value = "1")]
        page: usize,

        #[arg(long, default_value = "20")]
        per_page: usize,

        /// Filter by change type
        #[arg(short = 't', long)]
        change_type: Option<String>,

        /// Filter by status (pending, success, failed, skipped)
        #[arg(short, long)]
        status: Option<String>,

        /// Filter by target entity
        #[arg(long)]
        target: Option<i64>,

        /// Earliest timestamp (inclusive)
        #[arg(long)]
        from: Option<String>,

        /// Latest timestamp (inclusive)
        #[arg(long)]
        to: Option<String>,
    },

    /// Most recent entries
    Recent {
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Entries for one target entity
    Target {
        id: i64,

        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Entries of one change type
    Type {
        change_type: String,

        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Aggregate statistics
    Stats {
        #[arg(short, long, default_value = "30")]
        days: u32,
    },

    /// Change types present in the log, with display labels
    Types,

    /// Statuses present in the log
    Statuses,

    /// Delete entries older than the retention window
    Cleanup {
        /// Retention in days (defaults to audit.retention_days)
        #[arg(short, long)]
        days: Option<u32>,
    },
}

/// Arguments for config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Show current configuration
    #[arg(long)]
    pub show: bool,

    /// Get a configuration value (dotted key, e.g. backup.retention_days)
    #[arg(long)]
    pub get: Option<String>,

    /// Reset to defaults
    #[arg(long)]
    pub reset: bool,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
