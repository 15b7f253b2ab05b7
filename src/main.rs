//! seopilot - Content recommendation approval and rollback tool
//!
//! Reviews recommended content edits, backs up what they touch, applies
//! them, and restores any backup on request.

use anyhow::Result;
use clap::Parser;
use seopilot::cli::{
    approve, audit, backup, changes, config, diff, implement, init, modify, pending, reject,
    show, site_import, site_show, status, suggest, Cli, Commands, OutputFormat, SiteCommand,
    Workspace,
};
use seopilot::review::Modifications;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let path = Path::new(&cli.path);
    let format = cli.format;

    match cli.command {
        Commands::Init(args) => init(path, args.force)?,

        Commands::Config(args) => config(path, &args, format)?,

        Commands::Run(args) => run_periodic(path, args.interval, format)?,

        Commands::Site(args) => {
            let ws = Workspace::open(path)?;
            match args.command {
                SiteCommand::Import { file } => site_import(&ws, Path::new(&file), format)?,
                SiteCommand::Show { id } => site_show(&ws, id, format)?,
            }
        }

        Commands::Suggest(args) => suggest(&Workspace::open(path)?, Path::new(&args.file), format)?,

        Commands::Pending(args) => pending(&Workspace::open(path)?, args.limit, args.offset, format)?,

        Commands::Show(args) => show(&Workspace::open(path)?, args.id, format)?,

        Commands::Approve(args) => {
            approve(&Workspace::open(path)?, args.id, args.notes.as_deref(), format)?
        }

        Commands::Reject(args) => {
            reject(&Workspace::open(path)?, args.id, args.reason.as_deref(), format)?
        }

        Commands::Modify(args) => {
            let modifications = Modifications {
                suggested_value: args.value,
                reasoning: args.reasoning,
                implementation_details: args.details,
            };
            modify(&Workspace::open(path)?, args.id, &modifications, format)?;
        }

        Commands::Changes(args) => changes(
            &Workspace::open(path)?,
            args.approved,
            args.status.as_deref(),
            args.list.limit,
            args.list.offset,
            format,
        )?,

        Commands::Diff(args) => diff(&Workspace::open(path)?, args.change_id, format)?,

        Commands::Implement(args) => {
            implement(&Workspace::open(path)?, &args.ids, args.limit, format)?;
        }

        Commands::Backup(args) => backup(&Workspace::open(path)?, &args.command, format)?,

        Commands::Audit(args) => audit(&Workspace::open(path)?, &args.command, format)?,

        Commands::Status => status(&Workspace::open(path)?, format)?,
    }

    Ok(())
}

/// Implement approved changes on a fixed interval until Ctrl+C
fn run_periodic(path: &Path, interval: Option<u64>, format: OutputFormat) -> Result<()> {
    let ws = Workspace::open(path)?;
    let interval_secs = interval
        .unwrap_or(ws.config().automation.interval_secs)
        .max(1);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
        info!("Starting implementation loop (interval: {}s)", interval_secs);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match implement(&ws, &[], None, format) {
                        Ok(report) if report.all_failed() => {
                            warn!(failed = report.failed, "Every change in this run failed");
                        }
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "Implementation run failed"),
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Received Ctrl+C, stopping");
                    break;
                }
            }
        }
    });

    Ok(())
}
