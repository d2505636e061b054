use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::commands::{self, CommandReport};
use crate::logging;
use crate::sorter::paths::resolve_paths;

#[derive(Debug, Parser)]
#[command(
    name = "inbox-sorter",
    version,
    about = "Sort JSON/JSONL drops from an inbox into a versioned dataset archive"
)]
struct Cli {
    /// Print the command report as JSON.
    #[arg(long, global = true)]
    json: bool,

    /// Debug-level logging.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Process the inbox backlog, then keep watching for new drops.
    Watch {
        /// Process the current backlog and exit.
        #[arg(long)]
        once: bool,
    },
    /// Run a single file through the pipeline.
    Ingest { path: PathBuf },
    /// Show resolved paths, effective config, and SORTER_* overrides.
    Status,
    /// Show what the indexing phase would extract from an archived JSONL file.
    Preview {
        path: PathBuf,
        #[arg(long, default_value_t = 2)]
        limit: usize,
    },
}

fn print_report(report: &CommandReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    let status = if report.ok { "ok" } else { "failed" };
    println!("{}: {status}", report.command);
    for detail in &report.details {
        println!("  {detail}");
    }
    for issue in &report.issues {
        println!("  ! {issue}");
    }
    Ok(())
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let paths = resolve_paths()?;
    let _guard = logging::init_logging(&paths.logs_dir, cli.verbose)?;

    let report = match cli.command {
        Command::Watch { once } => {
            commands::watch::run(&commands::watch::WatchOptions { once })?
        }
        Command::Ingest { path } => commands::ingest::run(&path)?,
        Command::Status => commands::status::run()?,
        Command::Preview { path, limit } => commands::preview::run(&path, limit)?,
    };

    print_report(&report, cli.json)?;
    if !report.ok {
        bail!("{} reported {} issue(s)", report.command, report.issues.len());
    }
    Ok(())
}
