/// CLI glue for harvest: argument parsing, config loading and dispatch.
///
/// All domain logic lives in `harvest-core`; this module wires configuration,
/// secrets and transports together and reports results to the user.
///
/// ## Commands
/// - `crawl`: Drive folder tree(s) → level table CSV.
/// - `flatten`: work-item JSON document → flat table CSV.
/// - `table`: CSV source → (optionally shaped) CSV.
/// - `publish`: upload, register and import the given files.
/// - `publish-dir`: the same for every `*.csv` in a folder, with a persisted report.
///
/// For programmatic or test use, call [`run`] with a constructed [`Cli`].
use crate::credentials::{api_token_from_env, drive_token_from_env};
use crate::load_config::load_config_or_default;
use crate::source::{
    apply_output, crawl_roots, csv_files_in, flatten_file, load_table, read_pending, write_table,
};
use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use harvest_core::batch::{ensure_unique_batch_names, run_batch, BatchOptions, BatchReport};
use harvest_core::config::{Config, UNATTENDED_DELAY_SECS};
use harvest_core::drive::DriveLister;
use harvest_core::publish::HttpPublisher;
use harvest_core::transport::HttpTransport;
use std::path::PathBuf;
use std::time::Duration;

/// CLI for harvest: crawl image folders, flatten annotation exports and publish batches.
#[derive(Debug, Parser)]
#[clap(
    name = "harvest",
    version,
    about = "Crawl Drive image folders, flatten annotation exports and publish batches"
)]
pub struct Cli {
    /// Path to the YAML config file (defaults apply when omitted)
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Crawl one or more Drive folders into a table of image links
    Crawl {
        /// Drive folder id to scan (repeatable)
        #[clap(long = "root", required = true)]
        roots: Vec<String>,
        /// Output CSV path (stdout when omitted)
        #[clap(long)]
        out: Option<PathBuf>,
    },
    /// Flatten a work-item JSON document into a table
    Flatten {
        #[clap(long)]
        input: PathBuf,
        #[clap(long)]
        out: Option<PathBuf>,
    },
    /// Load a CSV source and apply the configured output mapping
    Table {
        #[clap(long)]
        input: PathBuf,
        #[clap(long)]
        out: Option<PathBuf>,
    },
    /// Upload, register and import the given files in order
    Publish {
        #[clap(long = "file", required = true)]
        files: Vec<PathBuf>,
        /// Seconds to wait between files
        #[clap(long)]
        delay: Option<u64>,
        /// Also write a JSON report to this path
        #[clap(long)]
        log: Option<PathBuf>,
    },
    /// Publish every *.csv file in a folder, in name order
    PublishDir {
        #[clap(long)]
        dir: PathBuf,
        /// Seconds to wait between files (default 60)
        #[clap(long)]
        delay: Option<u64>,
        /// JSON report path (defaults to batch.log_file from config)
        #[clap(long)]
        log: Option<PathBuf>,
    },
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    let config = load_config_or_default(cli.config.as_deref())?;

    match cli.command {
        Commands::Crawl { roots, out } => {
            tracing::info!(command = "crawl", roots = roots.len(), "Starting crawl");
            let token = drive_token_from_env()?;
            let transport = HttpTransport::new(&config.transport)?;
            let lister = DriveLister::new(transport, &config.crawl, token);
            let table = crawl_roots(lister, &config, &roots).await?;
            tracing::info!(command = "crawl", rows = table.len(), "Crawl complete");
            write_table(&apply_output(table, &config), out.as_deref())
        }
        Commands::Flatten { input, out } => {
            tracing::info!(command = "flatten", input = %input.display(), "Flattening document");
            let table = flatten_file(&input)?;
            write_table(&apply_output(table, &config), out.as_deref())
        }
        Commands::Table { input, out } => {
            tracing::info!(command = "table", input = %input.display(), "Loading table");
            let table = load_table(&input)?;
            write_table(&apply_output(table, &config), out.as_deref())
        }
        Commands::Publish { files, delay, log } => {
            let delay = delay.or(config.batch.delay_secs).unwrap_or(0);
            let pending = files
                .iter()
                .map(|path| read_pending(path))
                .collect::<Result<Vec<_>>>()?;
            publish(&config, pending, delay, log).await
        }
        Commands::PublishDir { dir, delay, log } => {
            let delay = delay
                .or(config.batch.delay_secs)
                .unwrap_or(UNATTENDED_DELAY_SECS);
            let log = log.unwrap_or_else(|| config.batch.log_file.clone());
            let files = csv_files_in(&dir)?;
            if files.is_empty() {
                bail!("No .csv files found in {}", dir.display());
            }
            println!("Found {} CSV file(s) in {}", files.len(), dir.display());
            let pending = files
                .iter()
                .map(|path| read_pending(path))
                .collect::<Result<Vec<_>>>()?;
            publish(&config, pending, delay, Some(log)).await
        }
    }
}

async fn publish(
    config: &Config,
    files: Vec<harvest_core::contract::PendingFile>,
    delay_secs: u64,
    report_path: Option<PathBuf>,
) -> Result<()> {
    if delay_secs > 300 {
        bail!("--delay must be between 0 and 300 seconds, got {delay_secs}");
    }
    ensure_unique_batch_names(&files)?;
    config.publish.validate_identity()?;
    let token = api_token_from_env()?;
    let transport = HttpTransport::new(&config.transport)?;
    let publisher = HttpPublisher::new(transport, config.publish.clone(), token);
    let options = BatchOptions {
        delay: Duration::from_secs(delay_secs),
        report_path,
    };
    tracing::info!(command = "publish", files = files.len(), delay_secs, "Starting publish");
    let report = run_batch(&publisher, files, &options).await;
    print_report(&report);

    let mut problems = Vec::new();
    if report.failed() > 0 {
        problems.push(format!(
            "{} of {} file(s) failed to publish",
            report.failed(),
            report.len()
        ));
    }
    if let Some(path) = &options.report_path {
        match report.persist_error() {
            None => println!("Report written to {}", path.display()),
            Some(e) => {
                println!("Report NOT written to {}", path.display());
                problems.push(format!("batch report not saved: {e}"));
            }
        }
    }
    if !problems.is_empty() {
        bail!(problems.join("; "));
    }
    Ok(())
}

fn print_report(report: &BatchReport) {
    for entry in report.entries() {
        let marker = if entry.outcome.ok { "OK  " } else { "FAIL" };
        println!("[{marker}] {}: {}", entry.filename, entry.outcome.message);
        if let Some(link) = &entry.outcome.orphaned_file_link {
            println!("       uploaded object left behind: {link}");
        }
    }
    println!(
        "Summary: {} imported, {} failed, {} total",
        report.succeeded(),
        report.failed(),
        report.len()
    );
}
