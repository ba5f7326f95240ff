//! # cvedb CLI
//!
//! The `cvedb` binary is the primary interface for the import pipeline. It
//! provides commands for database initialization, bulk import, the
//! audit/retry reconciliation protocol, store statistics, and the query API
//! server.
//!
//! ## Usage
//!
//! ```bash
//! cvedb --config ./config/cvedb.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `cvedb init` | Create the SQLite database and run schema migrations |
//! | `cvedb import` | Bulk-import the CVE corpus with batched upserts |
//! | `cvedb status` | Audit corpus vs store and write the failure manifest |
//! | `cvedb retry` | Re-import the documents named in the manifest |
//! | `cvedb stats` | Print a summary of the store contents |
//! | `cvedb serve api` | Start the read-only HTTP query API |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use cvedb::progress::ProgressMode;
use cvedb::{audit, config, import, migrate, retry, server, stats};

/// cvedb — CVE corpus import, reconciliation, and query tool.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/cvedb.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "cvedb",
    about = "cvedb — CVE corpus import, reconciliation, and query tool",
    version,
    long_about = "cvedb ingests a cvelistV5-style corpus of per-CVE JSON documents into SQLite, \
    normalizing nested fields into a flat schema, and provides an audit/retry protocol for \
    reconciling partial imports plus a read-only HTTP API over the imported records."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/cvedb.toml")]
    config: PathBuf,

    /// Progress output on stderr: `off`, `human`, or `json`.
    /// Defaults to `human` when stderr is a terminal.
    #[arg(long, global = true, value_parser = parse_progress_mode)]
    progress: Option<ProgressMode>,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file, the `cves` and
    /// `vulnerability_types` tables, and all indexes. Idempotent.
    Init,

    /// Bulk-import the CVE corpus.
    ///
    /// Walks the corpus root, normalizes each document, and commits records
    /// in batches. A failed batch is rolled back and logged; the import
    /// continues with the next batch.
    Import {
        /// Maximum number of corpus files to visit.
        #[arg(long)]
        limit: Option<usize>,

        /// Walk and normalize without writing to the database.
        #[arg(long)]
        dry_run: bool,
    },

    /// Audit import status and write the failure manifest.
    ///
    /// Compares every corpus document against the store's identifier set
    /// and records the discrepancies. Overwrites any previous manifest.
    Status,

    /// Retry the failed imports named in the manifest.
    ///
    /// Each record commits in its own transaction; entries already in the
    /// store are skipped, so repeated runs are safe.
    Retry,

    /// Print a summary of the store contents.
    Stats,

    /// Start a server.
    Serve {
        #[command(subcommand)]
        service: ServeService,
    },
}

/// Server subcommands.
#[derive(Subcommand)]
enum ServeService {
    /// Start the read-only HTTP query API.
    ///
    /// Binds to the address configured in `[server].bind`.
    Api,
}

fn parse_progress_mode(s: &str) -> Result<ProgressMode, String> {
    match s {
        "off" => Ok(ProgressMode::Off),
        "human" => Ok(ProgressMode::Human),
        "json" => Ok(ProgressMode::Json),
        other => Err(format!(
            "invalid progress mode '{}': use off, human, or json",
            other
        )),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    let progress_mode = cli.progress.unwrap_or_else(ProgressMode::default_for_tty);
    let reporter = progress_mode.reporter();

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Import { limit, dry_run } => {
            import::run_import(&cfg, limit, dry_run, reporter.as_ref()).await?;
        }
        Commands::Status => {
            audit::run_status(&cfg, reporter.as_ref()).await?;
        }
        Commands::Retry => {
            retry::run_retry(&cfg, reporter.as_ref()).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Serve { service } => match service {
            ServeService::Api => {
                server::run_server(&cfg).await?;
            }
        },
    }

    Ok(())
}
