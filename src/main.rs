//! # Catalog Reconcile CLI (`catrec`)
//!
//! Reconciles AI enrichment suggestions, manual cell edits, and bulk stock
//! uploads against a product catalog held in a JSON records file.
//!
//! ## Usage
//!
//! ```bash
//! catrec --config ./config/catrec.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `catrec score` | Completeness breakdowns and catalog summary |
//! | `catrec check-file <path>` | Validate an upload's file type |
//! | `catrec import <path>` | Apply a CSV/XLSX stock file to the catalog |
//! | `catrec review <file>` | Propose and auto-resolve AI suggestions |
//! | `catrec edit <file>` | Apply a batch of manual cell edits |
//! | `catrec export` | Write records with fresh scores as JSON |
//!
//! ## Examples
//!
//! ```bash
//! # Preview a stock update without writing
//! catrec import ./stock.xlsx --dry-run
//!
//! # Only update two products
//! catrec import ./stock.csv --only SKU-1 --only SKU-2
//!
//! # Accept confident suggestions, drop weak ones
//! catrec review ./suggestions.json --accept-above 80 --reject-below 40
//! ```

use catalog_reconcile::{config, edit, export, import, logging, progress, review, score};

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Catalog Reconcile CLI: keep product records consistent while AI
/// suggestions, manual edits, and stock uploads change them.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/catrec.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "catrec",
    about = "Catalog Reconcile: review enrichment suggestions and apply stock uploads",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/catrec.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show completeness breakdowns.
    ///
    /// Without `--id`, prints one line per record and a catalog summary.
    Score {
        /// Only this record (internal id).
        #[arg(long)]
        id: Option<String>,

        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Check whether a file would be accepted for import.
    ///
    /// Looks at the extension and the declared content type only; the file
    /// is not opened.
    CheckFile {
        path: PathBuf,

        /// Declared MIME type (e.g. `text/csv`).
        #[arg(long)]
        content_type: Option<String>,
    },

    /// Apply a CSV or XLSX stock file to the catalog.
    ///
    /// Rows are matched by SKU. Quantity sets the stock status (≤ 0 → Out
    /// of Stock, below the low-stock threshold → Low Stock, otherwise In
    /// Stock). Prints a JSON report with per-row errors.
    Import {
        path: PathBuf,

        /// Declared MIME type, used when the extension is not recognised.
        #[arg(long)]
        content_type: Option<String>,

        /// Print the commit plan without writing anything.
        #[arg(long)]
        dry_run: bool,

        /// Restrict the import to these records (id or SKU). Repeatable.
        #[arg(long)]
        only: Vec<String>,

        /// Progress on stderr: `off`, `human`, or `json`. Defaults to human
        /// on a terminal.
        #[arg(long)]
        progress: Option<progress::ProgressMode>,
    },

    /// Propose AI suggestions from a JSON file and auto-resolve them.
    Review {
        /// JSON array of suggestions
        /// (`record_id`, `field`, `suggested_value`, `confidence`, ...).
        path: PathBuf,

        /// Accept pending suggestions with confidence at or above this.
        #[arg(long)]
        accept_above: Option<f64>,

        /// Reject pending suggestions with confidence below this.
        #[arg(long)]
        reject_below: Option<f64>,
    },

    /// Apply manual cell edits from a JSON file.
    Edit {
        /// JSON array of `{record_id, field, value}`.
        path: PathBuf,

        /// Show the staged edits without writing anything.
        #[arg(long)]
        dry_run: bool,
    },

    /// Export all records with completeness breakdowns as JSON.
    Export {
        /// Output file; stdout when omitted.
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Commands that don't require config
    if let Commands::CheckFile { path, content_type } = &cli.command {
        let cfg = config::load_config(&cli.config).unwrap_or_else(|_| config::Config::minimal());
        logging::init_tracing(&cfg.logging.level)?;
        import::run_check_file(path, content_type.as_deref())?;
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;
    logging::init_tracing(&cfg.logging.level)?;

    match cli.command {
        Commands::Score { id, json } => {
            score::run_score(&cfg, id.as_deref(), json).await?;
        }
        Commands::Import {
            path,
            content_type,
            dry_run,
            only,
            progress,
        } => {
            let options = import::ImportOptions {
                content_type,
                dry_run,
                only,
            };
            let mode = progress.unwrap_or_else(progress::ProgressMode::default_for_tty);
            import::run_import(&cfg, &path, &options, mode).await?;
        }
        Commands::Review {
            path,
            accept_above,
            reject_below,
        } => {
            let options = review::ReviewOptions {
                accept_above,
                reject_below,
            };
            review::run_review(&cfg, &path, options).await?;
        }
        Commands::Edit { path, dry_run } => {
            edit::run_edit(&cfg, &path, dry_run).await?;
        }
        Commands::Export { output } => {
            export::run_export(&cfg, output.as_deref()).await?;
        }
        Commands::CheckFile { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}
