//! Bulk stock import: `catrec import` and `catrec check-file`.
//!
//! # Pipeline
//!
//! ```text
//! validate shape → parse rows → reconcile against records → apply plan
//!                                                          → rescore → save
//! ```
//!
//! Validation and parsing failures abort before anything is read from the
//! record store. Row-level failures never abort: they end up in the
//! [`BulkReport`] printed on stdout.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

use catalog_reconcile_core::bulk::{BulkOutcome, BulkReport, CommitEntry, RawRow, RecordIndex};
use catalog_reconcile_core::file_shape::{validate_upload, FileKind};
use catalog_reconcile_core::review::{apply_plan, rescore};
use catalog_reconcile_core::selection::SelectionSet;

use crate::config::Config;
use crate::db;
use crate::extract::extract_rows;
use crate::progress::{ImportProgressEvent, ProgressMode};

/// Options for [`run_import`].
#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    /// Declared MIME type; the file extension wins when both are present.
    pub content_type: Option<String>,
    pub dry_run: bool,
    /// Restrict the import to these records (ids or SKUs). Empty = all.
    pub only: Vec<String>,
}

#[derive(Serialize)]
struct DryRunOutput<'a> {
    dry_run: bool,
    total_rows: usize,
    plan: &'a [CommitEntry],
    outcomes: &'a [BulkOutcome],
}

/// Validate the file shape without reading it.
pub fn run_check_file(path: &Path, content_type: Option<&str>) -> Result<FileKind> {
    let kind = check_shape(path, content_type)?;
    println!("ok: {} ({})", file_name(path), kind.mime());
    Ok(kind)
}

fn check_shape(path: &Path, content_type: Option<&str>) -> Result<FileKind> {
    Ok(validate_upload(&file_name(path), content_type.unwrap_or(""))?)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Read and parse an upload into rows.
pub async fn read_rows(path: &Path, content_type: Option<&str>) -> Result<Vec<RawRow>> {
    let kind = check_shape(path, content_type)?;
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    extract_rows(&bytes, kind).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Run a bulk import and print its report as JSON.
///
/// Returns `None` for dry runs, which print the commit plan instead and
/// leave the records file untouched.
pub async fn run_import(
    config: &Config,
    path: &Path,
    options: &ImportOptions,
    progress: ProgressMode,
) -> Result<Option<BulkReport>> {
    let reporter = progress.reporter();
    let label = file_name(path);

    let rows = read_rows(path, options.content_type.as_deref()).await?;
    reporter.report(ImportProgressEvent::Parsed {
        file: label.clone(),
        rows: rows.len() as u64,
    });

    let store = db::connect(config).await?;
    let records = store.records()?;
    let mut index = RecordIndex::from_records(records.iter().cloned());
    if !options.only.is_empty() {
        let selection = select_records(&records, &options.only);
        tracing::info!(selected = selection.size(), "import restricted to selection");
        index = index.restricted_to(&selection);
    }

    let reconciliation = config.bulk.reconciler().reconcile(&rows, &index)?;

    if options.dry_run {
        let out = DryRunOutput {
            dry_run: true,
            total_rows: reconciliation.outcomes.len(),
            plan: &reconciliation.plan,
            outcomes: &reconciliation.outcomes,
        };
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(None);
    }

    let applied = apply_plan(reconciliation, &store, |n, total| {
        reporter.report(ImportProgressEvent::Applying {
            file: label.clone(),
            n: n as u64,
            total: total as u64,
        })
    })
    .await?;

    let calculator = config.scoring.calculator();
    rescore(&store, &calculator, &applied.updated).await?;
    store.save().await?;

    tracing::info!(
        file = %label,
        success = applied.report.success_count,
        errors = applied.report.error_count,
        "import finished"
    );
    println!("{}", serde_json::to_string_pretty(&applied.report)?);
    Ok(Some(applied.report))
}

/// Ids of records named by id or SKU.
fn select_records(
    records: &[catalog_reconcile_core::models::ProductRecord],
    wanted: &[String],
) -> SelectionSet<String> {
    let mut selection = SelectionSet::new();
    for w in wanted {
        let w = w.trim();
        for rec in records {
            if rec.id == w || rec.sku.as_deref().map(str::trim) == Some(w) {
                selection.select(rec.id.clone());
            }
        }
    }
    selection
}
