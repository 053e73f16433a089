//! Export the catalog with fresh completeness breakdowns as JSON.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

use catalog_reconcile_core::models::ProductRecord;
use catalog_reconcile_core::score::CompletenessBreakdown;
use catalog_reconcile_core::store::RecordStore;

use crate::config::Config;
use crate::db;

#[derive(Serialize)]
struct ExportRecord {
    #[serde(flatten)]
    record: ProductRecord,
    completeness: CompletenessBreakdown,
}

/// Export every record plus its breakdown.
///
/// If `output` is `Some`, writes to that file path. Otherwise writes
/// to stdout for piping.
pub async fn run_export(config: &Config, output: Option<&Path>) -> Result<()> {
    let store = db::connect(config).await?;
    let calculator = config.scoring.calculator();

    let data: Vec<ExportRecord> = store
        .list_records()
        .await?
        .into_iter()
        .map(|record| {
            let completeness = calculator.compute(&record);
            ExportRecord {
                record,
                completeness,
            }
        })
        .collect();

    let json = serde_json::to_string_pretty(&data)?;

    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            std::fs::write(path, &json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("Exported {} records to {}", data.len(), path.display());
        }
        None => {
            println!("{}", json);
        }
    }

    Ok(())
}
