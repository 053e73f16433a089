//! `catrec edit`: apply a batch of manual cell edits.
//!
//! Edits are staged in a [`CellEditLedger`] first, so repeated edits to the
//! same cell collapse into one diff from the original value to the last
//! one. The ledger is then flushed one record at a time; a record whose
//! edits cannot be applied is reported without affecting the others.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

use catalog_reconcile_core::ledger::{CellEdit, CellEditLedger};
use catalog_reconcile_core::models::FieldRef;
use catalog_reconcile_core::review::{flush_ledger, rescore, FailedEdits};
use catalog_reconcile_core::store::RecordStore;

use crate::config::Config;
use crate::db;

/// One edit as written in the input file.
#[derive(Debug, Clone, Deserialize)]
pub struct EditRequest {
    pub record_id: String,
    pub field: String,
    pub value: Value,
}

#[derive(Debug, Default, Serialize)]
pub struct EditSummary {
    pub dry_run: bool,
    pub staged: Vec<CellEdit>,
    pub applied: usize,
    pub failed: Vec<FailedEdits>,
}

pub async fn run_edit(config: &Config, edits_path: &Path, dry_run: bool) -> Result<EditSummary> {
    let content = tokio::fs::read_to_string(edits_path)
        .await
        .with_context(|| format!("Failed to read {}", edits_path.display()))?;
    let requests: Vec<EditRequest> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", edits_path.display()))?;

    let store = db::connect(config).await?;
    let mut ledger = stage_edits(&store, requests).await?;

    let mut summary = EditSummary {
        dry_run,
        staged: ledger.edits().to_vec(),
        ..Default::default()
    };

    if !dry_run {
        let report = flush_ledger(&mut ledger, &store).await;
        rescore(&store, &config.scoring.calculator(), &report.updated).await?;
        store.save().await?;
        summary.applied = report.applied.len();
        summary.failed = report.failed;
    }

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(summary)
}

/// Build a ledger from edit requests, snapshotting each cell's current
/// value as the edit's old value. Cells are keyed by canonical field name,
/// so `feature_01` and `feature_1` are the same cell. Unknown records keep
/// a null old value and fail at flush time.
async fn stage_edits<R>(store: &R, requests: Vec<EditRequest>) -> Result<CellEditLedger>
where
    R: RecordStore + ?Sized,
{
    let mut ledger = CellEditLedger::new();
    for req in requests {
        let field: FieldRef = req
            .field
            .parse()
            .with_context(|| format!("record {}", req.record_id))?;
        let field_id = field.to_string();
        let old = match ledger.original_value(&req.record_id, &field_id) {
            Some(v) => v.clone(),
            None => store
                .get_record(&req.record_id)
                .await?
                .map(|r| r.field_value(&field))
                .unwrap_or(Value::Null),
        };
        ledger.record_edit(req.record_id, field_id, old, req.value);
    }
    Ok(ledger)
}
