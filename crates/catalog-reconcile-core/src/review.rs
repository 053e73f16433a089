//! Async glue between the in-memory components and the external stores.
//!
//! Every function here awaits its store calls in order and returns only
//! once they finish, so a caller issuing one call at a time gets serialized
//! behaviour without the engine taking any locks.
//!
//! Failure is per item. A suggestion whose record update fails stays
//! pending; a ledger flush reports failing records without touching the
//! edits of other records; a bulk plan confirms or fails row by row.

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::bulk::{BulkReport, Reconciliation};
use crate::error::{EngineError, EngineResult};
use crate::ledger::{CellEdit, CellEditLedger};
use crate::models::{AppliedChange, FieldDiff, FieldRef, NewSuggestion, ProductRecord, Suggestion};
use crate::score::{CompletenessBreakdown, ScoreCalculator};
use crate::store::{RecordStore, SuggestionSink};
use crate::suggestion::SuggestionStore;

// ── Suggestions ─────────────────────────────────────────────────────────

/// Propose a suggestion for an existing record and mirror it to the sink.
///
/// The field name is validated and stored in canonical form. When the
/// proposer did not snapshot the current value, it is read from the record.
pub async fn propose_suggestion<R, S>(
    suggestions: &mut SuggestionStore,
    records: &R,
    sink: &S,
    mut new: NewSuggestion,
) -> EngineResult<Suggestion>
where
    R: RecordStore + ?Sized,
    S: SuggestionSink + ?Sized,
{
    let field: FieldRef = new.field.parse()?;
    new.field = field.to_string();
    let record = records
        .get_record(&new.record_id)
        .await
        .map_err(EngineError::from_store)?
        .ok_or_else(|| EngineError::not_found(format!("record {}", new.record_id)))?;
    if new.current_value.is_none() {
        new.current_value = value_as_text(&record.field_value(&field));
    }

    let mark = suggestions.history_len();
    let suggestion = suggestions.propose(new)?;
    sink.save_suggestion(&suggestion)
        .await
        .map_err(EngineError::from_store)?;
    mirror_history(suggestions, sink, mark).await?;
    Ok(suggestion)
}

/// Accept a pending suggestion: update the record, mark the suggestion, and
/// append exactly one audit entry.
///
/// The record is written first. If that fails the suggestion stays pending.
/// If the record write succeeds but the sink does not, the suggestion is
/// already accepted and [`EngineError::Unaudited`] is returned.
pub async fn accept_suggestion<R, S>(
    suggestions: &mut SuggestionStore,
    records: &R,
    sink: &S,
    id: &str,
) -> EngineResult<AppliedChange>
where
    R: RecordStore + ?Sized,
    S: SuggestionSink + ?Sized,
{
    let pending = suggestions.ensure_pending(id)?;
    let record_id = pending.record_id.clone();
    let diff = FieldDiff::new(
        pending.field.clone(),
        Value::String(pending.suggested_value.clone()),
    );
    write_record(records, &record_id, &[diff]).await?;

    let mark = suggestions.history_len();
    let change = suggestions.accept(id)?;
    persist_resolution(suggestions, sink, id, mark).await?;
    Ok(change)
}

/// Resolve a pending suggestion with a human-provided value. Write ordering
/// and failures are as for [`accept_suggestion`].
pub async fn edit_suggestion<R, S>(
    suggestions: &mut SuggestionStore,
    records: &R,
    sink: &S,
    id: &str,
    new_value: &str,
) -> EngineResult<AppliedChange>
where
    R: RecordStore + ?Sized,
    S: SuggestionSink + ?Sized,
{
    let pending = suggestions.ensure_pending(id)?;
    let record_id = pending.record_id.clone();
    let diff = FieldDiff::new(pending.field.clone(), Value::String(new_value.to_string()));
    write_record(records, &record_id, &[diff]).await?;

    let mark = suggestions.history_len();
    let change = suggestions.edit(id, new_value)?;
    persist_resolution(suggestions, sink, id, mark).await?;
    Ok(change)
}

/// Reject a pending suggestion. The record is not touched. A sink failure
/// after the rejection is recorded yields [`EngineError::Unaudited`].
pub async fn reject_suggestion<S>(
    suggestions: &mut SuggestionStore,
    sink: &S,
    id: &str,
) -> EngineResult<()>
where
    S: SuggestionSink + ?Sized,
{
    let mark = suggestions.history_len();
    suggestions.reject(id)?;
    persist_resolution(suggestions, sink, id, mark).await
}

async fn write_record<R>(records: &R, record_id: &str, diffs: &[FieldDiff]) -> EngineResult<ProductRecord>
where
    R: RecordStore + ?Sized,
{
    records
        .apply_diffs(record_id, diffs)
        .await
        .map_err(EngineError::from_store)?
        .ok_or_else(|| EngineError::not_found(format!("record {}", record_id)))
}

async fn persist_resolution<S>(
    suggestions: &SuggestionStore,
    sink: &S,
    id: &str,
    mark: usize,
) -> EngineResult<()>
where
    S: SuggestionSink + ?Sized,
{
    let mirrored = async {
        if let Some(s) = suggestions.get(id) {
            sink.save_suggestion(s)
                .await
                .map_err(EngineError::from_store)?;
        }
        mirror_history(suggestions, sink, mark).await
    };
    mirrored.await.map_err(|e| {
        warn!(suggestion_id = %id, error = %e, "resolution applied but not audited");
        EngineError::unaudited(id, e)
    })
}

async fn mirror_history<S>(suggestions: &SuggestionStore, sink: &S, mark: usize) -> EngineResult<()>
where
    S: SuggestionSink + ?Sized,
{
    for entry in suggestions.entries_since(mark) {
        sink.append_history(entry)
            .await
            .map_err(EngineError::from_store)?;
    }
    Ok(())
}

fn value_as_text(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

// ── Ledger flush ────────────────────────────────────────────────────────

/// Edits of one record that could not be written.
#[derive(Debug, Clone, Serialize)]
pub struct FailedEdits {
    pub record_id: String,
    pub edits: Vec<CellEdit>,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FlushReport {
    pub applied: Vec<CellEdit>,
    pub failed: Vec<FailedEdits>,
    /// Records as stored after their edits were applied.
    #[serde(skip)]
    pub updated: Vec<ProductRecord>,
}

/// Commit the ledger and write its edits, one store call per record.
///
/// The ledger is empty afterwards regardless of outcome; failed edits are
/// returned so the caller can show them or record them again.
pub async fn flush_ledger<R>(ledger: &mut CellEditLedger, records: &R) -> FlushReport
where
    R: RecordStore + ?Sized,
{
    let edits = ledger.commit();
    let mut groups: Vec<(String, Vec<CellEdit>)> = Vec::new();
    for edit in edits {
        match groups.iter_mut().find(|(id, _)| *id == edit.record_id) {
            Some((_, group)) => group.push(edit),
            None => groups.push((edit.record_id.clone(), vec![edit])),
        }
    }

    let mut report = FlushReport::default();
    for (record_id, group) in groups {
        let diffs: Vec<FieldDiff> = group.iter().map(CellEdit::as_diff).collect();
        match write_record(records, &record_id, &diffs).await {
            Ok(updated) => {
                debug!(record_id = %record_id, edits = group.len(), "flushed edits");
                report.applied.extend(group);
                report.updated.push(updated);
            }
            Err(e) => {
                warn!(record_id = %record_id, error = %e, "flush failed for record");
                report.failed.push(FailedEdits {
                    record_id,
                    edits: group,
                    message: e.to_string(),
                });
            }
        }
    }
    info!(
        applied = report.applied.len(),
        failed_records = report.failed.len(),
        "ledger flushed"
    );
    report
}

// ── Bulk plan ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct AppliedPlan {
    pub report: BulkReport,
    pub updated: Vec<ProductRecord>,
}

/// Apply a reconciliation's commit plan entry by entry and build the final
/// report. `on_progress(done, total)` is called after each entry.
pub async fn apply_plan<R, F>(
    mut reconciliation: Reconciliation,
    records: &R,
    mut on_progress: F,
) -> EngineResult<AppliedPlan>
where
    R: RecordStore + ?Sized,
    F: FnMut(usize, usize),
{
    let plan = std::mem::take(&mut reconciliation.plan);
    let total = plan.len();
    let mut updated = Vec::new();

    for (done, entry) in plan.iter().enumerate() {
        let result = match entry.record_id.as_deref() {
            Some(id) => write_record(records, id, &entry.diffs()).await,
            None => Err(EngineError::not_found(format!("'{}' not found", entry.natural_key))),
        };
        match result {
            Ok(rec) => {
                reconciliation.confirm(entry.row_index)?;
                updated.retain(|r: &ProductRecord| r.id != rec.id);
                updated.push(rec);
            }
            Err(e) => {
                warn!(row = entry.row_index, sku = %entry.natural_key, error = %e, "bulk row failed");
                reconciliation.fail(entry.row_index, e.to_string())?;
            }
        }
        on_progress(done + 1, total);
    }

    let report = reconciliation.finish();
    info!(
        total = report.total_rows,
        success = report.success_count,
        errors = report.error_count,
        "bulk plan applied"
    );
    Ok(AppliedPlan { report, updated })
}

// ── Scores ──────────────────────────────────────────────────────────────

/// Recompute and store completeness for the given records.
pub async fn rescore<R>(
    records: &R,
    calculator: &ScoreCalculator,
    updated: &[ProductRecord],
) -> EngineResult<Vec<(String, CompletenessBreakdown)>>
where
    R: RecordStore + ?Sized,
{
    let mut out = Vec::with_capacity(updated.len());
    for rec in updated {
        let breakdown = calculator.compute(rec);
        records
            .set_completeness(&rec.id, breakdown.overall_score)
            .await
            .map_err(EngineError::from_store)?;
        out.push((rec.id.clone(), breakdown));
    }
    Ok(out)
}
