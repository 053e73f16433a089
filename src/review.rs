//! `catrec review`: load AI suggestions, auto-resolve by confidence, and
//! report what is left for a human.
//!
//! Every proposal and resolution is mirrored to the audit log. Accepted
//! values are written to the records file and the affected records are
//! rescored. A suggestion that fails (unknown record, bad field, value the
//! field cannot hold) is reported and skipped; the others still go through.
//! A resolution whose record write succeeded but whose audit entry could
//! not be appended counts as resolved and is listed under `unaudited`.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use catalog_reconcile_core::models::{HistoryEntry, NewSuggestion};
use catalog_reconcile_core::review::{
    accept_suggestion, propose_suggestion, reject_suggestion, rescore,
};
use catalog_reconcile_core::store::{RecordStore, SuggestionSink};
use catalog_reconcile_core::EngineError;
use catalog_reconcile_core::suggestion::{ConfidenceBand, SuggestionStore};

use crate::audit::JsonlAuditLog;
use crate::config::Config;
use crate::db;

#[derive(Debug, Clone, Copy, Default)]
pub struct ReviewOptions {
    /// Accept pending suggestions at or above this confidence.
    pub accept_above: Option<f64>,
    /// Reject pending suggestions below this confidence.
    pub reject_below: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct PendingView {
    pub id: String,
    pub field: String,
    pub current_value: Option<String>,
    pub suggested_value: String,
    pub confidence: f64,
    pub band: ConfidenceBand,
}

#[derive(Debug, Serialize)]
pub struct ReviewFailure {
    /// Suggestion id, or the input position for proposals that never got one.
    pub item: String,
    pub message: String,
}

#[derive(Debug, Default, Serialize)]
pub struct ReviewSummary {
    pub proposed: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub failed: Vec<ReviewFailure>,
    /// Resolutions that were applied but could not be written to the audit
    /// log. They are also counted in `accepted` / `rejected`.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unaudited: Vec<ReviewFailure>,
    pub pending: BTreeMap<String, Vec<PendingView>>,
    pub history: BTreeMap<String, Vec<HistoryEntry>>,
}

pub async fn run_review(
    config: &Config,
    suggestions_path: &Path,
    options: ReviewOptions,
) -> Result<ReviewSummary> {
    let content = tokio::fs::read_to_string(suggestions_path)
        .await
        .with_context(|| format!("Failed to read {}", suggestions_path.display()))?;
    let incoming: Vec<NewSuggestion> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", suggestions_path.display()))?;

    let store = db::connect(config).await?;
    let audit = JsonlAuditLog::new(config.store.audit_log_path());
    let mut suggestions = config.suggestions.store();

    let summary = review_batch(&mut suggestions, &store, &audit, incoming, options, config).await?;
    store.save().await?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(summary)
}

async fn review_batch<S>(
    suggestions: &mut SuggestionStore,
    store: &db::JsonRecordStore,
    audit: &S,
    incoming: Vec<NewSuggestion>,
    options: ReviewOptions,
    config: &Config,
) -> Result<ReviewSummary>
where
    S: SuggestionSink + ?Sized,
{
    let mut summary = ReviewSummary::default();
    let mut touched: BTreeSet<String> = BTreeSet::new();

    for (i, new) in incoming.into_iter().enumerate() {
        let record_id = new.record_id.clone();
        match propose_suggestion(suggestions, store, audit, new).await {
            Ok(_) => {
                summary.proposed += 1;
                touched.insert(record_id);
            }
            Err(e) => {
                tracing::warn!(index = i, record_id = %record_id, error = %e, "proposal rejected");
                summary.failed.push(ReviewFailure {
                    item: format!("#{}", i),
                    message: e.to_string(),
                });
            }
        }
    }

    let mut changed: BTreeSet<String> = BTreeSet::new();
    for record_id in &touched {
        let decisions: Vec<(String, f64)> = suggestions
            .list_pending(record_id)
            .into_iter()
            .map(|s| (s.id.clone(), s.confidence))
            .collect();
        for (id, confidence) in decisions {
            let (accepting, result) = if options.accept_above.is_some_and(|min| confidence >= min) {
                let result = accept_suggestion(suggestions, store, audit, &id).await;
                (true, result.map(|_| ()))
            } else if options.reject_below.is_some_and(|max| confidence < max) {
                (false, reject_suggestion(suggestions, audit, &id).await)
            } else {
                continue;
            };
            let resolved = match result {
                Ok(()) => true,
                Err(e @ EngineError::Unaudited { .. }) => {
                    summary.unaudited.push(ReviewFailure {
                        item: id,
                        message: e.to_string(),
                    });
                    true
                }
                Err(e) => {
                    tracing::warn!(suggestion_id = %id, error = %e, "resolution failed");
                    summary.failed.push(ReviewFailure {
                        item: id,
                        message: e.to_string(),
                    });
                    false
                }
            };
            if resolved && accepting {
                summary.accepted += 1;
                changed.insert(record_id.clone());
            } else if resolved {
                summary.rejected += 1;
            }
        }
    }

    let mut updated = Vec::new();
    for id in &changed {
        if let Some(rec) = store.get_record(id).await? {
            updated.push(rec);
        }
    }
    rescore(store, &config.scoring.calculator(), &updated).await?;

    for record_id in &touched {
        let pending: Vec<PendingView> = suggestions
            .list_pending(record_id)
            .into_iter()
            .map(|s| PendingView {
                id: s.id.clone(),
                field: s.field.clone(),
                current_value: s.current_value.clone(),
                suggested_value: s.suggested_value.clone(),
                confidence: s.confidence,
                band: suggestions.band(s),
            })
            .collect();
        if !pending.is_empty() {
            summary.pending.insert(record_id.clone(), pending);
        }
        let history: Vec<HistoryEntry> = suggestions
            .history(record_id, config.suggestions.history_limit)
            .into_iter()
            .cloned()
            .collect();
        summary.history.insert(record_id.clone(), history);
    }

    Ok(summary)
}
