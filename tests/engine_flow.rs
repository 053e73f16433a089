//! End-to-end engine flows against custom store implementations.
//!
//! `FlakyStore` wraps the in-memory store and fails writes for chosen
//! record ids, so per-item failure isolation can be checked across
//! suggestion resolution, ledger flushes, and bulk plans.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Mutex;

use catalog_reconcile_core::bulk::{BulkReconciler, OutcomeState, RawRow, RecordIndex};
use catalog_reconcile_core::ledger::CellEditLedger;
use catalog_reconcile_core::models::{
    ChangeType, FieldDiff, HistoryEntry, NewSuggestion, ProductRecord, StockStatus, Suggestion,
    SuggestionStatus,
};
use catalog_reconcile_core::review::{
    accept_suggestion, apply_plan, edit_suggestion, flush_ledger, propose_suggestion,
    reject_suggestion, rescore,
};
use catalog_reconcile_core::score::{RequiredAttributes, ScoreCalculator, ScoreThresholds};
use catalog_reconcile_core::selection::SelectionSet;
use catalog_reconcile_core::store::memory::InMemoryStore;
use catalog_reconcile_core::store::{RecordStore, SuggestionSink};
use catalog_reconcile_core::suggestion::SuggestionStore;
use catalog_reconcile_core::EngineError;

struct FlakyStore {
    inner: InMemoryStore,
    failing: Mutex<HashSet<String>>,
}

impl FlakyStore {
    fn new(records: Vec<ProductRecord>) -> Self {
        Self {
            inner: InMemoryStore::with_records(records),
            failing: Mutex::new(HashSet::new()),
        }
    }

    fn fail_writes_for(&self, id: &str) {
        self.failing.lock().unwrap().insert(id.to_string());
    }

    fn heal(&self) {
        self.failing.lock().unwrap().clear();
    }
}

#[async_trait]
impl RecordStore for FlakyStore {
    async fn get_record(&self, id: &str) -> Result<Option<ProductRecord>> {
        self.inner.get_record(id).await
    }

    async fn find_by_sku(&self, sku: &str) -> Result<Option<ProductRecord>> {
        self.inner.find_by_sku(sku).await
    }

    async fn list_records(&self) -> Result<Vec<ProductRecord>> {
        self.inner.list_records().await
    }

    async fn apply_diffs(&self, id: &str, diffs: &[FieldDiff]) -> Result<Option<ProductRecord>> {
        if self.failing.lock().unwrap().contains(id) {
            bail!("write to {} timed out", id);
        }
        self.inner.apply_diffs(id, diffs).await
    }

    async fn set_completeness(&self, id: &str, score: u8) -> Result<()> {
        self.inner.set_completeness(id, score).await
    }
}

#[async_trait]
impl SuggestionSink for FlakyStore {
    async fn save_suggestion(&self, suggestion: &Suggestion) -> Result<()> {
        self.inner.save_suggestion(suggestion).await
    }

    async fn append_history(&self, entry: &HistoryEntry) -> Result<()> {
        self.inner.append_history(entry).await
    }
}

fn catalog() -> Vec<ProductRecord> {
    let mut a = ProductRecord::new("p-a").with_sku("A");
    a.name = Some("Trail Runner".into());
    a.quantity = Some(12);
    let mut b = ProductRecord::new("p-b").with_sku("B");
    b.quantity = Some(5);
    vec![a, b, ProductRecord::new("p-c").with_sku("C")]
}

fn suggestion(record: &str, field: &str, value: &str, confidence: f64) -> NewSuggestion {
    NewSuggestion {
        record_id: record.into(),
        field: field.into(),
        current_value: None,
        suggested_value: value.into(),
        confidence,
        reason: Some("catalog enrichment".into()),
        source_model: Some("enricher-v2".into()),
    }
}

#[tokio::test]
async fn suggestion_failure_is_isolated() {
    let store = FlakyStore::new(catalog());
    let mut suggestions = SuggestionStore::default();

    let sa = propose_suggestion(&mut suggestions, &store, &store, suggestion("p-a", "name", "Trail Runner GTX", 88.0))
        .await
        .unwrap();
    let sb = propose_suggestion(&mut suggestions, &store, &store, suggestion("p-b", "name", "Road Runner", 91.0))
        .await
        .unwrap();

    store.fail_writes_for("p-a");
    let err = accept_suggestion(&mut suggestions, &store, &store, &sa.id)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Persistence { .. }));
    assert!(err.to_string().contains("timed out"));
    assert_eq!(suggestions.get(&sa.id).unwrap().status, SuggestionStatus::Pending);

    accept_suggestion(&mut suggestions, &store, &store, &sb.id)
        .await
        .unwrap();
    let b = store.get_record("p-b").await.unwrap().unwrap();
    assert_eq!(b.name.as_deref(), Some("Road Runner"));

    store.heal();
    let change = accept_suggestion(&mut suggestions, &store, &store, &sa.id)
        .await
        .unwrap();
    assert_eq!(change.old_value.as_deref(), Some("Trail Runner"));

    let value_entries: Vec<HistoryEntry> = store
        .inner
        .history_entries()
        .unwrap()
        .into_iter()
        .filter(|e| e.change_type.changes_value())
        .collect();
    assert_eq!(value_entries.len(), 2);
}

#[tokio::test]
async fn resolution_is_single_shot() {
    let store = FlakyStore::new(catalog());
    let mut suggestions = SuggestionStore::default();

    let s1 = propose_suggestion(&mut suggestions, &store, &store, suggestion("p-c", "feature_1", "Waterproof", 72.0))
        .await
        .unwrap();
    accept_suggestion(&mut suggestions, &store, &store, &s1.id)
        .await
        .unwrap();
    let err = accept_suggestion(&mut suggestions, &store, &store, &s1.id)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::AlreadyResolved {
            status: SuggestionStatus::Accepted,
            ..
        }
    ));

    let s2 = propose_suggestion(&mut suggestions, &store, &store, suggestion("p-c", "feature_2", "Vegan", 40.0))
        .await
        .unwrap();
    reject_suggestion(&mut suggestions, &store, &s2.id).await.unwrap();
    let err = edit_suggestion(&mut suggestions, &store, &store, &s2.id, "Vegan leather")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::AlreadyResolved { .. }));

    let c = store.get_record("p-c").await.unwrap().unwrap();
    assert_eq!(c.features, vec![Some("Waterproof".to_string())]);
}

#[tokio::test]
async fn newer_proposal_supersedes_pending() {
    let store = FlakyStore::new(catalog());
    let mut suggestions = SuggestionStore::default();

    let old = propose_suggestion(&mut suggestions, &store, &store, suggestion("p-a", "short_description", "Grippy", 60.0))
        .await
        .unwrap();
    let new = propose_suggestion(&mut suggestions, &store, &store, suggestion("p-a", "short_description", "Grippy and light", 85.0))
        .await
        .unwrap();

    assert_eq!(suggestions.pending_count("p-a"), 1);
    let err = accept_suggestion(&mut suggestions, &store, &store, &old.id)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound { .. }));

    let kinds: Vec<ChangeType> = store
        .inner
        .history_entries()
        .unwrap()
        .iter()
        .map(|e| e.change_type)
        .collect();
    assert_eq!(
        kinds,
        vec![ChangeType::Proposed, ChangeType::Superseded, ChangeType::Proposed]
    );
    assert!(store.inner.saved_suggestion(&new.id).unwrap().is_some());
}

#[tokio::test]
async fn ledger_flush_isolates_failing_record() {
    let store = FlakyStore::new(catalog());
    let mut ledger = CellEditLedger::new();
    ledger.record_edit("p-b", "quantity", 5, 10);
    ledger.record_edit("p-b", "quantity", 10, 20);
    ledger.record_edit("p-a", "name", "Trail Runner", "Trail Runner 2");
    ledger.record_edit("p-a", "quantity", 12, 0);

    assert_eq!(ledger.len(), 3);
    let b_edit = ledger.get("p-b", "quantity").unwrap();
    assert_eq!(b_edit.old_value, json!(5));
    assert_eq!(b_edit.new_value, json!(20));

    store.fail_writes_for("p-a");
    let report = flush_ledger(&mut ledger, &store).await;
    assert!(ledger.is_empty());
    assert_eq!(report.applied.len(), 1);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].record_id, "p-a");
    assert_eq!(report.failed[0].edits.len(), 2);

    let a = store.get_record("p-a").await.unwrap().unwrap();
    assert_eq!(a.name.as_deref(), Some("Trail Runner"));
    assert_eq!(a.quantity, Some(12));
    let b = store.get_record("p-b").await.unwrap().unwrap();
    assert_eq!(b.quantity, Some(20));
}

#[tokio::test]
async fn bulk_plan_against_partial_catalog() {
    let store = FlakyStore::new(catalog());
    let known = RecordIndex::from_records(store.list_records().await.unwrap());
    let rows = vec![
        RawRow::new(2, [("sku", "A"), ("quantity", "0")]),
        RawRow::new(3, [("sku", "B"), ("quantity", "40")]),
        RawRow::new(4, [("sku", "Z"), ("quantity", "10")]),
    ];

    let reconciliation = BulkReconciler::default().reconcile(&rows, &known).unwrap();
    assert_eq!(reconciliation.plan.len(), 2);
    let applied = apply_plan(reconciliation, &store, |_, _| {}).await.unwrap();

    assert_eq!(applied.report.success_count, 2);
    assert_eq!(applied.report.error_count, 1);
    assert_eq!(applied.report.errors[0].natural_key.as_deref(), Some("Z"));
    let a = store.find_by_sku("A").await.unwrap().unwrap();
    assert_eq!(a.status, Some(StockStatus::OutOfStock));
    let b = store.find_by_sku("B").await.unwrap().unwrap();
    assert_eq!(b.status, Some(StockStatus::LowStock));
}

#[tokio::test]
async fn bulk_write_failure_marks_row_failed() {
    let store = FlakyStore::new(catalog());
    store.fail_writes_for("p-b");
    let known = RecordIndex::from_records(store.list_records().await.unwrap());
    let rows = vec![
        RawRow::new(2, [("sku", "A"), ("qty", "80")]),
        RawRow::new(3, [("sku", "B"), ("qty", "60")]),
    ];

    let reconciliation = BulkReconciler::default().reconcile(&rows, &known).unwrap();
    let states: Vec<OutcomeState> = reconciliation.outcomes.iter().map(|o| o.state).collect();
    assert_eq!(states, vec![OutcomeState::Planned, OutcomeState::Planned]);

    let applied = apply_plan(reconciliation, &store, |_, _| {}).await.unwrap();
    assert_eq!(applied.report.success_count, 1);
    assert_eq!(applied.report.errors[0].row_index, 3);
    assert!(applied.report.errors[0].message.contains("timed out"));
    assert_eq!(applied.updated.len(), 1);
}

#[tokio::test]
async fn selection_restricts_bulk_targets() {
    let store = FlakyStore::new(catalog());
    let mut selection: SelectionSet<String> = SelectionSet::new();
    let universe: Vec<String> = vec!["p-a".into(), "p-b".into(), "p-c".into()];
    selection.toggle_all(&universe);
    selection.toggle_all(&universe);
    assert!(selection.is_empty());
    selection.toggle("p-b".to_string());

    let known =
        RecordIndex::from_records(store.list_records().await.unwrap()).restricted_to(&selection);
    let rows = vec![
        RawRow::new(2, [("sku", "A"), ("quantity", "1")]),
        RawRow::new(3, [("sku", "B"), ("quantity", "1")]),
    ];
    let reconciliation = BulkReconciler::default().reconcile(&rows, &known).unwrap();
    let applied = apply_plan(reconciliation, &store, |_, _| {}).await.unwrap();
    assert_eq!(applied.report.success_count, 1);
    assert_eq!(
        store.find_by_sku("A").await.unwrap().unwrap().quantity,
        Some(12)
    );
}

#[tokio::test]
async fn rescore_uses_required_attributes() {
    let mut rec = ProductRecord::new("p-x").with_sku("X");
    rec.attributes.insert("brand".into(), json!("Acme"));
    rec.attributes.insert("color".into(), Value::Null);
    let store = FlakyStore::new(vec![rec.clone()]);

    let calc = ScoreCalculator::new(
        ScoreThresholds::default(),
        Box::new(RequiredAttributes::new(["brand", "color"])),
    );
    let scores = rescore(&store, &calc, &[rec]).await.unwrap();
    assert_eq!(scores[0].1.attributes.score, 50);
    // round(mean(50, 80, 0, 50, 0)) = 36
    assert_eq!(scores[0].1.overall_score, 36);
    let stored = store.get_record("p-x").await.unwrap().unwrap();
    assert_eq!(stored.completeness_score, Some(36));
}
