//! Lifecycle of AI-proposed field values.
//!
//! A [`SuggestionStore`] holds suggestions for any number of records. Each
//! suggestion starts `pending` and moves exactly once to `accepted`,
//! `rejected`, or `edited`; terminal states never change again. At most one
//! pending suggestion exists per (record, field): proposing another for the
//! same pair supersedes the old one, and both events land in the history.
//!
//! The store is purely in-memory. Persisting records and audit entries is
//! done by the async helpers in [`crate::review`].

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::models::{
    AppliedChange, ChangeType, HistoryEntry, NewSuggestion, Suggestion, SuggestionStatus,
};

/// Confidence band boundaries. Scores at or above `high` are high, at or
/// above `medium` are medium, everything else low.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceThresholds {
    pub high: f64,
    pub medium: f64,
}

impl Default for ConfidenceThresholds {
    fn default() -> Self {
        Self {
            high: 80.0,
            medium: 60.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceBand {
    High,
    Medium,
    Low,
}

impl ConfidenceBand {
    pub fn classify(confidence: f64, thresholds: &ConfidenceThresholds) -> Self {
        if confidence >= thresholds.high {
            Self::High
        } else if confidence >= thresholds.medium {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

#[derive(Debug, Default)]
pub struct SuggestionStore {
    thresholds: ConfidenceThresholds,
    suggestions: HashMap<String, Suggestion>,
    /// Insertion sequence per suggestion id, used as a stable tiebreaker.
    order: HashMap<String, u64>,
    /// (record_id, field) → id of the pending suggestion.
    pending_by_field: HashMap<(String, String), String>,
    history: Vec<HistoryEntry>,
    next_seq: u64,
}

impl SuggestionStore {
    pub fn new(thresholds: ConfidenceThresholds) -> Self {
        Self {
            thresholds,
            ..Default::default()
        }
    }

    pub fn thresholds(&self) -> &ConfidenceThresholds {
        &self.thresholds
    }

    pub fn band(&self, suggestion: &Suggestion) -> ConfidenceBand {
        ConfidenceBand::classify(suggestion.confidence, &self.thresholds)
    }

    /// Insert a pending suggestion, superseding any pending one for the same
    /// (record, field). Returns the new suggestion.
    pub fn propose(&mut self, new: NewSuggestion) -> EngineResult<Suggestion> {
        if new.record_id.trim().is_empty() {
            return Err(EngineError::validation("suggestion record_id is empty"));
        }
        if new.field.trim().is_empty() {
            return Err(EngineError::validation(format!(
                "suggestion for record {} has an empty field name",
                new.record_id
            )));
        }
        if !new.confidence.is_finite() {
            return Err(EngineError::validation(format!(
                "suggestion for {}.{} has a non-finite confidence",
                new.record_id, new.field
            )));
        }

        let key = (new.record_id.clone(), new.field.clone());
        if let Some(old_id) = self.pending_by_field.remove(&key) {
            if let Some(old) = self.suggestions.remove(&old_id) {
                warn!(
                    record_id = %old.record_id,
                    field = %old.field,
                    superseded = %old.id,
                    "superseding pending suggestion"
                );
                self.order.remove(&old_id);
                self.log(&old, ChangeType::Superseded, None, None);
            }
        }

        let suggestion = Suggestion {
            id: Uuid::new_v4().to_string(),
            record_id: new.record_id,
            field: new.field,
            current_value: new.current_value,
            suggested_value: new.suggested_value,
            confidence: new.confidence,
            status: SuggestionStatus::Pending,
            reason: new.reason,
            source_model: new.source_model,
            created_at: Utc::now(),
        };
        debug!(id = %suggestion.id, record_id = %suggestion.record_id, field = %suggestion.field, "proposed suggestion");

        self.log(
            &suggestion,
            ChangeType::Proposed,
            suggestion.current_value.clone(),
            Some(suggestion.suggested_value.clone()),
        );
        let seq = self.next_seq;
        self.next_seq += 1;
        self.order.insert(suggestion.id.clone(), seq);
        self.pending_by_field.insert(key, suggestion.id.clone());
        self.suggestions
            .insert(suggestion.id.clone(), suggestion.clone());
        Ok(suggestion)
    }

    pub fn get(&self, id: &str) -> Option<&Suggestion> {
        self.suggestions.get(id)
    }

    /// Fails unless `id` names a pending suggestion. Does not change state.
    pub fn ensure_pending(&self, id: &str) -> EngineResult<&Suggestion> {
        let s = self
            .suggestions
            .get(id)
            .ok_or_else(|| EngineError::not_found(format!("suggestion {}", id)))?;
        if s.status.is_terminal() {
            return Err(EngineError::already_resolved(id, s.status));
        }
        Ok(s)
    }

    pub fn accept(&mut self, id: &str) -> EngineResult<AppliedChange> {
        let change = self.resolve(id, SuggestionStatus::Accepted, None)?;
        debug!(id, "accepted suggestion");
        Ok(change)
    }

    /// Override the suggested value and resolve as `edited`.
    pub fn edit(&mut self, id: &str, new_value: impl Into<String>) -> EngineResult<AppliedChange> {
        let change = self.resolve(id, SuggestionStatus::Edited, Some(new_value.into()))?;
        debug!(id, "edited suggestion");
        Ok(change)
    }

    pub fn reject(&mut self, id: &str) -> EngineResult<()> {
        let s = self.finish(id, SuggestionStatus::Rejected, None)?;
        self.log(&s, ChangeType::Rejected, None, None);
        debug!(id, "rejected suggestion");
        Ok(())
    }

    fn resolve(
        &mut self,
        id: &str,
        status: SuggestionStatus,
        override_value: Option<String>,
    ) -> EngineResult<AppliedChange> {
        let s = self.finish(id, status, override_value)?;
        let change_type = if status == SuggestionStatus::Edited {
            ChangeType::AiEdited
        } else {
            ChangeType::AiAccepted
        };
        self.log(
            &s,
            change_type,
            s.current_value.clone(),
            Some(s.suggested_value.clone()),
        );
        Ok(AppliedChange {
            suggestion_id: s.id.clone(),
            record_id: s.record_id.clone(),
            field: s.field.clone(),
            old_value: s.current_value.clone(),
            new_value: s.suggested_value,
        })
    }

    /// Mark a pending suggestion terminal and return a snapshot of it.
    fn finish(
        &mut self,
        id: &str,
        status: SuggestionStatus,
        override_value: Option<String>,
    ) -> EngineResult<Suggestion> {
        let s = self
            .suggestions
            .get_mut(id)
            .ok_or_else(|| EngineError::not_found(format!("suggestion {}", id)))?;
        if s.status.is_terminal() {
            return Err(EngineError::already_resolved(id, s.status));
        }
        s.status = status;
        if let Some(v) = override_value {
            s.suggested_value = v;
        }
        let snapshot = s.clone();
        self.pending_by_field
            .remove(&(snapshot.record_id.clone(), snapshot.field.clone()));
        Ok(snapshot)
    }

    fn log(
        &mut self,
        s: &Suggestion,
        change_type: ChangeType,
        old_value: Option<String>,
        new_value: Option<String>,
    ) {
        let seq = self.history.len() as u64;
        self.history.push(HistoryEntry {
            seq,
            suggestion_id: s.id.clone(),
            record_id: s.record_id.clone(),
            field: s.field.clone(),
            change_type,
            old_value,
            new_value,
            confidence: s.confidence,
            source_model: s.source_model.clone(),
            at: Utc::now(),
        });
    }

    /// Pending suggestions for a record, highest confidence first.
    pub fn list_pending(&self, record_id: &str) -> Vec<&Suggestion> {
        let mut out: Vec<&Suggestion> = self
            .suggestions
            .values()
            .filter(|s| s.record_id == record_id && s.status == SuggestionStatus::Pending)
            .collect();
        out.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| self.order.get(&a.id).cmp(&self.order.get(&b.id)))
        });
        out
    }

    pub fn pending_count(&self, record_id: &str) -> usize {
        self.pending_by_field
            .keys()
            .filter(|(r, _)| r == record_id)
            .count()
    }

    /// Records that currently have at least one pending suggestion, sorted.
    pub fn records_with_pending(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self
            .pending_by_field
            .keys()
            .map(|(r, _)| r.as_str())
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// History for a record, most recent first, at most `limit` entries.
    pub fn history(&self, record_id: &str, limit: usize) -> Vec<&HistoryEntry> {
        self.history
            .iter()
            .rev()
            .filter(|e| e.record_id == record_id)
            .take(limit)
            .collect()
    }

    /// Number of history entries logged so far; pass to
    /// [`entries_since`](Self::entries_since) to collect what an operation added.
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn entries_since(&self, mark: usize) -> &[HistoryEntry] {
        self.history.get(mark..).unwrap_or(&[])
    }

    /// Most recent history entry for a suggestion.
    pub fn latest_entry(&self, suggestion_id: &str) -> Option<&HistoryEntry> {
        self.history
            .iter()
            .rev()
            .find(|e| e.suggestion_id == suggestion_id)
    }

    /// Accept every pending suggestion for `record_id` whose confidence is at
    /// least `min_confidence`. One result per attempted suggestion, in
    /// [`list_pending`](Self::list_pending) order.
    pub fn accept_above(
        &mut self,
        record_id: &str,
        min_confidence: f64,
    ) -> Vec<EngineResult<AppliedChange>> {
        let ids: Vec<String> = self
            .list_pending(record_id)
            .into_iter()
            .filter(|s| s.confidence >= min_confidence)
            .map(|s| s.id.clone())
            .collect();
        ids.iter().map(|id| self.accept(id)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new(record: &str, field: &str, value: &str, confidence: f64) -> NewSuggestion {
        NewSuggestion {
            record_id: record.to_string(),
            field: field.to_string(),
            current_value: Some("old".to_string()),
            suggested_value: value.to_string(),
            confidence,
            reason: None,
            source_model: Some("model-a".to_string()),
        }
    }

    #[test]
    fn accept_twice_fails_already_resolved() {
        let mut store = SuggestionStore::default();
        let s = store.propose(new("p-1", "name", "Better name", 90.0)).unwrap();
        let change = store.accept(&s.id).unwrap();
        assert_eq!(change.record_id, "p-1");
        assert_eq!(change.field, "name");
        assert_eq!(change.old_value.as_deref(), Some("old"));
        assert_eq!(change.new_value, "Better name");

        let err = store.accept(&s.id).unwrap_err();
        assert!(matches!(
            err,
            EngineError::AlreadyResolved {
                status: SuggestionStatus::Accepted,
                ..
            }
        ));
    }

    #[test]
    fn reject_then_edit_fails() {
        let mut store = SuggestionStore::default();
        let s = store.propose(new("p-1", "name", "x", 50.0)).unwrap();
        store.reject(&s.id).unwrap();
        let err = store.edit(&s.id, "y").unwrap_err();
        assert!(matches!(err, EngineError::AlreadyResolved { .. }));
        assert_eq!(store.get(&s.id).unwrap().status, SuggestionStatus::Rejected);
        assert_eq!(store.get(&s.id).unwrap().suggested_value, "x");
    }

    #[test]
    fn unknown_id_is_not_found() {
        let mut store = SuggestionStore::default();
        assert!(matches!(
            store.accept("nope").unwrap_err(),
            EngineError::NotFound { .. }
        ));
        assert!(matches!(
            store.reject("nope").unwrap_err(),
            EngineError::NotFound { .. }
        ));
    }

    #[test]
    fn edit_overrides_value_and_logs() {
        let mut store = SuggestionStore::default();
        let s = store.propose(new("p-1", "feature_1", "AI text", 70.0)).unwrap();
        let change = store.edit(&s.id, "Human text").unwrap();
        assert_eq!(change.new_value, "Human text");
        let stored = store.get(&s.id).unwrap();
        assert_eq!(stored.status, SuggestionStatus::Edited);
        assert_eq!(stored.suggested_value, "Human text");
        let entry = store.latest_entry(&s.id).unwrap();
        assert_eq!(entry.change_type, ChangeType::AiEdited);
        assert_eq!(entry.new_value.as_deref(), Some("Human text"));
    }

    #[test]
    fn reject_logs_without_value_change() {
        let mut store = SuggestionStore::default();
        let s = store.propose(new("p-1", "name", "x", 50.0)).unwrap();
        store.reject(&s.id).unwrap();
        let entry = store.latest_entry(&s.id).unwrap();
        assert_eq!(entry.change_type, ChangeType::Rejected);
        assert!(entry.old_value.is_none());
        assert!(entry.new_value.is_none());
        assert!(!entry.change_type.changes_value());
    }

    #[test]
    fn propose_supersedes_pending_for_same_field() {
        let mut store = SuggestionStore::default();
        let first = store.propose(new("p-1", "name", "first", 90.0)).unwrap();
        let second = store.propose(new("p-1", "name", "second", 60.0)).unwrap();

        assert!(store.get(&first.id).is_none());
        let pending = store.list_pending("p-1");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, second.id);
        assert_eq!(store.pending_count("p-1"), 1);

        let kinds: Vec<ChangeType> = store
            .history("p-1", 10)
            .iter()
            .map(|e| e.change_type)
            .collect();
        assert_eq!(
            kinds,
            vec![
                ChangeType::Proposed,
                ChangeType::Superseded,
                ChangeType::Proposed
            ]
        );
        assert!(matches!(
            store.accept(&first.id).unwrap_err(),
            EngineError::NotFound { .. }
        ));
    }

    #[test]
    fn resolved_field_accepts_new_proposal() {
        let mut store = SuggestionStore::default();
        let a = store.propose(new("p-1", "name", "a", 90.0)).unwrap();
        store.accept(&a.id).unwrap();
        let b = store.propose(new("p-1", "name", "b", 90.0)).unwrap();
        assert_eq!(store.get(&a.id).unwrap().status, SuggestionStatus::Accepted);
        assert_eq!(store.list_pending("p-1")[0].id, b.id);
    }

    #[test]
    fn list_pending_orders_by_confidence() {
        let mut store = SuggestionStore::default();
        store.propose(new("p-1", "name", "a", 40.0)).unwrap();
        store.propose(new("p-1", "feature_1", "b", 95.0)).unwrap();
        store.propose(new("p-1", "feature_2", "c", 70.0)).unwrap();
        store.propose(new("p-2", "name", "d", 99.0)).unwrap();
        let values: Vec<&str> = store
            .list_pending("p-1")
            .iter()
            .map(|s| s.suggested_value.as_str())
            .collect();
        assert_eq!(values, vec!["b", "c", "a"]);
        assert_eq!(store.records_with_pending(), vec!["p-1", "p-2"]);
    }

    #[test]
    fn history_is_recent_first_and_limited() {
        let mut store = SuggestionStore::default();
        let a = store.propose(new("p-1", "name", "a", 90.0)).unwrap();
        let b = store.propose(new("p-1", "feature_1", "b", 90.0)).unwrap();
        store.accept(&a.id).unwrap();
        store.reject(&b.id).unwrap();
        let h = store.history("p-1", 2);
        assert_eq!(h.len(), 2);
        assert_eq!(h[0].change_type, ChangeType::Rejected);
        assert_eq!(h[1].change_type, ChangeType::AiAccepted);
        assert!(h[0].seq > h[1].seq);
        assert!(store.history("p-2", 10).is_empty());
    }

    #[test]
    fn accept_above_threshold() {
        let mut store = SuggestionStore::default();
        store.propose(new("p-1", "name", "a", 85.0)).unwrap();
        store.propose(new("p-1", "feature_1", "b", 80.0)).unwrap();
        let low = store.propose(new("p-1", "feature_2", "c", 79.9)).unwrap();
        let results = store.accept_above("p-1", 80.0);
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.is_ok()));
        let pending = store.list_pending("p-1");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, low.id);
    }

    #[test]
    fn confidence_bands() {
        let t = ConfidenceThresholds::default();
        assert_eq!(ConfidenceBand::classify(80.0, &t), ConfidenceBand::High);
        assert_eq!(ConfidenceBand::classify(79.99, &t), ConfidenceBand::Medium);
        assert_eq!(ConfidenceBand::classify(60.0, &t), ConfidenceBand::Medium);
        assert_eq!(ConfidenceBand::classify(12.0, &t), ConfidenceBand::Low);
        assert_eq!(ConfidenceBand::classify(140.0, &t), ConfidenceBand::High);
    }

    #[test]
    fn propose_validates_input() {
        let mut store = SuggestionStore::default();
        assert!(store.propose(new("", "name", "a", 1.0)).is_err());
        assert!(store.propose(new("p-1", " ", "a", 1.0)).is_err());
        assert!(store.propose(new("p-1", "name", "a", f64::NAN)).is_err());
    }
}
