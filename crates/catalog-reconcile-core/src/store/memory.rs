//! In-memory [`RecordStore`] and [`SuggestionSink`] for tests and embedding.
//!
//! Uses `BTreeMap` and `Vec` behind `std::sync::RwLock` for thread safety.
//! Records are listed in id order.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;

use crate::models::{FieldDiff, HistoryEntry, ProductRecord, Suggestion};

use super::{RecordStore, SuggestionSink};

pub struct InMemoryStore {
    records: RwLock<BTreeMap<String, ProductRecord>>,
    suggestions: RwLock<BTreeMap<String, Suggestion>>,
    history: RwLock<Vec<HistoryEntry>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            suggestions: RwLock::new(BTreeMap::new()),
            history: RwLock::new(Vec::new()),
        }
    }

    /// Build a store holding `records`. Later duplicates of an id replace
    /// earlier ones.
    pub fn with_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = ProductRecord>,
    {
        let store = Self::new();
        if let Ok(mut map) = store.records.write() {
            for rec in records {
                map.insert(rec.id.clone(), rec);
            }
        }
        store
    }

    /// Snapshot of every record, ordered by id.
    pub fn snapshot(&self) -> Result<Vec<ProductRecord>> {
        Ok(read(&self.records)?.values().cloned().collect())
    }

    pub fn saved_suggestion(&self, id: &str) -> Result<Option<Suggestion>> {
        Ok(read(&self.suggestions)?.get(id).cloned())
    }

    /// Audit entries in append order.
    pub fn history_entries(&self) -> Result<Vec<HistoryEntry>> {
        Ok(read(&self.history)?.clone())
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>> {
    lock.read().map_err(|_| anyhow!("in-memory store lock poisoned"))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>> {
    lock.write()
        .map_err(|_| anyhow!("in-memory store lock poisoned"))
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn get_record(&self, id: &str) -> Result<Option<ProductRecord>> {
        Ok(read(&self.records)?.get(id).cloned())
    }

    async fn find_by_sku(&self, sku: &str) -> Result<Option<ProductRecord>> {
        let sku = sku.trim();
        Ok(read(&self.records)?
            .values()
            .find(|r| r.sku.as_deref().map(str::trim) == Some(sku))
            .cloned())
    }

    async fn list_records(&self) -> Result<Vec<ProductRecord>> {
        self.snapshot()
    }

    async fn apply_diffs(&self, id: &str, diffs: &[FieldDiff]) -> Result<Option<ProductRecord>> {
        let mut records = write(&self.records)?;
        let Some(current) = records.get(id) else {
            return Ok(None);
        };
        let mut updated = current.clone();
        for diff in diffs {
            updated.apply_diff(diff)?;
        }
        updated.updated_at = Utc::now().timestamp();
        records.insert(id.to_string(), updated.clone());
        Ok(Some(updated))
    }

    async fn set_completeness(&self, id: &str, score: u8) -> Result<()> {
        let mut records = write(&self.records)?;
        let rec = records
            .get_mut(id)
            .ok_or_else(|| anyhow!("record {} not found", id))?;
        rec.completeness_score = Some(score.min(100));
        Ok(())
    }
}

#[async_trait]
impl SuggestionSink for InMemoryStore {
    async fn save_suggestion(&self, suggestion: &Suggestion) -> Result<()> {
        write(&self.suggestions)?.insert(suggestion.id.clone(), suggestion.clone());
        Ok(())
    }

    async fn append_history(&self, entry: &HistoryEntry) -> Result<()> {
        write(&self.history)?.push(entry.clone());
        Ok(())
    }
}
