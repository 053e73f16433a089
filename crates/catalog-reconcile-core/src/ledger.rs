//! Uncommitted cell edits for one review session.
//!
//! The ledger keeps at most one [`CellEdit`] per (record id, field id). A
//! second edit of the same cell replaces the new value but keeps the old
//! value captured by the first edit, so the whole session can still be
//! reverted to what the store held when editing began.
//!
//! A ledger belongs to a single session; two sessions over the same records
//! must not share one.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::FieldDiff;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellEdit {
    pub record_id: String,
    pub field_id: String,
    /// Value when the first edit of this cell began.
    pub old_value: Value,
    pub new_value: Value,
}

impl CellEdit {
    pub fn as_diff(&self) -> FieldDiff {
        FieldDiff::new(self.field_id.clone(), self.new_value.clone())
    }
}

type CellKey = (String, String);

#[derive(Debug, Default)]
pub struct CellEditLedger {
    /// Edits in first-edit order.
    edits: Vec<CellEdit>,
    index: HashMap<CellKey, usize>,
}

impl CellEditLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an edit. If the cell was already edited this session only the
    /// new value changes; the original old value is kept.
    pub fn record_edit(
        &mut self,
        record_id: impl Into<String>,
        field_id: impl Into<String>,
        old_value: impl Into<Value>,
        new_value: impl Into<Value>,
    ) {
        let key = (record_id.into(), field_id.into());
        let new_value = new_value.into();
        if let Some(&i) = self.index.get(&key) {
            self.edits[i].new_value = new_value;
            return;
        }
        self.index.insert(key.clone(), self.edits.len());
        self.edits.push(CellEdit {
            record_id: key.0,
            field_id: key.1,
            old_value: old_value.into(),
            new_value,
        });
    }

    pub fn is_changed(&self, record_id: &str, field_id: &str) -> bool {
        self.index
            .contains_key(&(record_id.to_string(), field_id.to_string()))
    }

    pub fn get(&self, record_id: &str, field_id: &str) -> Option<&CellEdit> {
        self.index
            .get(&(record_id.to_string(), field_id.to_string()))
            .map(|&i| &self.edits[i])
    }

    /// The value the cell held before this session touched it.
    pub fn original_value(&self, record_id: &str, field_id: &str) -> Option<&Value> {
        self.get(record_id, field_id).map(|e| &e.old_value)
    }

    /// Drop one pending edit and return it, e.g. to restore the grid cell.
    pub fn revert(&mut self, record_id: &str, field_id: &str) -> Option<CellEdit> {
        let i = self
            .index
            .remove(&(record_id.to_string(), field_id.to_string()))?;
        let edit = self.edits.remove(i);
        for slot in self.index.values_mut() {
            if *slot > i {
                *slot -= 1;
            }
        }
        Some(edit)
    }

    /// Pending edits in first-edit order.
    pub fn edits(&self) -> &[CellEdit] {
        &self.edits
    }

    pub fn edits_for<'a>(&'a self, record_id: &'a str) -> impl Iterator<Item = &'a CellEdit> + 'a {
        self.edits.iter().filter(move |e| e.record_id == record_id)
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    /// Take every pending edit, leaving the ledger empty. The returned list
    /// is the final set of changes for this session.
    pub fn commit(&mut self) -> Vec<CellEdit> {
        self.index.clear();
        std::mem::take(&mut self.edits)
    }

    pub fn discard_all(&mut self) {
        self.index.clear();
        self.edits.clear();
    }
}
