//! Bulk reconciliation of external rows against known records.
//!
//! # Flow
//!
//! 1. Each [`RawRow`] is shaped into a [`BulkRow`]; rows missing the key
//!    column or carrying unusable values fail here, before any lookup.
//! 2. The natural key is looked up in a [`RecordIndex`]. Unknown keys fail
//!    with "not found".
//! 3. Matched rows get a [`CommitEntry`]: the quantity plus the stock status
//!    derived from it by [`StockPolicy`]. Rows that would not change the
//!    record, as left by earlier rows of the same file, are marked skipped.
//! 4. The caller applies the plan and reports back through
//!    [`Reconciliation::confirm`] / [`Reconciliation::fail`]. Only confirmed
//!    rows count as successes; [`Reconciliation::finish`] builds the
//!    [`BulkReport`].
//!
//! Nothing here has side effects: dropping a [`Reconciliation`] before
//! applying its plan abandons the import.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{EngineError, EngineResult};
use crate::models::{FieldDiff, FieldRef, ProductRecord, StockStatus};
use crate::selection::SelectionSet;

/// One parsed input row: header name → cell text.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawRow {
    /// Position reported back to the user (spreadsheet row number).
    pub row_index: usize,
    pub cells: BTreeMap<String, String>,
}

impl RawRow {
    pub fn new<I, K, V>(row_index: usize, cells: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            row_index,
            cells: cells
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// First non-blank cell among `aliases`, trimmed.
    fn first<'a>(&'a self, aliases: &[String]) -> Option<&'a str> {
        aliases
            .iter()
            .filter_map(|a| self.cells.get(a))
            .map(|v| v.trim())
            .find(|v| !v.is_empty())
    }

    fn has_any(&self, aliases: &[String]) -> bool {
        aliases.iter().any(|a| self.cells.contains_key(a))
    }
}

/// Quantity → stock status thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StockPolicy {
    /// Quantities below this (and above zero) are "Low Stock".
    pub low_stock_threshold: i64,
}

impl Default for StockPolicy {
    fn default() -> Self {
        Self {
            low_stock_threshold: 50,
        }
    }
}

impl StockPolicy {
    pub fn status_for(&self, quantity: i64) -> StockStatus {
        if quantity <= 0 {
            StockStatus::OutOfStock
        } else if quantity < self.low_stock_threshold {
            StockStatus::LowStock
        } else {
            StockStatus::InStock
        }
    }
}

/// Accepted header names per logical column, lower-case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnMap {
    pub key: Vec<String>,
    pub quantity: Vec<String>,
    pub status: Vec<String>,
}

impl Default for ColumnMap {
    fn default() -> Self {
        Self {
            key: vec!["sku".into(), "product_code".into(), "product code".into()],
            quantity: vec!["quantity".into(), "qty".into(), "stock".into()],
            status: vec!["status".into(), "stock_status".into()],
        }
    }
}

/// A validated input row.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkRow {
    pub row_index: usize,
    pub natural_key: String,
    pub quantity: Option<i64>,
    pub status: Option<StockStatus>,
}

impl BulkRow {
    pub fn from_raw(raw: &RawRow, columns: &ColumnMap) -> EngineResult<Self> {
        let row = raw.row_index;
        let natural_key = raw.first(&columns.key).ok_or_else(|| {
            let name = columns.key.first().map(String::as_str).unwrap_or("sku");
            EngineError::validation(format!("row {}: missing required column '{}'", row, name))
        })?;

        let quantity = raw
            .first(&columns.quantity)
            .map(|q| {
                parse_quantity(q).ok_or_else(|| {
                    EngineError::validation(format!(
                        "row {} ({}): quantity '{}' is not a whole number",
                        row, natural_key, q
                    ))
                })
            })
            .transpose()?;

        let status = raw
            .first(&columns.status)
            .map(|s| {
                s.parse::<StockStatus>().map_err(|_| {
                    EngineError::validation(format!(
                        "row {} ({}): unknown status '{}'",
                        row, natural_key, s
                    ))
                })
            })
            .transpose()?;

        if quantity.is_none() && status.is_none() {
            let missing = if raw.has_any(&columns.quantity) || raw.has_any(&columns.status) {
                "empty quantity and status"
            } else {
                "missing required column 'quantity'"
            };
            return Err(EngineError::validation(format!(
                "row {} ({}): {}",
                row, natural_key, missing
            )));
        }

        Ok(Self {
            row_index: row,
            natural_key: natural_key.to_string(),
            quantity,
            status,
        })
    }
}

/// Whole numbers, including spreadsheet renderings such as `"12.0"`.
fn parse_quantity(s: &str) -> Option<i64> {
    if let Ok(n) = s.parse::<i64>() {
        return Some(n);
    }
    let f = s.parse::<f64>().ok()?;
    if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

/// Known records indexed by natural key.
#[derive(Debug, Default, Clone)]
pub struct RecordIndex {
    by_key: HashMap<String, ProductRecord>,
}

impl RecordIndex {
    /// Records without a SKU are not addressable and are left out. On a
    /// duplicate SKU the first record wins.
    pub fn from_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = ProductRecord>,
    {
        let mut by_key = HashMap::new();
        for rec in records {
            let Some(sku) = rec
                .sku
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
            else {
                continue;
            };
            if by_key.contains_key(&sku) {
                warn!(sku = %sku, record_id = %rec.id, "duplicate sku in record set, keeping first");
                continue;
            }
            by_key.insert(sku, rec);
        }
        Self { by_key }
    }

    /// Keep only records whose id is selected.
    pub fn restricted_to(mut self, selection: &SelectionSet<String>) -> Self {
        self.by_key.retain(|_, rec| selection.has(&rec.id));
        self
    }

    pub fn get(&self, natural_key: &str) -> Option<&ProductRecord> {
        self.by_key.get(natural_key.trim())
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CommitFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<StockStatus>,
}

/// One mutation in the commit batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitEntry {
    pub row_index: usize,
    pub natural_key: String,
    pub record_id: Option<String>,
    pub fields: CommitFields,
}

impl CommitEntry {
    pub fn diffs(&self) -> Vec<FieldDiff> {
        let mut out = Vec::with_capacity(2);
        if let Some(q) = self.fields.quantity {
            out.push(FieldDiff::new(FieldRef::Quantity.to_string(), q));
        }
        if let Some(s) = self.fields.status {
            out.push(FieldDiff::new(FieldRef::Status.to_string(), s.label()));
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeState {
    /// In the commit plan, not yet confirmed.
    Planned,
    Applied,
    /// Matched, but the record already holds these values.
    Skipped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkOutcome {
    pub row_index: usize,
    pub natural_key: Option<String>,
    pub record_id: Option<String>,
    pub state: OutcomeState,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowError {
    pub row_index: usize,
    pub natural_key: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkReport {
    pub total_rows: usize,
    pub success_count: usize,
    pub error_count: usize,
    pub errors: Vec<RowError>,
}

/// Result of [`BulkReconciler::reconcile`]: the commit plan plus one outcome
/// per input row, in input order.
#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub plan: Vec<CommitEntry>,
    pub outcomes: Vec<BulkOutcome>,
}

impl Reconciliation {
    /// Mark a planned row as applied by the caller.
    pub fn confirm(&mut self, row_index: usize) -> EngineResult<()> {
        let outcome = self.planned_mut(row_index)?;
        outcome.state = OutcomeState::Applied;
        Ok(())
    }

    /// Mark a planned row as failed by the caller.
    pub fn fail(&mut self, row_index: usize, message: impl Into<String>) -> EngineResult<()> {
        let outcome = self.planned_mut(row_index)?;
        outcome.state = OutcomeState::Failed;
        outcome.message = Some(message.into());
        Ok(())
    }

    fn planned_mut(&mut self, row_index: usize) -> EngineResult<&mut BulkOutcome> {
        self.outcomes
            .iter_mut()
            .find(|o| o.row_index == row_index && o.state == OutcomeState::Planned)
            .ok_or_else(|| EngineError::not_found(format!("planned row {}", row_index)))
    }

    pub fn planned_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.state == OutcomeState::Planned)
            .count()
    }

    /// Build the final report. Rows still planned were never confirmed and
    /// count as errors.
    pub fn finish(mut self) -> BulkReport {
        for o in self.outcomes.iter_mut() {
            if o.state == OutcomeState::Planned {
                o.state = OutcomeState::Failed;
                o.message = Some("update was not applied".to_string());
            }
        }
        let mut success_count = 0;
        let mut errors = Vec::new();
        for o in &self.outcomes {
            match o.state {
                OutcomeState::Applied | OutcomeState::Skipped => success_count += 1,
                _ => errors.push(RowError {
                    row_index: o.row_index,
                    natural_key: o.natural_key.clone(),
                    message: o.message.clone().unwrap_or_default(),
                }),
            }
        }
        BulkReport {
            total_rows: self.outcomes.len(),
            success_count,
            error_count: errors.len(),
            errors,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BulkReconciler {
    policy: StockPolicy,
    columns: ColumnMap,
    max_rows: Option<usize>,
}

impl BulkReconciler {
    pub fn new(policy: StockPolicy, columns: ColumnMap) -> Self {
        Self {
            policy,
            columns,
            max_rows: None,
        }
    }

    /// Refuse inputs with more than `max` rows.
    pub fn with_max_rows(mut self, max: usize) -> Self {
        self.max_rows = Some(max);
        self
    }

    pub fn policy(&self) -> &StockPolicy {
        &self.policy
    }

    pub fn reconcile(&self, rows: &[RawRow], known: &RecordIndex) -> EngineResult<Reconciliation> {
        if let Some(max) = self.max_rows {
            if rows.len() > max {
                return Err(EngineError::validation(format!(
                    "file has {} rows; at most {} rows can be imported at once",
                    rows.len(),
                    max
                )));
            }
        }

        let mut plan = Vec::new();
        let mut outcomes = Vec::with_capacity(rows.len());
        let mut seen: HashMap<String, usize> = HashMap::new();
        // Record id → (quantity, status) after the rows planned so far.
        let mut projected: HashMap<String, (Option<i64>, Option<StockStatus>)> = HashMap::new();

        for raw in rows {
            let row = match BulkRow::from_raw(raw, &self.columns) {
                Ok(row) => row,
                Err(e) => {
                    outcomes.push(BulkOutcome {
                        row_index: raw.row_index,
                        natural_key: raw.first(&self.columns.key).map(str::to_string),
                        record_id: None,
                        state: OutcomeState::Failed,
                        message: Some(message_of(e)),
                    });
                    continue;
                }
            };

            let Some(record) = known.get(&row.natural_key) else {
                outcomes.push(BulkOutcome {
                    row_index: row.row_index,
                    natural_key: Some(row.natural_key.clone()),
                    record_id: None,
                    state: OutcomeState::Failed,
                    message: Some(format!("'{}' not found", row.natural_key)),
                });
                continue;
            };

            if let Some(prev) = seen.insert(row.natural_key.clone(), row.row_index) {
                warn!(
                    sku = %row.natural_key,
                    first_row = prev,
                    row = row.row_index,
                    "sku appears more than once; later row applies last"
                );
            }

            let fields = self.fields_for(&row);
            let (quantity, status) = projected
                .get(&record.id)
                .copied()
                .unwrap_or((record.quantity, record.status));
            let unchanged = fields.quantity.map_or(true, |q| quantity == Some(q))
                && fields.status.map_or(true, |s| status == Some(s));
            if unchanged {
                debug!(sku = %row.natural_key, "row matches record, skipping");
                outcomes.push(BulkOutcome {
                    row_index: row.row_index,
                    natural_key: Some(row.natural_key),
                    record_id: Some(record.id.clone()),
                    state: OutcomeState::Skipped,
                    message: None,
                });
                continue;
            }

            projected.insert(
                record.id.clone(),
                (fields.quantity.or(quantity), fields.status.or(status)),
            );
            plan.push(CommitEntry {
                row_index: row.row_index,
                natural_key: row.natural_key.clone(),
                record_id: Some(record.id.clone()),
                fields,
            });
            outcomes.push(BulkOutcome {
                row_index: row.row_index,
                natural_key: Some(row.natural_key),
                record_id: Some(record.id.clone()),
                state: OutcomeState::Planned,
                message: None,
            });
        }

        debug!(
            rows = rows.len(),
            planned = plan.len(),
            "reconciled bulk rows"
        );
        Ok(Reconciliation { plan, outcomes })
    }

    /// A quantity always determines the status; an explicit status is used
    /// only when no quantity is given.
    fn fields_for(&self, row: &BulkRow) -> CommitFields {
        match row.quantity {
            Some(q) => {
                let derived = self.policy.status_for(q);
                if let Some(explicit) = row.status.filter(|s| *s != derived) {
                    debug!(
                        sku = %row.natural_key,
                        explicit = %explicit,
                        derived = %derived,
                        "status column overridden by quantity"
                    );
                }
                CommitFields {
                    quantity: Some(q),
                    status: Some(derived),
                }
            }
            None => CommitFields {
                quantity: None,
                status: row.status,
            },
        }
    }
}

fn message_of(err: EngineError) -> String {
    match err {
        EngineError::Validation { message } => message,
        other => other.to_string(),
    }
}
