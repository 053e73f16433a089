//! Core data models shared by every engine component.
//!
//! [`ProductRecord`] is owned by the external store; the engine reads it and
//! proposes mutations as [`FieldDiff`]s. Suggestion and history types live
//! here too so that store implementations can persist them without pulling
//! in the lifecycle logic.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{EngineError, EngineResult};

/// Highest slot number accepted in `feature_N` / `image_N_url` field names.
pub const MAX_SLOT_NUMBER: usize = 64;

/// A product record as held by the external store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: String,
    /// Natural key used to match external rows.
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub short_description: Option<String>,
    #[serde(default)]
    pub long_description: Option<String>,
    /// Ordered feature slots; `None` marks an empty slot.
    #[serde(default)]
    pub features: Vec<Option<String>>,
    /// Ordered image-url slots; `None` marks an empty slot.
    #[serde(default)]
    pub images: Vec<Option<String>>,
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
    #[serde(default)]
    pub quantity: Option<i64>,
    #[serde(default)]
    pub status: Option<StockStatus>,
    #[serde(default)]
    pub completeness_score: Option<u8>,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
}

impl ProductRecord {
    /// An empty record with only an id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            sku: None,
            name: None,
            short_description: None,
            long_description: None,
            features: Vec::new(),
            images: Vec::new(),
            attributes: BTreeMap::new(),
            quantity: None,
            status: None,
            completeness_score: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    pub fn with_sku(mut self, sku: impl Into<String>) -> Self {
        self.sku = Some(sku.into());
        self
    }

    /// Current value of a named field, `Value::Null` when unset.
    pub fn field_value(&self, field: &FieldRef) -> Value {
        match field {
            FieldRef::Name => opt_str(&self.name),
            FieldRef::ShortDescription => opt_str(&self.short_description),
            FieldRef::LongDescription => opt_str(&self.long_description),
            FieldRef::Feature(n) => slot_value(&self.features, *n),
            FieldRef::Image(n) => slot_value(&self.images, *n),
            FieldRef::Attribute(key) => self.attributes.get(key).cloned().unwrap_or(Value::Null),
            FieldRef::Quantity => self.quantity.map(Value::from).unwrap_or(Value::Null),
            FieldRef::Status => self
                .status
                .map(|s| Value::String(s.label().to_string()))
                .unwrap_or(Value::Null),
        }
    }

    /// Apply one diff to a copy-owned record. Used by store implementations.
    pub fn apply_diff(&mut self, diff: &FieldDiff) -> EngineResult<()> {
        let field = FieldRef::from_str(&diff.field)?;
        let value = &diff.value;
        match &field {
            FieldRef::Name => self.name = text_value(&field, value)?,
            FieldRef::ShortDescription => self.short_description = text_value(&field, value)?,
            FieldRef::LongDescription => self.long_description = text_value(&field, value)?,
            FieldRef::Feature(n) => set_slot(&mut self.features, *n, text_value(&field, value)?),
            FieldRef::Image(n) => set_slot(&mut self.images, *n, text_value(&field, value)?),
            FieldRef::Attribute(key) => {
                if value.is_null() {
                    self.attributes.remove(key);
                } else {
                    self.attributes.insert(key.clone(), value.clone());
                }
            }
            FieldRef::Quantity => {
                self.quantity = match value {
                    Value::Null => None,
                    Value::Number(n) => Some(n.as_i64().ok_or_else(|| {
                        EngineError::validation(format!("quantity must be an integer, got {}", n))
                    })?),
                    Value::String(s) => Some(s.trim().parse::<i64>().map_err(|_| {
                        EngineError::validation(format!("quantity must be an integer, got '{}'", s))
                    })?),
                    other => {
                        return Err(EngineError::validation(format!(
                            "quantity must be an integer, got {}",
                            other
                        )))
                    }
                }
            }
            FieldRef::Status => {
                self.status = match value {
                    Value::Null => None,
                    Value::String(s) => Some(StockStatus::from_str(s)?),
                    other => {
                        return Err(EngineError::validation(format!(
                            "status must be a string, got {}",
                            other
                        )))
                    }
                }
            }
        }
        Ok(())
    }
}

fn opt_str(v: &Option<String>) -> Value {
    v.as_ref()
        .map(|s| Value::String(s.clone()))
        .unwrap_or(Value::Null)
}

fn slot_value(slots: &[Option<String>], number: usize) -> Value {
    slots
        .get(number - 1)
        .and_then(|s| s.as_ref())
        .map(|s| Value::String(s.clone()))
        .unwrap_or(Value::Null)
}

fn set_slot(slots: &mut Vec<Option<String>>, number: usize, value: Option<String>) {
    if slots.len() < number {
        slots.resize(number, None);
    }
    slots[number - 1] = value;
}

fn text_value(field: &FieldRef, value: &Value) -> EngineResult<Option<String>> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Bool(b) => Ok(Some(b.to_string())),
        other => Err(EngineError::validation(format!(
            "field {} expects a scalar value, got {}",
            field, other
        ))),
    }
}

/// A named, addressable field of a [`ProductRecord`].
///
/// Field names on the wire: `name`, `short_description`, `long_description`,
/// `feature_N`, `image_N_url`, `attr:<id>`, `quantity`, `status`. Slot
/// numbers are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldRef {
    Name,
    ShortDescription,
    LongDescription,
    Feature(usize),
    Image(usize),
    Attribute(String),
    Quantity,
    Status,
}

impl FromStr for FieldRef {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s {
            "name" => return Ok(Self::Name),
            "short_description" => return Ok(Self::ShortDescription),
            "long_description" => return Ok(Self::LongDescription),
            "quantity" => return Ok(Self::Quantity),
            "status" => return Ok(Self::Status),
            _ => {}
        }
        if let Some(key) = s.strip_prefix("attr:") {
            if key.is_empty() {
                return Err(EngineError::validation("attribute field name is empty"));
            }
            return Ok(Self::Attribute(key.to_string()));
        }
        if let Some(n) = s.strip_prefix("feature_") {
            return parse_slot(s, n).map(Self::Feature);
        }
        if let Some(rest) = s.strip_prefix("image_") {
            if let Some(n) = rest.strip_suffix("_url") {
                return parse_slot(s, n).map(Self::Image);
            }
        }
        Err(EngineError::validation(format!("unknown field: '{}'", s)))
    }
}

fn parse_slot(field: &str, digits: &str) -> EngineResult<usize> {
    match digits.parse::<usize>() {
        Ok(n) if (1..=MAX_SLOT_NUMBER).contains(&n) => Ok(n),
        _ => Err(EngineError::validation(format!(
            "invalid slot in field name '{}' (expected 1..={})",
            field, MAX_SLOT_NUMBER
        ))),
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name => write!(f, "name"),
            Self::ShortDescription => write!(f, "short_description"),
            Self::LongDescription => write!(f, "long_description"),
            Self::Feature(n) => write!(f, "feature_{}", n),
            Self::Image(n) => write!(f, "image_{}_url", n),
            Self::Attribute(key) => write!(f, "attr:{}", key),
            Self::Quantity => write!(f, "quantity"),
            Self::Status => write!(f, "status"),
        }
    }
}

/// Stock status derived from quantity during bulk updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StockStatus {
    #[serde(rename = "Out of Stock")]
    OutOfStock,
    #[serde(rename = "Low Stock")]
    LowStock,
    #[serde(rename = "In Stock")]
    InStock,
}

impl StockStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::OutOfStock => "Out of Stock",
            Self::LowStock => "Low Stock",
            Self::InStock => "In Stock",
        }
    }
}

impl FromStr for StockStatus {
    type Err = EngineError;

    /// Accepts the display label or a snake/kebab form, case-insensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm: String = s
            .trim()
            .to_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        match norm.as_str() {
            "outofstock" => Ok(Self::OutOfStock),
            "lowstock" => Ok(Self::LowStock),
            "instock" => Ok(Self::InStock),
            _ => Err(EngineError::validation(format!(
                "unknown stock status: '{}'",
                s.trim()
            ))),
        }
    }
}

impl fmt::Display for StockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A single field-level mutation to apply to a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDiff {
    pub field: String,
    pub value: Value,
}

impl FieldDiff {
    pub fn new(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }
}

// ── Suggestions ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionStatus {
    Pending,
    Accepted,
    Rejected,
    Edited,
}

impl SuggestionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for SuggestionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Edited => "edited",
        };
        f.write_str(s)
    }
}

/// An AI-proposed value for one field of one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub id: String,
    pub record_id: String,
    pub field: String,
    /// Snapshot of the field at proposal time.
    pub current_value: Option<String>,
    pub suggested_value: String,
    /// Not clamped on input; classified against confidence bands.
    pub confidence: f64,
    pub status: SuggestionStatus,
    pub reason: Option<String>,
    pub source_model: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input to [`SuggestionStore::propose`](crate::suggestion::SuggestionStore::propose).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSuggestion {
    pub record_id: String,
    pub field: String,
    #[serde(default)]
    pub current_value: Option<String>,
    pub suggested_value: String,
    pub confidence: f64,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub source_model: Option<String>,
}

/// Concrete mutation produced by accepting or editing a suggestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedChange {
    pub suggestion_id: String,
    pub record_id: String,
    pub field: String,
    pub old_value: Option<String>,
    pub new_value: String,
}

impl AppliedChange {
    pub fn as_diff(&self) -> FieldDiff {
        FieldDiff::new(self.field.clone(), Value::String(self.new_value.clone()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Proposed,
    Superseded,
    AiAccepted,
    AiEdited,
    Rejected,
}

impl ChangeType {
    /// Whether this entry records a change of the record's field value.
    pub fn changes_value(&self) -> bool {
        matches!(self, Self::AiAccepted | Self::AiEdited)
    }
}

/// One audit entry in a record's suggestion history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Monotonic sequence within one store; orders entries with equal timestamps.
    pub seq: u64,
    pub suggestion_id: String,
    pub record_id: String,
    pub field: String,
    pub change_type: ChangeType,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub confidence: f64,
    pub source_model: Option<String>,
    pub at: DateTime<Utc>,
}
