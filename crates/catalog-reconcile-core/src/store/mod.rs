//! External capabilities the engine consumes.
//!
//! The engine never owns persistent state. Records live behind a
//! [`RecordStore`]; suggestion resolutions and their audit trail are mirrored
//! into a [`SuggestionSink`]. Both are async so that real backends (SQL,
//! HTTP) and the in-memory backend share one interface.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`get_record`](RecordStore::get_record) | Fetch a record by internal id |
//! | [`find_by_sku`](RecordStore::find_by_sku) | Fetch a record by natural key |
//! | [`list_records`](RecordStore::list_records) | Every record, ordered by id |
//! | [`apply_diffs`](RecordStore::apply_diffs) | Apply field diffs to one record |
//! | [`set_completeness`](RecordStore::set_completeness) | Store a recomputed score |
//! | [`save_suggestion`](SuggestionSink::save_suggestion) | Mirror a suggestion's state |
//! | [`append_history`](SuggestionSink::append_history) | Append one audit entry |

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{FieldDiff, HistoryEntry, ProductRecord, Suggestion};

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get_record(&self, id: &str) -> Result<Option<ProductRecord>>;

    async fn find_by_sku(&self, sku: &str) -> Result<Option<ProductRecord>>;

    async fn list_records(&self) -> Result<Vec<ProductRecord>>;

    /// Apply all diffs to one record, or none of them.
    ///
    /// Returns the updated record, or `None` if `id` is unknown.
    async fn apply_diffs(&self, id: &str, diffs: &[FieldDiff]) -> Result<Option<ProductRecord>>;

    async fn set_completeness(&self, id: &str, score: u8) -> Result<()>;
}

#[async_trait]
pub trait SuggestionSink: Send + Sync {
    async fn save_suggestion(&self, suggestion: &Suggestion) -> Result<()>;

    async fn append_history(&self, entry: &HistoryEntry) -> Result<()>;
}
