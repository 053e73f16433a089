//! # Catalog Reconcile Core
//!
//! The reconciliation engine behind `catrec`: completeness scoring, the
//! AI suggestion lifecycle, the cell-edit ledger, bulk stock reconciliation
//! and upload validation, and row selection.
//!
//! The components are synchronous and own only session state. Records live
//! behind the [`store::RecordStore`] capability and suggestion audit entries
//! are mirrored to a [`store::SuggestionSink`]; [`review`] wires the two
//! together. This crate does no filesystem or network I/O and does not
//! depend on tokio.

pub mod bulk;
pub mod error;
pub mod file_shape;
pub mod ledger;
pub mod models;
pub mod review;
pub mod score;
pub mod selection;
pub mod store;
pub mod suggestion;

pub use error::{EngineError, EngineResult};
