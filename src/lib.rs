//! # Catalog Reconcile
//!
//! Command-line front end for the catalog reconciliation engine in
//! [`catalog_reconcile_core`].
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌───────────────┐   ┌──────────────┐
//! │ Stock file   │──▶│ Extract rows  │──▶│ Reconcile    │──┐
//! │ CSV / XLSX   │   │ CSV / OOXML   │   │ + apply plan │  │
//! └──────────────┘   └───────────────┘   └──────────────┘  │
//! ┌──────────────┐   ┌───────────────┐                     ▼
//! │ Suggestions  │──▶│ Review bands  │──────────────▶┌──────────────┐
//! │ JSON         │   │ accept/reject │               │ records.json │
//! └──────────────┘   └──────┬────────┘               └──────────────┘
//!                           ▼
//!                    ┌──────────────┐
//!                    │ audit.jsonl  │
//!                    └──────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Records file backend |
//! | [`audit`] | JSON-lines audit log |
//! | [`extract`] | CSV and XLSX row extraction |
//! | [`import`] | Bulk stock import pipeline |
//! | [`review`] | Suggestion review |
//! | [`edit`] | Manual cell edits |
//! | [`score`] | Completeness report |
//! | [`export`] | JSON export |
//! | [`progress`] | Import progress on stderr |
//! | [`logging`] | Tracing setup |

pub mod audit;
pub mod config;
pub mod db;
pub mod edit;
pub mod export;
pub mod extract;
pub mod import;
pub mod logging;
pub mod progress;
pub mod review;
pub mod score;
