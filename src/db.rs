//! Record file backend.
//!
//! The catalog is a JSON array of [`ProductRecord`]s. It is loaded into an
//! [`InMemoryStore`] at command start; commands that change records call
//! [`JsonRecordStore::save`] once at the end, which writes a temp file next
//! to the records file and renames it over the original.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

use catalog_reconcile_core::models::{FieldDiff, ProductRecord};
use catalog_reconcile_core::store::memory::InMemoryStore;
use catalog_reconcile_core::store::RecordStore;

use crate::config::Config;

pub struct JsonRecordStore {
    path: PathBuf,
    inner: InMemoryStore,
}

/// Open the records file named by `[store].records_path`.
pub async fn connect(config: &Config) -> Result<JsonRecordStore> {
    JsonRecordStore::load(&config.store.records_path).await
}

impl JsonRecordStore {
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read records file: {}", path.display()))?;
        let records: Vec<ProductRecord> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse records file: {}", path.display()))?;
        tracing::debug!(path = %path.display(), records = records.len(), "loaded records");
        Ok(Self {
            path: path.to_path_buf(),
            inner: InMemoryStore::with_records(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> Result<Vec<ProductRecord>> {
        self.inner.snapshot()
    }

    /// Write every record back, replacing the file atomically.
    pub async fn save(&self) -> Result<()> {
        let records = self.inner.snapshot()?;
        let json = serde_json::to_string_pretty(&records)?;
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "records.json".to_string());
        let tmp = self
            .path
            .with_file_name(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));
        tokio::fs::write(&tmp, json)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        tracing::debug!(path = %self.path.display(), records = records.len(), "saved records");
        Ok(())
    }
}

#[async_trait]
impl RecordStore for JsonRecordStore {
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
        self.inner
            .apply_diffs(id, diffs)
            .await
            .with_context(|| format!("updating record {}", id))
    }

    async fn set_completeness(&self, id: &str, score: u8) -> Result<()> {
        self.inner.set_completeness(id, score).await
    }
}
