//! Append-only JSON-lines audit log.
//!
//! Every suggestion state change and every history entry the engine emits
//! is written as one line, tagged by `kind`. The log is never rewritten.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use catalog_reconcile_core::models::{HistoryEntry, Suggestion};
use catalog_reconcile_core::store::SuggestionSink;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditLine {
    Suggestion(Suggestion),
    History(HistoryEntry),
}

pub struct JsonlAuditLog {
    path: PathBuf,
}

impl JsonlAuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn append(&self, line: &AuditLine) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.with_context(|| {
                    format!("Failed to create audit log directory: {}", parent.display())
                })?;
            }
        }
        let mut json = serde_json::to_string(line)?;
        json.push('\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("Failed to open audit log: {}", self.path.display()))?;
        file.write_all(json.as_bytes())
            .await
            .with_context(|| format!("Failed to append to audit log: {}", self.path.display()))?;
        file.flush().await?;
        Ok(())
    }

    /// Read every line back, oldest first.
    pub async fn read_all(&self) -> Result<Vec<AuditLine>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read audit log: {}", self.path.display()))
            }
        };
        content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .enumerate()
            .map(|(i, l)| {
                serde_json::from_str(l).with_context(|| {
                    format!("{}: malformed audit line {}", self.path.display(), i + 1)
                })
            })
            .collect()
    }
}

#[async_trait]
impl SuggestionSink for JsonlAuditLog {
    async fn save_suggestion(&self, suggestion: &Suggestion) -> Result<()> {
        self.append(&AuditLine::Suggestion(suggestion.clone())).await
    }

    async fn append_history(&self, entry: &HistoryEntry) -> Result<()> {
        self.append(&AuditLine::History(entry.clone())).await
    }
}
