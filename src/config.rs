//! TOML configuration for `catrec`.
//!
//! Only `[store].records_path` is required. Every other section falls back
//! to the engine defaults (confidence bands 80/60, low stock below 50,
//! title bands 50/80, five features, two images).

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use catalog_reconcile_core::bulk::{BulkReconciler, ColumnMap, StockPolicy};
use catalog_reconcile_core::score::{
    AttributeScorer, FixedAttributeScore, RequiredAttributes, ScoreCalculator, ScoreThresholds,
};
use catalog_reconcile_core::suggestion::{ConfidenceThresholds, SuggestionStore};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub store: StoreConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub suggestions: SuggestionsConfig,
    #[serde(default)]
    pub bulk: BulkConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// JSON array of product records.
    pub records_path: PathBuf,
    /// JSON-lines audit log. Defaults to `audit.jsonl` beside the records file.
    #[serde(default)]
    pub audit_log: Option<PathBuf>,
}

impl StoreConfig {
    pub fn audit_log_path(&self) -> PathBuf {
        match &self.audit_log {
            Some(p) => p.clone(),
            None => self
                .records_path
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join("audit.jsonl"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScoringConfig {
    #[serde(flatten)]
    pub thresholds: ScoreThresholds,
    /// `fixed` or `required`.
    #[serde(default = "default_attribute_rule")]
    pub attribute_rule: String,
    #[serde(default = "default_fixed_attribute_score")]
    pub fixed_attribute_score: u8,
    #[serde(default)]
    pub required_attributes: Vec<String>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            thresholds: ScoreThresholds::default(),
            attribute_rule: default_attribute_rule(),
            fixed_attribute_score: default_fixed_attribute_score(),
            required_attributes: Vec::new(),
        }
    }
}

fn default_attribute_rule() -> String {
    "fixed".to_string()
}
fn default_fixed_attribute_score() -> u8 {
    80
}

impl ScoringConfig {
    pub fn calculator(&self) -> ScoreCalculator {
        let rule: Box<dyn AttributeScorer> = match self.attribute_rule.as_str() {
            "required" => Box::new(RequiredAttributes::new(self.required_attributes.clone())),
            _ => Box::new(FixedAttributeScore(self.fixed_attribute_score)),
        };
        ScoreCalculator::new(self.thresholds.clone(), rule)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SuggestionsConfig {
    #[serde(flatten)]
    pub confidence: ConfidenceThresholds,
    /// Audit entries shown per record by `catrec review`.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl Default for SuggestionsConfig {
    fn default() -> Self {
        Self {
            confidence: ConfidenceThresholds::default(),
            history_limit: default_history_limit(),
        }
    }
}

fn default_history_limit() -> usize {
    20
}

impl SuggestionsConfig {
    pub fn store(&self) -> SuggestionStore {
        SuggestionStore::new(self.confidence.clone())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct BulkConfig {
    #[serde(default = "default_low_stock_threshold")]
    pub low_stock_threshold: i64,
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,
    #[serde(default)]
    pub columns: ColumnMap,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            low_stock_threshold: default_low_stock_threshold(),
            max_rows: default_max_rows(),
            columns: ColumnMap::default(),
        }
    }
}

fn default_low_stock_threshold() -> i64 {
    50
}
fn default_max_rows() -> usize {
    10_000
}

impl BulkConfig {
    pub fn reconciler(&self) -> BulkReconciler {
        let policy = StockPolicy {
            low_stock_threshold: self.low_stock_threshold,
        };
        let columns = ColumnMap {
            key: normalize_aliases(&self.columns.key),
            quantity: normalize_aliases(&self.columns.quantity),
            status: normalize_aliases(&self.columns.status),
        };
        BulkReconciler::new(policy, columns).with_max_rows(self.max_rows)
    }
}

fn normalize_aliases(aliases: &[String]) -> Vec<String> {
    aliases.iter().map(|a| a.trim().to_lowercase()).collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

impl Config {
    /// Defaults for commands that never touch the record store.
    pub fn minimal() -> Self {
        Self {
            store: StoreConfig {
                records_path: PathBuf::from("./data/records.json"),
                audit_log: None,
            },
            scoring: ScoringConfig::default(),
            suggestions: SuggestionsConfig::default(),
            bulk: BulkConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate scoring
    let t = &config.scoring.thresholds;
    if t.feature_slots == 0 || t.image_slots == 0 {
        anyhow::bail!("scoring.feature_slots and scoring.image_slots must be > 0");
    }
    if t.features_full_count == 0 || t.features_full_count > t.feature_slots {
        anyhow::bail!("scoring.features_full_count must be in [1, feature_slots]");
    }
    if t.images_full_count == 0 || t.images_full_count > t.image_slots {
        anyhow::bail!("scoring.images_full_count must be in [1, image_slots]");
    }
    if t.title_medium_chars >= t.title_long_chars {
        anyhow::bail!("scoring.title_medium_chars must be < scoring.title_long_chars");
    }
    if t.features_partial_score > 100 || config.scoring.fixed_attribute_score > 100 {
        anyhow::bail!("scoring scores must be in [0, 100]");
    }
    match config.scoring.attribute_rule.as_str() {
        "fixed" => {}
        "required" => {
            if config.scoring.required_attributes.is_empty() {
                anyhow::bail!(
                    "scoring.required_attributes must be non-empty when attribute_rule is 'required'"
                );
            }
        }
        other => anyhow::bail!(
            "Unknown scoring.attribute_rule: '{}'. Must be fixed or required.",
            other
        ),
    }

    // Validate suggestions
    let c = &config.suggestions.confidence;
    if !(0.0..=100.0).contains(&c.medium) || !(0.0..=100.0).contains(&c.high) {
        anyhow::bail!("suggestions.high and suggestions.medium must be in [0, 100]");
    }
    if c.medium > c.high {
        anyhow::bail!("suggestions.medium must be <= suggestions.high");
    }

    // Validate bulk
    if config.bulk.low_stock_threshold < 1 {
        anyhow::bail!("bulk.low_stock_threshold must be >= 1");
    }
    if config.bulk.max_rows == 0 {
        anyhow::bail!("bulk.max_rows must be > 0");
    }
    if config.bulk.columns.key.is_empty() || config.bulk.columns.quantity.is_empty() {
        anyhow::bail!("bulk.columns.key and bulk.columns.quantity need at least one alias");
    }

    match config.logging.level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        other => anyhow::bail!(
            "Unknown logging.level: '{}'. Must be trace, debug, info, warn, or error.",
            other
        ),
    }

    Ok(config)
}
