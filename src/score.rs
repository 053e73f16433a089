//! `catrec score`: completeness breakdowns and a catalog summary.
//!
//! Read-only. Scores are computed from the records as stored; nothing is
//! written back (imports and reviews store refreshed scores themselves).

use anyhow::Result;
use serde::Serialize;

use catalog_reconcile_core::models::ProductRecord;
use catalog_reconcile_core::score::{CatalogSummary, CompletenessBreakdown};
use catalog_reconcile_core::store::RecordStore;

use crate::config::Config;
use crate::db;

#[derive(Serialize)]
struct ScoredRecord<'a> {
    id: &'a str,
    sku: Option<&'a str>,
    breakdown: &'a CompletenessBreakdown,
}

#[derive(Serialize)]
struct ScoreOutput<'a> {
    records: Vec<ScoredRecord<'a>>,
    summary: CatalogSummary,
}

/// Run the score command for one record (`id`) or the whole catalog.
pub async fn run_score(config: &Config, id: Option<&str>, json: bool) -> Result<()> {
    let store = db::connect(config).await?;
    let records: Vec<ProductRecord> = match id {
        Some(id) => match store.get_record(id).await? {
            Some(rec) => vec![rec],
            None => anyhow::bail!("record not found: {}", id),
        },
        None => store.list_records().await?,
    };

    let calculator = config.scoring.calculator();
    let breakdowns: Vec<CompletenessBreakdown> =
        records.iter().map(|r| calculator.compute(r)).collect();
    let summary = CatalogSummary::from_breakdowns(&breakdowns);

    if json {
        let out = ScoreOutput {
            records: records
                .iter()
                .zip(&breakdowns)
                .map(|(r, b)| ScoredRecord {
                    id: &r.id,
                    sku: r.sku.as_deref(),
                    breakdown: b,
                })
                .collect(),
            summary,
        };
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if id.is_some() {
        for (rec, b) in records.iter().zip(&breakdowns) {
            print_detail(rec, b);
        }
        return Ok(());
    }

    println!("Catalog completeness");
    println!("====================");
    println!();
    println!(
        "  {:<24} {:<16} {:>7} {:>5} {:>5} {:>5} {:>5} {:>5}",
        "ID", "SKU", "OVERALL", "ATTR", "FEAT", "IMG", "TITLE", "DESC"
    );
    println!("  {}", "-".repeat(82));
    for (rec, b) in records.iter().zip(&breakdowns) {
        println!(
            "  {:<24} {:<16} {:>7} {:>5} {:>5} {:>5} {:>5} {:>5}",
            truncate(&rec.id, 24),
            truncate(rec.sku.as_deref().unwrap_or("-"), 16),
            b.overall_score,
            b.attributes.score,
            b.features.score,
            b.images.score,
            b.title.score,
            b.description.score
        );
    }
    println!();
    println!("  Records:          {}", summary.records);
    println!("  Average overall:  {:.1}", summary.average_overall);
    println!("  Below 50:         {}", summary.below_half);
    Ok(())
}

fn print_detail(rec: &ProductRecord, b: &CompletenessBreakdown) {
    println!("{} ({})", rec.id, rec.sku.as_deref().unwrap_or("no sku"));
    println!("  overall: {}", b.overall_score);
    for (name, sub) in b.dimensions() {
        println!("  {:<12} {:>3}  {}", name, sub.score, sub.detail);
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
        out.push('~');
        out
    }
}
