//! Completeness scoring for product records.
//!
//! [`ScoreCalculator::compute`] is a pure, total function: absent fields
//! score low, nothing ever fails. The same record always yields the same
//! [`CompletenessBreakdown`].
//!
//! # Dimensions
//!
//! | Dimension | Rule (default thresholds) |
//! |-----------|---------------------------|
//! | attributes | injected [`AttributeScorer`] |
//! | features | ≥ 5 filled slots → 100, otherwise 80 |
//! | images | 0 → 0, 1 → 50, ≥ 2 → 100 |
//! | title | < 50 chars → 50, 50–79 → 80, ≥ 80 → 100 |
//! | description | both → 100, one → 60, none → 0 |
//!
//! The overall score is the rounded mean of the five, equally weighted.

use serde::{Deserialize, Serialize};

use crate::models::ProductRecord;

/// Tunable bands for the built-in dimensions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreThresholds {
    /// Number of feature slots considered.
    pub feature_slots: usize,
    /// Number of image slots considered.
    pub image_slots: usize,
    /// Filled feature slots needed for a full features score.
    pub features_full_count: usize,
    /// Score given when fewer than `features_full_count` slots are filled,
    /// including zero.
    pub features_partial_score: u8,
    /// Filled image slots needed for a full images score.
    pub images_full_count: usize,
    pub title_medium_chars: usize,
    pub title_long_chars: usize,
}

impl Default for ScoreThresholds {
    fn default() -> Self {
        Self {
            feature_slots: 8,
            image_slots: 5,
            features_full_count: 5,
            features_partial_score: 80,
            images_full_count: 2,
            title_medium_chars: 50,
            title_long_chars: 80,
        }
    }
}

/// A single dimension's score with a human-readable explanation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubScore {
    pub score: u8,
    pub detail: String,
}

impl SubScore {
    pub fn new(score: u8, detail: impl Into<String>) -> Self {
        Self {
            score: score.min(100),
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletenessBreakdown {
    pub attributes: SubScore,
    pub features: SubScore,
    pub images: SubScore,
    pub title: SubScore,
    pub description: SubScore,
    pub overall_score: u8,
}

impl CompletenessBreakdown {
    /// Sub-scores in a fixed order, paired with their dimension name.
    pub fn dimensions(&self) -> [(&'static str, &SubScore); 5] {
        [
            ("attributes", &self.attributes),
            ("features", &self.features),
            ("images", &self.images),
            ("title", &self.title),
            ("description", &self.description),
        ]
    }
}

/// Strategy for the attributes dimension.
///
/// The required-attribute set is catalog specific, so callers inject the
/// rule rather than the calculator hardcoding one.
pub trait AttributeScorer: Send + Sync {
    fn score(&self, record: &ProductRecord) -> SubScore;
}

/// Returns the same score for every record.
///
/// Placeholder rule: it does not look at the record at all. Prefer
/// [`RequiredAttributes`] once the catalog's required set is known.
#[derive(Debug, Clone)]
pub struct FixedAttributeScore(pub u8);

impl AttributeScorer for FixedAttributeScore {
    fn score(&self, _record: &ProductRecord) -> SubScore {
        SubScore::new(self.0, "Fixed attribute score")
    }
}

/// Percentage of required attribute ids that carry a non-empty value.
#[derive(Debug, Clone)]
pub struct RequiredAttributes {
    required: Vec<String>,
}

impl RequiredAttributes {
    pub fn new<I, S>(required: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut required: Vec<String> = required.into_iter().map(Into::into).collect();
        required.sort();
        required.dedup();
        Self { required }
    }
}

impl AttributeScorer for RequiredAttributes {
    fn score(&self, record: &ProductRecord) -> SubScore {
        if self.required.is_empty() {
            return SubScore::new(100, "No required attributes");
        }
        let filled = self
            .required
            .iter()
            .filter(|key| record.attributes.get(*key).map_or(false, is_filled_json))
            .count();
        let pct = (filled as f64 * 100.0 / self.required.len() as f64).round() as u8;
        SubScore::new(
            pct,
            format!("{}/{} required attributes filled", filled, self.required.len()),
        )
    }
}

fn is_filled_json(v: &serde_json::Value) -> bool {
    match v {
        serde_json::Value::Null => false,
        serde_json::Value::String(s) => !s.trim().is_empty(),
        serde_json::Value::Array(a) => !a.is_empty(),
        _ => true,
    }
}

/// Computes [`CompletenessBreakdown`]s with injected thresholds and
/// attribute rule.
pub struct ScoreCalculator {
    thresholds: ScoreThresholds,
    attributes: Box<dyn AttributeScorer>,
}

impl ScoreCalculator {
    pub fn new(thresholds: ScoreThresholds, attributes: Box<dyn AttributeScorer>) -> Self {
        Self {
            thresholds,
            attributes,
        }
    }

    pub fn thresholds(&self) -> &ScoreThresholds {
        &self.thresholds
    }

    pub fn compute(&self, record: &ProductRecord) -> CompletenessBreakdown {
        let attributes = self.attributes.score(record);
        let features = self.features(record);
        let images = self.images(record);
        let title = self.title(record);
        let description = description(record);

        let sum: u32 = [&attributes, &features, &images, &title, &description]
            .iter()
            .map(|s| s.score as u32)
            .sum();
        let overall_score = (sum as f64 / 5.0).round() as u8;

        CompletenessBreakdown {
            attributes,
            features,
            images,
            title,
            description,
            overall_score,
        }
    }

    fn features(&self, record: &ProductRecord) -> SubScore {
        let t = &self.thresholds;
        let count = filled_slots(&record.features, t.feature_slots);
        let score = if count >= t.features_full_count {
            100
        } else {
            t.features_partial_score
        };
        SubScore::new(
            score,
            format!("{}/{} features filled", count, t.features_full_count),
        )
    }

    fn images(&self, record: &ProductRecord) -> SubScore {
        let count = filled_slots(&record.images, self.thresholds.image_slots);
        let score = if count == 0 {
            0
        } else if count >= self.thresholds.images_full_count {
            100
        } else {
            50
        };
        let noun = if count == 1 { "image" } else { "images" };
        SubScore::new(score, format!("{} {}", count, noun))
    }

    fn title(&self, record: &ProductRecord) -> SubScore {
        let t = &self.thresholds;
        let len = record.name.as_deref().map_or(0, |n| n.chars().count());
        let score = if len >= t.title_long_chars {
            100
        } else if len >= t.title_medium_chars {
            80
        } else {
            50
        };
        SubScore::new(score, format!("{} characters", len))
    }
}

fn filled_slots(slots: &[Option<String>], arity: usize) -> usize {
    slots
        .iter()
        .take(arity)
        .filter(|s| is_filled(s.as_deref()))
        .count()
}

fn is_filled(v: Option<&str>) -> bool {
    v.map_or(false, |s| !s.trim().is_empty())
}

fn description(record: &ProductRecord) -> SubScore {
    let short = is_filled(record.short_description.as_deref());
    let long = is_filled(record.long_description.as_deref());
    match (short, long) {
        (true, true) => SubScore::new(100, "Both descriptions found"),
        (true, false) => SubScore::new(60, "Only short description found"),
        (false, true) => SubScore::new(60, "Only long description found"),
        (false, false) => SubScore::new(0, "No descriptions"),
    }
}

/// Average completeness across a set of records.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogSummary {
    pub records: usize,
    pub average_overall: f64,
    pub average_attributes: f64,
    pub average_features: f64,
    pub average_images: f64,
    pub average_title: f64,
    pub average_description: f64,
    /// Records whose overall score is below 50.
    pub below_half: usize,
}

impl CatalogSummary {
    pub fn from_breakdowns<'a, I>(breakdowns: I) -> Self
    where
        I: IntoIterator<Item = &'a CompletenessBreakdown>,
    {
        let mut n = 0usize;
        let mut sums = [0u64; 6];
        let mut below_half = 0usize;
        for b in breakdowns {
            n += 1;
            sums[0] += b.overall_score as u64;
            for (i, (_, s)) in b.dimensions().iter().enumerate() {
                sums[i + 1] += s.score as u64;
            }
            if b.overall_score < 50 {
                below_half += 1;
            }
        }
        let avg = |s: u64| if n == 0 { 0.0 } else { s as f64 / n as f64 };
        Self {
            records: n,
            average_overall: avg(sums[0]),
            average_attributes: avg(sums[1]),
            average_features: avg(sums[2]),
            average_images: avg(sums[3]),
            average_title: avg(sums[4]),
            average_description: avg(sums[5]),
            below_half,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn calculator(attr: u8) -> ScoreCalculator {
        ScoreCalculator::new(
            ScoreThresholds::default(),
            Box::new(FixedAttributeScore(attr)),
        )
    }

    fn rich_record() -> ProductRecord {
        let mut rec = ProductRecord::new("p-1");
        rec.name = Some("x".repeat(80));
        rec.short_description = Some("Short".into());
        rec.long_description = Some("Long description".into());
        rec.images = vec![Some("a.jpg".into()), Some("b.jpg".into())];
        rec.features = (0..5).map(|i| Some(format!("feature {}", i))).collect();
        rec
    }

    #[test]
    fn empty_record_scores_floor_values() {
        for attr in [0u8, 37, 80, 100] {
            let b = calculator(attr).compute(&ProductRecord::new("p-1"));
            assert_eq!(b.features.score, 80);
            assert_eq!(b.images.score, 0);
            assert_eq!(b.title.score, 50);
            assert_eq!(b.description.score, 0);
            let expected = ((attr as f64 + 80.0 + 0.0 + 50.0 + 0.0) / 5.0).round() as u8;
            assert_eq!(b.overall_score, expected, "attr={}", attr);
        }
    }

    #[test]
    fn fully_populated_record_scores_full() {
        let b = calculator(80).compute(&rich_record());
        assert_eq!(b.title.score, 100);
        assert_eq!(b.description.score, 100);
        assert_eq!(b.images.score, 100);
        assert_eq!(b.features.score, 100);
        assert_eq!(b.overall_score, 96);
        assert_eq!(b.description.detail, "Both descriptions found");
        assert_eq!(b.features.detail, "5/5 features filled");
    }

    #[test]
    fn compute_is_idempotent() {
        let calc = calculator(80);
        let rec = rich_record();
        let a = calc.compute(&rec);
        let b = calc.compute(&rec);
        assert_eq!(a, b);
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn title_bands() {
        let calc = calculator(80);
        let mut rec = ProductRecord::new("p-1");
        for (len, expected) in [(0, 50), (49, 50), (50, 80), (79, 80), (80, 100), (200, 100)] {
            rec.name = Some("é".repeat(len));
            assert_eq!(calc.compute(&rec).title.score, expected, "len={}", len);
        }
    }

    #[test]
    fn image_bands_and_blank_slots() {
        let calc = calculator(80);
        let mut rec = ProductRecord::new("p-1");
        rec.images = vec![None, Some("   ".into()), Some("a.jpg".into())];
        let b = calc.compute(&rec);
        assert_eq!(b.images.score, 50);
        assert_eq!(b.images.detail, "1 image");
        rec.images.push(Some("b.jpg".into()));
        assert_eq!(calc.compute(&rec).images.score, 100);
    }

    #[test]
    fn slots_beyond_arity_are_ignored() {
        let calc = calculator(80);
        let mut rec = ProductRecord::new("p-1");
        rec.images = vec![None, None, None, None, None, Some("late.jpg".into())];
        assert_eq!(calc.compute(&rec).images.score, 0);
    }

    #[test]
    fn partial_features_score_flat() {
        let calc = calculator(80);
        let mut rec = ProductRecord::new("p-1");
        rec.features = vec![Some("one".into()), None, Some("three".into())];
        let b = calc.compute(&rec);
        assert_eq!(b.features.score, 80);
        assert_eq!(b.features.detail, "2/5 features filled");
    }

    #[test]
    fn single_description_names_which() {
        let calc = calculator(80);
        let mut rec = ProductRecord::new("p-1");
        rec.long_description = Some("Long".into());
        rec.short_description = Some("  ".into());
        let b = calc.compute(&rec);
        assert_eq!(b.description.score, 60);
        assert_eq!(b.description.detail, "Only long description found");
    }

    #[test]
    fn required_attributes_rule() {
        let scorer = RequiredAttributes::new(["color", "size", "material", "color"]);
        let mut rec = ProductRecord::new("p-1");
        rec.attributes.insert("color".into(), json!("red"));
        rec.attributes.insert("size".into(), json!(""));
        let s = scorer.score(&rec);
        assert_eq!(s.score, 33);
        assert_eq!(s.detail, "1/3 required attributes filled");

        let empty = RequiredAttributes::new(Vec::<String>::new());
        assert_eq!(empty.score(&rec).score, 100);
    }

    #[test]
    fn out_of_range_attribute_score_is_clamped() {
        let b = calculator(250).compute(&ProductRecord::new("p-1"));
        assert_eq!(b.attributes.score, 100);
        assert!(b.overall_score <= 100);
    }

    #[test]
    fn summary_averages() {
        let calc = calculator(80);
        let a = calc.compute(&ProductRecord::new("p-1"));
        let b = calc.compute(&rich_record());
        let summary = CatalogSummary::from_breakdowns([&a, &b]);
        assert_eq!(summary.records, 2);
        assert_eq!(summary.below_half, 1);
        assert!((summary.average_overall - (a.overall_score as f64 + 96.0) / 2.0).abs() < 1e-9);
        assert!((summary.average_images - 50.0).abs() < 1e-9);

        let none = CatalogSummary::from_breakdowns(std::iter::empty());
        assert_eq!(none.records, 0);
        assert_eq!(none.average_overall, 0.0);
    }
}
