use super::Dataset;
use crate::pipeline::encoder::{RawValue, raw_fields};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;

const BINS: usize = 10;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnalysisQuery {
    pub top_n: Option<usize>,
    #[serde(default)]
    pub include_bins: bool,
}

/// Ordered `{label: count}` map; serialises in insertion order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Counts(pub Vec<(String, u64)>);

impl Serialize for Counts {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (label, count) in &self.0 {
            map.serialize_entry(label, count)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumericSummary {
    pub count: u64,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    #[serde(rename = "25%")]
    pub q25: f64,
    #[serde(rename = "50%")]
    pub q50: f64,
    #[serde(rename = "75%")]
    pub q75: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisMeta {
    pub total_rows: usize,
    pub columns_count: usize,
    pub generated_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub meta: AnalysisMeta,
    pub categorical_distributions: BTreeMap<String, Counts>,
    pub numerical: BTreeMap<String, NumericSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub numerical_distributions: Option<BTreeMap<String, Counts>>,
}

type Columns<T> = BTreeMap<&'static str, Vec<T>>;

/// Per-column views of the dataset, `risk` included as a numeric column.
fn columns(dataset: &Dataset) -> (Columns<&'static str>, Columns<f64>) {
    let mut categorical: BTreeMap<&'static str, Vec<&'static str>> = BTreeMap::new();
    let mut numeric: BTreeMap<&'static str, Vec<f64>> = BTreeMap::new();
    for row in &dataset.rows {
        for (field, value) in raw_fields(&row.record) {
            match value {
                RawValue::Category(c) => categorical.entry(field).or_default().push(c),
                RawValue::Number(n) => numeric.entry(field).or_default().push(n),
            }
        }
        numeric.entry("risk").or_default().push(f64::from(row.risk));
    }
    (categorical, numeric)
}

/// Value counts, most frequent first; ties broken by label.
pub fn value_counts<'a>(values: impl IntoIterator<Item = &'a str>, top_n: Option<usize>) -> Counts {
    let mut tally: BTreeMap<&str, u64> = BTreeMap::new();
    for v in values {
        *tally.entry(v).or_default() += 1;
    }
    let mut counts: Vec<(String, u64)> =
        tally.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    if let Some(n) = top_n {
        counts.truncate(n);
    }
    Counts(counts)
}

/// Linear interpolation between order statistics.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

pub fn describe(values: &[f64]) -> NumericSummary {
    if values.is_empty() {
        return NumericSummary {
            count: 0,
            mean: 0.0,
            std: 0.0,
            min: 0.0,
            q25: 0.0,
            q50: 0.0,
            q75: 0.0,
            max: 0.0,
        };
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let std = if values.len() > 1 {
        (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
    } else {
        0.0
    };
    NumericSummary {
        count: values.len() as u64,
        mean,
        std,
        min: sorted[0],
        q25: quantile(&sorted, 0.25),
        q50: quantile(&sorted, 0.5),
        q75: quantile(&sorted, 0.75),
        max: sorted[sorted.len() - 1],
    }
}

/// Counts over equal-width bins labelled `(lo, hi]`, in bin order. The lowest
/// edge is pushed down by 0.1% of the range so the minimum falls in bin 0.
pub fn binned_counts(values: &[f64], bins: usize) -> Counts {
    if values.is_empty() || bins == 0 {
        return Counts::default();
    }
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let (min, max) = if max > min {
        (min, max)
    } else {
        let pad = if min == 0.0 { 0.001 } else { min.abs() * 0.001 };
        (min - pad, max + pad)
    };
    let width = (max - min) / bins as f64;
    let edges: Vec<f64> = (0..=bins)
        .map(|i| match i {
            0 => min - (max - min) * 0.001,
            i if i == bins => max,
            i => min + width * i as f64,
        })
        .collect();

    let interior = &edges[1..bins];
    let mut counts = vec![0u64; bins];
    for v in values {
        counts[interior.partition_point(|e| e < v)] += 1;
    }
    Counts(
        counts
            .into_iter()
            .enumerate()
            .map(|(i, c)| (format!("({:.3}, {:.3}]", edges[i], edges[i + 1]), c))
            .collect(),
    )
}

pub fn analyze(dataset: &Dataset, query: &AnalysisQuery) -> AnalysisReport {
    let (categorical, numeric) = columns(dataset);

    let categorical_distributions = categorical
        .iter()
        .map(|(field, values)| {
            let counts = value_counts(values.iter().copied(), query.top_n);
            (field.to_string(), counts)
        })
        .collect();
    let numerical = numeric
        .iter()
        .map(|(field, values)| (field.to_string(), describe(values)))
        .collect();
    let numerical_distributions = query.include_bins.then(|| {
        numeric
            .iter()
            .map(|(field, values)| (field.to_string(), binned_counts(values, BINS)))
            .collect()
    });

    AnalysisReport {
        meta: AnalysisMeta {
            total_rows: dataset.len(),
            columns_count: categorical.len() + numeric.len(),
            generated_at: chrono::Utc::now().to_rfc3339(),
        },
        categorical_distributions,
        numerical,
        numerical_distributions,
    }
}
