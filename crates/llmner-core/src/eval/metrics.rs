//! Per-type and averaged scores, converted from a `rusev` report.

use std::collections::{BTreeSet, HashSet};

use rusev::{Average, ClassMetrics, Reporter};
use serde::{Deserialize, Serialize};

const AVERAGE_LABELS: [&str; 3] = ["micro avg", "macro avg", "weighted avg"];

/// Scores for one label (or one average) row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelMetrics {
    pub label: String,
    pub precision: f64,
    pub recall: f64,
    #[serde(rename = "f1-score")]
    pub f1_score: f64,
    pub support: usize,
}

impl LabelMetrics {
    fn zero(label: &str) -> Self {
        Self {
            label: label.to_string(),
            precision: 0.0,
            recall: 0.0,
            f1_score: 0.0,
            support: 0,
        }
    }

    fn from_class(label: String, m: &ClassMetrics) -> Self {
        Self {
            label,
            precision: f64::from(m.precision),
            recall: f64::from(m.recall),
            f1_score: f64::from(m.fscore),
            support: m.support,
        }
    }
}

/// Split a report into per-type rows sorted by name, and the micro, macro
/// and weighted average rows in that order.
pub(crate) fn split_report(reporter: Reporter) -> (Vec<LabelMetrics>, Vec<LabelMetrics>) {
    let mut per_label = Vec::new();
    let mut averages: [Option<LabelMetrics>; 3] = [None, None, None];

    for m in HashSet::<ClassMetrics>::from(reporter) {
        let slot = match m.average {
            Average::Micro => 0,
            Average::Macro => 1,
            Average::Weighted => 2,
            Average::None | Average::Samples => {
                per_label.push(LabelMetrics::from_class(m.class.clone(), &m));
                continue;
            }
        };
        averages[slot] = Some(LabelMetrics::from_class(AVERAGE_LABELS[slot].to_string(), &m));
    }

    per_label.sort_by(|a, b| a.label.cmp(&b.label));
    let averages = AVERAGE_LABELS
        .iter()
        .zip(averages)
        .map(|(name, row)| row.unwrap_or_else(|| LabelMetrics::zero(name)))
        .collect();
    (per_label, averages)
}

/// Rows for predictions scored against ground truth that holds no entity:
/// every predicted type gets a zero row with no support.
pub(crate) fn without_truth<S: AsRef<str>>(
    y_pred: &[Vec<S>],
) -> (Vec<LabelMetrics>, Vec<LabelMetrics>) {
    let types: BTreeSet<&str> = y_pred
        .iter()
        .flatten()
        .map(AsRef::as_ref)
        .filter(|tag| *tag != "O")
        .map(|tag| tag.split_once('-').map_or("_", |(_, kind)| kind))
        .collect();
    let per_label = types.into_iter().map(LabelMetrics::zero).collect();
    let averages = AVERAGE_LABELS.iter().map(|name| LabelMetrics::zero(name)).collect();
    (per_label, averages)
}
