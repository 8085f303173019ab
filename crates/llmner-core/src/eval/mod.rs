//! # Evaluator
//!
//! Entity-level scoring of predicted tag sequences against ground truth.
//! Label IDs are mapped to BIO tag strings and handed to `rusev` in its
//! lenient (conlleval) mode; precision/recall/F1 are reported per entity
//! type plus micro-averaged overall scores.

mod metrics;
mod report;

use std::collections::BTreeMap;

use rusev::{DivByZeroStrat, classification_report};
use serde::{Deserialize, Serialize};

use crate::dataset::{NerDataset, PRED_COLUMN, TRUE_COLUMN};
use crate::error::{NerError, Result};

pub use metrics::LabelMetrics;

/// Column names and formatting used by [`evaluate_ner_predictions`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalOptions {
    pub true_col: String,
    pub pred_col: String,
    /// Decimal places in the text report.
    pub digits: usize,
}

impl Default for EvalOptions {
    fn default() -> Self {
        Self {
            true_col: TRUE_COLUMN.into(),
            pred_col: PRED_COLUMN.into(),
            digits: 2,
        }
    }
}

impl EvalOptions {
    pub fn with_true_col(mut self, col: impl Into<String>) -> Self {
        self.true_col = col.into();
        self
    }

    pub fn with_pred_col(mut self, col: impl Into<String>) -> Self {
        self.pred_col = col.into();
        self
    }

    pub fn with_digits(mut self, digits: usize) -> Self {
        self.digits = digits;
        self
    }
}

/// Micro-averaged scores over all entity types.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OverallScores {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

/// Everything the evaluator produces for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub overall: OverallScores,
    /// One entry per entity type, sorted by name. Average rows are excluded.
    pub per_label: Vec<LabelMetrics>,
    /// The micro, macro and weighted average rows, in that order.
    pub averages: Vec<LabelMetrics>,
    /// Human-readable table in the seqeval `classification_report` layout.
    pub report_text: String,
}

impl EvaluationReport {
    /// Look up the row for one entity type.
    pub fn label(&self, name: &str) -> Option<&LabelMetrics> {
        self.per_label.iter().find(|m| m.label == name)
    }
}

/// Score the prediction column of `dataset` against its ground-truth column.
///
/// Fails with a configuration error if either column is missing, if
/// `id2label` is empty, or if the columns disagree in shape.
pub fn evaluate_ner_predictions(
    dataset: &NerDataset,
    id2label: &BTreeMap<usize, String>,
    options: &EvalOptions,
) -> Result<EvaluationReport> {
    let (Some(y_true), Some(y_pred)) = (
        dataset.column(&options.true_col),
        dataset.column(&options.pred_col),
    ) else {
        return Err(NerError::MissingColumn {
            true_col: options.true_col.clone(),
            pred_col: options.pred_col.clone(),
        });
    };

    evaluate_sequences(&y_true, &y_pred, id2label, options.digits)
}

/// Score raw ID sequences.
///
/// # Examples
/// ```
/// use llmner_core::eval::evaluate_sequences;
/// use llmner_core::schema::LabelSchema;
///
/// let id2label = LabelSchema::conll2003().id2label();
/// let report = evaluate_sequences(&[vec![1, 0, 5, 6]], &[vec![1, 0, 5, 6]], &id2label, 2).unwrap();
/// assert_eq!(report.overall.f1, 1.0);
/// ```
pub fn evaluate_sequences<T, P>(
    y_true: &[T],
    y_pred: &[P],
    id2label: &BTreeMap<usize, String>,
    digits: usize,
) -> Result<EvaluationReport>
where
    T: AsRef<[usize]>,
    P: AsRef<[usize]>,
{
    if id2label.is_empty() {
        return Err(NerError::EmptyLabelMapping);
    }
    if y_true.len() != y_pred.len() {
        return Err(NerError::RowCountMismatch {
            true_rows: y_true.len(),
            pred_rows: y_pred.len(),
        });
    }

    let mut true_tags = Vec::with_capacity(y_true.len());
    let mut pred_tags = Vec::with_capacity(y_pred.len());
    for (row, (t, p)) in y_true.iter().zip(y_pred).enumerate() {
        let (t, p) = (t.as_ref(), p.as_ref());
        if t.len() != p.len() {
            return Err(NerError::SequenceLengthMismatch {
                row,
                true_len: t.len(),
                pred_len: p.len(),
            });
        }
        true_tags.push(to_tags(t, id2label)?);
        pred_tags.push(to_tags(p, id2label)?);
    }

    let rows = y_true.len();
    // rusev cannot average over a ground truth without entities.
    let (per_label, averages) = if true_tags.iter().flatten().all(|tag| *tag == "O") {
        metrics::without_truth(&pred_tags)
    } else {
        let reporter = classification_report(
            true_tags,
            pred_tags,
            None,
            DivByZeroStrat::ReplaceBy0,
            None,
            false,
            false,
        )
        .map_err(|e| NerError::Scoring(e.to_string()))?;
        metrics::split_report(reporter)
    };
    let overall = OverallScores {
        precision: averages[0].precision,
        recall: averages[0].recall,
        f1: averages[0].f1_score,
    };
    let report_text = report::render(&per_label, &averages, digits);

    tracing::debug!(
        rows,
        labels = per_label.len(),
        f1 = overall.f1,
        "evaluated predictions"
    );

    Ok(EvaluationReport {
        overall,
        per_label,
        averages,
        report_text,
    })
}

fn to_tags<'a>(ids: &[usize], id2label: &'a BTreeMap<usize, String>) -> Result<Vec<&'a str>> {
    ids.iter()
        .map(|id| {
            id2label
                .get(id)
                .map(String::as_str)
                .ok_or(NerError::UnknownLabelId(*id))
        })
        .collect()
}
