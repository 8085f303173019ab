//! # NER Dataset
//!
//! Rows of tokens with ground-truth label IDs and, after a run, predicted
//! label IDs. Loads JSON-lines exports and CoNLL column files.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{NerError, Result};
use crate::schema::{LabelSchema, Prefix, split_tag};

/// Name of the ground-truth label column.
pub const TRUE_COLUMN: &str = "ner_tags";

/// Name of the prediction column added by a run.
pub const PRED_COLUMN: &str = "pred_ner_tags";

/// One sentence of the dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NerRow {
    /// Row identifier (`"0"`, `"1"`, ... for CoNLL-2003).
    pub id: String,
    /// Tokens in original order.
    pub tokens: Vec<String>,
    /// Ground-truth label IDs, one per token.
    pub ner_tags: Vec<usize>,
    /// Predicted label IDs, one per token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pred_ner_tags: Option<Vec<usize>>,
}

impl NerRow {
    pub fn new(id: impl Into<String>, tokens: Vec<String>, ner_tags: Vec<usize>) -> Self {
        Self {
            id: id.into(),
            tokens,
            ner_tags,
            pred_ner_tags: None,
        }
    }
}

/// An ordered set of rows sharing one label schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NerDataset {
    schema: LabelSchema,
    rows: Vec<NerRow>,
}

impl NerDataset {
    pub fn new(schema: LabelSchema, rows: Vec<NerRow>) -> Self {
        Self { schema, rows }
    }

    pub fn schema(&self) -> &LabelSchema {
        &self.schema
    }

    pub fn rows(&self) -> &[NerRow] {
        &self.rows
    }

    pub fn get(&self, index: usize) -> Option<&NerRow> {
        self.rows.get(index)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn into_rows(self) -> Vec<NerRow> {
        self.rows
    }

    /// Keep only the first `n` rows (all rows if `n` exceeds the length).
    #[must_use]
    pub fn select(mut self, n: usize) -> Self {
        self.rows.truncate(n);
        self
    }

    /// Attach one prediction per row, in row order.
    ///
    /// Fails if the number of predictions differs from the number of rows.
    pub fn with_predictions(mut self, predictions: Vec<Vec<usize>>) -> Result<Self> {
        if predictions.len() != self.rows.len() {
            return Err(NerError::RowCountMismatch {
                true_rows: self.rows.len(),
                pred_rows: predictions.len(),
            });
        }
        for (row, pred) in self.rows.iter_mut().zip(predictions) {
            row.pred_ner_tags = Some(pred);
        }
        Ok(self)
    }

    /// Borrow a label column by name.
    ///
    /// `ner_tags` always exists; `pred_ner_tags` exists only once every row
    /// carries a prediction. Unknown names return `None`.
    pub fn column(&self, name: &str) -> Option<Vec<&[usize]>> {
        match name {
            TRUE_COLUMN => Some(self.rows.iter().map(|r| r.ner_tags.as_slice()).collect()),
            PRED_COLUMN => self
                .rows
                .iter()
                .map(|r| r.pred_ner_tags.as_deref())
                .collect(),
            _ => None,
        }
    }

    /// Load rows from a JSON-lines file (`{"id", "tokens", "ner_tags"}` per line).
    pub fn load_jsonl<P: AsRef<Path>>(path: P, schema: LabelSchema) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_jsonl_reader(BufReader::new(file), schema)
    }

    /// Read rows from any JSON-lines source.
    ///
    /// Rows without an `id` get their 0-based position. An existing
    /// `pred_ner_tags` field is kept, so saved predictions load back.
    pub fn from_jsonl_reader<R: BufRead>(reader: R, schema: LabelSchema) -> Result<Self> {
        let mut rows = Vec::new();

        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let raw: RawRow = serde_json::from_str(line).map_err(|e| NerError::DatasetFormat {
                line: idx + 1,
                reason: e.to_string(),
            })?;
            let row = raw.into_row(rows.len());
            check_row(&row, &schema, idx + 1)?;
            rows.push(row);
        }

        debug!(rows = rows.len(), "loaded JSON-lines dataset");
        Ok(Self { schema, rows })
    }

    /// Load a CoNLL column file.
    pub fn load_conll<P: AsRef<Path>>(path: P, schema: LabelSchema) -> Result<Self> {
        let mut content = String::new();
        File::open(path)?.read_to_string(&mut content)?;
        Self::parse_conll(&content, schema)
    }

    /// Parse CoNLL column content.
    ///
    /// Accepts `token POS chunk NER` and `token NER` lines. Blank lines end a
    /// sentence, `-DOCSTART-` lines are skipped. IOB1 tags are rewritten to
    /// IOB2 before being mapped through the schema.
    pub fn parse_conll(content: &str, schema: LabelSchema) -> Result<Self> {
        let mut rows = Vec::new();
        let mut tokens = Vec::new();
        let mut tags = Vec::new();

        let mut flush = |tokens: &mut Vec<String>, tags: &mut Vec<String>, line: usize| -> Result<()> {
            if tokens.is_empty() {
                return Ok(());
            }
            to_iob2(tags);
            let ner_tags = tags
                .iter()
                .map(|t| schema.id(t).ok_or_else(|| NerError::UnknownLabel(t.clone())))
                .collect::<Result<Vec<_>>>()
                .map_err(|e| NerError::DatasetFormat {
                    line,
                    reason: e.to_string(),
                })?;
            tags.clear();
            rows.push(NerRow::new(
                rows.len().to_string(),
                std::mem::take(tokens),
                ner_tags,
            ));
            Ok(())
        };

        for (idx, line) in content.lines().enumerate() {
            let line = line.trim();

            if line.is_empty() {
                flush(&mut tokens, &mut tags, idx + 1)?;
                continue;
            }

            if line.starts_with("-DOCSTART-") {
                continue;
            }

            let parts: Vec<&str> = line.split_whitespace().collect();
            let (token, tag) = match parts.as_slice() {
                [token, _, _, tag, ..] => (*token, *tag),
                [token, tag] => (*token, *tag),
                _ => {
                    return Err(NerError::DatasetFormat {
                        line: idx + 1,
                        reason: format!("expected 2 or 4+ columns, found {}", parts.len()),
                    });
                }
            };
            tokens.push(token.to_string());
            tags.push(tag.to_string());
        }
        flush(&mut tokens, &mut tags, content.lines().count())?;

        debug!(rows = rows.len(), "parsed CoNLL dataset");
        Ok(Self { schema, rows })
    }
}

/// Return the label names and the `name -> id` table of a dataset.
pub fn get_label_mapping(
    dataset: &NerDataset,
) -> (Vec<String>, std::collections::HashMap<String, usize>) {
    let schema = dataset.schema();
    (schema.names().to_vec(), schema.name_to_id().clone())
}

/// Rewrite IOB1 tags to IOB2 in place.
///
/// An `I-X` that does not continue an `X` entity starts one, so it becomes `B-X`.
/// Sequences already in IOB2 are left untouched.
pub fn to_iob2(tags: &mut [String]) {
    let mut prev_type: Option<String> = None;
    for tag in tags.iter_mut() {
        let (prefix, kind) = split_tag(tag);
        let kind = kind.to_string();
        match prefix {
            Prefix::Outside => {
                prev_type = None;
                continue;
            }
            Prefix::Inside if prev_type.as_deref() != Some(kind.as_str()) => {
                *tag = format!("B-{kind}");
            }
            _ => {}
        }
        prev_type = Some(kind);
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(u64),
}

#[derive(Deserialize)]
struct RawRow {
    #[serde(default)]
    id: Option<RawId>,
    tokens: Vec<String>,
    ner_tags: Vec<usize>,
    #[serde(default)]
    pred_ner_tags: Option<Vec<usize>>,
}

impl RawRow {
    fn into_row(self, position: usize) -> NerRow {
        let id = match self.id {
            Some(RawId::Text(s)) => s,
            Some(RawId::Number(n)) => n.to_string(),
            None => position.to_string(),
        };
        NerRow {
            id,
            tokens: self.tokens,
            ner_tags: self.ner_tags,
            pred_ner_tags: self.pred_ner_tags,
        }
    }
}

fn check_row(row: &NerRow, schema: &LabelSchema, line: usize) -> Result<()> {
    if row.tokens.len() != row.ner_tags.len() {
        return Err(NerError::DatasetFormat {
            line,
            reason: format!(
                "{} tokens but {} ner_tags",
                row.tokens.len(),
                row.ner_tags.len()
            ),
        });
    }
    if let Some(&id) = row.ner_tags.iter().find(|&&id| id >= schema.len()) {
        return Err(NerError::UnknownLabelId(id));
    }
    Ok(())
}
