use thiserror::Error;

/// Errors that can occur while building, loading or scoring NER data.
#[derive(Debug, Error)]
pub enum NerError {
    /// The label list is empty or contains duplicates.
    #[error("invalid label schema: {0}")]
    InvalidSchema(String),

    /// The ID-to-label mapping handed to the evaluator is empty.
    #[error("id2label must be a non-empty mapping from tag id to BIO tag")]
    EmptyLabelMapping,

    /// One of the requested label columns does not exist.
    #[error("dataset must contain '{true_col}' and '{pred_col}' columns")]
    MissingColumn {
        /// Ground-truth column name.
        true_col: String,
        /// Prediction column name.
        pred_col: String,
    },

    /// Ground-truth and prediction columns hold a different number of rows.
    #[error("true and pred lists must have the same number of sequences ({true_rows} vs {pred_rows})")]
    RowCountMismatch {
        /// Rows in the ground-truth column.
        true_rows: usize,
        /// Rows in the prediction column.
        pred_rows: usize,
    },

    /// A single row has ground-truth and prediction sequences of different length.
    #[error("row {row}: true sequence has {true_len} tags but prediction has {pred_len}")]
    SequenceLengthMismatch {
        /// Index of the offending row.
        row: usize,
        /// Length of the ground-truth sequence.
        true_len: usize,
        /// Length of the predicted sequence.
        pred_len: usize,
    },

    /// A label ID has no entry in the mapping.
    #[error("no label mapped to id {0}")]
    UnknownLabelId(usize),

    /// A tag name is not part of the label schema.
    #[error("tag {0:?} is not part of the label schema")]
    UnknownLabel(String),

    /// The scoring backend rejected the tag sequences.
    #[error("scoring failed: {0}")]
    Scoring(String),

    /// A dataset file could not be interpreted.
    #[error("malformed dataset at line {line}: {reason}")]
    DatasetFormat {
        /// 1-based line number in the source file.
        line: usize,
        /// What was wrong with it.
        reason: String,
    },

    /// A regex pattern failed to compile (should not happen with static patterns).
    #[error("regex compilation error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl NerError {
    /// Returns `true` for errors caused by inconsistent inputs or settings
    /// rather than by data lookups or I/O.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            NerError::InvalidSchema(_)
                | NerError::EmptyLabelMapping
                | NerError::MissingColumn { .. }
                | NerError::RowCountMismatch { .. }
                | NerError::SequenceLengthMismatch { .. }
        )
    }
}

/// Result type alias for llmner-core operations.
pub type Result<T> = std::result::Result<T, NerError>;
