//! # llmner core
//!
//! Data model and scoring for LLM-driven named entity recognition: the BIO
//! label schema, prompt construction, model reply validation, dataset
//! loading and seqeval-compatible entity-level evaluation.
//!
//! ## Quick Start
//!
//! ```rust
//! use llmner_core::{build_prompt, evaluate_sequences, validate_response, LabelSchema};
//!
//! let schema = LabelSchema::conll2003();
//! let tokens = ["EU", "rejects", "German", "call"];
//! let prompt = build_prompt(&tokens, schema.names());
//! assert!(prompt.starts_with("Tokens: EU rejects German call"));
//!
//! let reply = validate_response("[3,0,7,0]", tokens.len(), schema.len());
//! assert!(reply.is_valid());
//!
//! let report = evaluate_sequences(&[vec![3, 0, 7, 0]], &[reply.prediction], &schema.id2label(), 2).unwrap();
//! assert_eq!(report.overall.f1, 1.0);
//! ```
pub mod dataset;
pub mod error;
pub mod eval;
pub mod prompt;
pub mod schema;
pub mod validate;

// Re-export primary API
pub use dataset::{NerDataset, NerRow, PRED_COLUMN, TRUE_COLUMN, get_label_mapping};
pub use error::{NerError, Result};
pub use eval::{
    EvalOptions, EvaluationReport, LabelMetrics, OverallScores, evaluate_ner_predictions,
    evaluate_sequences,
};
pub use prompt::{TokenSanitizer, build_prompt};
pub use schema::{CONLL2003_LABELS, LabelSchema, Prefix};
pub use validate::{Rejection, Validation, validate_predicted_ids, validate_response};
