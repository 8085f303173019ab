//! # Response Validator
//!
//! Checks a model's raw reply against the token count and label count and
//! falls back to an all-`O` prediction when it does not fit.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Why a model reply was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Rejection {
    /// The reply is not a JSON array of integers.
    Malformed { detail: String },
    /// The array length differs from the token count.
    WrongLength { expected: usize, actual: usize },
    /// At least one value lies outside `[0, num_labels)`.
    OutOfRange { value: i64, num_labels: usize },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Malformed { detail } => write!(f, "malformed response: {detail}"),
            Rejection::WrongLength { expected, actual } => {
                write!(f, "expected {expected} labels, got {actual}")
            }
            Rejection::OutOfRange { value, num_labels } => {
                write!(f, "label {value} outside [0, {num_labels})")
            }
        }
    }
}

/// Outcome of validating one reply. The prediction always has the expected length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validation {
    /// The accepted prediction, or the all-zero fallback.
    pub prediction: Vec<usize>,
    /// Set when the fallback was used.
    pub rejection: Option<Rejection>,
}

impl Validation {
    /// Returns `true` if the reply was used unchanged.
    pub fn is_valid(&self) -> bool {
        self.rejection.is_none()
    }

    fn fallback(num_tokens: usize, rejection: Rejection) -> Self {
        Self {
            prediction: vec![0; num_tokens],
            rejection: Some(rejection),
        }
    }
}

/// Returns `true` if `pred_ids` has one entry per token and every entry is a
/// valid label index.
pub fn validate_predicted_ids(pred_ids: &[i64], num_tokens: usize, num_labels: usize) -> bool {
    pred_ids.len() == num_tokens && pred_ids.iter().all(|&x| in_range(x, num_labels))
}

fn in_range(value: i64, num_labels: usize) -> bool {
    usize::try_from(value).is_ok_and(|v| v < num_labels)
}

/// Validate a raw model reply.
///
/// Never fails: any reply that is not a JSON integer array of length
/// `num_tokens` with values in `[0, num_labels)` is replaced by
/// `num_tokens` zeros and the reason is recorded.
///
/// # Examples
/// ```
/// use llmner_core::validate::validate_response;
///
/// let ok = validate_response("[1,0,5,6]", 4, 9);
/// assert_eq!(ok.prediction, vec![1, 0, 5, 6]);
///
/// let short = validate_response("[1,0,5]", 4, 9);
/// assert_eq!(short.prediction, vec![0, 0, 0, 0]);
/// assert!(!short.is_valid());
/// ```
pub fn validate_response(text: &str, num_tokens: usize, num_labels: usize) -> Validation {
    let ids: Vec<i64> = match serde_json::from_str(text.trim()) {
        Ok(ids) => ids,
        Err(e) => {
            return Validation::fallback(
                num_tokens,
                Rejection::Malformed {
                    detail: e.to_string(),
                },
            );
        }
    };

    if ids.len() != num_tokens {
        return Validation::fallback(
            num_tokens,
            Rejection::WrongLength {
                expected: num_tokens,
                actual: ids.len(),
            },
        );
    }

    if let Some(&value) = ids.iter().find(|&&x| !in_range(x, num_labels)) {
        return Validation::fallback(num_tokens, Rejection::OutOfRange { value, num_labels });
    }

    debug_assert!(validate_predicted_ids(&ids, num_tokens, num_labels));
    Validation {
        prediction: ids.into_iter().map(|x| x as usize).collect(),
        rejection: None,
    }
}
