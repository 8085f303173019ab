//! # Prompt Builder
//!
//! Turns a row's tokens into the per-row user prompt and offers the token
//! normalization used before prompting.

use regex::Regex;

use crate::error::Result;

const ZERO_WIDTH_SPACE: char = '\u{200b}';

/// Token normalizer applied before prompting.
#[derive(Debug, Clone)]
pub struct TokenSanitizer {
    re_whitespace: Regex,
}

impl TokenSanitizer {
    /// Create a sanitizer, compiling its patterns.
    pub fn new() -> Result<Self> {
        Ok(Self {
            re_whitespace: Regex::new(r"\s+")?,
        })
    }

    /// Normalize tokens.
    ///
    /// Removes zero-width spaces, trims, collapses whitespace runs to a single
    /// space and drops tokens that end up empty. Dropping changes the token
    /// count, so callers that must stay aligned with ground-truth tags have to
    /// check the length.
    ///
    /// # Examples
    /// ```
    /// use llmner_core::prompt::TokenSanitizer;
    ///
    /// let sanitizer = TokenSanitizer::new().unwrap();
    /// let tokens = vec!["New\u{200b}".to_string(), "  York \t City ".into(), " ".into()];
    /// assert_eq!(sanitizer.sanitize(&tokens), vec!["New", "York City"]);
    /// ```
    pub fn sanitize<S: AsRef<str>>(&self, tokens: &[S]) -> Vec<String> {
        tokens
            .iter()
            .filter_map(|t| {
                let stripped = t.as_ref().replace(ZERO_WIDTH_SPACE, "");
                let collapsed = self.re_whitespace.replace_all(stripped.trim(), " ");
                (!collapsed.is_empty()).then(|| collapsed.into_owned())
            })
            .collect()
    }
}

/// Build the user prompt for one row.
///
/// The output lists the space-joined tokens and the index-aligned label
/// names, and asks for one integer per token. Pure and deterministic.
///
/// # Examples
/// ```
/// use llmner_core::prompt::build_prompt;
///
/// let prompt = build_prompt(&["John", "lives"], &["O", "B-PER"]);
/// assert!(prompt.starts_with("Tokens: John lives\n"));
/// ```
pub fn build_prompt<T, L>(tokens: &[T], label_names: &[L]) -> String
where
    T: AsRef<str>,
    L: AsRef<str>,
{
    let joined_tokens = join(tokens, " ");
    let labels_str = join(label_names, ", ");
    format!(
        "Tokens: {joined_tokens}\n\
         Label names (index aligned): [{labels_str}]\n\
         Return a list of integers, one per token."
    )
}

fn join<S: AsRef<str>>(items: &[S], sep: &str) -> String {
    items
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(sep)
}
