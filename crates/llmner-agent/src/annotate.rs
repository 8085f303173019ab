//! # Annotation Client
//!
//! Sends one row's prompt to a chat model under a fixed NER instruction and
//! returns the raw reply text. Validation is the caller's job.

use std::fmt::Write;
use std::sync::Arc;

use llmner_core::LabelSchema;
use tracing::debug;

use crate::error::Result;
use crate::provider::{ChatMessage, ChatModel, ChatRequest};
use crate::retry::RetryPolicy;

/// Worked examples shown to the model: sentence and gold tag names.
const EXAMPLES: &[(&str, &[&str])] = &[
    ("John lives in Berlin", &["B-PER", "O", "B-LOC", "I-LOC"]),
    ("Microsoft released Windows 11", &["B-ORG", "O", "B-MISC", "O"]),
    (
        "Barack Obama met Angela Merkel",
        &["B-PER", "I-PER", "O", "B-PER", "I-PER"],
    ),
    ("I love pizza", &["O", "O", "O"]),
    (
        "The United Nations is in New York",
        &["O", "B-ORG", "I-ORG", "O", "O", "B-LOC", "I-LOC"],
    ),
];

/// Build the system instruction for `schema`.
///
/// Lists the exact label-to-ID mapping, the output constraints and the
/// worked examples whose tags all exist in the schema.
pub fn ner_instructions(schema: &LabelSchema) -> String {
    let max_id = schema.len().saturating_sub(1);
    let mapping = schema
        .names()
        .iter()
        .enumerate()
        .map(|(id, name)| format!("'{name}': {id}"))
        .collect::<Vec<_>>()
        .join(", ");

    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = writeln!(
        out,
        "You are a Named Entity Recognition model using the BIO2 tagging scheme."
    );
    let _ = writeln!(
        out,
        "Return ONLY a raw JSON array of integers (no text, no keys, no code fences), \
         one integer per input token, aligned exactly to the token order."
    );
    let _ = writeln!(out, "Use this exact label-to-ID mapping: {{ {mapping} }}.");
    let _ = writeln!(out, "Constraints:");
    let _ = writeln!(out, "- Output length must equal the number of input tokens.");
    let _ = writeln!(out, "- All values must be integers in [0,{max_id}].");
    let _ = writeln!(
        out,
        "- Do NOT include any words, explanations, JSON objects, or markdown; only the array like [0,1,2]."
    );

    let examples: Vec<(&str, Vec<usize>, &[&str])> = EXAMPLES
        .iter()
        .filter_map(|(sentence, tags)| {
            let ids = tags.iter().map(|t| schema.id(t)).collect::<Option<Vec<_>>>()?;
            Some((*sentence, ids, *tags))
        })
        .collect();

    if !examples.is_empty() {
        let _ = writeln!(out, "Examples:");
        for (i, (sentence, ids, tags)) in examples.iter().enumerate() {
            let ids = ids
                .iter()
                .map(usize::to_string)
                .collect::<Vec<_>>()
                .join(",");
            let gloss = if tags.iter().all(|t| *t == "O") {
                "no entities".to_string()
            } else {
                tags.join(",")
            };
            let _ = writeln!(
                out,
                "{}. Tokens: '{sentence}' -> [{ids}]   ({gloss})",
                i + 1
            );
        }
    }
    out
}

/// NER agent: a chat model plus a fixed instruction.
pub struct NerAgent {
    model: Arc<dyn ChatModel>,
    instructions: String,
    retry: RetryPolicy,
}

impl NerAgent {
    /// Create an agent for `schema`. Requests are not retried until a policy
    /// is set with [`NerAgent::with_retry`].
    pub fn new(model: Arc<dyn ChatModel>, schema: &LabelSchema) -> Self {
        Self {
            model,
            instructions: ner_instructions(schema),
            retry: RetryPolicy::none(),
        }
    }

    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// Send `prompt` and return the reply text, retrying transient failures.
    ///
    /// A reply without text comes back as an empty string; judging it is
    /// left to the response validator.
    pub async fn annotate(&self, prompt: &str) -> Result<String> {
        self.retry
            .retry("annotation", move || async move {
                let request = ChatRequest::new(vec![
                    ChatMessage::system(self.instructions.as_str()),
                    ChatMessage::user(prompt),
                ]);
                let response = self.model.complete(request).await?;
                let text = response.text().to_string();
                debug!(chars = text.len(), "received annotation");
                Ok(text)
            })
            .await
    }
}
