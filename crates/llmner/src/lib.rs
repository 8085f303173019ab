//! # llmner
//!
//! Facade over [`llmner_core`] (schema, prompts, validation, scoring) and
//! [`llmner_agent`] (model provider, batch runner, exports, web search).
pub use llmner_agent as agent;
pub use llmner_core as core;

pub use llmner_agent::{
    AgentError, BatchRunner, NerAgent, OpenAiCompatProvider, RetryPolicy, RowStatus, RunOutput,
    RunSummary, Settings, WebSearchAgent,
};
pub use llmner_core::{
    EvalOptions, EvaluationReport, LabelSchema, NerDataset, NerError, NerRow, build_prompt,
    evaluate_ner_predictions, validate_response,
};
