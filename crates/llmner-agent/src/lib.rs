//! # llmner agent
//!
//! Everything that talks to a remote service: the OpenAI-compatible chat
//! model provider, the NER annotation client with retry, the batch runner,
//! run exports, the CoNLL-2003 downloader and the web-search agent.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use llmner_agent::{BatchRunner, ModelProvider, NerAgent, OpenAiCompatProvider, Settings};
//! use llmner_core::{LabelSchema, NerDataset};
//!
//! # async fn run() -> llmner_agent::Result<()> {
//! let settings = Settings::from_env()?;
//! settings.validate()?;
//! let provider = OpenAiCompatProvider::from_settings(&settings)?;
//!
//! let dataset = NerDataset::load_jsonl("conll2003_test.jsonl", LabelSchema::conll2003())?;
//! let agent = NerAgent::new(provider.get_model(None), dataset.schema())
//!     .with_retry(settings.retry_policy()?);
//! let output = BatchRunner::new(agent).run_dataset(dataset, 100).await?;
//! println!("{} rows annotated", output.summary.rows);
//! # Ok(())
//! # }
//! ```
pub mod annotate;
pub mod config;
pub mod error;
pub mod export;
pub mod fetch;
pub mod provider;
pub mod retry;
pub mod runner;
pub mod search;

#[cfg(test)]
mod testing;

// Re-export primary API
pub use annotate::{NerAgent, ner_instructions};
pub use config::Settings;
pub use error::{AgentError, Result};
pub use export::{ExportPaths, export_run, notify_webhook};
pub use fetch::fetch_conll2003_test_split;
pub use provider::{
    ChatMessage, ChatModel, ChatRequest, ChatResponse, ModelProvider, OpenAiCompatProvider,
    ToolDefinition,
};
pub use retry::RetryPolicy;
pub use runner::{BatchRunner, RowStatus, RunOutput, RunSummary};
pub use search::{SearchTool, TavilyClient, WebSearchAgent};
