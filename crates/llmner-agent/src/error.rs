use llmner_core::NerError;
use thiserror::Error;

/// Errors raised while talking to remote services or running a batch.
#[derive(Debug, Error)]
pub enum AgentError {
    /// No API key was configured for a remote service.
    #[error("missing API key: set {0}")]
    MissingApiKey(&'static str),

    /// A setting has a value that cannot be used.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Transport failure: connect, timeout, TLS or body read.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    /// The completion had no choices.
    #[error("model returned an empty completion")]
    EmptyCompletion,

    /// The response body did not have the expected shape.
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// The model kept requesting tools past the turn limit.
    #[error("agent did not produce a final answer within {0} turns")]
    ToolLoopExhausted(usize),

    #[error(transparent)]
    Core(#[from] NerError),

    #[error("worker task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("spreadsheet error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),
}

impl AgentError {
    /// Returns `true` if repeating the same request may succeed:
    /// transport errors, timeouts, HTTP 429 and HTTP 5xx.
    pub fn is_retryable(&self) -> bool {
        match self {
            AgentError::Http(e) => !(e.is_decode() || e.is_builder() || e.is_redirect()),
            AgentError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Result type alias for llmner-agent operations.
pub type Result<T> = std::result::Result<T, AgentError>;
