//! Environment-sourced runtime settings.
//!
//! Every field can be set through its environment variable or a long flag.
//! Binaries flatten [`Settings`] into their own CLI; library callers use
//! [`Settings::from_env`]. The binaries load a `.env` file first, and its
//! values override the inherited environment.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::error::{AgentError, Result};
use crate::retry::RetryPolicy;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai/";
pub const DEFAULT_MODEL_NAME: &str = "gemini-2.0-flash";
pub const DEFAULT_OUTPUT_DIR: &str = "output";

/// Runtime configuration shared by the NER runner and the web-search agent.
#[derive(Debug, Clone, PartialEq, Parser)]
pub struct Settings {
    /// OpenAI-compatible API base URL
    #[arg(long, env = "GEMINI_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// API key for the completion service
    #[arg(long, env = "GOOGLE_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Model used for annotation
    #[arg(long, env = "NER_MODEL_NAME", default_value = DEFAULT_MODEL_NAME)]
    pub model_name: String,

    /// Endpoint that receives the run summary
    #[arg(long, env = "WEBHOOK_URL")]
    pub webhook_url: Option<String>,

    /// Upper bound for concurrent annotation requests
    #[arg(long, env = "MAX_CONCURRENCY", default_value_t = 8)]
    pub max_concurrency: usize,

    /// Retries per annotation request after the first attempt
    #[arg(long, env = "MAX_RETRIES", default_value_t = 5)]
    pub max_retries: u32,

    /// First backoff delay, in seconds
    #[arg(long, env = "INITIAL_BACKOFF_S", default_value_t = 0.5)]
    pub initial_backoff_s: f64,

    /// Backoff ceiling, in seconds
    #[arg(long, env = "MAX_BACKOFF_S", default_value_t = 10.0)]
    pub max_backoff_s: f64,

    /// Per-request timeout, in seconds
    #[arg(long, env = "REQUEST_TIMEOUT_S", default_value_t = 30.0)]
    pub request_timeout_s: f64,

    /// Directory for predictions and reports
    #[arg(long, env = "OUTPUT_DIR", default_value = DEFAULT_OUTPUT_DIR)]
    pub output_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            api_key: None,
            model_name: DEFAULT_MODEL_NAME.into(),
            webhook_url: None,
            max_concurrency: 8,
            max_retries: 5,
            initial_backoff_s: 0.5,
            max_backoff_s: 10.0,
            request_timeout_s: 30.0,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
        }
    }
}

impl Settings {
    /// Read settings from the environment, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        Self::try_parse_from(["llmner"]).map_err(|e| AgentError::InvalidConfig(e.to_string()))
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// The configured API key. Missing or blank keys are a configuration error.
    pub fn api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(AgentError::MissingApiKey("GOOGLE_API_KEY"))
    }

    /// Check every setting that can be wrong before any request is made.
    pub fn validate(&self) -> Result<()> {
        self.api_key()?;
        if self.base_url.trim().is_empty() {
            return Err(AgentError::InvalidConfig("base_url is empty".into()));
        }
        if self.max_concurrency == 0 {
            return Err(AgentError::InvalidConfig(
                "max_concurrency must be at least 1".into(),
            ));
        }
        self.request_timeout()?;
        let policy = self.retry_policy()?;
        if policy.initial_backoff > policy.max_backoff {
            return Err(AgentError::InvalidConfig(
                "initial_backoff_s exceeds max_backoff_s".into(),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Result<Duration> {
        seconds("request_timeout_s", self.request_timeout_s)
    }

    /// Retry policy for annotation requests.
    pub fn retry_policy(&self) -> Result<RetryPolicy> {
        Ok(RetryPolicy {
            max_retries: self.max_retries,
            initial_backoff: seconds("initial_backoff_s", self.initial_backoff_s)?,
            max_backoff: seconds("max_backoff_s", self.max_backoff_s)?,
        })
    }
}

fn seconds(name: &str, value: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(value).map_err(|_| {
        AgentError::InvalidConfig(format!(
            "{name} must be a non-negative number of seconds, got {value}"
        ))
    })
}
