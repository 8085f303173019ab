//! # Web Search Agent
//!
//! A chat model with a single `tavily_search` tool. The agent loop executes
//! every tool call the model makes, feeds the results back, and stops at the
//! first assistant message that does not ask for a tool.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::error::{AgentError, Result};
use crate::provider::{ChatMessage, ChatModel, ChatRequest, ToolCall, ToolDefinition};

pub const DEFAULT_TAVILY_URL: &str = "https://api.tavily.com";
pub const TAVILY_TOOL_NAME: &str = "tavily_search";
pub const WEB_SEARCH_INSTRUCTIONS: &str =
    "You are a helpful assistant. Use the Tavily tool to answer web queries.";
pub const DEFAULT_QUERY: &str = "Find the latest news about generative AI funding rounds";

/// One search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub score: Option<f64>,
}

/// A search response as returned by Tavily.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(default)]
    pub results: Vec<SearchResult>,
}

/// Anything that can run a web search.
#[async_trait]
pub trait SearchTool: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> Result<SearchResponse>;
}

/// Client for the Tavily search API.
#[derive(Debug, Clone)]
pub struct TavilyClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Serialize)]
struct SearchBody<'a> {
    query: &'a str,
    max_results: usize,
}

impl TavilyClient {
    pub fn new(client: reqwest::Client, api_key: impl Into<String>) -> Self {
        Self {
            client,
            base_url: DEFAULT_TAVILY_URL.into(),
            api_key: api_key.into(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl SearchTool for TavilyClient {
    async fn search(&self, query: &str, max_results: usize) -> Result<SearchResponse> {
        let url = format!("{}/search", self.base_url.trim_end_matches('/'));
        debug!(query, max_results, "tavily search");
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&SearchBody { query, max_results })
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(AgentError::Status {
                status: status.as_u16(),
                body: text,
            });
        }
        serde_json::from_str(&text).map_err(|e| AgentError::Decode(e.to_string()))
    }
}

#[derive(Deserialize)]
struct SearchArgs {
    query: String,
}

/// The tool definition advertised to the model.
pub fn tavily_tool() -> ToolDefinition {
    ToolDefinition::function(
        TAVILY_TOOL_NAME,
        "Perform a web search using Tavily and return the best 3 results.",
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "The search query."}
            },
            "required": ["query"]
        }),
    )
}

/// Answers free-text queries, searching the web when the model asks to.
pub struct WebSearchAgent {
    model: Arc<dyn ChatModel>,
    search: Arc<dyn SearchTool>,
    max_turns: usize,
    max_results: usize,
}

impl WebSearchAgent {
    pub fn new(model: Arc<dyn ChatModel>, search: Arc<dyn SearchTool>) -> Self {
        Self {
            model,
            search,
            max_turns: 5,
            max_results: 3,
        }
    }

    /// Maximum number of model calls per query.
    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    /// Run the agent loop and return the final answer.
    pub async fn run(&self, query: &str) -> Result<String> {
        let mut messages = vec![
            ChatMessage::system(WEB_SEARCH_INSTRUCTIONS),
            ChatMessage::user(query),
        ];
        let tools = vec![tavily_tool()];

        for turn in 0..self.max_turns {
            let request = ChatRequest::new(messages.clone()).with_tools(tools.clone());
            let response = self.model.complete(request).await?;

            if response.message.tool_calls.is_empty() {
                info!(turns = turn + 1, "agent finished");
                return Ok(response.text().to_string());
            }

            let calls = response.message.tool_calls.clone();
            messages.push(response.message);
            for call in &calls {
                let output = self.execute(call).await;
                messages.push(ChatMessage::tool(&call.id, output));
            }
        }

        Err(AgentError::ToolLoopExhausted(self.max_turns))
    }

    /// Run one tool call. Failures are reported back to the model as text.
    async fn execute(&self, call: &ToolCall) -> String {
        if call.function.name != TAVILY_TOOL_NAME {
            warn!(tool = %call.function.name, "model called an unknown tool");
            return format!("error: unknown tool {:?}", call.function.name);
        }

        let args: SearchArgs = match serde_json::from_str(&call.function.arguments) {
            Ok(args) => args,
            Err(e) => {
                warn!(error = %e, "bad tool arguments");
                return format!("error: invalid arguments: {e}");
            }
        };

        info!(query = %args.query, "searching the web");
        match self.search.search(&args.query, self.max_results).await {
            Ok(results) => serde_json::to_string(&results)
                .unwrap_or_else(|e| format!("error: could not encode results: {e}")),
            Err(e) => {
                warn!(error = %e, "search failed");
                format!("error: search failed: {e}")
            }
        }
    }
}
