//! # Model Provider
//!
//! Chat-completion types and the OpenAI-compatible HTTP backend.
//!
//! A [`ModelProvider`] hands out [`ChatModel`]s by name. The provider owns the
//! HTTP client and is passed explicitly to whatever needs a model, so tests
//! can swap in a scripted model without touching the network.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use crate::config::Settings;
use crate::error::{AgentError, Result};

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One message in a chat transcript, in OpenAI wire format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(
        default,
        deserialize_with = "null_as_empty",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::text(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::text(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text(Role::Assistant, content)
    }

    /// The result of running a tool, answering the call with `call_id`.
    pub fn tool(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(call_id.into()),
            ..Self::text(Role::Tool, content)
        }
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<ToolCall>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<ToolCall>>::deserialize(deserializer)?.unwrap_or_default())
}

/// A function call requested by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "function_kind")]
    pub kind: String,
    pub function: FunctionCall,
}

/// Function name plus its JSON-encoded arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

/// A tool the model may call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionDefinition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema of the arguments object.
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    pub fn function(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            kind: function_kind(),
            function: FunctionDefinition {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }
}

fn function_kind() -> String {
    "function".into()
}

/// Input to a single completion call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolDefinition>,
    pub temperature: Option<f32>,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// The first choice of a completion.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatResponse {
    pub message: ChatMessage,
    pub finish_reason: Option<String>,
}

impl ChatResponse {
    /// Message text; empty when the model sent none.
    pub fn text(&self) -> &str {
        self.message.content.as_deref().unwrap_or_default()
    }
}

/// A chat model that turns a transcript into the next assistant message.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Model identifier sent with each request.
    fn name(&self) -> &str;

    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse>;
}

/// Source of chat models. `None` selects the provider's default model.
pub trait ModelProvider: Send + Sync {
    fn get_model(&self, name: Option<&str>) -> Arc<dyn ChatModel>;
}

/// Provider for any service that speaks the OpenAI `/chat/completions` API
/// (Gemini's compatibility endpoint by default).
#[derive(Debug, Clone)]
pub struct OpenAiCompatProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    default_model: String,
}

impl OpenAiCompatProvider {
    /// Build a provider with its own HTTP client.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        default_model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            default_model: default_model.into(),
        })
    }

    /// Build a provider from validated settings.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(
            settings.base_url.clone(),
            settings.api_key()?,
            settings.model_name.clone(),
            settings.request_timeout()?,
        )
    }

    /// The shared HTTP client, for callers that talk to other endpoints.
    pub fn http_client(&self) -> &reqwest::Client {
        &self.client
    }
}

impl ModelProvider for OpenAiCompatProvider {
    fn get_model(&self, name: Option<&str>) -> Arc<dyn ChatModel> {
        Arc::new(OpenAiChatModel {
            client: self.client.clone(),
            endpoint: completions_endpoint(&self.base_url),
            api_key: self.api_key.clone(),
            model: name.unwrap_or(&self.default_model).to_string(),
        })
    }
}

fn completions_endpoint(base_url: &str) -> String {
    format!("{}/chat/completions", base_url.trim_end_matches('/'))
}

/// A chat model behind an OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiChatModel {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "no_tools")]
    tools: &'a [ToolDefinition],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

fn no_tools(tools: &&[ToolDefinition]) -> bool {
    tools.is_empty()
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

fn parse_completion(body: &str) -> Result<ChatResponse> {
    let parsed: CompletionResponse =
        serde_json::from_str(body).map_err(|e| AgentError::Decode(e.to_string()))?;
    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or(AgentError::EmptyCompletion)?;
    Ok(ChatResponse {
        message: choice.message,
        finish_reason: choice.finish_reason,
    })
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse> {
        let body = CompletionBody {
            model: &self.model,
            messages: &request.messages,
            tools: &request.tools,
            temperature: request.temperature,
        };

        debug!(
            model = %self.model,
            messages = request.messages.len(),
            "sending completion request"
        );
        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
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
        parse_completion(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_endpoint_joins_cleanly() {
        assert_eq!(
            completions_endpoint("https://generativelanguage.googleapis.com/v1beta/openai/"),
            "https://generativelanguage.googleapis.com/v1beta/openai/chat/completions"
        );
        assert_eq!(
            completions_endpoint("http://localhost:8080/v1"),
            "http://localhost:8080/v1/chat/completions"
        );
    }

    #[test]
    fn test_request_body_shape() {
        let messages = vec![ChatMessage::system("sys"), ChatMessage::user("hi")];
        let body = CompletionBody {
            model: "m",
            messages: &messages,
            tools: &[],
            temperature: None,
        };
        let v = serde_json::to_value(&body).unwrap();
        assert_eq!(
            v,
            json!({
                "model": "m",
                "messages": [
                    {"role": "system", "content": "sys"},
                    {"role": "user", "content": "hi"}
                ]
            })
        );
    }

    #[test]
    fn test_tool_definition_serializes() {
        let tool = ToolDefinition::function(
            "lookup",
            "Look something up.",
            json!({"type": "object", "properties": {}}),
        );
        let v = serde_json::to_value(&tool).unwrap();
        assert_eq!(v["type"], "function");
        assert_eq!(v["function"]["name"], "lookup");
    }

    #[test]
    fn test_parse_text_completion() {
        let body = r#"{"choices":[{"index":0,"message":{"role":"assistant","content":"[1,0,5,6]"},"finish_reason":"stop"}]}"#;
        let resp = parse_completion(body).unwrap();
        assert_eq!(resp.text(), "[1,0,5,6]");
        assert_eq!(resp.finish_reason.as_deref(), Some("stop"));
        assert!(resp.message.tool_calls.is_empty());
    }

    #[test]
    fn test_parse_tool_call_completion() {
        let body = json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "tavily_search", "arguments": "{\"query\":\"x\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        })
        .to_string();
        let resp = parse_completion(&body).unwrap();
        assert_eq!(resp.message.tool_calls.len(), 1);
        assert_eq!(resp.message.tool_calls[0].function.name, "tavily_search");
        assert_eq!(resp.text(), "");
    }

    #[test]
    fn test_null_tool_calls_accepted() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"ok","tool_calls":null}}]}"#;
        let resp = parse_completion(body).unwrap();
        assert!(resp.message.tool_calls.is_empty());
    }

    #[test]
    fn test_empty_and_malformed_bodies() {
        assert!(matches!(
            parse_completion(r#"{"choices":[]}"#),
            Err(AgentError::EmptyCompletion)
        ));
        assert!(matches!(
            parse_completion("<html>bad gateway</html>"),
            Err(AgentError::Decode(_))
        ));
    }

    #[test]
    fn test_provider_selects_model() {
        let provider = OpenAiCompatProvider::new(
            "http://localhost:1/v1",
            "key",
            "gemini-2.0-flash",
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(provider.get_model(None).name(), "gemini-2.0-flash");
        assert_eq!(provider.get_model(Some("other")).name(), "other");
    }

    #[test]
    fn test_tool_message() {
        let m = ChatMessage::tool("call_1", "result");
        let v = serde_json::to_value(&m).unwrap();
        assert_eq!(v["role"], "tool");
        assert_eq!(v["tool_call_id"], "call_1");
    }
}
