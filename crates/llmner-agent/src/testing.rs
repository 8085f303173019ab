//! Scripted chat models for unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{AgentError, Result};
use crate::provider::{ChatMessage, ChatModel, ChatRequest, ChatResponse, Role};

/// What a scripted model does on one call.
pub enum Reply {
    Message(ChatMessage),
    Status(u16),
}

impl Reply {
    pub fn text(text: &str) -> Self {
        Reply::Message(ChatMessage::assistant(text))
    }
}

/// Plays back a fixed list of replies and records every request.
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Reply>>,
    pub requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse> {
        self.requests.lock().unwrap().push(request);
        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            Some(Reply::Message(message)) => Ok(ChatResponse {
                message,
                finish_reason: Some("stop".into()),
            }),
            Some(Reply::Status(status)) => Err(AgentError::Status {
                status,
                body: "scripted failure".into(),
            }),
            None => Err(AgentError::EmptyCompletion),
        }
    }
}

/// Tags every capitalized token as `B-PER` (id 1) and the rest as `O`,
/// reading the tokens back out of the prompt. Replies are independent of
/// call order, so it suits concurrent runs.
pub struct CapitalizedModel;

#[async_trait]
impl ChatModel for CapitalizedModel {
    fn name(&self) -> &str {
        "capitalized"
    }

    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse> {
        let prompt = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .and_then(|m| m.content.clone())
            .unwrap_or_default();
        let tokens = prompt
            .lines()
            .next()
            .and_then(|l| l.strip_prefix("Tokens: "))
            .unwrap_or_default();
        let ids: Vec<u8> = tokens
            .split(' ')
            .filter(|t| !t.is_empty())
            .map(|t| u8::from(t.starts_with(char::is_uppercase)))
            .collect();
        tokio::task::yield_now().await;
        Ok(ChatResponse {
            message: ChatMessage::assistant(serde_json::to_string(&ids)?),
            finish_reason: Some("stop".into()),
        })
    }
}
