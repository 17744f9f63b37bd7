// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Mutex;

use async_trait::async_trait;

use crate::{ChatRequest, ChatResponse, ModelProvider, Role, ToolCallRequest};

/// Deterministic mock provider for tests.  Echoes the last user message
/// back as the assistant response.
#[derive(Default)]
pub struct MockProvider;

#[async_trait]
impl ModelProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }
    fn default_model(&self) -> &str {
        "mock-model"
    }

    async fn chat(&self, req: ChatRequest) -> anyhow::Result<ChatResponse> {
        let reply = req
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("[no input]");
        Ok(ChatResponse::text(format!("MOCK: {reply}")))
    }
}

/// A pre-scripted mock provider.  Each `chat` call pops the next response
/// from the front of the queue, letting tests specify exact sequences –
/// including tool calls – without network access.
pub struct ScriptedMockProvider {
    scripts: Mutex<Vec<ChatResponse>>,
    /// Every `ChatRequest` seen by this provider, oldest first.
    /// Recorded on each `chat()` call so tests can inspect what was sent.
    pub requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedMockProvider {
    /// Build a provider from an ordered list of responses.
    pub fn new(scripts: Vec<ChatResponse>) -> Self {
        Self {
            scripts: Mutex::new(scripts),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Convenience: provider that always returns a single text reply.
    pub fn always_text(reply: impl Into<String>) -> Self {
        Self::new(vec![ChatResponse::text(reply.into())])
    }

    /// Convenience: provider that returns a tool call followed by a text reply.
    pub fn tool_then_text(
        tool_id: impl Into<String>,
        tool_name: impl Into<String>,
        args: serde_json::Value,
        final_text: impl Into<String>,
    ) -> Self {
        Self::new(vec![
            ChatResponse {
                tool_calls: vec![ToolCallRequest {
                    id: tool_id.into(),
                    name: tool_name.into(),
                    arguments: args,
                }],
                ..Default::default()
            },
            ChatResponse::text(final_text.into()),
        ])
    }

    /// Number of `chat` calls made so far.
    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ModelProvider for ScriptedMockProvider {
    fn name(&self) -> &str {
        "scripted-mock"
    }
    fn default_model(&self) -> &str {
        "scripted-mock-model"
    }

    async fn chat(&self, req: ChatRequest) -> anyhow::Result<ChatResponse> {
        self.requests.lock().unwrap().push(req);
        let mut scripts = self.scripts.lock().unwrap();
        if scripts.is_empty() {
            // Default fallback when all scripts are consumed
            return Ok(ChatResponse::text("[no more scripts]"));
        }
        Ok(scripts.remove(0))
    }
}

/// Convenience for scripting a JSON reply (e.g. distillation output).
pub fn json_response(value: serde_json::Value) -> ChatResponse {
    ChatResponse::text(value.to_string())
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
