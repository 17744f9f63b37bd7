// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use freja_config::ModelConfig;

use crate::{
    repair::parse_tool_arguments, ChatRequest, ChatResponse, ModelProvider, ToolCallRequest, Usage,
};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Driver for any OpenAI-compatible `/chat/completions` endpoint:
/// hosted OpenAI, LiteLLM, vLLM, llama.cpp server, Ollama, proxies.
///
/// Non-streaming: the cognition core consumes completed responses, and
/// every background job (journal, distillation, reflection) wants the
/// full text anyway.
pub struct OpenAiCompatProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    default_model: String,
}

impl OpenAiCompatProvider {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, default_model: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
            default_model: default_model.into(),
        }
    }

    /// Build a provider from the model section of the config file.
    /// The API key is read from the configured environment variable at
    /// construction time; a missing key is allowed for local servers.
    pub fn from_config(cfg: &ModelConfig) -> Self {
        let api_key = cfg
            .api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|k| !k.is_empty());
        let base_url = cfg.base_url.clone().unwrap_or_else(|| DEFAULT_BASE_URL.into());
        Self::new(base_url, api_key, cfg.name.clone())
    }

    fn request_body(&self, req: &ChatRequest) -> Value {
        let mut body = json!({
            "model": if req.model.is_empty() { self.default_model.as_str() } else { req.model.as_str() },
            "messages": req.messages,
            "temperature": req.temperature,
            "max_tokens": req.max_tokens,
        });
        if !req.tools.is_empty() {
            let tools: Vec<Value> = req
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
            body["tools"] = Value::Array(tools);
        }
        body
    }
}

#[async_trait]
impl ModelProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        "openai-compat"
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    async fn chat(&self, req: ChatRequest) -> anyhow::Result<ChatResponse> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.request_body(&req);
        debug!(model = %body["model"], n_messages = req.messages.len(), "chat completion request");

        let mut http = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            http = http.bearer_auth(key);
        }

        let response = http.send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            anyhow::bail!("chat completion failed ({status}): {text}");
        }

        let wire: WireResponse = serde_json::from_str(&text)
            .map_err(|e| anyhow::anyhow!("malformed completion response: {e}: {text}"))?;
        let choice = wire
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("completion response has no choices"))?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .filter_map(|tc| {
                if tc.function.name.is_empty() {
                    // An undispatchable call would corrupt the transcript
                    // sent back on the next turn; drop it here.
                    warn!(tool_call_id = %tc.id, "dropping tool call with empty name from model");
                    return None;
                }
                Some(ToolCallRequest {
                    arguments: parse_tool_arguments(&tc.function.name, &tc.function.arguments),
                    id: tc.id,
                    name: tc.function.name,
                })
            })
            .collect();

        Ok(ChatResponse {
            content: choice.message.content.unwrap_or_default(),
            tool_calls,
            finish_reason: choice.finish_reason,
            usage: wire.usage,
            reasoning_content: choice.message.reasoning_content,
        })
    }
}

// ─── Wire types ───────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(default)]
    reasoning_content: Option<String>,
}

#[derive(Deserialize)]
struct WireToolCall {
    #[serde(default)]
    id: String,
    function: WireFunction,
}

#[derive(Deserialize)]
struct WireFunction {
    #[serde(default)]
    name: String,
    #[serde(default)]
    arguments: String,
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
