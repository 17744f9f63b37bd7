// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{info, warn};

use freja_bus::{MessageBus, OutboundMessage};
use freja_model::{ChatMessage, ChatRequest, ModelProvider};
use freja_tools::{Tool, ToolCall, ToolOutput};

use crate::util::truncate_chars;

/// Context-bearing tool that launches a one-shot background sub-agent.
///
/// The sub-agent runs a single tool-free completion and publishes its
/// result back to the conversation the spawn came from.  The foreground
/// turn is never blocked: the tool returns immediately with a
/// confirmation.
pub struct SpawnTool {
    provider: Arc<dyn ModelProvider>,
    bus: Arc<dyn MessageBus>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    ctx: Mutex<(String, String)>,
}

impl SpawnTool {
    pub fn new(
        provider: Arc<dyn ModelProvider>,
        bus: Arc<dyn MessageBus>,
        model: impl Into<String>,
        temperature: f32,
        max_tokens: u32,
    ) -> Self {
        Self {
            provider,
            bus,
            model: model.into(),
            temperature,
            max_tokens,
            ctx: Mutex::new((String::new(), String::new())),
        }
    }

    pub fn set_context(&self, channel: &str, chat_id: &str) {
        if let Ok(mut ctx) = self.ctx.lock() {
            *ctx = (channel.to_string(), chat_id.to_string());
        }
    }
}

#[async_trait]
impl Tool for SpawnTool {
    fn name(&self) -> &str {
        "spawn"
    }

    fn description(&self) -> &str {
        "Spawn a background sub-agent for an independent task. The sub-agent \
         works on its own and reports its result back into this conversation \
         when done. Use for research or long analysis that should not block \
         the current reply."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "task": {"type": "string", "description": "Complete task description for the sub-agent"}
            },
            "required": ["task"]
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let Some(task) = call.args.get("task").and_then(|v| v.as_str()) else {
            return ToolOutput::err(&call.id, "missing 'task' parameter");
        };
        let (channel, chat_id) = match self.ctx.lock() {
            Ok(ctx) => ctx.clone(),
            Err(_) => return ToolOutput::err(&call.id, "spawn routing context unavailable"),
        };
        if channel.is_empty() {
            return ToolOutput::err(&call.id, "no active conversation to report back to");
        }

        let provider = Arc::clone(&self.provider);
        let bus = Arc::clone(&self.bus);
        let req = ChatRequest {
            messages: vec![
                ChatMessage::system(
                    "You are a background sub-agent. Complete the given task and \
                     reply with the result only.",
                ),
                ChatMessage::user(task),
            ],
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            ..Default::default()
        };
        let task_preview = truncate_chars(task, 80);

        tokio::spawn(async move {
            match provider.chat(req).await {
                Ok(response) if !response.content.trim().is_empty() => {
                    let out = OutboundMessage::new(
                        &channel,
                        &chat_id,
                        format!("[subagent] {}", response.content.trim()),
                    );
                    if let Err(e) = bus.publish_outbound(out).await {
                        warn!(error = %e, "sub-agent result could not be published");
                    }
                }
                Ok(_) => warn!("sub-agent produced no content"),
                Err(e) => warn!(error = %e, "sub-agent model call failed"),
            }
        });

        info!(task = %task_preview, "sub-agent spawned");
        ToolOutput::ok(&call.id, format!("Sub-agent started: {task_preview}"))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use freja_bus::InMemoryBus;
    use freja_model::ScriptedMockProvider;
    use serde_json::json;

    use super::*;

    fn call(args: Value) -> ToolCall {
        ToolCall {
            id: "s1".into(),
            name: "spawn".into(),
            args,
        }
    }

    #[tokio::test]
    async fn spawn_publishes_result_to_origin_chat() {
        let bus = Arc::new(InMemoryBus::new());
        let provider = Arc::new(ScriptedMockProvider::always_text("research complete"));
        let tool = SpawnTool::new(provider, bus.clone(), "m", 0.1, 512);
        tool.set_context("cli", "c1");

        let out = tool.execute(&call(json!({"task": "look into X"}))).await;
        assert!(!out.is_error, "{}", out.content);
        assert!(out.content.contains("Sub-agent started"));

        let result = bus
            .consume_outbound(Duration::from_millis(500))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.chat_id, "c1");
        assert!(result.content.contains("[subagent] research complete"));
    }

    #[tokio::test]
    async fn missing_task_is_error() {
        let bus = Arc::new(InMemoryBus::new());
        let provider = Arc::new(ScriptedMockProvider::new(vec![]));
        let tool = SpawnTool::new(provider, bus, "m", 0.1, 512);
        tool.set_context("cli", "c1");
        let out = tool.execute(&call(json!({}))).await;
        assert!(out.is_error);
    }

    #[tokio::test]
    async fn spawn_without_context_is_error() {
        let bus = Arc::new(InMemoryBus::new());
        let provider = Arc::new(ScriptedMockProvider::new(vec![]));
        let tool = SpawnTool::new(provider, bus, "m", 0.1, 512);
        let out = tool.execute(&call(json!({"task": "x"}))).await;
        assert!(out.is_error);
    }
}
