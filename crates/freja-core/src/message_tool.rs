// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use freja_bus::{MessageBus, OutboundMessage};
use freja_tools::{Tool, ToolCall, ToolOutput};

#[derive(Default, Clone)]
struct RouteContext {
    channel: String,
    chat_id: String,
    message_id: Option<String>,
}

/// Context-bearing tool that lets the model send a message mid-turn.
///
/// The agent loop sets the routing context (channel, chat id, message id)
/// before each Phase B and resets the sent-this-turn flag; when the model
/// used this tool, the loop suppresses its own duplicate final response.
pub struct MessageTool {
    bus: Arc<dyn MessageBus>,
    ctx: Mutex<RouteContext>,
    sent_in_turn: AtomicBool,
}

impl MessageTool {
    pub fn new(bus: Arc<dyn MessageBus>) -> Self {
        Self {
            bus,
            ctx: Mutex::new(RouteContext::default()),
            sent_in_turn: AtomicBool::new(false),
        }
    }

    /// Update routing so sends land in the conversation being processed.
    pub fn set_context(&self, channel: &str, chat_id: &str, message_id: Option<String>) {
        if let Ok(mut ctx) = self.ctx.lock() {
            *ctx = RouteContext {
                channel: channel.to_string(),
                chat_id: chat_id.to_string(),
                message_id,
            };
        }
    }

    /// Reset the per-turn send tracking; called at the start of Phase B.
    pub fn start_turn(&self) {
        self.sent_in_turn.store(false, Ordering::SeqCst);
    }

    pub fn has_sent_in_turn(&self) -> bool {
        self.sent_in_turn.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Tool for MessageTool {
    fn name(&self) -> &str {
        "message"
    }

    fn description(&self) -> &str {
        "Send a message to the user immediately, before the turn finishes. \
         Use for long-running work where an early update helps."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "content": {"type": "string", "description": "The message text to send"}
            },
            "required": ["content"]
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let Some(content) = call.args.get("content").and_then(|v| v.as_str()) else {
            return ToolOutput::err(&call.id, "missing 'content' parameter");
        };
        let ctx = match self.ctx.lock() {
            Ok(ctx) => ctx.clone(),
            Err(_) => return ToolOutput::err(&call.id, "message routing context unavailable"),
        };
        if ctx.channel.is_empty() {
            return ToolOutput::err(&call.id, "no active conversation to send to");
        }

        let mut out = OutboundMessage::new(&ctx.channel, &ctx.chat_id, content);
        if let Some(message_id) = &ctx.message_id {
            out.metadata.insert("reply_to".into(), message_id.clone());
        }
        match self.bus.publish_outbound(out).await {
            Ok(()) => {
                self.sent_in_turn.store(true, Ordering::SeqCst);
                debug!(channel = %ctx.channel, chat_id = %ctx.chat_id, "message tool sent");
                ToolOutput::ok(&call.id, "Message sent.")
            }
            Err(e) => ToolOutput::err(&call.id, format!("failed to send message: {e}")),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use freja_bus::InMemoryBus;
    use serde_json::json;

    use super::*;

    fn call(args: Value) -> ToolCall {
        ToolCall {
            id: "m1".into(),
            name: "message".into(),
            args,
        }
    }

    #[tokio::test]
    async fn sends_to_current_context_and_sets_flag() {
        let bus = Arc::new(InMemoryBus::new());
        let tool = MessageTool::new(bus.clone());
        tool.set_context("cli", "c1", Some("msg-9".into()));
        tool.start_turn();
        assert!(!tool.has_sent_in_turn());

        let out = tool.execute(&call(json!({"content": "progress update"}))).await;
        assert!(!out.is_error, "{}", out.content);
        assert!(tool.has_sent_in_turn());

        let sent = bus
            .consume_outbound(Duration::from_millis(100))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sent.channel, "cli");
        assert_eq!(sent.chat_id, "c1");
        assert_eq!(sent.content, "progress update");
        assert_eq!(sent.metadata.get("reply_to").map(String::as_str), Some("msg-9"));
    }

    #[tokio::test]
    async fn start_turn_resets_flag() {
        let bus = Arc::new(InMemoryBus::new());
        let tool = MessageTool::new(bus);
        tool.set_context("cli", "c1", None);
        tool.execute(&call(json!({"content": "x"}))).await;
        assert!(tool.has_sent_in_turn());
        tool.start_turn();
        assert!(!tool.has_sent_in_turn());
    }

    #[tokio::test]
    async fn missing_content_is_error() {
        let bus = Arc::new(InMemoryBus::new());
        let tool = MessageTool::new(bus);
        tool.set_context("cli", "c1", None);
        let out = tool.execute(&call(json!({}))).await;
        assert!(out.is_error);
    }

    #[tokio::test]
    async fn without_context_is_error() {
        let bus = Arc::new(InMemoryBus::new());
        let tool = MessageTool::new(bus);
        let out = tool.execute(&call(json!({"content": "x"}))).await;
        assert!(out.is_error);
        assert!(out.content.contains("no active conversation"));
    }
}
