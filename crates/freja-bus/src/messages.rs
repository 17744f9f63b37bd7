// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A message arriving from a channel adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Channel name, e.g. "cli"
    pub channel: String,
    pub sender_id: String,
    pub chat_id: String,
    pub content: String,
    /// Local paths of attached media, if any
    #[serde(default)]
    pub media: Vec<String>,
    /// Channel-specific routing data (message ids, thread ids, ...)
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl InboundMessage {
    pub fn new(
        channel: impl Into<String>,
        sender_id: impl Into<String>,
        chat_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            channel: channel.into(),
            sender_id: sender_id.into(),
            chat_id: chat_id.into(),
            content: content.into(),
            media: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    /// Conversation identity: `{channel}:{chat_id}`.
    pub fn session_key(&self) -> String {
        format!("{}:{}", self.channel, self.chat_id)
    }
}

/// A message published by the core for a channel adapter to deliver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub channel: String,
    pub chat_id: String,
    pub content: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl OutboundMessage {
    pub fn new(
        channel: impl Into<String>,
        chat_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            channel: channel.into(),
            chat_id: chat_id.into(),
            content: content.into(),
            metadata: HashMap::new(),
        }
    }

    /// True for in-turn progress hints (partial content, tool previews)
    /// that channels may render differently from final responses.
    pub fn is_progress(&self) -> bool {
        self.metadata.contains_key("_progress")
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
