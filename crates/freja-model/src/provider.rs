// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;

use crate::{ChatRequest, ChatResponse};

/// Contract between the cognition core and any model backend.
///
/// The core never talks HTTP itself: it hands a [`ChatRequest`] (message
/// list, tool catalog, model id, sampling parameters) to an injected
/// provider and receives a completed [`ChatResponse`] (content, parsed tool
/// calls, finish reason, usage, optional reasoning text).
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Human-readable provider name for status display.
    fn name(&self) -> &str;

    /// Model used when the caller does not specify one.
    fn default_model(&self) -> &str;

    /// Run one completion to the end and return the result.
    async fn chat(&self, req: ChatRequest) -> anyhow::Result<ChatResponse>;
}
