// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
mod mock;
mod openai_compat;
mod provider;
pub mod repair;
mod types;

pub use mock::{json_response, MockProvider, ScriptedMockProvider};
pub use openai_compat::OpenAiCompatProvider;
pub use provider::ModelProvider;
pub use types::{
    ChatMessage, ChatRequest, ChatResponse, FunctionCall, Role, ToolCallRecord, ToolCallRequest,
    ToolSchema, Usage,
};
