// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Serde default helper — returns `true`.
///
/// `#[serde(default)]` on a `bool` always falls back to `bool::default()`
/// (i.e. `false`), so fields that should be enabled unless explicitly
/// disabled need a named function.
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Workspace root holding memory/, journal/, sessions/ and the
    /// bootstrap instruction files.  Defaults to `~/.freja/workspace`.
    #[serde(default)]
    pub workspace: Option<PathBuf>,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub jobs: JobModelsConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub reflection: ReflectionConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
}

impl Config {
    /// Resolve the workspace path, expanding `~` and falling back to the
    /// default location.
    pub fn workspace_path(&self) -> PathBuf {
        if let Some(ws) = &self.workspace {
            let expanded = shellexpand::tilde(&ws.to_string_lossy()).to_string();
            return PathBuf::from(expanded);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".freja/workspace")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Provider identifier: "openai" (any OpenAI-compatible endpoint) or "mock"
    pub provider: String,
    /// Primary model name forwarded to the provider API
    pub name: String,
    /// Environment variable that holds the API key (read at runtime)
    pub api_key_env: Option<String>,
    /// Base URL override.  Useful for local servers, LiteLLM, or proxies.
    pub base_url: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: "openai".into(),
            name: "gpt-4o-mini".into(),
            api_key_env: Some("OPENAI_API_KEY".into()),
            base_url: None,
        }
    }
}

/// Per-job-class model overrides.
///
/// Every field is optional.  Unset jobs fall back to the primary model,
/// with one exception: `distillation` has **no fallback** — when unset the
/// job is skipped entirely, so sensitive extraction can never escalate to
/// an external model.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobModelsConfig {
    pub interactive_response: Option<String>,
    pub journal_synthesis: Option<String>,
    pub distillation: Option<String>,
    pub reflection: Option<String>,
    pub summarisation: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum tool-call rounds per turn before the budget-exhausted reply
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Maximum tokens requested per completion
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Sampling temperature for interactive responses
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Number of historical turns included in the LLM context
    #[serde(default = "default_memory_window")]
    pub memory_window: usize,
    /// Inactivity window after which a session is considered ended
    #[serde(default = "default_inactivity_timeout")]
    pub inactivity_timeout_seconds: u64,
    /// Publish assistant partial content as progress hints during tool loops
    #[serde(default = "default_true")]
    pub send_progress: bool,
    /// Publish compact tool-call previews during tool loops
    #[serde(default = "default_true")]
    pub send_tool_hints: bool,
}

fn default_max_iterations() -> u32 {
    40
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_temperature() -> f32 {
    0.1
}
fn default_memory_window() -> usize {
    100
}
fn default_inactivity_timeout() -> u64 {
    1800
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            memory_window: default_memory_window(),
            inactivity_timeout_seconds: default_inactivity_timeout(),
            send_progress: true,
            send_tool_hints: true,
        }
    }
}

/// Reflection promotion: how (and whether) reflections become edits to the
/// agent's own instruction files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReflectionConfig {
    /// Promote reflections to bootstrap file edits automatically.
    /// Off by default: self-modification stays opt-in.
    #[serde(default)]
    pub auto_promote: bool,
    /// Notify the user when a bootstrap file was edited
    #[serde(default = "default_true")]
    pub notify_user: bool,
    /// Let the promotion model place content within the file; falls back to
    /// append-to-section when the model call fails
    #[serde(default = "default_true")]
    pub smart_insert: bool,
    /// Instruction files the promoter is allowed to touch
    #[serde(default = "default_target_files")]
    pub target_files: Vec<String>,
    /// Line ceiling per instruction file before archiving + trimming
    #[serde(default = "default_max_file_lines")]
    pub max_file_lines: usize,
}

fn default_target_files() -> Vec<String> {
    ["AGENTS.md", "SOUL.md", "IDENTITY.md", "TOOLS.md"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_max_file_lines() -> usize {
    500
}

impl Default for ReflectionConfig {
    fn default() -> Self {
        Self {
            auto_promote: false,
            notify_user: true,
            smart_insert: true,
            target_files: default_target_files(),
            max_file_lines: default_max_file_lines(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default)]
    pub exec: ExecToolConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecToolConfig {
    /// Execution timeout for the shell tool
    #[serde(default = "default_exec_timeout")]
    pub timeout_seconds: u64,
    /// Restrict shell working directories to the workspace
    #[serde(default)]
    pub restrict_to_workspace: bool,
}

fn default_exec_timeout() -> u64 {
    60
}

impl Default for ExecToolConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_exec_timeout(),
            restrict_to_workspace: false,
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
