// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;

use freja_memory::MemoryStore;
use freja_model::ChatMessage;

/// The instruction files the agent consults about itself, in the order
/// they are layered into the system preamble.
const BOOTSTRAP_FILES: [&str; 4] = ["IDENTITY.md", "SOUL.md", "AGENTS.md", "TOOLS.md"];

/// Builds the LLM input for a turn: system preamble (bootstrap files +
/// memory context + session facts), reused history, current user turn.
pub struct ContextBuilder {
    workspace: PathBuf,
    memory: Arc<MemoryStore>,
}

impl ContextBuilder {
    pub fn new(workspace: PathBuf, memory: Arc<MemoryStore>) -> Self {
        Self { workspace, memory }
    }

    fn bootstrap_block(&self) -> String {
        let mut parts = Vec::new();
        for name in BOOTSTRAP_FILES {
            let path = self.workspace.join(name);
            if let Ok(content) = std::fs::read_to_string(&path) {
                let trimmed = content.trim();
                if !trimmed.is_empty() {
                    parts.push(trimmed.to_string());
                }
            }
        }
        parts.join("\n\n")
    }

    /// The full system message for an interactive turn.
    pub fn system_preamble(&self, channel: &str, chat_id: &str) -> String {
        let mut sections = vec![
            "You are Freja, a long-running personal agent. You help with tasks, remember \
             what matters across conversations, and use tools when they get the job done \
             faster than words."
                .to_string(),
        ];

        let bootstrap = self.bootstrap_block();
        if !bootstrap.is_empty() {
            sections.push(bootstrap);
        }

        let memory = self.memory.build_context();
        if !memory.is_empty() {
            sections.push(format!("# Memory\n\n{memory}"));
        }

        sections.push(format!(
            "# Session\n\nChannel: {channel}\nChat: {chat_id}\nCurrent time (UTC): {}",
            Utc::now().format("%Y-%m-%d %H:%M:%S")
        ));

        sections.join("\n\n---\n\n")
    }

    /// Assemble the message list: system preamble, reused history, the
    /// current user turn last.
    pub fn build_messages(
        &self,
        history: Vec<ChatMessage>,
        current: &str,
        channel: &str,
        chat_id: &str,
    ) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(self.system_preamble(channel, chat_id)));
        messages.extend(history);
        messages.push(ChatMessage::user(current));
        messages
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use freja_model::Role;

    use super::*;

    fn builder() -> (tempfile::TempDir, ContextBuilder) {
        let dir = tempfile::tempdir().unwrap();
        let memory = Arc::new(MemoryStore::new(dir.path()).unwrap());
        let builder = ContextBuilder::new(dir.path().to_path_buf(), memory);
        (dir, builder)
    }

    #[test]
    fn build_messages_orders_system_history_user() {
        let (_dir, builder) = builder();
        let history = vec![ChatMessage::user("earlier"), ChatMessage::assistant("reply")];
        let messages = builder.build_messages(history, "now", "cli", "c1");
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].content, "earlier");
        assert_eq!(messages[2].content, "reply");
        assert_eq!(messages[3].role, Role::User);
        assert_eq!(messages[3].content, "now");
    }

    #[test]
    fn preamble_includes_session_routing() {
        let (_dir, builder) = builder();
        let preamble = builder.system_preamble("mail", "thread-1");
        assert!(preamble.contains("Channel: mail"));
        assert!(preamble.contains("Chat: thread-1"));
    }

    #[test]
    fn preamble_includes_bootstrap_files_when_present() {
        let (dir, builder) = builder();
        std::fs::write(dir.path().join("IDENTITY.md"), "# Identity\n\nCalm and direct.").unwrap();
        let preamble = builder.system_preamble("cli", "c1");
        assert!(preamble.contains("Calm and direct."));
    }

    #[test]
    fn preamble_includes_memory_context() {
        let (dir, _b) = builder();
        let memory = Arc::new(MemoryStore::new(dir.path()).unwrap());
        memory
            .write_fact("Editor", "Uses Helix", vec![], None, None)
            .unwrap();
        let builder = ContextBuilder::new(dir.path().to_path_buf(), memory);
        let preamble = builder.system_preamble("cli", "c1");
        assert!(preamble.contains("# Memory"));
        assert!(preamble.contains("Uses Helix"));
    }
}
