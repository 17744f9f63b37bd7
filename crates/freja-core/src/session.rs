// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use freja_model::{ChatMessage, Role};

/// One saved turn in the conversation log: the wire-shaped message plus
/// the time it was recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRecord {
    #[serde(flatten)]
    pub message: ChatMessage,
    pub timestamp: DateTime<Utc>,
}

impl TurnRecord {
    pub fn new(message: ChatMessage) -> Self {
        Self {
            message,
            timestamp: Utc::now(),
        }
    }
}

/// A conversation, keyed by `{channel}:{chat_id}`.
///
/// Mutated only by the agent loop's deterministic save phase; `/new`
/// clears the messages in place while preserving the key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub key: String,
    pub messages: Vec<TurnRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(key: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            key: key.into(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Clear all messages while keeping the key identity.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.updated_at = Utc::now();
    }

    /// The last `max_messages` turns in chronological order.
    ///
    /// Leading tool-role records are skipped: cutting the window can
    /// separate a tool result from the assistant turn that requested it,
    /// and an orphaned tool message is rejected by provider APIs.
    pub fn get_history(&self, max_messages: usize) -> Vec<ChatMessage> {
        let start = self.messages.len().saturating_sub(max_messages);
        let mut slice = &self.messages[start..];
        while let Some(first) = slice.first() {
            if first.message.role == Role::Tool {
                slice = &slice[1..];
            } else {
                break;
            }
        }
        slice.iter().map(|t| t.message.clone()).collect()
    }

    /// Immutable copy for background cognition.  Never aliases the live
    /// message list: the session may be cleared or appended to while
    /// background tasks are still reading the snapshot.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            key: self.key.clone(),
            messages: self.messages.iter().map(|t| t.message.clone()).collect(),
        }
    }
}

/// Immutable view of a session at a point in time.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub key: String,
    pub messages: Vec<ChatMessage>,
}

/// Disk-backed session store: one JSON document per session under
/// `workspace/sessions/`, with an in-memory cache in front.
pub struct SessionStore {
    sessions_dir: PathBuf,
    cache: HashMap<String, Session>,
}

impl SessionStore {
    pub fn new(workspace: &Path) -> anyhow::Result<Self> {
        let sessions_dir = workspace.join("sessions");
        fs::create_dir_all(&sessions_dir)?;
        Ok(Self {
            sessions_dir,
            cache: HashMap::new(),
        })
    }

    fn session_path(&self, key: &str) -> PathBuf {
        self.sessions_dir.join(format!("{key}.json"))
    }

    /// Fetch a session from cache or disk, creating it on first use.
    pub fn get_or_create(&mut self, key: &str) -> Session {
        if let Some(session) = self.cache.get(key) {
            return session.clone();
        }
        let path = self.session_path(key);
        let session = match fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str::<Session>(&text) {
                Ok(session) => session,
                Err(e) => {
                    warn!(key, error = %e, "corrupt session file; starting fresh");
                    Session::new(key)
                }
            },
            Err(_) => Session::new(key),
        };
        self.cache.insert(key.to_string(), session.clone());
        session
    }

    /// Persist the session and refresh the cache.
    pub fn save(&mut self, session: &Session) -> anyhow::Result<()> {
        let path = self.session_path(&session.key);
        let json = serde_json::to_string_pretty(session)?;
        fs::write(path, json)?;
        self.cache.insert(session.key.clone(), session.clone());
        Ok(())
    }

    /// Drop a session from the cache; the next `get_or_create` reloads it
    /// from disk.
    pub fn invalidate(&mut self, key: &str) {
        self.cache.remove(key);
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, SessionStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn get_or_create_returns_empty_session_for_new_key() {
        let (_dir, mut store) = store();
        let session = store.get_or_create("cli:c1");
        assert_eq!(session.key, "cli:c1");
        assert!(session.messages.is_empty());
    }

    #[test]
    fn save_and_reload_round_trips() {
        let (_dir, mut store) = store();
        let mut session = store.get_or_create("cli:c1");
        session.messages.push(TurnRecord::new(ChatMessage::user("hello")));
        session.messages.push(TurnRecord::new(ChatMessage::assistant("hi")));
        store.save(&session).unwrap();
        store.invalidate("cli:c1");

        let reloaded = store.get_or_create("cli:c1");
        assert_eq!(reloaded.messages.len(), 2);
        assert_eq!(reloaded.messages[0].message.content, "hello");
        assert_eq!(reloaded.messages[1].message.role, Role::Assistant);
    }

    #[test]
    fn tool_turn_round_trips_with_call_id_and_name() {
        let (_dir, mut store) = store();
        let mut session = store.get_or_create("cli:c1");
        session
            .messages
            .push(TurnRecord::new(ChatMessage::tool_result("t1", "exec", "out")));
        store.save(&session).unwrap();
        store.invalidate("cli:c1");

        let reloaded = store.get_or_create("cli:c1");
        let m = &reloaded.messages[0].message;
        assert_eq!(m.tool_call_id.as_deref(), Some("t1"));
        assert_eq!(m.name.as_deref(), Some("exec"));
    }

    #[test]
    fn clear_preserves_key() {
        let mut session = Session::new("cli:c1");
        session.messages.push(TurnRecord::new(ChatMessage::user("x")));
        session.clear();
        assert_eq!(session.key, "cli:c1");
        assert!(session.messages.is_empty());
    }

    #[test]
    fn history_window_returns_chronological_tail() {
        let mut session = Session::new("cli:c1");
        for i in 0..10 {
            session
                .messages
                .push(TurnRecord::new(ChatMessage::user(format!("m{i}"))));
        }
        let history = session.get_history(3);
        let contents: Vec<&str> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m7", "m8", "m9"]);
    }

    #[test]
    fn history_skips_leading_orphaned_tool_turns() {
        let mut session = Session::new("cli:c1");
        session.messages.push(TurnRecord::new(ChatMessage::user("q")));
        session.messages.push(TurnRecord::new(
            ChatMessage::assistant_with_tool_calls(
                "",
                vec![freja_model::ToolCallRecord::function(
                    "t1",
                    "exec",
                    &serde_json::json!({}),
                )],
            ),
        ));
        session
            .messages
            .push(TurnRecord::new(ChatMessage::tool_result("t1", "exec", "out")));
        session.messages.push(TurnRecord::new(ChatMessage::assistant("done")));

        // Window of 2 starts at the tool record; it must be skipped.
        let history = session.get_history(2);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "done");
    }

    #[test]
    fn snapshot_is_not_aliased_to_live_session() {
        let mut session = Session::new("cli:c1");
        for i in 0..6 {
            session
                .messages
                .push(TurnRecord::new(ChatMessage::user(format!("m{i}"))));
        }
        let snapshot = session.snapshot();
        session.clear();
        assert_eq!(snapshot.messages.len(), 6, "snapshot must survive the clear");
        assert!(session.messages.is_empty());
    }

    #[test]
    fn corrupt_session_file_starts_fresh() {
        let (dir, mut store) = store();
        fs::write(dir.path().join("sessions/cli:bad.json"), "{not json").unwrap();
        let session = store.get_or_create("cli:bad");
        assert!(session.messages.is_empty());
    }
}
