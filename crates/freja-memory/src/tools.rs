// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Typed memory tools — one write tool per category.
//!
//! Parameter schemas encode the category rules (tasks require `assignee`,
//! decision status is a closed enum).  Failures come back as diagnostic
//! strings in the tool output, never as panics or transport errors.
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use freja_tools::{Tool, ToolCall, ToolOutput};

use crate::{DecisionStatus, GoalStatus, MemoryStore, TaskStatus};

fn str_arg(args: &Value, key: &str) -> Option<String> {
    args.get(key).and_then(|v| v.as_str()).map(str::to_string)
}

fn tags_arg(args: &Value) -> Vec<String> {
    args.get("tags")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn required(call: &ToolCall, key: &str) -> Result<String, ToolOutput> {
    str_arg(&call.args, key)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ToolOutput::err(&call.id, format!("missing '{key}' parameter")))
}

pub struct WriteFactTool {
    memory: Arc<MemoryStore>,
}

impl WriteFactTool {
    pub fn new(memory: Arc<MemoryStore>) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl Tool for WriteFactTool {
    fn name(&self) -> &str {
        "write_fact"
    }

    fn description(&self) -> &str {
        "Save a long-term fact to memory (user preferences, established truths, project context)"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "title": {"type": "string", "description": "Short descriptive title for this fact"},
                "content": {"type": "string", "description": "The fact content"},
                "tags": {"type": "array", "items": {"type": "string"}, "description": "Optional tags for categorization"},
                "confidence": {"type": "number", "description": "Confidence level (0.0-1.0)"},
                "source": {"type": "string", "description": "Source of the fact (e.g. 'user statement', 'web search')"}
            },
            "required": ["title", "content"]
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let (title, content) = match (required(call, "title"), required(call, "content")) {
            (Ok(t), Ok(c)) => (t, c),
            (Err(e), _) | (_, Err(e)) => return e,
        };
        let confidence = call.args.get("confidence").and_then(|v| v.as_f64());
        match self.memory.write_fact(
            &title,
            &content,
            tags_arg(&call.args),
            confidence,
            str_arg(&call.args, "source"),
        ) {
            Ok(item) => ToolOutput::ok(&call.id, format!("Fact saved: {}", item.title)),
            Err(e) => ToolOutput::err(&call.id, format!("Error saving fact: {e}")),
        }
    }
}

pub struct WriteDecisionTool {
    memory: Arc<MemoryStore>,
}

impl WriteDecisionTool {
    pub fn new(memory: Arc<MemoryStore>) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl Tool for WriteDecisionTool {
    fn name(&self) -> &str {
        "write_decision"
    }

    fn description(&self) -> &str {
        "Save a decision to memory (architectural choices, trade-offs, locked decisions)"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "title": {"type": "string", "description": "Short descriptive title"},
                "content": {"type": "string", "description": "Decision content"},
                "tags": {"type": "array", "items": {"type": "string"}, "description": "Optional tags"},
                "status": {"type": "string", "enum": ["active", "superseded"], "description": "Decision status"},
                "rationale": {"type": "string", "description": "Reasoning behind the decision"},
                "supersedes": {"type": "string", "description": "ID of the decision this supersedes"}
            },
            "required": ["title", "content"]
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let (title, content) = match (required(call, "title"), required(call, "content")) {
            (Ok(t), Ok(c)) => (t, c),
            (Err(e), _) | (_, Err(e)) => return e,
        };
        let status = match str_arg(&call.args, "status").as_deref() {
            None => DecisionStatus::Active,
            Some(s) => match DecisionStatus::parse(s) {
                Some(s) => s,
                None => {
                    return ToolOutput::err(&call.id, format!("invalid decision status: {s}"));
                }
            },
        };
        match self.memory.write_decision(
            &title,
            &content,
            tags_arg(&call.args),
            status,
            str_arg(&call.args, "supersedes"),
            str_arg(&call.args, "rationale"),
            str_arg(&call.args, "scope"),
        ) {
            Ok(item) => ToolOutput::ok(&call.id, format!("Decision saved: {}", item.title)),
            Err(e) => ToolOutput::err(&call.id, format!("Error saving decision: {e}")),
        }
    }
}

pub struct WriteGoalTool {
    memory: Arc<MemoryStore>,
}

impl WriteGoalTool {
    pub fn new(memory: Arc<MemoryStore>) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl Tool for WriteGoalTool {
    fn name(&self) -> &str {
        "write_goal"
    }

    fn description(&self) -> &str {
        "Save a goal to memory (objectives, outcomes the user wants to achieve)"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "title": {"type": "string", "description": "Short descriptive title"},
                "content": {"type": "string", "description": "Goal content"},
                "tags": {"type": "array", "items": {"type": "string"}, "description": "Optional tags"},
                "status": {"type": "string", "enum": ["active", "achieved", "abandoned"], "description": "Goal status"},
                "priority": {"type": "string", "enum": ["low", "medium", "high"], "description": "Goal priority"}
            },
            "required": ["title", "content"]
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let (title, content) = match (required(call, "title"), required(call, "content")) {
            (Ok(t), Ok(c)) => (t, c),
            (Err(e), _) | (_, Err(e)) => return e,
        };
        let status = match str_arg(&call.args, "status").as_deref() {
            None => GoalStatus::Active,
            Some(s) => match GoalStatus::parse(s) {
                Some(s) => s,
                None => return ToolOutput::err(&call.id, format!("invalid goal status: {s}")),
            },
        };
        match self.memory.write_goal(
            &title,
            &content,
            tags_arg(&call.args),
            status,
            str_arg(&call.args, "priority"),
            str_arg(&call.args, "horizon"),
        ) {
            Ok(item) => ToolOutput::ok(&call.id, format!("Goal saved: {}", item.title)),
            Err(e) => ToolOutput::err(&call.id, format!("Error saving goal: {e}")),
        }
    }
}

pub struct WriteTaskTool {
    memory: Arc<MemoryStore>,
}

impl WriteTaskTool {
    pub fn new(memory: Arc<MemoryStore>) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl Tool for WriteTaskTool {
    fn name(&self) -> &str {
        "write_task"
    }

    fn description(&self) -> &str {
        "Save a task to memory (action items, todos, things to do)"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "title": {"type": "string", "description": "Short descriptive title"},
                "content": {"type": "string", "description": "Task content"},
                "assignee": {"type": "string", "description": "Who is responsible for this task"},
                "tags": {"type": "array", "items": {"type": "string"}, "description": "Optional tags"},
                "status": {"type": "string", "enum": ["open", "in_progress", "done", "deferred"], "description": "Task status"},
                "deadline": {"type": "string", "description": "Task deadline (e.g. '2026-03-01', 'next week')"},
                "priority": {"type": "string", "enum": ["low", "medium", "high"], "description": "Task priority"}
            },
            "required": ["title", "content", "assignee"]
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let (title, content) = match (required(call, "title"), required(call, "content")) {
            (Ok(t), Ok(c)) => (t, c),
            (Err(e), _) | (_, Err(e)) => return e,
        };
        let assignee = match required(call, "assignee") {
            Ok(a) => a,
            Err(e) => return e,
        };
        let status = match str_arg(&call.args, "status").as_deref() {
            None => TaskStatus::Open,
            Some(s) => match TaskStatus::parse(s) {
                Some(s) => s,
                None => return ToolOutput::err(&call.id, format!("invalid task status: {s}")),
            },
        };
        match self.memory.write_task(
            &title,
            &content,
            &assignee,
            tags_arg(&call.args),
            status,
            str_arg(&call.args, "deadline"),
            str_arg(&call.args, "priority"),
            str_arg(&call.args, "related_goal"),
        ) {
            Ok(item) => ToolOutput::ok(
                &call.id,
                format!("Task saved: {} (assigned to {assignee})", item.title),
            ),
            Err(e) => ToolOutput::err(&call.id, format!("Error saving task: {e}")),
        }
    }
}

pub struct WriteReflectionTool {
    memory: Arc<MemoryStore>,
}

impl WriteReflectionTool {
    pub fn new(memory: Arc<MemoryStore>) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl Tool for WriteReflectionTool {
    fn name(&self) -> &str {
        "write_reflection"
    }

    fn description(&self) -> &str {
        "Save a reflection to memory (meta-observations, patterns, insights)"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "title": {"type": "string", "description": "Short descriptive title"},
                "content": {"type": "string", "description": "Reflection content"},
                "tags": {"type": "array", "items": {"type": "string"}, "description": "Optional tags"},
                "context": {"type": "string", "description": "Context or situation that prompted this reflection"}
            },
            "required": ["title", "content"]
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let (title, content) = match (required(call, "title"), required(call, "content")) {
            (Ok(t), Ok(c)) => (t, c),
            (Err(e), _) | (_, Err(e)) => return e,
        };
        match self.memory.write_reflection(
            &title,
            &content,
            tags_arg(&call.args),
            str_arg(&call.args, "context"),
        ) {
            Ok(item) => ToolOutput::ok(&call.id, format!("Reflection saved: {}", item.title)),
            Err(e) => ToolOutput::err(&call.id, format!("Error saving reflection: {e}")),
        }
    }
}

/// Register all five typed memory tools against one store.
pub fn register_memory_tools(registry: &mut freja_tools::ToolRegistry, memory: Arc<MemoryStore>) {
    registry.register(WriteFactTool::new(Arc::clone(&memory)));
    registry.register(WriteDecisionTool::new(Arc::clone(&memory)));
    registry.register(WriteGoalTool::new(Arc::clone(&memory)));
    registry.register(WriteTaskTool::new(Arc::clone(&memory)));
    registry.register(WriteReflectionTool::new(memory));
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::MemoryCategory;

    fn setup() -> (tempfile::TempDir, Arc<MemoryStore>) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new(dir.path()).unwrap());
        (dir, store)
    }

    fn call(args: Value) -> ToolCall {
        ToolCall {
            id: "t1".into(),
            name: "memory".into(),
            args,
        }
    }

    #[tokio::test]
    async fn write_fact_tool_persists_item() {
        let (_dir, store) = setup();
        let tool = WriteFactTool::new(Arc::clone(&store));
        let out = tool
            .execute(&call(json!({
                "title": "Prefers dark mode",
                "content": "User prefers dark mode",
                "tags": ["ui"]
            })))
            .await;
        assert!(!out.is_error, "{}", out.content);
        assert!(out.content.contains("Fact saved"));
        assert_eq!(store.read(MemoryCategory::Facts, None, None).len(), 1);
    }

    #[tokio::test]
    async fn write_fact_missing_content_is_error() {
        let (_dir, store) = setup();
        let tool = WriteFactTool::new(store);
        let out = tool.execute(&call(json!({"title": "x"}))).await;
        assert!(out.is_error);
        assert!(out.content.contains("content"));
    }

    #[tokio::test]
    async fn write_task_requires_assignee() {
        let (_dir, store) = setup();
        let tool = WriteTaskTool::new(store);
        let out = tool
            .execute(&call(json!({"title": "t", "content": "c"})))
            .await;
        assert!(out.is_error);
        assert!(out.content.contains("assignee"));
    }

    #[tokio::test]
    async fn write_task_with_assignee_succeeds() {
        let (_dir, store) = setup();
        let tool = WriteTaskTool::new(Arc::clone(&store));
        let out = tool
            .execute(&call(json!({
                "title": "Review PR",
                "content": "Review the memory PR",
                "assignee": "freja",
                "status": "in_progress"
            })))
            .await;
        assert!(!out.is_error, "{}", out.content);
        assert!(out.content.contains("assigned to freja"));
    }

    #[tokio::test]
    async fn write_decision_invalid_status_is_error() {
        let (_dir, store) = setup();
        let tool = WriteDecisionTool::new(store);
        let out = tool
            .execute(&call(json!({"title": "d", "content": "c", "status": "revoked"})))
            .await;
        assert!(out.is_error);
        assert!(out.content.contains("invalid decision status"));
    }

    #[tokio::test]
    async fn validation_errors_are_strings_not_panics() {
        let (_dir, store) = setup();
        let tool = WriteReflectionTool::new(store);
        let out = tool
            .execute(&call(json!({"title": "r", "content": "   "})))
            .await;
        assert!(out.is_error);
        assert!(out.content.contains("Error saving reflection"));
    }

    #[tokio::test]
    async fn register_memory_tools_adds_all_five() {
        let (_dir, store) = setup();
        let mut registry = freja_tools::ToolRegistry::new();
        register_memory_tools(&mut registry, store);
        let names = registry.names();
        for expected in [
            "write_decision",
            "write_fact",
            "write_goal",
            "write_reflection",
            "write_task",
        ] {
            assert!(names.contains(&expected.to_string()), "missing {expected}");
        }
    }
}
