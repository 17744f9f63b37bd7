// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Distillation: extract atomic knowledge candidates from an ended session.
//!
//! Distillation only proposes.  Candidates are validated here and
//! committed through the typed memory writes — the store stays the single
//! authority on what is actually kept.  The job is local-only by policy:
//! when no distillation model is configured the whole step is skipped
//! rather than escalated to an external model.
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use freja_memory::{DecisionStatus, GoalStatus, MemoryError, MemoryStore, TaskStatus};
use freja_model::{ChatMessage, ChatRequest, ModelProvider, Role};

use crate::{
    session::SessionSnapshot,
    util::{strip_think, truncate_chars},
};

/// Assignee substituted for tasks the model proposed without one.
const DEFAULT_TASK_ASSIGNEE: &str = "distilled";

/// Per-message content cap and message cap for the extraction prompt.
const PROMPT_CONTENT_CHARS: usize = 500;
const PROMPT_MAX_MESSAGES: usize = 50;

/// Candidate kinds mirror the memory categories (singular names on the
/// extraction wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateKind {
    Fact,
    Decision,
    Goal,
    Task,
    Reflection,
}

impl CandidateKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "fact" => Some(CandidateKind::Fact),
            "decision" => Some(CandidateKind::Decision),
            "goal" => Some(CandidateKind::Goal),
            "task" => Some(CandidateKind::Task),
            "reflection" => Some(CandidateKind::Reflection),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateKind::Fact => "fact",
            CandidateKind::Decision => "decision",
            CandidateKind::Goal => "goal",
            CandidateKind::Task => "task",
            CandidateKind::Reflection => "reflection",
        }
    }
}

/// An extracted proposal — not authoritative until committed.
#[derive(Debug, Clone)]
pub struct AtomicCandidate {
    pub kind: CandidateKind,
    pub title: String,
    pub content: String,
    pub confidence: f64,
    pub source_session: String,
    pub tags: Vec<String>,

    pub task_status: Option<TaskStatus>,
    pub task_assignee: Option<String>,
    pub task_deadline: Option<String>,
    pub task_priority: Option<String>,

    pub goal_status: Option<GoalStatus>,
    pub goal_priority: Option<String>,
    pub goal_horizon: Option<String>,

    pub decision_status: Option<DecisionStatus>,
    pub decision_rationale: Option<String>,
    pub decision_supersedes: Option<String>,

    pub fact_source: Option<String>,
    pub reflection_context: Option<String>,
}

fn opt_str(v: &Value, key: &str) -> Option<String> {
    v.get(key).and_then(|x| x.as_str()).map(str::to_string)
}

impl AtomicCandidate {
    /// Parse one candidate object from the model's JSON.  Unknown or
    /// invalid enum values are an error — a candidate with a status the
    /// store would reject is not worth carrying forward.
    pub fn from_json(v: &Value) -> anyhow::Result<Self> {
        let kind_str = v
            .get("type")
            .and_then(|x| x.as_str())
            .ok_or_else(|| anyhow::anyhow!("candidate missing 'type'"))?;
        let kind = CandidateKind::parse(kind_str)
            .ok_or_else(|| anyhow::anyhow!("unknown candidate type: {kind_str}"))?;

        let task_status = match opt_str(v, "task_status") {
            Some(s) => Some(
                TaskStatus::parse(&s).ok_or_else(|| anyhow::anyhow!("invalid task_status: {s}"))?,
            ),
            None => None,
        };
        let goal_status = match opt_str(v, "goal_status") {
            Some(s) => Some(
                GoalStatus::parse(&s).ok_or_else(|| anyhow::anyhow!("invalid goal_status: {s}"))?,
            ),
            None => None,
        };
        let decision_status = match opt_str(v, "decision_status") {
            Some(s) => Some(
                DecisionStatus::parse(&s)
                    .ok_or_else(|| anyhow::anyhow!("invalid decision_status: {s}"))?,
            ),
            None => None,
        };

        Ok(Self {
            kind,
            title: opt_str(v, "title").unwrap_or_default(),
            content: opt_str(v, "content").unwrap_or_default(),
            confidence: v.get("confidence").and_then(|x| x.as_f64()).unwrap_or(1.0),
            source_session: String::new(),
            tags: v
                .get("tags")
                .and_then(|x| x.as_array())
                .map(|arr| {
                    arr.iter()
                        .filter_map(|t| t.as_str())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            task_status,
            task_assignee: opt_str(v, "task_assignee"),
            task_deadline: opt_str(v, "task_deadline"),
            task_priority: opt_str(v, "task_priority"),
            goal_status,
            goal_priority: opt_str(v, "goal_priority"),
            goal_horizon: opt_str(v, "goal_horizon"),
            decision_status,
            decision_rationale: opt_str(v, "decision_rationale"),
            decision_supersedes: opt_str(v, "decision_supersedes"),
            fact_source: opt_str(v, "fact_source"),
            reflection_context: opt_str(v, "reflection_context"),
        })
    }

    /// Structural validation.  Returns the list of problems; empty means
    /// the candidate may be committed.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.title.trim().is_empty() {
            errors.push("title is required".to_string());
        }
        if self.content.trim().is_empty() {
            errors.push("content is required".to_string());
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            errors.push("confidence must be between 0.0 and 1.0".to_string());
        }
        if self.kind == CandidateKind::Decision
            && self.decision_supersedes.is_some()
            && self.decision_rationale.is_none()
        {
            errors.push("rationale required when superseding another decision".to_string());
        }
        errors
    }

    /// Commit through the typed memory write matching the kind.  Tasks
    /// without an assignee get [`DEFAULT_TASK_ASSIGNEE`].
    pub fn commit(&self, memory: &MemoryStore) -> Result<(), MemoryError> {
        match self.kind {
            CandidateKind::Fact => {
                memory.write_fact(
                    &self.title,
                    &self.content,
                    self.tags.clone(),
                    Some(self.confidence),
                    self.fact_source.clone(),
                )?;
            }
            CandidateKind::Decision => {
                memory.write_decision(
                    &self.title,
                    &self.content,
                    self.tags.clone(),
                    self.decision_status.unwrap_or(DecisionStatus::Active),
                    self.decision_supersedes.clone(),
                    self.decision_rationale.clone(),
                    None,
                )?;
            }
            CandidateKind::Goal => {
                memory.write_goal(
                    &self.title,
                    &self.content,
                    self.tags.clone(),
                    self.goal_status.unwrap_or(GoalStatus::Active),
                    self.goal_priority.clone(),
                    self.goal_horizon.clone(),
                )?;
            }
            CandidateKind::Task => {
                let assignee = self
                    .task_assignee
                    .clone()
                    .filter(|a| !a.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_TASK_ASSIGNEE.to_string());
                memory.write_task(
                    &self.title,
                    &self.content,
                    &assignee,
                    self.tags.clone(),
                    self.task_status.unwrap_or(TaskStatus::Open),
                    self.task_deadline.clone(),
                    self.task_priority.clone(),
                    None,
                )?;
            }
            CandidateKind::Reflection => {
                memory.write_reflection(
                    &self.title,
                    &self.content,
                    self.tags.clone(),
                    self.reflection_context.clone(),
                )?;
            }
        }
        info!(kind = self.kind.as_str(), title = %self.title, "memory commit");
        Ok(())
    }
}

/// Build the extraction prompt from the user + assistant turns of the
/// snapshot, each truncated, capped at the first messages.
pub(crate) fn build_distillation_prompt(snapshot: &SessionSnapshot) -> String {
    let mut prompt = String::from(
        "Extract atomic knowledge candidates from this agent session.\n\n\
         Look for:\n\
         - FACTS: User preferences, project context, established truths\n\
         - DECISIONS: Architectural choices, trade-offs, locked decisions\n\
         - GOALS: Objectives, outcomes the user wants to achieve\n\
         - TASKS: Action items, todos, things to do\n\
         - REFLECTIONS: Insights, patterns, observations about the work\n\n\
         Session content:\n",
    );

    for msg in snapshot.messages.iter().take(PROMPT_MAX_MESSAGES) {
        let content = truncate_chars(&msg.content, PROMPT_CONTENT_CHARS);
        match msg.role {
            Role::User => {
                prompt.push_str("User: ");
                prompt.push_str(&content);
                prompt.push('\n');
            }
            Role::Assistant => {
                prompt.push_str("Assistant: ");
                prompt.push_str(&content);
                prompt.push('\n');
            }
            _ => {}
        }
    }

    prompt.push_str(
        "\n\nReturn candidates as a JSON object with 'candidates' array.\n\
         Each candidate must have: type, title, content.\n\
         Optional: confidence (0-1), tags, and type-specific fields\n\
         (task_status, task_assignee, task_deadline, task_priority,\n\
         goal_status, goal_priority, goal_horizon, decision_status,\n\
         decision_rationale, decision_supersedes, fact_source,\n\
         reflection_context).\n\
         Be conservative - only extract clear, atomic knowledge.",
    );
    prompt
}

/// Slice the outermost `{…}` span out of a response that may wrap the
/// JSON in prose or a code fence.
pub(crate) fn extract_json_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

/// Run the full extraction for one ended session: prompt, model call at
/// low temperature, tolerant JSON parse, per-candidate validation and
/// commit.  Produces no output and raises no error on model failure.
pub(crate) async fn distill_session(
    provider: Arc<dyn ModelProvider>,
    model: String,
    memory: Arc<MemoryStore>,
    snapshot: SessionSnapshot,
) -> anyhow::Result<()> {
    if snapshot.messages.is_empty() {
        return Ok(());
    }

    let prompt = build_distillation_prompt(&snapshot);
    let response = match provider
        .chat(ChatRequest {
            messages: vec![ChatMessage::user(prompt)],
            model,
            temperature: 0.1,
            max_tokens: 2048,
            ..Default::default()
        })
        .await
    {
        Ok(r) => r,
        Err(e) => {
            warn!(session = %snapshot.key, error = %e, "distillation model call failed");
            return Ok(());
        }
    };

    let Some(content) = strip_think(&response.content) else {
        return Ok(());
    };
    let Some(json_str) = extract_json_span(&content) else {
        warn!(session = %snapshot.key, "distillation response contained no JSON object");
        return Ok(());
    };
    let data: Value = match serde_json::from_str(json_str) {
        Ok(v) => v,
        Err(e) => {
            warn!(session = %snapshot.key, error = %e, "distillation response not valid JSON");
            return Ok(());
        }
    };

    let candidates = data
        .get("candidates")
        .and_then(|c| c.as_array())
        .cloned()
        .unwrap_or_default();

    let mut committed = 0usize;
    for candidate_json in &candidates {
        let mut candidate = match AtomicCandidate::from_json(candidate_json) {
            Ok(c) => c,
            Err(e) => {
                warn!(session = %snapshot.key, error = %e, "failed to parse candidate");
                continue;
            }
        };
        candidate.source_session = snapshot.key.clone();

        let errors = candidate.validate();
        if !errors.is_empty() {
            warn!(
                title = %candidate.title,
                errors = ?errors,
                "candidate validation failed"
            );
            continue;
        }

        match candidate.commit(&memory) {
            Ok(()) => committed += 1,
            Err(e) => warn!(title = %candidate.title, error = %e, "failed to commit candidate"),
        }
    }

    if committed > 0 {
        info!(session = %snapshot.key, committed, "distillation complete");
    } else {
        debug!(session = %snapshot.key, "no valid candidates distilled");
    }
    Ok(())
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
