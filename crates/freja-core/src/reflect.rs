// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Reflection: meta-analysis of the agent's own behaviour.
//!
//! Unlike distillation (domain knowledge), reflection looks at how the
//! session went: tool failures, user corrections, repeated tool use,
//! hedged answers.  The analyzer is deliberately deterministic — plain
//! substring heuristics, no model call — so the reflection record cannot
//! be polluted by a model's opinion of itself.
use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use freja_memory::{MemoryError, MemoryStore};
use freja_model::Role;

use crate::{promote::ReflectionPromoter, session::SessionSnapshot, util::truncate_chars};

/// Markers in tool output that indicate a failed invocation.
const TOOL_ERROR_MARKERS: [&str; 4] = ["error:", "failed", "exception", "traceback"];

/// Markers in user turns that read as corrections of the agent.
/// Known to over-trigger ("not ", "wrong") — kept deterministic on purpose.
const CORRECTION_MARKERS: [&str; 6] = ["no,", "that's wrong", "i meant", "actually,", "not ", "wrong"];

/// Hedging phrases in assistant turns.
const UNCERTAINTY_MARKERS: [&str; 9] = [
    "i'm not sure",
    "i don't know",
    "might be",
    "could be",
    "possibly",
    "perhaps",
    "i think",
    "i believe",
    "uncertain",
];

/// A tool invoked at least this many times in one session counts as a
/// repetition pattern.
const REPEAT_THRESHOLD: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReflectionKind {
    Mistake,
    Uncertainty,
    Pattern,
    Improvement,
    Insight,
}

impl ReflectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReflectionKind::Mistake => "mistake",
            ReflectionKind::Uncertainty => "uncertainty",
            ReflectionKind::Pattern => "pattern",
            ReflectionKind::Improvement => "improvement",
            ReflectionKind::Insight => "insight",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "mistake" => Some(ReflectionKind::Mistake),
            "uncertainty" => Some(ReflectionKind::Uncertainty),
            "pattern" => Some(ReflectionKind::Pattern),
            "improvement" => Some(ReflectionKind::Improvement),
            "insight" => Some(ReflectionKind::Insight),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Impact {
    Low,
    Medium,
    High,
}

impl Impact {
    pub fn as_str(&self) -> &'static str {
        match self {
            Impact::Low => "low",
            Impact::Medium => "medium",
            Impact::High => "high",
        }
    }
}

/// A meta-observation candidate extracted from session analysis.
#[derive(Debug, Clone)]
pub struct ReflectionCandidate {
    pub kind: ReflectionKind,
    pub title: String,
    pub content: String,
    pub confidence: f64,
    pub source_session: String,
    pub tags: Vec<String>,

    pub tool_involved: Option<String>,
    pub error_pattern: Option<String>,
    pub frequency: Option<String>,
    pub impact: Option<Impact>,
    pub suggestion: Option<String>,
    pub session_context: Option<String>,
    pub user_correction: bool,
}

impl ReflectionCandidate {
    fn new(kind: ReflectionKind, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            content: content.into(),
            confidence: 1.0,
            source_session: String::new(),
            tags: Vec::new(),
            tool_involved: None,
            error_pattern: None,
            frequency: None,
            impact: None,
            suggestion: None,
            session_context: None,
            user_correction: false,
        }
    }

    /// Kind-specific structural validation: mistakes carry the error
    /// pattern they describe, patterns carry their frequency.
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
        match self.kind {
            ReflectionKind::Mistake if self.error_pattern.is_none() => {
                errors.push("error pattern required for mistakes".to_string());
            }
            ReflectionKind::Pattern if self.frequency.is_none() => {
                errors.push("frequency required for patterns".to_string());
            }
            _ => {}
        }
        errors
    }

    /// Aggregate the analysis metadata into the stored reflection's
    /// context block.
    fn memory_context(&self) -> Option<String> {
        let mut parts = Vec::new();
        if let Some(ctx) = &self.session_context {
            parts.push(format!("Context: {ctx}"));
        }
        if let Some(tool) = &self.tool_involved {
            parts.push(format!("Tool: {tool}"));
        }
        if let Some(pattern) = &self.error_pattern {
            parts.push(format!("Error: {pattern}"));
        }
        if let Some(freq) = &self.frequency {
            parts.push(format!("Frequency: {freq}"));
        }
        if let Some(impact) = &self.impact {
            parts.push(format!("Impact: {}", impact.as_str()));
        }
        if let Some(suggestion) = &self.suggestion {
            parts.push(format!("Suggestion: {suggestion}"));
        }
        if self.user_correction {
            parts.push("User correction: yes".to_string());
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n"))
        }
    }

    /// Commit as a reflection memory item; tags gain the kind marker.
    pub fn commit(&self, memory: &MemoryStore) -> Result<(), MemoryError> {
        let mut tags = self.tags.clone();
        tags.push(self.kind.as_str().to_string());
        tags.push("reflection".to_string());
        memory.write_reflection(&self.title, &self.content, tags, self.memory_context())?;
        info!(title = %self.title, "memory commit: reflection");
        Ok(())
    }
}

/// Deterministic session analysis.  Scans the snapshot for reflection
/// triggers and returns the candidates in a stable order: tool errors,
/// user corrections, repeated tools, uncertainty, then the meta-synthesis
/// when at least two mistakes were found.
pub fn analyze_session(snapshot: &SessionSnapshot) -> Vec<ReflectionCandidate> {
    let mut reflections = Vec::new();

    // Tool errors
    for msg in &snapshot.messages {
        if msg.role != Role::Tool {
            continue;
        }
        let content_lower = msg.content.to_lowercase();
        if TOOL_ERROR_MARKERS.iter().any(|m| content_lower.contains(m)) {
            let tool = msg.name.as_deref().unwrap_or("unknown");
            let mut r = ReflectionCandidate::new(
                ReflectionKind::Mistake,
                format!("Tool failure: {tool}"),
                format!("Tool {tool} failed with: {}", truncate_chars(&msg.content, 200)),
            );
            r.tool_involved = Some(tool.to_string());
            r.error_pattern = Some(truncate_chars(&msg.content, 100));
            r.impact = Some(if content_lower.contains("error") {
                Impact::High
            } else {
                Impact::Medium
            });
            r.session_context = Some(format!("Tool call: {tool}"));
            reflections.push(r);
        }
    }

    // User corrections
    for msg in &snapshot.messages {
        if msg.role != Role::User {
            continue;
        }
        let content_lower = msg.content.to_lowercase();
        if CORRECTION_MARKERS.iter().any(|m| content_lower.contains(m)) {
            let mut r = ReflectionCandidate::new(
                ReflectionKind::Mistake,
                "User correction required",
                format!("User corrected agent: {}", truncate_chars(&msg.content, 200)),
            );
            r.user_correction = true;
            r.error_pattern = Some(truncate_chars(&msg.content, 100));
            r.session_context = Some("User correction".to_string());
            r.suggestion = Some("Review context before responding".to_string());
            reflections.push(r);
        }
    }

    // Repeated tool calls
    let mut tool_counts: HashMap<String, usize> = HashMap::new();
    for msg in &snapshot.messages {
        if msg.role == Role::Tool {
            let tool = msg.name.as_deref().unwrap_or("unknown").to_string();
            *tool_counts.entry(tool).or_insert(0) += 1;
        }
    }
    let mut repeated: Vec<(String, usize)> = tool_counts
        .into_iter()
        .filter(|(_, count)| *count >= REPEAT_THRESHOLD)
        .collect();
    repeated.sort();
    for (tool, count) in repeated {
        let mut r = ReflectionCandidate::new(
            ReflectionKind::Pattern,
            format!("Repeated tool usage: {tool}"),
            format!("Tool {tool} called {count} times in session"),
        );
        r.tool_involved = Some(tool);
        r.frequency = Some(format!("{count} times in one session"));
        r.impact = Some(Impact::Medium);
        r.suggestion = Some("Consider caching or batching requests".to_string());
        reflections.push(r);
    }

    // Uncertainty markers
    for msg in &snapshot.messages {
        if msg.role != Role::Assistant {
            continue;
        }
        let content_lower = msg.content.to_lowercase();
        if UNCERTAINTY_MARKERS.iter().any(|m| content_lower.contains(m)) {
            let mut r = ReflectionCandidate::new(
                ReflectionKind::Uncertainty,
                "Uncertainty in response",
                format!(
                    "Agent expressed uncertainty: {}",
                    truncate_chars(&msg.content, 200)
                ),
            );
            r.session_context = Some("Assistant uncertainty".to_string());
            r.suggestion = Some("Consider adding knowledge or clarifying questions".to_string());
            reflections.push(r);
        }
    }

    // Meta-synthesis: several mistakes in one session warrant a broader
    // improvement note.
    let mistakes = reflections
        .iter()
        .filter(|r| r.kind == ReflectionKind::Mistake)
        .count();
    if mistakes >= 2 {
        let mut r = ReflectionCandidate::new(
            ReflectionKind::Improvement,
            "Multiple failures detected",
            format!("Session had {mistakes} mistakes - review error handling"),
        );
        r.impact = Some(Impact::High);
        r.suggestion = Some("Improve error recovery or add validation".to_string());
        reflections.push(r);
    }

    reflections
}

/// Background body for one ended session: analyze, commit the valid
/// reflections, then optionally hand them to the bootstrap promoter.
pub(crate) async fn reflect_on_session(
    memory: Arc<MemoryStore>,
    promoter: Arc<ReflectionPromoter>,
    auto_promote: bool,
    snapshot: SessionSnapshot,
) -> anyhow::Result<()> {
    if snapshot.messages.is_empty() {
        return Ok(());
    }

    let mut reflections = analyze_session(&snapshot);
    if reflections.is_empty() {
        debug!(session = %snapshot.key, "no reflections generated");
        return Ok(());
    }

    let mut committed = 0usize;
    for reflection in &mut reflections {
        reflection.source_session = snapshot.key.clone();
        let errors = reflection.validate();
        if !errors.is_empty() {
            warn!(title = %reflection.title, errors = ?errors, "reflection validation failed");
            continue;
        }
        match reflection.commit(&memory) {
            Ok(()) => committed += 1,
            Err(e) => warn!(title = %reflection.title, error = %e, "failed to commit reflection"),
        }
    }

    if committed > 0 {
        info!(session = %snapshot.key, committed, "reflection complete");
        if auto_promote {
            promoter.promote(&reflections, &snapshot.key).await;
        }
    }
    Ok(())
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
