// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Bootstrap promotion: the self-improvement loop.
//!
//! Reflections are turned into edit proposals against the agent's own
//! instruction files (AGENTS.md, SOUL.md, IDENTITY.md, TOOLS.md), the
//! proposals are applied with an append-to-section discipline, oversized
//! files are archived and trimmed, and the user is optionally notified.
//! Every step is failure-isolated: a broken proposal or a failed write is
//! logged and never reaches memory or the main loop.
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Local;
use serde_json::Value;
use tracing::{debug, info, warn};

use freja_model::{ChatMessage, ChatRequest, ModelProvider};

use crate::{
    distill::extract_json_span,
    reflect::{ReflectionCandidate, ReflectionKind},
    util::strip_think,
};

/// Canonical section header per instruction file.
const BOOTSTRAP_SECTIONS: [(&str, &str); 4] = [
    ("AGENTS.md", "## Self-Improvements from Reflection"),
    ("SOUL.md", "## Learned Values"),
    ("IDENTITY.md", "## Adapted Identity"),
    ("TOOLS.md", "## Learned Tool Behaviors"),
];

/// The canonical section for a bootstrap file, or `None` for a file
/// outside the closed set.
pub fn canonical_section(target_file: &str) -> Option<&'static str> {
    BOOTSTRAP_SECTIONS
        .iter()
        .find(|(file, _)| *file == target_file)
        .map(|(_, section)| *section)
}

/// Receives one notification per edited instruction file.
#[async_trait]
pub trait PromotionNotifier: Send + Sync {
    async fn notify(&self, session_key: &str, message: String);
}

/// A proposed edit to one instruction file, produced by the promotion
/// model from the reflection set.
#[derive(Debug, Clone)]
pub struct BootstrapEditProposal {
    pub target_file: String,
    pub section: String,
    pub content: String,
    pub reason: String,
    pub reflection_kind: String,
    pub confidence: f64,
}

impl BootstrapEditProposal {
    pub fn from_json(v: &Value) -> anyhow::Result<Self> {
        let target_file = v
            .get("target_file")
            .and_then(|x| x.as_str())
            .ok_or_else(|| anyhow::anyhow!("edit missing 'target_file'"))?
            .to_string();
        let section = v
            .get("section")
            .and_then(|x| x.as_str())
            .map(str::to_string)
            .or_else(|| canonical_section(&target_file).map(str::to_string))
            .unwrap_or_default();
        Ok(Self {
            section,
            content: v
                .get("content")
                .and_then(|x| x.as_str())
                .unwrap_or_default()
                .to_string(),
            reason: v
                .get("reason")
                .and_then(|x| x.as_str())
                .unwrap_or_default()
                .to_string(),
            reflection_kind: v
                .get("reflection_type")
                .and_then(|x| x.as_str())
                .unwrap_or_default()
                .to_string(),
            confidence: v.get("confidence").and_then(|x| x.as_f64()).unwrap_or(1.0),
            target_file,
        })
    }

    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if canonical_section(&self.target_file).is_none() {
            errors.push(format!("invalid target file: {}", self.target_file));
        }
        if self.content.trim().is_empty() {
            errors.push("content is required".to_string());
        }
        if self.reason.is_empty() {
            errors.push("reason is required".to_string());
        }
        errors
    }
}

/// Applies reflection-driven edits to the bootstrap files.
pub struct ReflectionPromoter {
    workspace: PathBuf,
    provider: Arc<dyn ModelProvider>,
    model: String,
    target_files: Vec<String>,
    max_file_lines: usize,
    use_smart_insert: bool,
    notifier: Option<Arc<dyn PromotionNotifier>>,
}

impl ReflectionPromoter {
    pub fn new(
        workspace: PathBuf,
        provider: Arc<dyn ModelProvider>,
        model: impl Into<String>,
        target_files: Vec<String>,
        max_file_lines: usize,
        use_smart_insert: bool,
    ) -> Self {
        Self {
            workspace,
            provider,
            model: model.into(),
            target_files,
            max_file_lines,
            use_smart_insert,
            notifier: None,
        }
    }

    /// Install the notification sink; without one, edits are applied
    /// silently.
    pub fn with_notifier(mut self, notifier: Arc<dyn PromotionNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    fn file_path(&self, filename: &str) -> PathBuf {
        self.workspace.join(filename)
    }

    fn read_file(&self, filename: &str) -> String {
        std::fs::read_to_string(self.file_path(filename)).unwrap_or_default()
    }

    /// Full pipeline: propose edits, apply them, notify the user.
    /// Returns filename → applied-edit reasons.
    pub async fn promote(
        &self,
        reflections: &[ReflectionCandidate],
        session_key: &str,
    ) -> HashMap<String, Vec<String>> {
        if reflections.is_empty() {
            return HashMap::new();
        }

        let proposals = self.propose_edits(reflections).await;
        if proposals.is_empty() {
            debug!(
                count = reflections.len(),
                "no bootstrap edit proposals generated from reflections"
            );
            return HashMap::new();
        }

        let mut applied: HashMap<String, Vec<String>> = HashMap::new();
        for proposal in proposals {
            match self.apply(&proposal).await {
                Ok(()) => {
                    applied
                        .entry(proposal.target_file.clone())
                        .or_default()
                        .push(proposal.reason.clone());
                }
                Err(e) => {
                    warn!(reason = %proposal.reason, error = %e, "failed to apply bootstrap edit");
                }
            }
        }

        if let Some(notifier) = &self.notifier {
            for (filename, reasons) in &applied {
                let message = format!(
                    "Self-improvement: updated {filename}\n\nBased on recent reflections:\n{}",
                    reasons
                        .iter()
                        .map(|r| format!("- {r}"))
                        .collect::<Vec<_>>()
                        .join("\n")
                );
                notifier.notify(session_key, message).await;
            }
        }

        if !applied.is_empty() {
            info!(files = applied.len(), "bootstrap promotion complete");
        }
        applied
    }

    /// Ask the promotion model for a JSON `edits` array; filter to valid
    /// proposals targeting configured files.
    async fn propose_edits(
        &self,
        reflections: &[ReflectionCandidate],
    ) -> Vec<BootstrapEditProposal> {
        let mut listing = String::new();
        for (i, r) in reflections.iter().enumerate() {
            listing.push_str(&format!(
                "{}. [{}] {}\n   Content: {}\n   Tool: {}\n   Suggestion: {}\n",
                i + 1,
                r.kind.as_str(),
                r.title,
                r.content,
                r.tool_involved.as_deref().unwrap_or("N/A"),
                r.suggestion.as_deref().unwrap_or("N/A"),
            ));
        }

        let prompt = format!(
            "Analyze these reflections and propose bootstrap file updates.\n\n\
             Reflections:\n{listing}\n\
             For each reflection, decide:\n\
             - Which bootstrap file should be updated (AGENTS.md, SOUL.md, IDENTITY.md, TOOLS.md)\n\
             - What instruction/value/behavior should be added\n\
             - Be specific and actionable\n\n\
             Target files and their purposes:\n\
             - AGENTS.md: Agent instructions and behavior guidelines\n\
             - SOUL.md: Core values and principles\n\
             - IDENTITY.md: Agent identity and interaction style\n\
             - TOOLS.md: Tool usage notes and caveats\n\n\
             Return proposals as JSON with 'edits' array.\n\
             Each edit must have: target_file, content, reason, reflection_type.\n\
             Optional: section, confidence."
        );

        let response = match self
            .provider
            .chat(ChatRequest {
                messages: vec![ChatMessage::user(prompt)],
                model: self.model.clone(),
                temperature: 0.1,
                max_tokens: 2048,
                ..Default::default()
            })
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "bootstrap edit proposal generation failed");
                return Vec::new();
            }
        };

        let Some(content) = strip_think(&response.content) else {
            return Vec::new();
        };
        let Some(json_str) = extract_json_span(&content) else {
            warn!("bootstrap edit proposal response contained no JSON");
            return Vec::new();
        };
        let data: Value = match serde_json::from_str(json_str) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "bootstrap edit proposal response not valid JSON");
                return Vec::new();
            }
        };

        let mut proposals = Vec::new();
        for edit in data.get("edits").and_then(|e| e.as_array()).into_iter().flatten() {
            let proposal = match BootstrapEditProposal::from_json(edit) {
                Ok(p) => p,
                Err(e) => {
                    warn!(error = %e, "failed to parse bootstrap edit proposal");
                    continue;
                }
            };
            let errors = proposal.validate();
            if !errors.is_empty() {
                warn!(reason = %proposal.reason, errors = ?errors, "bootstrap edit proposal validation failed");
                continue;
            }
            if !self.target_files.contains(&proposal.target_file) {
                debug!(file = %proposal.target_file, "skipping edit for non-target file");
                continue;
            }
            proposals.push(proposal);
        }
        proposals
    }

    async fn apply(&self, proposal: &BootstrapEditProposal) -> anyhow::Result<()> {
        let updated = if self.use_smart_insert {
            self.smart_insert(proposal).await
        } else {
            append_to_section(
                &self.read_file(&proposal.target_file),
                &proposal.section,
                &proposal.content,
            )
        };

        std::fs::write(self.file_path(&proposal.target_file), updated)?;
        info!(file = %proposal.target_file, "bootstrap file updated");

        self.check_size_and_archive(&proposal.target_file)?;
        Ok(())
    }

    /// Let the model place the new content within the file.  Any failure
    /// or empty answer falls back to the deterministic append.
    async fn smart_insert(&self, proposal: &BootstrapEditProposal) -> String {
        let existing = self.read_file(&proposal.target_file);
        if existing.is_empty() {
            return format!("{}\n\n{}\n", proposal.section, proposal.content);
        }

        let prompt = format!(
            "You are updating a bootstrap file '{}'.\n\n\
             Current content:\n{}\n\n\
             New content to insert:\n{}\n\n\
             Reflection type: {}\n\n\
             Decide: Should this content:\n\
             1. Be appended to existing section '{}'\n\
             2. Create a new section '{}' at the end\n\
             3. Be inserted elsewhere (specify location)\n\n\
             Return ONLY the updated file content. No explanations.",
            proposal.target_file,
            crate::util::truncate_chars(&existing, 2000),
            proposal.content,
            proposal.reflection_kind,
            proposal.section,
            proposal.section,
        );

        match self
            .provider
            .chat(ChatRequest {
                messages: vec![ChatMessage::user(prompt)],
                model: self.model.clone(),
                temperature: 0.1,
                max_tokens: 2048,
                ..Default::default()
            })
            .await
        {
            Ok(response) if !response.content.trim().is_empty() => response.content,
            Ok(_) => {
                warn!("smart insert returned empty content; falling back to append");
                append_to_section(&existing, &proposal.section, &proposal.content)
            }
            Err(e) => {
                warn!(error = %e, "smart insert model call failed; falling back to append");
                append_to_section(&existing, &proposal.section, &proposal.content)
            }
        }
    }

    /// Archive and trim a file that grew past the line ceiling: copy to
    /// `{name}.archived.{timestamp}`, keep the last 80% of the budget.
    fn check_size_and_archive(&self, filename: &str) -> anyhow::Result<()> {
        let path = self.file_path(filename);
        let Ok(content) = std::fs::read_to_string(&path) else {
            return Ok(());
        };
        let lines: Vec<&str> = content.split('\n').collect();
        if lines.len() <= self.max_file_lines {
            return Ok(());
        }

        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let archive_path = self.workspace.join(format!("{filename}.archived.{timestamp}"));
        std::fs::copy(&path, &archive_path)?;
        info!(file = filename, archive = %archive_path.display(), "archived oversized bootstrap file");

        let keep_lines = (self.max_file_lines as f64 * 0.8) as usize;
        let recent: Vec<&str> = lines[lines.len() - keep_lines..].to_vec();
        std::fs::write(&path, recent.join("\n"))?;
        info!(file = filename, kept = keep_lines, "trimmed bootstrap file");
        Ok(())
    }
}

/// Append `content` under `section`.
///
/// When the section header exists, the content is inserted (blank lines
/// around it) immediately before the next sibling `## ` header, or at EOF
/// when the section is last.  A missing section is created at EOF after a
/// blank-line separator.
pub(crate) fn append_to_section(existing: &str, section: &str, content: &str) -> String {
    if !existing.contains(section) {
        let separator = if existing.is_empty() { "" } else { "\n\n" };
        return format!("{existing}{separator}{section}\n\n{content}\n");
    }

    let mut new_lines: Vec<String> = Vec::new();
    let mut in_section = false;
    for line in existing.split('\n') {
        if line.trim() == section {
            in_section = true;
            new_lines.push(line.to_string());
            continue;
        }
        if in_section && line.starts_with("## ") && line.trim() != section {
            new_lines.push(String::new());
            new_lines.push(content.to_string());
            new_lines.push(String::new());
            in_section = false;
        }
        new_lines.push(line.to_string());
    }
    if in_section {
        new_lines.push(String::new());
        new_lines.push(content.to_string());
        new_lines.push(String::new());
    }
    new_lines.join("\n")
}

/// Instruction files a reflection kind typically lands in; used by tests
/// and by prompt documentation.
pub fn default_targets_for(kind: ReflectionKind) -> &'static [&'static str] {
    match kind {
        ReflectionKind::Mistake => &["TOOLS.md", "AGENTS.md"],
        ReflectionKind::Uncertainty => &["IDENTITY.md", "AGENTS.md"],
        ReflectionKind::Pattern => &["AGENTS.md", "SOUL.md"],
        ReflectionKind::Improvement => &["AGENTS.md", "SOUL.md", "TOOLS.md"],
        ReflectionKind::Insight => &["SOUL.md", "IDENTITY.md"],
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
