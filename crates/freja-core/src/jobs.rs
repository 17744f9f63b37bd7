// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use freja_config::JobModelsConfig;

/// The role of an LLM call.  Each class routes to its own model so that
/// cheap local models can carry background cognition while the primary
/// model stays on the interactive path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobClass {
    /// User-facing, latency sensitive
    InteractiveResponse,
    /// Narrative summary, prefer a weak local model
    JournalSynthesis,
    /// Atomic extraction, local only, skip if unavailable
    Distillation,
    /// Meta-analysis promotion, local preferred
    Reflection,
    /// Content compression, flexible
    Summarisation,
}

impl JobClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobClass::InteractiveResponse => "interactive_response",
            JobClass::JournalSynthesis => "journal_synthesis",
            JobClass::Distillation => "distillation",
            JobClass::Reflection => "reflection",
            JobClass::Summarisation => "summarisation",
        }
    }
}

/// Mechanical model routing — no heuristics.
///
/// 1. Use the job-specific model when configured.
/// 2. Otherwise fall back to the primary model.
/// 3. Exception: distillation never falls back.  `None` means "skip", so
///    sensitive extraction cannot escalate to an external model.
pub struct ModelRouter {
    primary: String,
    jobs: JobModelsConfig,
}

impl ModelRouter {
    pub fn new(primary: impl Into<String>, jobs: JobModelsConfig) -> Self {
        Self {
            primary: primary.into(),
            jobs,
        }
    }

    pub fn primary(&self) -> &str {
        &self.primary
    }

    pub fn model_for(&self, job: JobClass) -> Option<String> {
        let specific = match job {
            JobClass::InteractiveResponse => &self.jobs.interactive_response,
            JobClass::JournalSynthesis => &self.jobs.journal_synthesis,
            JobClass::Distillation => &self.jobs.distillation,
            JobClass::Reflection => &self.jobs.reflection,
            JobClass::Summarisation => &self.jobs.summarisation,
        };
        match specific {
            Some(model) => Some(model.clone()),
            None if job == JobClass::Distillation => None,
            None => Some(self.primary.clone()),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
