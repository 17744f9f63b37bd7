// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use chrono::{DateTime, Utc};

/// Valid memory categories – fixed and enforced.
///
/// The string forms are the plural on-disk names: both the category
/// directory and the `type` header key use them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryCategory {
    Facts,
    Decisions,
    Goals,
    Tasks,
    Reflections,
}

impl MemoryCategory {
    /// All categories in registry order.  Search and context building scan
    /// in this order.
    pub const ALL: [MemoryCategory; 5] = [
        MemoryCategory::Facts,
        MemoryCategory::Decisions,
        MemoryCategory::Goals,
        MemoryCategory::Tasks,
        MemoryCategory::Reflections,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryCategory::Facts => "facts",
            MemoryCategory::Decisions => "decisions",
            MemoryCategory::Goals => "goals",
            MemoryCategory::Tasks => "tasks",
            MemoryCategory::Reflections => "reflections",
        }
    }

    /// Human-readable section title for context blocks.
    pub fn title(&self) -> &'static str {
        match self {
            MemoryCategory::Facts => "Facts",
            MemoryCategory::Decisions => "Decisions",
            MemoryCategory::Goals => "Goals",
            MemoryCategory::Tasks => "Tasks",
            MemoryCategory::Reflections => "Reflections",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "facts" => Some(MemoryCategory::Facts),
            "decisions" => Some(MemoryCategory::Decisions),
            "goals" => Some(MemoryCategory::Goals),
            "tasks" => Some(MemoryCategory::Tasks),
            "reflections" => Some(MemoryCategory::Reflections),
            _ => None,
        }
    }
}

impl std::fmt::Display for MemoryCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Open,
    InProgress,
    Done,
    Deferred,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Open => "open",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Done => "done",
            TaskStatus::Deferred => "deferred",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(TaskStatus::Open),
            "in_progress" => Some(TaskStatus::InProgress),
            "done" => Some(TaskStatus::Done),
            "deferred" => Some(TaskStatus::Deferred),
            _ => None,
        }
    }

    /// Whether `self → next` is on the task state machine.
    /// `done` is terminal; `deferred` may be reopened.
    pub fn allows_transition_to(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        match self {
            Open => matches!(next, InProgress | Done | Deferred),
            InProgress => matches!(next, Done | Deferred),
            Deferred => matches!(next, Open | InProgress),
            Done => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoalStatus {
    Active,
    Achieved,
    Abandoned,
}

impl GoalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GoalStatus::Active => "active",
            GoalStatus::Achieved => "achieved",
            GoalStatus::Abandoned => "abandoned",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(GoalStatus::Active),
            "achieved" => Some(GoalStatus::Achieved),
            "abandoned" => Some(GoalStatus::Abandoned),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionStatus {
    Active,
    Superseded,
}

impl DecisionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionStatus::Active => "active",
            DecisionStatus::Superseded => "superseded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(DecisionStatus::Active),
            "superseded" => Some(DecisionStatus::Superseded),
            _ => None,
        }
    }
}

/// Category-specific attributes, one variant per category.  Commit and
/// validation sites match exhaustively; stringly-typed comparisons stop at
/// the file-format boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemDetails {
    Fact {
        confidence: Option<f64>,
        source: Option<String>,
    },
    Decision {
        status: DecisionStatus,
        supersedes: Option<String>,
        rationale: Option<String>,
        scope: Option<String>,
    },
    Goal {
        status: GoalStatus,
        priority: Option<String>,
        horizon: Option<String>,
    },
    Task {
        status: TaskStatus,
        assignee: String,
        deadline: Option<String>,
        priority: Option<String>,
        related_goal: Option<String>,
    },
    Reflection {
        context: Option<String>,
    },
}

impl ItemDetails {
    pub fn category(&self) -> MemoryCategory {
        match self {
            ItemDetails::Fact { .. } => MemoryCategory::Facts,
            ItemDetails::Decision { .. } => MemoryCategory::Decisions,
            ItemDetails::Goal { .. } => MemoryCategory::Goals,
            ItemDetails::Task { .. } => MemoryCategory::Tasks,
            ItemDetails::Reflection { .. } => MemoryCategory::Reflections,
        }
    }
}

/// A single memory item with metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryItem {
    /// First 8 hex chars of `SHA-256(title + ":" + content)`
    pub id: String,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub tags: Vec<String>,
    pub details: ItemDetails,
    /// Backing file once persisted
    pub path: Option<PathBuf>,
}

impl MemoryItem {
    pub fn category(&self) -> MemoryCategory {
        self.details.category()
    }

    /// True when the backing file sits in an `archived/` subdirectory.
    pub fn is_archived(&self) -> bool {
        self.path
            .as_ref()
            .is_some_and(|p| p.components().any(|c| c.as_os_str() == "archived"))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_strings_round_trip() {
        for cat in MemoryCategory::ALL {
            assert_eq!(MemoryCategory::parse(cat.as_str()), Some(cat));
        }
        assert_eq!(MemoryCategory::parse("notes"), None);
    }

    #[test]
    fn done_is_terminal() {
        for next in [
            TaskStatus::Open,
            TaskStatus::InProgress,
            TaskStatus::Done,
            TaskStatus::Deferred,
        ] {
            assert!(!TaskStatus::Done.allows_transition_to(next));
        }
    }

    #[test]
    fn deferred_can_reopen() {
        assert!(TaskStatus::Deferred.allows_transition_to(TaskStatus::Open));
        assert!(TaskStatus::Deferred.allows_transition_to(TaskStatus::InProgress));
        assert!(!TaskStatus::Deferred.allows_transition_to(TaskStatus::Done));
    }

    #[test]
    fn open_allows_all_forward_transitions() {
        assert!(TaskStatus::Open.allows_transition_to(TaskStatus::InProgress));
        assert!(TaskStatus::Open.allows_transition_to(TaskStatus::Done));
        assert!(TaskStatus::Open.allows_transition_to(TaskStatus::Deferred));
    }

    #[test]
    fn details_report_their_category() {
        let d = ItemDetails::Task {
            status: TaskStatus::Open,
            assignee: "me".into(),
            deadline: None,
            priority: None,
            related_goal: None,
        };
        assert_eq!(d.category(), MemoryCategory::Tasks);
    }

    #[test]
    fn archived_detection_uses_path_component() {
        let mut item = MemoryItem {
            id: "a".into(),
            title: "t".into(),
            content: "c".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            tags: vec![],
            details: ItemDetails::Reflection { context: None },
            path: Some(PathBuf::from("memory/tasks/archived/x.md")),
        };
        assert!(item.is_archived());
        item.path = Some(PathBuf::from("memory/tasks/x.md"));
        assert!(!item.is_archived());
        item.path = None;
        assert!(!item.is_archived());
    }
}
