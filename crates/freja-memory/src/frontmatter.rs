// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! On-disk format for memory items: a YAML header between `---` lines, a
//! blank line, then the markdown body.
//!
//! Timestamps use `%Y-%m-%dT%H-%M-%S` — hyphens inside the time, not
//! standard ISO 8601.  This is the durable convention existing memory
//! directories were written with and must be preserved.
use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
    error::MemoryError,
    item::{DecisionStatus, GoalStatus, ItemDetails, MemoryCategory, MemoryItem, TaskStatus},
};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%S";

/// Deterministic item identity: first 8 hex chars of
/// `SHA-256(title + ":" + content)`.
pub fn generate_id(title: &str, content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update(b":");
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())[..8].to_string()
}

/// Convert a title to a filename-safe slug: lowercase, strip everything
/// outside word characters / whitespace / hyphens, collapse runs to a
/// single `-`, truncate to 50 chars.
pub fn slugify(text: &str) -> String {
    let lowered = text.to_lowercase();
    let filtered: String = lowered
        .trim()
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-' || c.is_whitespace())
        .collect();

    let mut slug = String::with_capacity(filtered.len());
    let mut in_separator = false;
    for c in filtered.chars() {
        if c.is_whitespace() || c == '-' {
            if !in_separator {
                slug.push('-');
                in_separator = true;
            }
        } else {
            slug.push(c);
            in_separator = false;
        }
    }

    slug.chars().take(50).collect()
}

/// Collision-resistant filename:
/// `{timestamp}-{12-hex random}-{category}-{slug}.md`.
pub fn generate_filename(title: &str, category: MemoryCategory, created_at: DateTime<Utc>) -> String {
    let timestamp = created_at.format(TIMESTAMP_FORMAT);
    let random = uuid::Uuid::new_v4().simple().to_string()[..12].to_string();
    format!("{timestamp}-{random}-{category}-{}.md", slugify(title))
}

pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse the on-disk timestamp form; extra characters past the seconds
/// field are ignored.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let head = if s.len() > 19 { &s[..19] } else { s };
    NaiveDateTime::parse_from_str(head, TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// Flat header representation covering every category's keys.  Serde keeps
/// declaration order on write; unknown keys are ignored on read.
#[derive(Debug, Serialize, Deserialize)]
struct Header {
    id: String,
    title: String,
    created_at: String,
    #[serde(default)]
    updated_at: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    assignee: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    deadline: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    priority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    related_goal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    horizon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    supersedes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    rationale: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    context: Option<String>,
}

/// Serialize an item to its full file text.
pub fn serialize_item(item: &MemoryItem) -> Result<String, MemoryError> {
    let mut header = Header {
        id: item.id.clone(),
        title: item.title.clone(),
        created_at: format_timestamp(item.created_at),
        updated_at: format_timestamp(item.updated_at),
        kind: item.category().as_str().to_string(),
        tags: item.tags.clone(),
        status: None,
        assignee: None,
        deadline: None,
        priority: None,
        related_goal: None,
        horizon: None,
        supersedes: None,
        rationale: None,
        scope: None,
        confidence: None,
        source: None,
        context: None,
    };

    match &item.details {
        ItemDetails::Fact { confidence, source } => {
            header.confidence = *confidence;
            header.source = source.clone();
        }
        ItemDetails::Decision {
            status,
            supersedes,
            rationale,
            scope,
        } => {
            header.status = Some(status.as_str().to_string());
            header.supersedes = supersedes.clone();
            header.rationale = rationale.clone();
            header.scope = scope.clone();
        }
        ItemDetails::Goal {
            status,
            priority,
            horizon,
        } => {
            header.status = Some(status.as_str().to_string());
            header.priority = priority.clone();
            header.horizon = horizon.clone();
        }
        ItemDetails::Task {
            status,
            assignee,
            deadline,
            priority,
            related_goal,
        } => {
            header.status = Some(status.as_str().to_string());
            header.assignee = Some(assignee.clone());
            header.deadline = deadline.clone();
            header.priority = priority.clone();
            header.related_goal = related_goal.clone();
        }
        ItemDetails::Reflection { context } => {
            header.context = context.clone();
        }
    }

    let yaml = serde_yaml::to_string(&header)
        .map_err(|e| MemoryError::Validation(format!("header serialization failed: {e}")))?;
    Ok(format!("---\n{yaml}---\n\n{}\n", item.content))
}

/// Parse file text back into a [`MemoryItem`], validating required fields
/// per category.
pub fn parse_item(text: &str, path: &Path) -> Result<MemoryItem, MemoryError> {
    let malformed = |reason: &str| MemoryError::Malformed {
        path: path.display().to_string(),
        reason: reason.to_string(),
    };

    let rest = text.strip_prefix("---").ok_or_else(|| malformed("missing header delimiter"))?;
    let rest = rest.strip_prefix('\n').unwrap_or(rest);
    let end = rest
        .find("\n---")
        .ok_or_else(|| malformed("unterminated header"))?;
    let yaml = &rest[..end + 1];
    let body = rest[end + 4..].trim();

    let header: Header = serde_yaml::from_str(yaml)
        .map_err(|e| malformed(&format!("invalid header: {e}")))?;

    let category = MemoryCategory::parse(&header.kind)
        .ok_or_else(|| malformed(&format!("invalid memory category: {}", header.kind)))?;
    if header.id.is_empty() {
        return Err(malformed("missing required field 'id'"));
    }

    let details = match category {
        MemoryCategory::Facts => ItemDetails::Fact {
            confidence: header.confidence,
            source: header.source,
        },
        MemoryCategory::Decisions => {
            let status = header
                .status
                .as_deref()
                .ok_or_else(|| malformed("missing required field 'status' in decision memory"))?;
            let status = DecisionStatus::parse(status)
                .ok_or_else(|| malformed(&format!("invalid decision status: {status}")))?;
            ItemDetails::Decision {
                status,
                supersedes: header.supersedes,
                rationale: header.rationale,
                scope: header.scope,
            }
        }
        MemoryCategory::Goals => {
            let status = header
                .status
                .as_deref()
                .ok_or_else(|| malformed("missing required field 'status' in goal memory"))?;
            let status = GoalStatus::parse(status)
                .ok_or_else(|| malformed(&format!("invalid goal status: {status}")))?;
            ItemDetails::Goal {
                status,
                priority: header.priority,
                horizon: header.horizon,
            }
        }
        MemoryCategory::Tasks => {
            let status = header
                .status
                .as_deref()
                .ok_or_else(|| malformed("missing required field 'status' in task memory"))?;
            let status = TaskStatus::parse(status)
                .ok_or_else(|| malformed(&format!("invalid task status: {status}")))?;
            let assignee = header
                .assignee
                .filter(|a| !a.trim().is_empty())
                .ok_or_else(|| malformed("missing required field 'assignee' in task memory"))?;
            ItemDetails::Task {
                status,
                assignee,
                deadline: header.deadline,
                priority: header.priority,
                related_goal: header.related_goal,
            }
        }
        MemoryCategory::Reflections => ItemDetails::Reflection {
            context: header.context,
        },
    };

    let created_at = parse_timestamp(&header.created_at).unwrap_or_else(Utc::now);
    let updated_at = parse_timestamp(&header.updated_at).unwrap_or(created_at);

    Ok(MemoryItem {
        id: header.id,
        title: header.title,
        content: body.to_string(),
        created_at,
        updated_at,
        tags: header.tags,
        details,
        path: Some(path.to_path_buf()),
    })
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
