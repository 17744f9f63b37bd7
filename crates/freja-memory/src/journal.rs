// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Daily narrative journal.
//!
//! The journal answers "what happened today?" — it exists for the user to
//! review activity and for the agent to reorient itself temporally.  It is
//! NOT memory: never authoritative, never distilled into memory, never
//! injected into prompts by default.
use std::fs;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::info;

use crate::error::MemoryError;

/// Parsed journal header.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JournalMetadata {
    pub date: String,
    pub session_keys: Vec<String>,
    pub tags: Vec<String>,
}

/// Append-only store of one markdown file per UTC calendar day under
/// `workspace/journal/`.
pub struct JournalStore {
    journal_dir: PathBuf,
}

impl JournalStore {
    pub fn new(workspace: &Path) -> Result<Self, MemoryError> {
        let journal_dir = workspace.join("journal");
        fs::create_dir_all(&journal_dir)?;
        Ok(Self { journal_dir })
    }

    fn date_path(&self, date: DateTime<Utc>) -> PathBuf {
        self.journal_dir.join(format!("{}.md", date.format("%Y-%m-%d")))
    }

    fn build_header(
        date: DateTime<Utc>,
        session_keys: &[String],
        tags: &[String],
    ) -> String {
        let mut lines = vec!["---".to_string(), format!("date: {}", date.format("%Y-%m-%d"))];
        if !session_keys.is_empty() {
            lines.push("session_keys:".into());
            for key in session_keys {
                lines.push(format!("  - {key}"));
            }
        }
        if !tags.is_empty() {
            lines.push("tags:".into());
            for tag in tags {
                lines.push(format!("  - {tag}"));
            }
        }
        lines.push("---".into());
        lines.join("\n")
    }

    /// Write a journal entry for `date` (defaults to today, UTC).
    ///
    /// The first write of a day emits the header followed by the body;
    /// later writes append the body after a blank line.  Existing content
    /// is never overwritten.
    pub fn write_entry(
        &self,
        content: &str,
        session_keys: &[String],
        tags: &[String],
        date: Option<DateTime<Utc>>,
    ) -> Result<PathBuf, MemoryError> {
        if content.trim().is_empty() {
            return Err(MemoryError::Validation("journal content cannot be empty".into()));
        }

        let date = date.unwrap_or_else(Utc::now);
        let path = self.date_path(date);
        let is_new = !path.exists();

        let full_content = if is_new {
            let header = Self::build_header(date, session_keys, tags);
            format!("{header}\n\n{}\n", content.trim())
        } else {
            format!("\n{}\n", content.trim())
        };

        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(full_content.as_bytes())?;

        info!(
            file = %path.display(),
            bytes = content.len(),
            mode = if is_new { "new file" } else { "appended" },
            "wrote journal entry"
        );
        Ok(path)
    }

    /// Full file content including the header, or `None` when no entry
    /// exists for the date.
    pub fn read_entry(&self, date: Option<DateTime<Utc>>) -> Option<String> {
        let path = self.date_path(date.unwrap_or_else(Utc::now));
        fs::read_to_string(path).ok()
    }

    /// Body content only, header stripped.
    pub fn read_entry_body(&self, date: Option<DateTime<Utc>>) -> Option<String> {
        let content = self.read_entry(date)?;
        if let Some(rest) = content.strip_prefix("---") {
            if let Some(end) = rest.find("\n---") {
                return Some(rest[end + 4..].trim().to_string());
            }
        }
        Some(content.trim().to_string())
    }

    /// Journal file paths, newest first.
    pub fn list_entries(&self, limit: Option<usize>) -> Vec<PathBuf> {
        let mut entries: Vec<PathBuf> = match fs::read_dir(&self.journal_dir) {
            Ok(dir) => dir
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.extension().is_some_and(|ext| ext == "md"))
                .collect(),
            Err(_) => Vec::new(),
        };
        entries.sort_by(|a, b| b.file_name().cmp(&a.file_name()));
        if let Some(limit) = limit {
            entries.truncate(limit);
        }
        entries
    }

    pub fn has_entry(&self, date: Option<DateTime<Utc>>) -> bool {
        self.date_path(date.unwrap_or_else(Utc::now)).exists()
    }

    /// Parse the header of a day's entry.  Returns a metadata struct with
    /// just the date when the file carries no (or a truncated) header.
    pub fn entry_metadata(&self, date: Option<DateTime<Utc>>) -> Option<JournalMetadata> {
        let date = date.unwrap_or_else(Utc::now);
        let content = self.read_entry(Some(date))?;
        let date_str = date.format("%Y-%m-%d").to_string();

        let mut metadata = JournalMetadata {
            date: date_str,
            ..Default::default()
        };

        let Some(rest) = content.strip_prefix("---") else {
            return Some(metadata);
        };
        let Some(end) = rest.find("\n---") else {
            return Some(metadata);
        };

        let mut current_list: Option<&str> = None;
        for line in rest[..end].lines() {
            let trimmed = line.trim();
            if trimmed.starts_with("session_keys:") {
                current_list = Some("session_keys");
            } else if trimmed.starts_with("tags:") {
                current_list = Some("tags");
            } else if let Some(value) = trimmed.strip_prefix("- ") {
                match current_list {
                    Some("session_keys") => metadata.session_keys.push(value.trim().to_string()),
                    Some("tags") => metadata.tags.push(value.trim().to_string()),
                    _ => {}
                }
            } else if !trimmed.is_empty() && !line.starts_with(' ') {
                current_list = None;
            }
        }

        Some(metadata)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn journal() -> (tempfile::TempDir, JournalStore) {
        let dir = tempfile::tempdir().unwrap();
        let journal = JournalStore::new(dir.path()).unwrap();
        (dir, journal)
    }

    fn day(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    #[test]
    fn first_write_emits_header_once() {
        let (_dir, journal) = journal();
        let date = day(2026, 8, 1);
        journal
            .write_entry("Morning work.", &["cli:c1".into()], &["session".into()], Some(date))
            .unwrap();
        let text = journal.read_entry(Some(date)).unwrap();
        assert!(text.starts_with("---\ndate: 2026-08-01\n"));
        assert!(text.contains("session_keys:\n  - cli:c1"));
        assert!(text.contains("tags:\n  - session"));
        assert!(text.contains("Morning work."));
    }

    #[test]
    fn second_write_appends_without_new_header() {
        let (_dir, journal) = journal();
        let date = day(2026, 8, 1);
        journal.write_entry("Morning.", &[], &[], Some(date)).unwrap();
        journal.write_entry("Evening.", &[], &[], Some(date)).unwrap();

        let text = journal.read_entry(Some(date)).unwrap();
        assert_eq!(text.matches("---").count(), 2, "header delimiters appear once");
        assert!(text.contains("Morning."));
        // Appended body arrives after a blank line.
        assert!(text.contains("Morning.\n\nEvening.\n"));
    }

    #[test]
    fn empty_content_is_rejected() {
        let (_dir, journal) = journal();
        let err = journal.write_entry("   ", &[], &[], None).unwrap_err();
        assert!(matches!(err, MemoryError::Validation(_)));
    }

    #[test]
    fn read_entry_body_strips_header() {
        let (_dir, journal) = journal();
        let date = day(2026, 8, 2);
        journal
            .write_entry("Just the narrative.", &["cli:c1".into()], &[], Some(date))
            .unwrap();
        let body = journal.read_entry_body(Some(date)).unwrap();
        assert_eq!(body, "Just the narrative.");
    }

    #[test]
    fn read_missing_entry_returns_none() {
        let (_dir, journal) = journal();
        assert!(journal.read_entry(Some(day(1999, 1, 1))).is_none());
        assert!(!journal.has_entry(Some(day(1999, 1, 1))));
    }

    #[test]
    fn entries_listed_newest_first_with_limit() {
        let (_dir, journal) = journal();
        journal.write_entry("a", &[], &[], Some(day(2026, 7, 30))).unwrap();
        journal.write_entry("b", &[], &[], Some(day(2026, 8, 1))).unwrap();
        journal.write_entry("c", &[], &[], Some(day(2026, 7, 31))).unwrap();

        let entries = journal.list_entries(None);
        let names: Vec<String> = entries
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["2026-08-01.md", "2026-07-31.md", "2026-07-30.md"]);

        assert_eq!(journal.list_entries(Some(2)).len(), 2);
    }

    #[test]
    fn metadata_parses_header_lists() {
        let (_dir, journal) = journal();
        let date = day(2026, 8, 3);
        journal
            .write_entry(
                "body",
                &["cli:c1".into(), "mail:m2".into()],
                &["session".into(), "synthesis".into()],
                Some(date),
            )
            .unwrap();
        let meta = journal.entry_metadata(Some(date)).unwrap();
        assert_eq!(meta.date, "2026-08-03");
        assert_eq!(meta.session_keys, vec!["cli:c1", "mail:m2"]);
        assert_eq!(meta.tags, vec!["session", "synthesis"]);
    }

    #[test]
    fn metadata_without_lists_is_just_the_date() {
        let (_dir, journal) = journal();
        let date = day(2026, 8, 4);
        journal.write_entry("plain", &[], &[], Some(date)).unwrap();
        let meta = journal.entry_metadata(Some(date)).unwrap();
        assert_eq!(meta.date, "2026-08-04");
        assert!(meta.session_keys.is_empty());
        assert!(meta.tags.is_empty());
    }
}
