// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Timelike, Utc};
use tracing::{debug, info, warn};

use crate::{
    error::MemoryError,
    frontmatter::{generate_filename, generate_id, parse_item, serialize_item},
    item::{DecisionStatus, GoalStatus, ItemDetails, MemoryCategory, MemoryItem, TaskStatus},
};

/// Category-typed memory store with atomic file-backed storage.
///
/// Each item lives in exactly one markdown file under
/// `workspace/memory/{category}/`.  Write operations are typed per
/// category and enforce the lifecycle rules; reads never mutate.
pub struct MemoryStore {
    memory_dir: PathBuf,
}

/// Field changes accepted by [`MemoryStore::update`].  Unset fields are
/// left untouched.  `status` is interpreted per category.
#[derive(Debug, Default, Clone)]
pub struct ItemUpdate {
    pub title: Option<String>,
    pub content: Option<String>,
    pub tags: Option<Vec<String>>,
    pub status: Option<String>,
}

/// Durable timestamps carry seconds resolution.
fn now_secs() -> DateTime<Utc> {
    let now = Utc::now();
    now.with_nanosecond(0).unwrap_or(now)
}

impl MemoryStore {
    /// Open (and lay out) the memory directory tree under `workspace`.
    pub fn new(workspace: &Path) -> Result<Self, MemoryError> {
        let memory_dir = workspace.join("memory");
        for category in MemoryCategory::ALL {
            fs::create_dir_all(memory_dir.join(category.as_str()))?;
        }
        Ok(Self { memory_dir })
    }

    pub fn category_dir(&self, category: MemoryCategory) -> PathBuf {
        self.memory_dir.join(category.as_str())
    }

    // ── Typed write operations ────────────────────────────────────────────────

    /// Write a new fact.  Facts are long-term truths: written only when
    /// explicitly stated or unambiguous, updated only when contradicted.
    pub fn write_fact(
        &self,
        title: &str,
        content: &str,
        tags: Vec<String>,
        confidence: Option<f64>,
        source: Option<String>,
    ) -> Result<MemoryItem, MemoryError> {
        if content.trim().is_empty() {
            return Err(MemoryError::Validation("fact content cannot be empty".into()));
        }
        self.write_item(self.new_item(
            title,
            content,
            tags,
            ItemDetails::Fact { confidence, source },
        ))
    }

    /// Write a new decision.  Decisions are locked choices: never edited,
    /// only superseded by new decisions, never deleted.
    pub fn write_decision(
        &self,
        title: &str,
        content: &str,
        tags: Vec<String>,
        status: DecisionStatus,
        supersedes: Option<String>,
        rationale: Option<String>,
        scope: Option<String>,
    ) -> Result<MemoryItem, MemoryError> {
        if content.trim().is_empty() {
            return Err(MemoryError::Validation("decision content cannot be empty".into()));
        }
        if supersedes.is_some() && rationale.as_deref().map_or(true, |r| r.trim().is_empty()) {
            return Err(MemoryError::Validation(
                "rationale required when superseding another decision".into(),
            ));
        }
        let item = self.write_item(self.new_item(
            title,
            content,
            tags,
            ItemDetails::Decision {
                status,
                supersedes,
                rationale,
                scope,
            },
        ))?;
        info!(title, status = status.as_str(), "wrote decision");
        Ok(item)
    }

    /// Write a new goal.  Goals are outcome-oriented objectives, durable
    /// beyond a single session.
    pub fn write_goal(
        &self,
        title: &str,
        content: &str,
        tags: Vec<String>,
        status: GoalStatus,
        priority: Option<String>,
        horizon: Option<String>,
    ) -> Result<MemoryItem, MemoryError> {
        if content.trim().is_empty() {
            return Err(MemoryError::Validation("goal content cannot be empty".into()));
        }
        self.write_item(self.new_item(
            title,
            content,
            tags,
            ItemDetails::Goal {
                status,
                priority,
                horizon,
            },
        ))
    }

    /// Write a new task.  Tasks are concrete actionable items; `assignee`
    /// is required, completed tasks are archived rather than deleted.
    #[allow(clippy::too_many_arguments)]
    pub fn write_task(
        &self,
        title: &str,
        content: &str,
        assignee: &str,
        tags: Vec<String>,
        status: TaskStatus,
        deadline: Option<String>,
        priority: Option<String>,
        related_goal: Option<String>,
    ) -> Result<MemoryItem, MemoryError> {
        if content.trim().is_empty() {
            return Err(MemoryError::Validation("task content cannot be empty".into()));
        }
        if assignee.trim().is_empty() {
            return Err(MemoryError::Validation("task assignee is required".into()));
        }
        self.write_item(self.new_item(
            title,
            content,
            tags,
            ItemDetails::Task {
                status,
                assignee: assignee.trim().to_string(),
                deadline,
                priority,
                related_goal,
            },
        ))
    }

    /// Write a new reflection.  Reflections are subjective observations:
    /// append-only, never edited or deleted, may contradict earlier ones.
    pub fn write_reflection(
        &self,
        title: &str,
        content: &str,
        tags: Vec<String>,
        context: Option<String>,
    ) -> Result<MemoryItem, MemoryError> {
        if content.trim().is_empty() {
            return Err(MemoryError::Validation("reflection content cannot be empty".into()));
        }
        self.write_item(self.new_item(title, content, tags, ItemDetails::Reflection { context }))
    }

    fn new_item(
        &self,
        title: &str,
        content: &str,
        tags: Vec<String>,
        details: ItemDetails,
    ) -> MemoryItem {
        let now = now_secs();
        let content = content.trim();
        MemoryItem {
            id: generate_id(title, content),
            title: title.to_string(),
            content: content.to_string(),
            created_at: now,
            updated_at: now,
            tags,
            details,
            path: None,
        }
    }

    /// Common write body: idempotency check, unique filename, serialize,
    /// write.
    ///
    /// The id is a digest of `title:content`, so an existing item with the
    /// same id in the same category already carries this knowledge — the
    /// write is skipped and the stored item returned, keeping repeated
    /// distillation of the same session from duplicating files.
    /// Reflections are exempt: they are append-only observation records,
    /// and observing the same thing twice is two observations (lookups by
    /// id warn and return the newest).
    fn write_item(&self, mut item: MemoryItem) -> Result<MemoryItem, MemoryError> {
        let category = item.category();
        if category != MemoryCategory::Reflections {
            if let Some(existing) = self.read(category, Some(&item.id), None).into_iter().next() {
                debug!(category = %category, id = %item.id, "memory item already exists; skipping write");
                return Ok(existing);
            }
        }

        let dir = self.category_dir(category);
        let filename = generate_filename(&item.title, category, item.created_at);
        let mut path = dir.join(&filename);

        // Filename collisions with a *different* id get a numeric stem
        // suffix; an identical id at the same path would already have been
        // caught above.
        let stem = filename.trim_end_matches(".md").to_string();
        let mut counter = 0;
        while path.exists() {
            match self.read_file(&path) {
                Some(existing) if existing.id == item.id => break,
                _ => {
                    counter += 1;
                    path = dir.join(format!("{stem}-{counter}.md"));
                }
            }
        }

        let text = serialize_item(&item)?;
        fs::write(&path, text)?;
        item.path = Some(path.clone());
        info!(category = %category, id = %item.id, path = %path.display(), "wrote memory item");
        Ok(item)
    }

    fn read_file(&self, path: &Path) -> Option<MemoryItem> {
        let text = match fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read memory file");
                return None;
            }
        };
        match parse_item(&text, path) {
            Ok(item) => Some(item),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping malformed memory file");
                None
            }
        }
    }

    /// Markdown files directly under `dir`, sorted lexicographically for
    /// deterministic iteration.  Does not descend into `archived/`.
    fn list_files(&self, dir: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = match fs::read_dir(dir) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "md"))
                .collect(),
            Err(_) => Vec::new(),
        };
        files.sort();
        files
    }

    // ── Read operations ───────────────────────────────────────────────────────

    /// Read items from one category, optionally filtered by exact id
    /// and/or case-insensitive substring query over title and content.
    /// Results are sorted newest-first by `updated_at`.
    pub fn read(
        &self,
        category: MemoryCategory,
        id: Option<&str>,
        query: Option<&str>,
    ) -> Vec<MemoryItem> {
        let query_lower = query.map(|q| q.to_lowercase());
        let mut items: Vec<MemoryItem> = self
            .list_files(&self.category_dir(category))
            .iter()
            .filter_map(|path| self.read_file(path))
            .filter(|item| id.is_none_or(|id| item.id == id))
            .filter(|item| {
                query_lower.as_deref().is_none_or(|q| {
                    item.title.to_lowercase().contains(q) || item.content.to_lowercase().contains(q)
                })
            })
            .collect();

        items.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

        if let Some(id) = id {
            if items.len() > 1 {
                warn!(id, count = items.len(), "duplicate memory ids detected; returning newest");
            }
            items.truncate(1);
        }
        items
    }

    /// Search across categories.  Per file the match order is: filename
    /// stem, then title, then any tag, then content — first match wins so
    /// no item is counted twice.  Results newest-first; `limit` truncates.
    pub fn search(
        &self,
        query: &str,
        categories: Option<&[MemoryCategory]>,
        limit: Option<usize>,
    ) -> Vec<MemoryItem> {
        let query_lower = query.to_lowercase();
        let cats: Vec<MemoryCategory> = match categories {
            Some(cs) => cs.to_vec(),
            None => MemoryCategory::ALL.to_vec(),
        };

        let mut results = Vec::new();
        for category in cats {
            for path in self.list_files(&self.category_dir(category)) {
                let stem_matches = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_lowercase().contains(&query_lower))
                    .unwrap_or(false);

                let Some(item) = self.read_file(&path) else {
                    continue;
                };
                if stem_matches
                    || item.title.to_lowercase().contains(&query_lower)
                    || item.tags.iter().any(|t| t.to_lowercase().contains(&query_lower))
                    || item.content.to_lowercase().contains(&query_lower)
                {
                    results.push(item);
                }
            }
        }

        results.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        if let Some(limit) = limit {
            results.truncate(limit);
        }
        results
    }

    /// List items, optionally one category only, optionally including the
    /// `archived/` subdirectories.
    pub fn list(&self, category: Option<MemoryCategory>, include_archived: bool) -> Vec<MemoryItem> {
        let cats: Vec<MemoryCategory> = match category {
            Some(c) => vec![c],
            None => MemoryCategory::ALL.to_vec(),
        };

        let mut results = Vec::new();
        for cat in cats {
            results.extend(self.read(cat, None, None));
            if include_archived {
                let archive_dir = self.category_dir(cat).join("archived");
                results.extend(
                    self.list_files(&archive_dir)
                        .iter()
                        .filter_map(|p| self.read_file(p)),
                );
            }
        }
        results
    }

    // ── Update operations ─────────────────────────────────────────────────────

    /// Update an existing item in place, gated by the category rules:
    /// reflections are rejected; decisions log a warning recommending a
    /// superseding item instead.  Returns `Ok(None)` when the id does not
    /// exist.
    pub fn update(
        &self,
        category: MemoryCategory,
        id: &str,
        changes: ItemUpdate,
    ) -> Result<Option<MemoryItem>, MemoryError> {
        if category == MemoryCategory::Reflections {
            return Err(MemoryError::RuleViolation(
                "reflections are append-only and cannot be updated".into(),
            ));
        }

        let Some(mut item) = self.read(category, Some(id), None).into_iter().next() else {
            warn!(category = %category, id, "memory item not found");
            return Ok(None);
        };

        if category == MemoryCategory::Decisions {
            warn!(
                id,
                "updating a decision; decisions should be immutable — consider writing a new \
                 decision that supersedes this one"
            );
        }

        if let Some(title) = changes.title {
            item.title = title;
        }
        if let Some(content) = changes.content {
            item.content = content.trim().to_string();
        }
        if let Some(tags) = changes.tags {
            item.tags = tags;
        }
        if let Some(status) = changes.status.as_deref() {
            self.apply_status(&mut item, status)?;
        }
        item.updated_at = now_secs();

        self.overwrite(&item)?;
        info!(category = %category, id, "updated memory item");
        Ok(Some(item))
    }

    /// Update a task's status with lifecycle validation.  An out-of-graph
    /// transition logs a warning but is applied anyway.
    pub fn update_task_status(
        &self,
        task_id: &str,
        new_status: TaskStatus,
    ) -> Result<Option<MemoryItem>, MemoryError> {
        let Some(item) = self.read(MemoryCategory::Tasks, Some(task_id), None).into_iter().next()
        else {
            warn!(task_id, "task not found");
            return Ok(None);
        };

        if let ItemDetails::Task { status: old, .. } = &item.details {
            if !old.allows_transition_to(new_status) {
                warn!(
                    task_id,
                    old = old.as_str(),
                    new = new_status.as_str(),
                    "unusual task status transition"
                );
            }
            info!(task_id, old = old.as_str(), new = new_status.as_str(), "task status changed");
        }

        self.update(
            MemoryCategory::Tasks,
            task_id,
            ItemUpdate {
                status: Some(new_status.as_str().to_string()),
                ..Default::default()
            },
        )
    }

    fn apply_status(&self, item: &mut MemoryItem, status: &str) -> Result<(), MemoryError> {
        match &mut item.details {
            ItemDetails::Decision { status: s, .. } => {
                *s = DecisionStatus::parse(status).ok_or_else(|| {
                    MemoryError::Validation(format!("invalid decision status: {status}"))
                })?;
            }
            ItemDetails::Goal { status: s, .. } => {
                *s = GoalStatus::parse(status).ok_or_else(|| {
                    MemoryError::Validation(format!("invalid goal status: {status}"))
                })?;
            }
            ItemDetails::Task { status: s, .. } => {
                *s = TaskStatus::parse(status).ok_or_else(|| {
                    MemoryError::Validation(format!("invalid task status: {status}"))
                })?;
            }
            ItemDetails::Fact { .. } | ItemDetails::Reflection { .. } => {
                return Err(MemoryError::Validation(format!(
                    "{} items carry no status",
                    item.category()
                )));
            }
        }
        Ok(())
    }

    /// Rewrite an item to its known path (explicit overwrite of an
    /// existing file, used by the update path).
    fn overwrite(&self, item: &MemoryItem) -> Result<(), MemoryError> {
        let path = item.path.as_ref().ok_or_else(|| {
            MemoryError::Validation("cannot overwrite an item that was never persisted".into())
        })?;
        let text = serialize_item(item)?;
        fs::write(path, text)?;
        Ok(())
    }

    // ── Delete operations ─────────────────────────────────────────────────────

    /// Delete an item, honouring category rules: decisions and reflections
    /// are rejected; done tasks and achieved goals are archived instead of
    /// removed.  Returns `Ok(false)` when the id does not exist.
    pub fn delete(&self, category: MemoryCategory, id: &str) -> Result<bool, MemoryError> {
        match category {
            MemoryCategory::Decisions => {
                return Err(MemoryError::RuleViolation(
                    "decisions are immutable and cannot be deleted".into(),
                ));
            }
            MemoryCategory::Reflections => {
                return Err(MemoryError::RuleViolation(
                    "reflections are append-only and cannot be deleted".into(),
                ));
            }
            _ => {}
        }

        let Some(item) = self.read(category, Some(id), None).into_iter().next() else {
            warn!(category = %category, id, "memory item not found");
            return Ok(false);
        };

        match &item.details {
            ItemDetails::Task {
                status: TaskStatus::Done,
                ..
            } => {
                warn!(id, "task is completed; archiving instead of deleting");
                return self.archive(&item);
            }
            ItemDetails::Goal {
                status: GoalStatus::Achieved,
                ..
            } => {
                warn!(id, "goal is achieved; archiving instead of deleting");
                return self.archive(&item);
            }
            ItemDetails::Fact { .. } => {
                warn!(id, "deleting a fact; facts are rarely deleted");
            }
            _ => {}
        }

        if let Some(path) = &item.path {
            if path.exists() {
                fs::remove_file(path)?;
                info!(category = %category, id, "deleted memory item");
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Move an item's file into the category's `archived/` subdirectory.
    fn archive(&self, item: &MemoryItem) -> Result<bool, MemoryError> {
        let Some(path) = &item.path else {
            return Ok(false);
        };
        let Some(name) = path.file_name() else {
            return Ok(false);
        };
        let archive_dir = self.category_dir(item.category()).join("archived");
        fs::create_dir_all(&archive_dir)?;
        let new_path = archive_dir.join(name);
        if path.exists() {
            fs::rename(path, &new_path)?;
            info!(title = %item.title, path = %new_path.display(), "archived memory item");
            return Ok(true);
        }
        Ok(false)
    }

    // ── Context building ──────────────────────────────────────────────────────

    /// Build the memory block for the system prompt: every non-archived
    /// item grouped by category, with a compact metadata line per item.
    pub fn build_context(&self) -> String {
        let mut parts = Vec::new();

        for category in MemoryCategory::ALL {
            let items = self.read(category, None, None);
            if items.is_empty() {
                continue;
            }

            let mut section = vec![format!("## {}", category.title())];
            for item in &items {
                if item.is_archived() {
                    continue;
                }
                let mut lines = vec![format!("\n### {}", item.title)];

                let mut meta = Vec::new();
                if !item.tags.is_empty() {
                    meta.push(format!("Tags: {}", item.tags.join(", ")));
                }
                match &item.details {
                    ItemDetails::Task {
                        status,
                        assignee,
                        deadline,
                        ..
                    } => {
                        meta.push(format!("Status: {}", status.as_str()));
                        if !assignee.is_empty() {
                            meta.push(format!("Assignee: {assignee}"));
                        }
                        if let Some(deadline) = deadline {
                            meta.push(format!("Deadline: {deadline}"));
                        }
                    }
                    ItemDetails::Goal { status, priority, .. } => {
                        meta.push(format!("Status: {}", status.as_str()));
                        if let Some(priority) = priority {
                            meta.push(format!("Priority: {priority}"));
                        }
                    }
                    ItemDetails::Fact { confidence, source } => {
                        if let Some(confidence) = confidence {
                            meta.push(format!("Confidence: {confidence}"));
                        }
                        if let Some(source) = source {
                            meta.push(format!("Source: {source}"));
                        }
                    }
                    ItemDetails::Decision { supersedes, .. } => {
                        if let Some(supersedes) = supersedes {
                            meta.push(format!("Supersedes: {supersedes}"));
                        }
                    }
                    ItemDetails::Reflection { .. } => {}
                }
                if !meta.is_empty() {
                    lines.push(format!("({})", meta.join(" | ")));
                }
                lines.push(item.content.clone());
                section.push(lines.join("\n"));
            }
            parts.push(section.join("\n"));
        }

        parts.join("\n\n---\n\n")
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontmatter::generate_id;

    fn store() -> (tempfile::TempDir, MemoryStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new(dir.path()).unwrap();
        (dir, store)
    }

    fn count_files(store: &MemoryStore, category: MemoryCategory) -> usize {
        store.list_files(&store.category_dir(category)).len()
    }

    // ── Writes ────────────────────────────────────────────────────────────────

    #[test]
    fn write_fact_creates_one_file_with_digest_id() {
        let (_dir, store) = store();
        let item = store
            .write_fact("Prefers dark mode", "User prefers dark mode", vec![], None, None)
            .unwrap();
        assert_eq!(item.id, generate_id("Prefers dark mode", "User prefers dark mode"));
        assert_eq!(count_files(&store, MemoryCategory::Facts), 1);
        assert!(item.path.as_ref().unwrap().exists());
    }

    #[test]
    fn empty_content_is_rejected_for_every_category() {
        let (_dir, store) = store();
        assert!(matches!(
            store.write_fact("t", "  ", vec![], None, None),
            Err(MemoryError::Validation(_))
        ));
        assert!(matches!(
            store.write_decision("t", "", vec![], DecisionStatus::Active, None, None, None),
            Err(MemoryError::Validation(_))
        ));
        assert!(matches!(
            store.write_goal("t", "", vec![], GoalStatus::Active, None, None),
            Err(MemoryError::Validation(_))
        ));
        assert!(matches!(
            store.write_task("t", "", "me", vec![], TaskStatus::Open, None, None, None),
            Err(MemoryError::Validation(_))
        ));
        assert!(matches!(
            store.write_reflection("t", "", vec![], None),
            Err(MemoryError::Validation(_))
        ));
    }

    #[test]
    fn task_without_assignee_is_rejected() {
        let (_dir, store) = store();
        let err = store
            .write_task("t", "c", "  ", vec![], TaskStatus::Open, None, None, None)
            .unwrap_err();
        assert!(err.to_string().contains("assignee"));
    }

    #[test]
    fn superseding_decision_requires_rationale() {
        let (_dir, store) = store();
        let err = store
            .write_decision(
                "Use sqlite",
                "We switch to sqlite",
                vec![],
                DecisionStatus::Active,
                Some("abcd1234".into()),
                None,
                None,
            )
            .unwrap_err();
        assert!(err.to_string().contains("rationale"));

        // With a rationale the supersede goes through.
        store
            .write_decision(
                "Use sqlite",
                "We switch to sqlite",
                vec![],
                DecisionStatus::Active,
                Some("abcd1234".into()),
                Some("file-per-item did not scale".into()),
                None,
            )
            .unwrap();
    }

    #[test]
    fn identical_write_is_idempotent() {
        let (_dir, store) = store();
        let a = store
            .write_fact("Prefers dark mode", "User prefers dark mode", vec![], None, None)
            .unwrap();
        let b = store
            .write_fact("Prefers dark mode", "User prefers dark mode", vec![], None, None)
            .unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(count_files(&store, MemoryCategory::Facts), 1);
    }

    #[test]
    fn identical_reflections_append_separately() {
        let (_dir, store) = store();
        let a = store.write_reflection("Same note", "observed it", vec![], None).unwrap();
        let b = store.write_reflection("Same note", "observed it", vec![], None).unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(count_files(&store, MemoryCategory::Reflections), 2);
        // Lookup by id warns and returns exactly the newest one.
        assert_eq!(store.read(MemoryCategory::Reflections, Some(&a.id), None).len(), 1);
    }

    #[test]
    fn round_trip_preserves_item() {
        let (_dir, store) = store();
        let written = store
            .write_task(
                "Ship it",
                "Finish the release",
                "freja",
                vec!["release".into()],
                TaskStatus::Open,
                Some("2026-09-01".into()),
                Some("high".into()),
                None,
            )
            .unwrap();
        let read = store
            .read(MemoryCategory::Tasks, Some(&written.id), None)
            .into_iter()
            .next()
            .unwrap();
        assert_eq!(read, written);
    }

    // ── Reads and search ──────────────────────────────────────────────────────

    #[test]
    fn read_filters_by_query_case_insensitive() {
        let (_dir, store) = store();
        store.write_fact("Editor", "Uses Helix daily", vec![], None, None).unwrap();
        store.write_fact("Shell", "Uses fish", vec![], None, None).unwrap();
        let hits = store.read(MemoryCategory::Facts, None, Some("HELIX"));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "Editor");
    }

    #[test]
    fn read_unknown_id_returns_empty() {
        let (_dir, store) = store();
        assert!(store.read(MemoryCategory::Facts, Some("ffffffff"), None).is_empty());
    }

    #[test]
    fn read_sorts_newest_first() {
        let (_dir, store) = store();
        let old = store.write_fact("Old", "old content", vec![], None, None).unwrap();
        // Backdate the first item so ordering is unambiguous.
        let mut backdated = old.clone();
        backdated.updated_at = old.updated_at - chrono::Duration::hours(1);
        store.overwrite(&backdated).unwrap();
        store.write_fact("New", "new content", vec![], None, None).unwrap();

        let items = store.read(MemoryCategory::Facts, None, None);
        assert_eq!(items[0].title, "New");
        assert_eq!(items[1].title, "Old");
    }

    #[test]
    fn search_matches_tags_and_limits() {
        let (_dir, store) = store();
        store
            .write_fact("One", "first", vec!["networking".into()], None, None)
            .unwrap();
        store
            .write_fact("Two", "second networking note", vec![], None, None)
            .unwrap();
        store.write_fact("Three", "unrelated", vec![], None, None).unwrap();

        let hits = store.search("networking", None, None);
        assert_eq!(hits.len(), 2);

        let limited = store.search("networking", None, Some(1));
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn search_respects_category_filter() {
        let (_dir, store) = store();
        store.write_fact("Fact", "shared keyword", vec![], None, None).unwrap();
        store
            .write_goal("Goal", "shared keyword", vec![], GoalStatus::Active, None, None)
            .unwrap();
        let hits = store.search("shared", Some(&[MemoryCategory::Goals]), None);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].category(), MemoryCategory::Goals);
    }

    #[test]
    fn malformed_file_is_skipped_not_fatal() {
        let (_dir, store) = store();
        store.write_fact("Good", "valid item", vec![], None, None).unwrap();
        std::fs::write(
            store.category_dir(MemoryCategory::Facts).join("zz-broken.md"),
            "not frontmatter at all",
        )
        .unwrap();
        let items = store.read(MemoryCategory::Facts, None, None);
        assert_eq!(items.len(), 1);
    }

    // ── Updates ───────────────────────────────────────────────────────────────

    #[test]
    fn update_reflection_is_rule_violation() {
        let (_dir, store) = store();
        let item = store.write_reflection("R", "observed something", vec![], None).unwrap();
        let err = store
            .update(MemoryCategory::Reflections, &item.id, ItemUpdate::default())
            .unwrap_err();
        assert!(matches!(err, MemoryError::RuleViolation(_)));
    }

    #[test]
    fn update_missing_item_returns_none() {
        let (_dir, store) = store();
        let got = store
            .update(MemoryCategory::Facts, "ffffffff", ItemUpdate::default())
            .unwrap();
        assert!(got.is_none());
    }

    #[test]
    fn update_goal_status_rewrites_same_file() {
        let (_dir, store) = store();
        let item = store
            .write_goal("Learn sailing", "Get the license", vec![], GoalStatus::Active, None, None)
            .unwrap();
        let updated = store
            .update(
                MemoryCategory::Goals,
                &item.id,
                ItemUpdate {
                    status: Some("achieved".into()),
                    ..Default::default()
                },
            )
            .unwrap()
            .unwrap();
        assert!(matches!(
            updated.details,
            ItemDetails::Goal {
                status: GoalStatus::Achieved,
                ..
            }
        ));
        assert_eq!(count_files(&store, MemoryCategory::Goals), 1);
        assert_eq!(updated.path, item.path);
    }

    #[test]
    fn update_decision_is_allowed_but_discouraged() {
        let (_dir, store) = store();
        let item = store
            .write_decision("Pick tokio", "We use tokio", vec![], DecisionStatus::Active, None, None, None)
            .unwrap();
        // Allowed (warns): the store does not block decision updates.
        let updated = store
            .update(
                MemoryCategory::Decisions,
                &item.id,
                ItemUpdate {
                    status: Some("superseded".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(updated.is_some());
    }

    #[test]
    fn out_of_graph_task_transition_is_applied_with_warning() {
        let (_dir, store) = store();
        let item = store
            .write_task("T", "do it", "me", vec![], TaskStatus::Done, None, None, None)
            .unwrap();
        // done → open is off the graph; the store warns but advances anyway.
        let updated = store.update_task_status(&item.id, TaskStatus::Open).unwrap().unwrap();
        assert!(matches!(
            updated.details,
            ItemDetails::Task {
                status: TaskStatus::Open,
                ..
            }
        ));
    }

    #[test]
    fn valid_task_transition_applies() {
        let (_dir, store) = store();
        let item = store
            .write_task("T", "do it", "me", vec![], TaskStatus::Open, None, None, None)
            .unwrap();
        let updated = store
            .update_task_status(&item.id, TaskStatus::InProgress)
            .unwrap()
            .unwrap();
        assert!(matches!(
            updated.details,
            ItemDetails::Task {
                status: TaskStatus::InProgress,
                ..
            }
        ));
    }

    // ── Deletes and archiving ─────────────────────────────────────────────────

    #[test]
    fn delete_decision_is_rule_violation() {
        let (_dir, store) = store();
        let item = store
            .write_decision("D", "locked", vec![], DecisionStatus::Active, None, None, None)
            .unwrap();
        let err = store.delete(MemoryCategory::Decisions, &item.id).unwrap_err();
        assert!(matches!(err, MemoryError::RuleViolation(_)));
        assert!(item.path.unwrap().exists(), "decision file must survive");
    }

    #[test]
    fn delete_reflection_is_rule_violation() {
        let (_dir, store) = store();
        let item = store.write_reflection("R", "note", vec![], None).unwrap();
        let err = store.delete(MemoryCategory::Reflections, &item.id).unwrap_err();
        assert!(matches!(err, MemoryError::RuleViolation(_)));
    }

    #[test]
    fn reflections_are_monotonically_non_decreasing() {
        let (_dir, store) = store();
        let a = store.write_reflection("A", "first", vec![], None).unwrap();
        store.write_reflection("B", "second", vec![], None).unwrap();
        let _ = store.update(MemoryCategory::Reflections, &a.id, ItemUpdate::default());
        let _ = store.delete(MemoryCategory::Reflections, &a.id);
        store.write_reflection("C", "third", vec![], None).unwrap();
        assert_eq!(count_files(&store, MemoryCategory::Reflections), 3);
        // Content of the first reflection is untouched.
        let re_read = store
            .read(MemoryCategory::Reflections, Some(&a.id), None)
            .into_iter()
            .next()
            .unwrap();
        assert_eq!(re_read.content, "first");
    }

    #[test]
    fn done_task_is_archived_on_delete() {
        let (_dir, store) = store();
        let item = store
            .write_task("T", "do it", "me", vec![], TaskStatus::Done, None, None, None)
            .unwrap();
        assert!(store.delete(MemoryCategory::Tasks, &item.id).unwrap());
        assert_eq!(count_files(&store, MemoryCategory::Tasks), 0);
        let archived = store.category_dir(MemoryCategory::Tasks).join("archived");
        assert_eq!(std::fs::read_dir(archived).unwrap().count(), 1);
    }

    #[test]
    fn open_task_is_deleted_outright() {
        let (_dir, store) = store();
        let item = store
            .write_task("T", "do it", "me", vec![], TaskStatus::Open, None, None, None)
            .unwrap();
        assert!(store.delete(MemoryCategory::Tasks, &item.id).unwrap());
        assert_eq!(count_files(&store, MemoryCategory::Tasks), 0);
        assert!(!store.category_dir(MemoryCategory::Tasks).join("archived").exists());
    }

    #[test]
    fn achieved_goal_is_archived_on_delete() {
        let (_dir, store) = store();
        let item = store
            .write_goal("G", "done deal", vec![], GoalStatus::Achieved, None, None)
            .unwrap();
        assert!(store.delete(MemoryCategory::Goals, &item.id).unwrap());
        let archived = store.category_dir(MemoryCategory::Goals).join("archived");
        assert_eq!(std::fs::read_dir(archived).unwrap().count(), 1);
    }

    #[test]
    fn delete_missing_item_returns_false() {
        let (_dir, store) = store();
        assert!(!store.delete(MemoryCategory::Facts, "ffffffff").unwrap());
    }

    #[test]
    fn archived_items_excluded_from_read_but_listable() {
        let (_dir, store) = store();
        let item = store
            .write_task("T", "do it", "me", vec![], TaskStatus::Done, None, None, None)
            .unwrap();
        store.delete(MemoryCategory::Tasks, &item.id).unwrap();

        assert!(store.read(MemoryCategory::Tasks, None, None).is_empty());
        assert_eq!(store.list(Some(MemoryCategory::Tasks), true).len(), 1);
        assert!(store.list(Some(MemoryCategory::Tasks), false).is_empty());
    }

    // ── Context ───────────────────────────────────────────────────────────────

    #[test]
    fn build_context_groups_by_category() {
        let (_dir, store) = store();
        store
            .write_fact("Editor", "Uses Helix", vec!["env".into()], None, Some("user".into()))
            .unwrap();
        store
            .write_task("T", "do it", "freja", vec![], TaskStatus::Open, None, None, None)
            .unwrap();

        let ctx = store.build_context();
        assert!(ctx.contains("## Facts"));
        assert!(ctx.contains("### Editor"));
        assert!(ctx.contains("Source: user"));
        assert!(ctx.contains("## Tasks"));
        assert!(ctx.contains("Status: open"));
        assert!(ctx.contains("Assignee: freja"));
    }

    #[test]
    fn build_context_empty_store_is_empty_string() {
        let (_dir, store) = store();
        assert_eq!(store.build_context(), "");
    }
}
