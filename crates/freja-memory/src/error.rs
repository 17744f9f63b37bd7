// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use thiserror::Error;

/// Errors surfaced by memory operations.
///
/// Item-not-found is deliberately *not* an error: updates return
/// `Ok(None)` and deletes return `Ok(false)` so callers can treat a stale
/// id as a non-event.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// Inputs violate the data-model invariants (empty content, invalid
    /// status, missing assignee, malformed header field).
    #[error("validation failed: {0}")]
    Validation(String),

    /// The operation is forbidden by the category lifecycle (deleting a
    /// decision, updating a reflection).
    #[error("rule violation: {0}")]
    RuleViolation(String),

    /// A file's header could not be parsed as a memory item.
    #[error("malformed memory file {path}: {reason}")]
    Malformed { path: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
