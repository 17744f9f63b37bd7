// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::OnceLock;

use regex::Regex;

use freja_model::ToolCallRequest;

/// Remove `<think>…</think>` blocks that some models embed in content.
/// Returns `None` when nothing but thinking remains.
pub(crate) fn strip_think(text: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"(?s)<think>.*?</think>").unwrap());
    let stripped = re.replace_all(text, "").trim().to_string();
    if stripped.is_empty() {
        None
    } else {
        Some(stripped)
    }
}

/// Truncate to at most `n` characters (not bytes — content may be
/// multi-byte UTF-8).
pub(crate) fn truncate_chars(s: &str, n: usize) -> String {
    if s.chars().count() <= n {
        return s.to_string();
    }
    s.chars().take(n).collect()
}

/// Format tool calls as a concise hint, e.g. `web_search("rust releases…")`.
pub(crate) fn tool_hint(tool_calls: &[ToolCallRequest]) -> String {
    let fmt = |tc: &ToolCallRequest| -> String {
        let first_string = tc
            .arguments
            .as_object()
            .and_then(|o| o.values().find_map(|v| v.as_str()));
        match first_string {
            Some(val) if val.chars().count() > 40 => {
                format!("{}(\"{}…\")", tc.name, truncate_chars(val, 40))
            }
            Some(val) => format!("{}(\"{val}\")", tc.name),
            None => tc.name.clone(),
        }
    };
    tool_calls.iter().map(fmt).collect::<Vec<_>>().join(", ")
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
