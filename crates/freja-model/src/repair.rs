// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Tolerant parsing of model-produced tool-call argument strings.
//!
//! Small local models — exactly the ones freja routes background and
//! interactive work to — emit argument objects that are almost-but-not-
//! quite JSON: a Windows path with unescaped backslashes, an object cut
//! off mid-string by the token limit.  Providers run every argument
//! string through [`parse_tool_arguments`] so the core always receives a
//! JSON object and a damaged argument string never aborts the turn.
use serde_json::Value;
use tracing::warn;

/// Parse a tool-call argument string into a JSON object, repairing common
/// syntax damage.  Substitutes `{}` when nothing can be recovered: the
/// tool-call protocol requires an object, and the dispatched tool will
/// report its missing parameters far more usefully than a parse error
/// here would.
pub fn parse_tool_arguments(tool_name: &str, raw: &str) -> Value {
    if raw.trim().is_empty() {
        warn!(tool_name, "model sent tool call with empty arguments; substituting {{}}");
        return Value::Object(Default::default());
    }
    match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(parse_err) => match repair_arguments(raw) {
            Ok(v) => {
                warn!(tool_name, "repaired invalid JSON arguments from model");
                v
            }
            Err(_) => {
                warn!(
                    tool_name,
                    error = %parse_err,
                    "model sent tool call with invalid JSON arguments; substituting {{}}"
                );
                Value::Object(Default::default())
            }
        },
    }
}

/// Repair pipeline for argument strings serde rejected.
///
/// One scan pass over the input does double duty: it rewrites invalid
/// escape sequences inside string values (`\p` → `\\p`) and records how
/// the input left off — inside a string, and with which containers still
/// open.  If the sanitized text still fails to parse, the recorded state
/// closes a truncated tail: terminate the open string, then pop the
/// container stack emitting `]`/`}` innermost-first.  Anything still
/// unparseable after that is genuinely not JSON.
fn repair_arguments(raw: &str) -> anyhow::Result<Value> {
    let scan = sanitize_and_scan(raw);
    if let Ok(v) = serde_json::from_str::<Value>(&scan.sanitized) {
        return Ok(v);
    }

    let mut completed = scan.sanitized;
    if scan.in_string {
        completed.push('"');
    }
    for closer in scan.open.iter().rev() {
        completed.push(*closer);
    }
    serde_json::from_str::<Value>(&completed)
        .map_err(|e| anyhow::anyhow!("argument string is not recoverable JSON: {e}"))
}

/// What one pass over an argument string leaves behind.
struct ScanOutcome {
    /// Input with invalid in-string escapes rewritten to `\\X`.
    /// JSON permits exactly `" \ / b f n r t u` after a backslash;
    /// anything else is a literal backslash the model forgot to escape.
    sanitized: String,
    /// Scan ended inside an unterminated string value
    in_string: bool,
    /// Closing delimiters owed for containers still open, outermost first
    open: Vec<char>,
}

fn sanitize_and_scan(raw: &str) -> ScanOutcome {
    let mut sanitized = String::with_capacity(raw.len() + 8);
    let mut open: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut chars = raw.chars();

    while let Some(c) = chars.next() {
        if in_string {
            match c {
                '\\' => match chars.next() {
                    Some(next)
                        if matches!(next, '"' | '\\' | '/' | 'b' | 'f' | 'n' | 'r' | 't' | 'u') =>
                    {
                        sanitized.push('\\');
                        sanitized.push(next);
                    }
                    Some(next) => {
                        sanitized.push_str("\\\\");
                        sanitized.push(next);
                    }
                    None => sanitized.push('\\'),
                },
                '"' => {
                    in_string = false;
                    sanitized.push('"');
                }
                _ => sanitized.push(c),
            }
        } else {
            match c {
                '"' => in_string = true,
                '{' => open.push('}'),
                '[' => open.push(']'),
                '}' | ']' => {
                    if open.last() == Some(&c) {
                        open.pop();
                    }
                }
                _ => {}
            }
            sanitized.push(c);
        }
    }

    ScanOutcome {
        sanitized,
        in_string,
        open,
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
