// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::process::Command;
use tracing::debug;

use freja_config::ExecToolConfig;

use crate::tool::{Tool, ToolCall, ToolOutput};

/// Hard byte ceiling for combined stdout + stderr returned to the model.
const OUTPUT_LIMIT_BYTES: usize = 20_000;

/// Lines kept from the head / tail of oversized output.  Errors and
/// summaries almost always appear at the end of command output, so the
/// tail matters at least as much as the head.
const HEAD_LINES: usize = 100;
const TAIL_LINES: usize = 100;

/// Built-in tool that runs a shell command with its own timeout budget.
pub struct ShellTool {
    pub timeout_secs: u64,
    /// Default working directory for commands
    pub working_dir: PathBuf,
    /// When set, reject workdir arguments outside `working_dir`
    pub restrict_to_workspace: bool,
}

impl ShellTool {
    pub fn new(working_dir: PathBuf, cfg: &ExecToolConfig) -> Self {
        Self {
            timeout_secs: cfg.timeout_seconds,
            working_dir,
            restrict_to_workspace: cfg.restrict_to_workspace,
        }
    }
}

impl Default for ShellTool {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            working_dir: PathBuf::from("."),
            restrict_to_workspace: false,
        }
    }
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "exec"
    }

    fn description(&self) -> &str {
        "Execute a shell command and return stdout + stderr.\n\
         'command' is required and can be any bash one-liner.\n\
         Output is capped at ~20 KB; when larger, the first 100 and last 100 lines\n\
         are preserved with an omission marker in the middle.\n\
         Prefer non-interactive commands; avoid commands that require a TTY."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The complete bash one-liner to execute"
                },
                "workdir": {
                    "type": "string",
                    "description": "Working directory (optional, defaults to the workspace)"
                },
                "timeout_secs": {
                    "type": "integer",
                    "description": "Execution timeout in seconds (optional)"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let command = match call.args.get("command").and_then(|v| v.as_str()) {
            Some(c) => c.to_string(),
            None => return ToolOutput::err(&call.id, "missing 'command' parameter"),
        };
        let workdir = call
            .args
            .get("workdir")
            .and_then(|v| v.as_str())
            .map(PathBuf::from)
            .unwrap_or_else(|| self.working_dir.clone());
        let timeout = call
            .args
            .get("timeout_secs")
            .and_then(|v| v.as_u64())
            .unwrap_or(self.timeout_secs);

        if self.restrict_to_workspace && !workdir.starts_with(&self.working_dir) {
            return ToolOutput::err(
                &call.id,
                format!(
                    "workdir {} is outside the workspace {}",
                    workdir.display(),
                    self.working_dir.display()
                ),
            );
        }

        debug!(cmd = %command, "executing shell tool");

        let mut cmd = Command::new("bash");
        cmd.arg("-c").arg(&command);
        // stdin from /dev/null keeps subprocesses from blocking on a TTY;
        // kill_on_drop guarantees the child dies when the timeout fires.
        cmd.stdin(Stdio::null());
        cmd.kill_on_drop(true);
        cmd.current_dir(&workdir);

        let result =
            tokio::time::timeout(std::time::Duration::from_secs(timeout), cmd.output()).await;

        match result {
            Ok(Ok(output)) => {
                let mut content = String::new();
                let stdout = String::from_utf8_lossy(&output.stdout);
                let stderr = String::from_utf8_lossy(&output.stderr);

                if !stdout.is_empty() {
                    content.push_str(&head_tail_truncate(&stdout));
                }
                if !stderr.is_empty() {
                    if !content.is_empty() {
                        content.push('\n');
                    }
                    content.push_str("[stderr]\n");
                    content.push_str(&head_tail_truncate(&stderr));
                }
                if content.is_empty() {
                    content = format!("[exit {}]", output.status.code().unwrap_or(-1));
                }

                let code = output.status.code().unwrap_or(-1);
                if code == 0 {
                    ToolOutput::ok(&call.id, content)
                } else {
                    ToolOutput::err(&call.id, format!("Error: [exit {code}]\n{content}"))
                }
            }
            Ok(Err(e)) => ToolOutput::err(&call.id, format!("Error: spawn failed: {e}")),
            Err(_) => ToolOutput::err(&call.id, format!("Error: timeout after {timeout}s")),
        }
    }
}

/// Truncate `s` to fit within `OUTPUT_LIMIT_BYTES`, keeping the first
/// `HEAD_LINES` and last `TAIL_LINES` verbatim with an omission marker in
/// the middle.
pub(crate) fn head_tail_truncate(s: &str) -> String {
    if s.len() <= OUTPUT_LIMIT_BYTES {
        return s.to_string();
    }

    let lines: Vec<&str> = s.lines().collect();
    let total = lines.len();

    if total <= HEAD_LINES + TAIL_LINES {
        // Byte budget exceeded by very long lines: fall back to byte-level
        // head + tail windows.
        let tail_start = s.len().saturating_sub(OUTPUT_LIMIT_BYTES / 2);
        let tail_str = &s[tail_start..];
        let head_end = OUTPUT_LIMIT_BYTES / 2;
        let head_str = &s[..head_end.min(s.len())];
        let omitted_bytes = s.len() - head_str.len() - tail_str.len();
        return format!("{head_str}\n...[{omitted_bytes} bytes omitted]...\n{tail_str}");
    }

    let head = lines[..HEAD_LINES].join("\n");
    let tail = lines[total - TAIL_LINES..].join("\n");
    let omitted_lines = total - HEAD_LINES - TAIL_LINES;
    let omitted_bytes = s.len().saturating_sub(head.len() + tail.len());

    format!("{head}\n...[{omitted_lines} lines / ~{omitted_bytes} bytes omitted]...\n{tail}")
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::tool::{Tool, ToolCall};

    fn call(id: &str, args: serde_json::Value) -> ToolCall {
        ToolCall {
            id: id.into(),
            name: "exec".into(),
            args,
        }
    }

    #[tokio::test]
    async fn executes_echo_and_returns_stdout() {
        let t = ShellTool::default();
        let out = t.execute(&call("1", json!({"command": "echo hello"}))).await;
        assert!(!out.is_error, "{}", out.content);
        assert!(out.content.contains("hello"));
    }

    #[tokio::test]
    async fn stdout_and_stderr_both_captured() {
        let t = ShellTool::default();
        let out = t
            .execute(&call("1", json!({"command": "echo out && echo err >&2"})))
            .await;
        assert!(out.content.contains("out"));
        assert!(out.content.contains("err"));
    }

    #[tokio::test]
    async fn nonzero_exit_is_error_with_code() {
        let t = ShellTool::default();
        let out = t.execute(&call("1", json!({"command": "exit 3"}))).await;
        assert!(out.is_error);
        assert!(out.content.contains("[exit 3]"));
    }

    #[tokio::test]
    async fn missing_command_argument_is_error() {
        let t = ShellTool::default();
        let out = t.execute(&call("1", json!({}))).await;
        assert!(out.is_error);
        assert!(out.content.contains("command"));
    }

    #[tokio::test]
    async fn timeout_returns_error() {
        let t = ShellTool {
            timeout_secs: 1,
            ..Default::default()
        };
        let out = t
            .execute(&call("1", json!({"command": "sleep 60", "timeout_secs": 1})))
            .await;
        assert!(out.is_error);
        assert!(out.content.contains("timeout"));
    }

    #[tokio::test]
    async fn restricted_workdir_outside_workspace_rejected() {
        let t = ShellTool {
            restrict_to_workspace: true,
            working_dir: PathBuf::from("/tmp/agent-ws"),
            ..Default::default()
        };
        let out = t
            .execute(&call("1", json!({"command": "pwd", "workdir": "/etc"})))
            .await;
        assert!(out.is_error);
        assert!(out.content.contains("outside the workspace"));
    }

    #[test]
    fn short_output_passes_through_unchanged() {
        let s = "hello\nworld\n";
        assert_eq!(head_tail_truncate(s), s);
    }

    #[test]
    fn large_output_keeps_head_and_tail() {
        let mut lines: Vec<String> = vec!["FIRST".to_string()];
        for i in 0..800 {
            lines.push(format!("middle line {i} padding padding padding padding"));
        }
        lines.push("LAST".to_string());
        let content = lines.join("\n");

        let result = head_tail_truncate(&content);
        assert!(result.contains("FIRST"));
        assert!(result.contains("LAST"));
        assert!(result.contains("omitted"));
        assert!(result.len() < content.len());
    }
}
