//! Code review passthrough to the CodeRabbit CLI.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::process::Command;

use crate::error::Result;
use crate::ipc::{str_arg, unknown_tool, ToolHandler, ToolOutcome};

pub const REVIEW_TOOL: &str = "coderabbit_review";

pub const REVIEW_MODES: &[&str] = &["all", "committed", "uncommitted"];

const AUTH_TIMEOUT: Duration = Duration::from_secs(10);
const REVIEW_TIMEOUT: Duration = Duration::from_secs(120);

const NOT_INSTALLED: &str = "coderabbit CLI is not installed; fall back to manual review.\n\
Linux/macOS: curl -fsSL https://cli.coderabbit.ai/install.sh | sh";

const NOT_AUTHED: &str = "coderabbit is not authenticated; fall back to manual review.\n\
Authenticate with: coderabbit auth login";

const NO_ISSUES: &str = "No issues found by CodeRabbit.";

/// Runs a review of the changes in one directory.
#[async_trait]
pub trait ReviewRunner: Send + Sync {
    async fn run_review(&self, path: &Path, mode: &str) -> ToolOutcome;
}

/// `coderabbit review --plain` on the local machine.
#[derive(Debug, Clone)]
pub struct CodeRabbitCli {
    program: String,
}

impl Default for CodeRabbitCli {
    fn default() -> Self {
        Self {
            program: "coderabbit".into(),
        }
    }
}

impl CodeRabbitCli {
    pub fn new() -> Self {
        Self::default()
    }

    async fn output(
        &self,
        args: &[&str],
        cwd: Option<&Path>,
        timeout: Duration,
    ) -> std::result::Result<std::process::Output, String> {
        let mut cmd = Command::new(&self.program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = cwd {
            cmd.current_dir(cwd);
        }
        match tokio::time::timeout(timeout, cmd.output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("timed out after {}s", timeout.as_secs())),
        }
    }
}

#[async_trait]
impl ReviewRunner for CodeRabbitCli {
    async fn run_review(&self, path: &Path, mode: &str) -> ToolOutcome {
        if !REVIEW_MODES.contains(&mode) {
            return ToolOutcome::error(format!(
                "Invalid review type: {mode:?} (expected one of {})",
                REVIEW_MODES.join(", ")
            ));
        }
        if !path.is_dir() {
            return ToolOutcome::error(format!(
                "worktree_path is not a directory: {:?}",
                path.display().to_string()
            ));
        }
        if which::which(&self.program).is_err() {
            return ToolOutcome::error(NOT_INSTALLED);
        }

        match self.output(&["auth", "status"], None, AUTH_TIMEOUT).await {
            Ok(out) if out.status.success() => {}
            Ok(_) => return ToolOutcome::error(NOT_AUTHED),
            Err(e) => {
                return ToolOutcome::error(format!(
                    "coderabbit auth check failed: {e}; fall back to manual review"
                ))
            }
        }

        let out = match self
            .output(&["review", "--plain", "--type", mode], Some(path), REVIEW_TIMEOUT)
            .await
        {
            Ok(out) => out,
            Err(e) => {
                return ToolOutcome::error(format!(
                    "coderabbit review failed: {e}; fall back to manual review"
                ))
            }
        };

        let mut text = String::from_utf8_lossy(&out.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&out.stderr));
        tracing::info!(path = %path.display(), mode, chars = text.len(), "coderabbit review finished");
        let text = text.trim();
        if text.is_empty() {
            ToolOutcome::ok(NO_ISSUES)
        } else {
            ToolOutcome::ok(text)
        }
    }
}

/// Tool definition. `path_required` is set for the team server, where the
/// caller's working directory is unknown.
pub fn review_tool_definition(path_required: bool) -> Value {
    let required: Vec<&str> = if path_required {
        vec!["worktree_path"]
    } else {
        vec![]
    };
    json!({
        "name": REVIEW_TOOL,
        "description": "Run the CodeRabbit CLI to review code changes in a git worktree. \
Returns plain-text reviewer feedback. If the CLI is not installed or not authenticated, \
returns an error message instructing you to fall back to manual review.",
        "inputSchema": {
            "type": "object",
            "properties": {
                "worktree_path": {
                    "type": "string",
                    "description": "Path to the git worktree whose changes should be reviewed.",
                },
                "type": {
                    "type": "string",
                    "enum": ["committed", "uncommitted", "all"],
                    "default": "committed",
                    "description": "Which changes to review: 'committed' (default), 'uncommitted', or 'all'.",
                },
            },
            "required": required,
        },
    })
}

/// Pull `(path, mode)` out of tool arguments. An empty path falls back to
/// `default_path`, or is an error when there is none.
pub fn review_args(
    arguments: &Value,
    default_path: Option<&Path>,
) -> std::result::Result<(PathBuf, String), ToolOutcome> {
    let path = match (str_arg(arguments, "worktree_path"), default_path) {
        ("", Some(default)) => default.to_path_buf(),
        ("", None) => return Err(ToolOutcome::error("worktree_path is required")),
        (path, _) => PathBuf::from(path),
    };
    let mode = match str_arg(arguments, "type") {
        "" => "committed",
        mode => mode,
    };
    Ok((path, mode.to_string()))
}

/// Standalone review server for solo sessions (`review-mcp`).
pub struct ReviewServer<R> {
    runner: R,
}

impl<R: ReviewRunner> ReviewServer<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl<R: ReviewRunner> ToolHandler for ReviewServer<R> {
    fn server_name(&self) -> &str {
        "coderabbit"
    }

    fn tools(&self) -> Vec<Value> {
        vec![review_tool_definition(false)]
    }

    async fn call_tool(&self, name: &str, arguments: &Value) -> Result<ToolOutcome> {
        if name != REVIEW_TOOL {
            return Ok(unknown_tool(name));
        }
        Ok(match review_args(arguments, Some(Path::new("."))) {
            Ok((path, mode)) => self.runner.run_review(&path, &mode).await,
            Err(outcome) => outcome,
        })
    }
}
