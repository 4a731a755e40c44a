use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{json, Value};

use super::{AgentBackend, LaunchOptions, ToolRequest, SHELL_TOOL};
use crate::config::agent_dir;
use crate::error::{AgentError, Result};
use crate::pane::{ENTER, ESCAPE};
use crate::tickets::Role;

/// Tools that never need a prompt. Bash is added per role and gated by the
/// PreToolUse hook.
const ALLOWED_TOOLS: &[&str] = &["Read", "Edit", "Write", "Glob", "Grep", "WebFetch", "WebSearch"];

const PROCEED: &str = "Do you want to proceed?";

/// Permission box headers and the tool each one asks about.
const PROMPT_HEADERS: &[(&str, &str)] = &[
    ("Bash command", SHELL_TOOL),
    ("Edit file", "Edit"),
    ("Create file", "Write"),
    ("Write file", "Write"),
    ("Read file", "Read"),
    ("Fetch", "WebFetch"),
    ("Web Search", "WebSearch"),
    ("Tool use", "MCP"),
];

/// How far above the question to look for the header.
const HEADER_SCAN_LINES: usize = 40;

/// Claude Code.
#[derive(Debug, Clone, Default)]
pub struct Claude;

impl Claude {
    pub fn new() -> Self {
        Self
    }

    /// Directory passed to `--plugin-dir`.
    pub fn plugin_dir(options: &LaunchOptions, project_root: &Path) -> PathBuf {
        let base = options.cwd.as_deref().unwrap_or(project_root);
        let name = match &options.role {
            Some(role) => format!("plugin-{role}"),
            None => "plugin".to_string(),
        };
        agent_dir(base).join(name)
    }

    /// Write the plugin directory: manifest, hooks and MCP server config.
    ///
    /// ```text
    /// plugin/
    /// ├── .claude-plugin/plugin.json
    /// ├── hooks/hooks.json
    /// └── .mcp.json
    /// ```
    fn write_plugin(
        &self,
        options: &LaunchOptions,
        rules_path: &Path,
        project_root: &Path,
    ) -> Result<PathBuf> {
        let dir = Self::plugin_dir(options, project_root);
        let program = options.hook_program.to_string_lossy().into_owned();
        let role = options.role.as_deref();

        let manifest_dir = dir.join(".claude-plugin");
        fs::create_dir_all(&manifest_dir)?;
        write_json(
            &manifest_dir.join("plugin.json"),
            &json!({"name": "repokit-agent", "version": "1.0.0"}),
        )?;

        let debug_log = agent_dir(project_root).join("hooks.log");
        let mut check_bash = vec![
            program.clone(),
            "check-bash".into(),
            "--rules".into(),
            rules_path.to_string_lossy().into_owned(),
            "--project-root".into(),
            project_root.to_string_lossy().into_owned(),
        ];
        if let Some(role) = role {
            check_bash.extend(["--role".into(), role.to_string()]);
        }
        check_bash.extend(["--debug-log".into(), debug_log.to_string_lossy().into_owned()]);

        let approve_mcp = [
            program.clone(),
            "approve-mcp".into(),
            "--debug-log".into(),
            debug_log.to_string_lossy().into_owned(),
        ];

        let mut hooks = json!({
            "PreToolUse": [{
                "matcher": SHELL_TOOL,
                "hooks": [{"type": "command", "command": shell_join(&check_bash)?}],
            }],
            "PermissionRequest": [{
                "matcher": "^mcp__",
                "hooks": [{"type": "command", "command": shell_join(&approve_mcp)?}],
            }],
        });
        let idle_tracked = role.is_some_and(|r| r != Role::Orchestrator.as_str());
        if let (Some(port), true) = (options.mcp_port, idle_tracked) {
            let stop = [program.clone(), "idle".into(), "--port".into(), port.to_string()];
            hooks["Stop"] = json!([{
                "hooks": [{"type": "command", "command": shell_join(&stop)?}],
            }]);
        }

        let hooks_dir = dir.join("hooks");
        fs::create_dir_all(&hooks_dir)?;
        write_json(&hooks_dir.join("hooks.json"), &json!({ "hooks": hooks }))?;

        let mut ticket_args = vec![
            "tickets-mcp".to_string(),
            "--project-root".into(),
            project_root.to_string_lossy().into_owned(),
        ];
        if let Some(role) = role {
            ticket_args.extend(["--role".into(), role.to_string()]);
        }
        let mut servers = serde_json::Map::new();
        servers.insert(
            "tickets".into(),
            json!({"type": "stdio", "command": program, "args": ticket_args}),
        );
        match options.mcp_port {
            Some(port) => {
                servers.insert(
                    "team".into(),
                    json!({"type": "http", "url": format!("http://127.0.0.1:{port}/mcp")}),
                );
            }
            None => {
                servers.insert(
                    "coderabbit".into(),
                    json!({"type": "stdio", "command": program, "args": ["review-mcp"]}),
                );
            }
        }
        write_json(&dir.join(".mcp.json"), &json!({ "mcpServers": servers }))?;

        Ok(dir)
    }
}

impl AgentBackend for Claude {
    fn name(&self) -> &'static str {
        "claude"
    }

    fn build_launch_command(&self, options: &LaunchOptions) -> Result<Vec<String>> {
        let mut cmd: Vec<String> = vec!["claude".into(), "--allowedTools".into()];
        cmd.extend(ALLOWED_TOOLS.iter().map(|t| t.to_string()));
        if options.role.is_some() {
            cmd.push(SHELL_TOOL.into());
        }

        if options.debug_hooks {
            cmd.extend(["-d".into(), "hooks".into()]);
        }
        if let Some(role_prompt) = &options.role_prompt {
            cmd.extend(["--append-system-prompt".into(), role_prompt.clone()]);
        }

        match (&options.rules_path, &options.project_root) {
            (Some(rules_path), Some(project_root)) => {
                let dir = self.write_plugin(options, rules_path, project_root)?;
                cmd.extend(["--plugin-dir".into(), dir.to_string_lossy().into_owned()]);
            }
            (None, None) => {
                tracing::warn!("no rules file or project root; launching claude without hooks or MCP servers");
            }
            (rules_path, project_root) => {
                return Err(AgentError::Backend {
                    reason: format!(
                        "rules_path and project_root must be given together; got rules_path={rules_path:?}, project_root={project_root:?}"
                    ),
                });
            }
        }

        if let Some(worktree) = &options.worktree {
            cmd.extend(["-w".into(), worktree.clone()]);
        }

        if let Some(prompt) = &options.prompt {
            cmd.extend([
                "-p".into(),
                prompt.clone(),
                "--output-format".into(),
                "json".into(),
                "--no-session-persistence".into(),
            ]);
            if let Some(max_turns) = options.max_turns {
                cmd.extend(["--max-turns".into(), max_turns.to_string()]);
            }
            if let Some(schema) = options.role.as_deref().and_then(output_schema) {
                cmd.extend(["--json-schema".into(), schema.to_string()]);
            }
        }

        Ok(cmd)
    }

    fn detect_prompt(&self, screen: &str) -> Option<ToolRequest> {
        let lines: Vec<&str> = screen.lines().map(strip_box).collect();
        let question = lines.iter().rposition(|l| l.starts_with(PROCEED))?;
        let floor = question.saturating_sub(HEADER_SCAN_LINES);

        let (header, tool) = (floor..question).rev().find_map(|i| {
            PROMPT_HEADERS
                .iter()
                .find(|(header, _)| lines[i] == *header)
                .map(|(_, tool)| (i, *tool))
        })?;

        if tool != SHELL_TOOL {
            return Some(ToolRequest {
                tool: tool.to_string(),
                command: None,
            });
        }

        // The command is the first block of lines under the header; the
        // description follows after a blank line.
        let command = lines[header + 1..question]
            .iter()
            .skip_while(|l| l.is_empty())
            .take_while(|l| !l.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join("\n");
        Some(ToolRequest {
            tool: SHELL_TOOL.into(),
            command: (!command.is_empty()).then_some(command),
        })
    }

    fn approve_keystroke(&self) -> &str {
        ENTER
    }

    fn deny_keystroke(&self) -> &str {
        ESCAPE
    }
}

/// Structured headless output expected from each team role.
fn output_schema(role: &str) -> Option<Value> {
    match role.parse::<Role>().ok()? {
        Role::Worker => Some(json!({
            "type": "object",
            "properties": {
                "ticket_id": {"type": "string"},
                "status": {"type": "string", "enum": ["verify", "in_progress"]},
                "notes": {"type": "string"},
            },
            "required": ["ticket_id", "status", "notes"],
            "additionalProperties": false,
        })),
        Role::Reviewer => Some(json!({
            "type": "object",
            "properties": {
                "ticket_id": {"type": "string"},
                "status": {"type": "string", "enum": ["closed", "todo"]},
                "result": {"type": "string", "enum": ["pass", "fail"]},
                "feedback": {"type": "string"},
            },
            "required": ["ticket_id", "status", "result", "feedback"],
            "additionalProperties": false,
        })),
        Role::Orchestrator => None,
    }
}

fn strip_box(line: &str) -> &str {
    line.trim().trim_matches('│').trim()
}

fn write_json(path: &Path, value: &Value) -> Result<()> {
    fs::write(path, serde_json::to_string_pretty(value)?)?;
    Ok(())
}

/// Quote one argument for a POSIX shell.
pub fn shell_quote(arg: &str) -> Result<String> {
    shlex::try_quote(arg)
        .map(|quoted| quoted.into_owned())
        .map_err(|e| AgentError::Backend {
            reason: format!("cannot quote {arg:?} for the shell: {e}"),
        })
}

pub fn shell_join<S: AsRef<str>>(args: &[S]) -> Result<String> {
    shlex::try_join(args.iter().map(|a| a.as_ref())).map_err(|e| AgentError::Backend {
        reason: format!("cannot build hook command: {e}"),
    })
}
