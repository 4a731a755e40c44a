//! Coding-agent CLI integrations.
//!
//! A backend knows how to launch one agent CLI and how to read and answer
//! its permission prompts. Nothing outside this module names a concrete
//! backend; callers look one up in a [`BackendRegistry`].

pub mod claude;

pub use claude::Claude;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{AgentError, Result};
use crate::pane::{InputSequence, ENTER};

/// Tool name of the shell-execution capability.
pub const SHELL_TOOL: &str = "Bash";

/// A permission request read off an agent's screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolRequest {
    pub tool: String,
    /// Present only for shell requests.
    pub command: Option<String>,
}

impl ToolRequest {
    pub fn shell(command: impl Into<String>) -> Self {
        Self {
            tool: SHELL_TOOL.into(),
            command: Some(command.into()),
        }
    }

    pub fn is_shell(&self) -> bool {
        self.tool == SHELL_TOOL
    }
}

impl std::fmt::Display for ToolRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.command {
            Some(command) => write!(f, "{}({command:?})", self.tool),
            None => write!(f, "{}", self.tool),
        }
    }
}

/// Everything a backend may need to build its launch command.
#[derive(Debug, Clone, Default)]
pub struct LaunchOptions {
    /// Run headless with this prompt instead of interactively.
    pub prompt: Option<String>,
    pub role: Option<String>,
    pub role_prompt: Option<String>,
    /// Rule file for the shell hook. Must be given together with `project_root`.
    pub rules_path: Option<PathBuf>,
    pub project_root: Option<PathBuf>,
    /// Directory the agent runs in, when it differs from `project_root`.
    pub cwd: Option<PathBuf>,
    pub debug_hooks: bool,
    pub worktree: Option<String>,
    pub max_turns: Option<u32>,
    /// Port of the coordination server, in team mode.
    pub mcp_port: Option<u16>,
    /// Executable the agent's hooks and stdio servers invoke.
    pub hook_program: PathBuf,
}

pub trait AgentBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// argv for launching the agent. May write supporting files.
    fn build_launch_command(&self, options: &LaunchOptions) -> Result<Vec<String>>;

    /// Parse the visible pane text for a pending permission prompt.
    fn detect_prompt(&self, screen: &str) -> Option<ToolRequest>;

    fn approve_keystroke(&self) -> &str;

    fn deny_keystroke(&self) -> &str;

    /// Input that types `text` into the agent's prompt and submits it.
    fn submit_text(&self, text: &str, pause: Duration) -> InputSequence {
        InputSequence::new().text(text).pause(pause).keys(ENTER)
    }
}

/// Backends by name. Built once at startup and passed to whoever needs it.
#[derive(Clone, Default)]
pub struct BackendRegistry {
    backends: BTreeMap<&'static str, Arc<dyn AgentBackend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(Claude::new()));
        registry
    }

    pub fn register(&mut self, backend: Arc<dyn AgentBackend>) {
        self.backends.insert(backend.name(), backend);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn AgentBackend>> {
        self.backends
            .get(name)
            .cloned()
            .ok_or_else(|| AgentError::UnknownBackend {
                name: name.to_string(),
            })
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.backends.keys().copied()
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.backends.keys()).finish()
    }
}
