pub mod check_bash;
pub mod hooks;
pub mod run;
pub mod serve;
pub mod team;

use std::future::Future;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::tickets::Role;

/// Launch coding agents in terminal panes, gate their shell commands and
/// coordinate multi-agent team sessions.
#[derive(Debug, Parser)]
#[command(name = "repokit-agent", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// PreToolUse hook: allow or deny a Bash command against the rule file.
    CheckBash(CheckBashArgs),

    /// Stop hook: tell the team server this pane went idle.
    Idle {
        /// Team server port.
        #[arg(long)]
        port: u16,
    },

    /// PermissionRequest hook: approve MCP tool calls.
    ApproveMcp {
        /// Append decisions to this file.
        #[arg(long)]
        debug_log: Option<PathBuf>,
    },

    /// Launch an agent in a new pane.
    Run(RunArgs),

    /// Multi-agent team sessions.
    Team {
        #[command(subcommand)]
        command: TeamCommand,
    },

    /// Ticket tools as a stdio JSON-RPC server.
    TicketsMcp {
        #[arg(long)]
        project_root: PathBuf,

        /// Restrict tools, fields and transitions to this role.
        #[arg(long)]
        role: Option<Role>,
    },

    /// CodeRabbit review tool as a stdio JSON-RPC server.
    ReviewMcp,
}

impl Commands {
    /// Hooks and stdio servers talk over stdout, so they stay quiet unless
    /// RUST_LOG says otherwise.
    pub fn default_log_filter(&self) -> &'static str {
        match self {
            Commands::Run(_) | Commands::Team { .. } => "info",
            _ => "warn",
        }
    }
}

#[derive(Debug, Args)]
pub struct CheckBashArgs {
    /// Rule file (TOML).
    #[arg(long)]
    pub rules: PathBuf,

    /// Root for `dir` constraints. Defaults to the event's cwd.
    #[arg(long)]
    pub project_root: Option<PathBuf>,

    /// Only rules for this role (plus unrestricted ones) apply.
    #[arg(long)]
    pub role: Option<String>,

    /// Append decisions to this file.
    #[arg(long)]
    pub debug_log: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Agent backend. Defaults to `agent.backend` from config.yaml.
    #[arg(long)]
    pub backend: Option<String>,

    /// Answer permission prompts according to the rule file.
    #[arg(long)]
    pub auto_approve: bool,

    #[arg(long)]
    pub project_root: Option<PathBuf>,

    /// Rule file. Defaults to the project's resolved rules.
    #[arg(long)]
    pub rules: Option<PathBuf>,

    #[arg(long)]
    pub role: Option<Role>,

    /// Extra system prompt for the role.
    #[arg(long)]
    pub role_prompt: Option<String>,

    /// Team workstream; also the multiplexer workspace.
    #[arg(long)]
    pub workstream: Option<String>,

    #[arg(long)]
    pub ticket: Option<String>,

    /// Team server port.
    #[arg(long)]
    pub mcp_port: Option<u16>,

    /// Run headless with this prompt.
    #[arg(long)]
    pub prompt: Option<String>,

    #[arg(long)]
    pub max_turns: Option<u32>,

    #[arg(long)]
    pub worktree: Option<String>,

    /// Have the agent CLI print hook debugging output.
    #[arg(long)]
    pub debug_hooks: bool,
}

#[derive(Debug, Subcommand)]
pub enum TeamCommand {
    /// Create or resume a workstream, launch its orchestrator and serve
    /// until Ctrl-C.
    Start {
        workstream: String,

        #[arg(long)]
        project_root: Option<PathBuf>,

        #[arg(long)]
        backend: Option<String>,
    },

    /// Run only the coordination server.
    Serve {
        #[arg(long)]
        workstream: String,

        #[arg(long)]
        port: u16,

        #[arg(long)]
        project_root: Option<PathBuf>,
    },
}

pub(crate) fn project_root_or_cwd(project_root: Option<PathBuf>) -> PathBuf {
    project_root
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Resolves on Ctrl-C. If the handler cannot be installed this never
/// resolves, so the caller keeps running instead of shutting down.
pub async fn interrupted() {
    until_signal(tokio::signal::ctrl_c()).await
}

async fn until_signal<F>(signal: F)
where
    F: Future<Output = std::io::Result<()>>,
{
    if let Err(e) = signal.await {
        tracing::warn!(error = %e, "cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn signal_resolves() {
        let waited = tokio::time::timeout(Duration::from_secs(1), until_signal(async { Ok(()) }));
        assert!(waited.await.is_ok());
    }

    #[tokio::test]
    async fn failed_signal_handler_never_resolves() {
        let broken = async { Err(std::io::Error::other("no signal handler")) };
        let waited = tokio::time::timeout(Duration::from_millis(100), until_signal(broken));
        assert!(waited.await.is_err());
    }
}
