use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::{Multiplexer, PaneId, PaneInfo, SpawnOptions};
use crate::error::{AgentError, Result};

/// Environment variable WezTerm sets inside each pane.
pub const PANE_ENV: &str = "WEZTERM_PANE";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// `wezterm cli` backed multiplexer.
#[derive(Debug, Clone)]
pub struct WezTerm {
    program: PathBuf,
    timeout: Duration,
}

/// Locate `wezterm` and make sure we are running inside one of its panes,
/// which `wezterm cli` needs to reach the mux.
pub fn ensure_installed() -> Result<PathBuf> {
    let program = which::which("wezterm").map_err(|_| AgentError::MultiplexerNotFound {
        reason: "wezterm is not on PATH (install from https://wezfurlong.org/wezterm/)".into(),
    })?;
    if std::env::var_os(PANE_ENV).is_none() {
        return Err(AgentError::MultiplexerNotFound {
            reason: format!("{PANE_ENV} is not set; run this from inside a WezTerm pane"),
        });
    }
    Ok(program)
}

/// The pane this process runs in, if any.
pub fn current_pane() -> Option<PaneId> {
    std::env::var(PANE_ENV).ok()?.trim().parse().ok()
}

impl WezTerm {
    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn detect() -> Result<Self> {
        Ok(Self::new(ensure_installed()?))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn cli(&self, args: &[&str], input: Option<&str>) -> Result<String> {
        let label = format!("wezterm cli {}", args.first().copied().unwrap_or_default());
        let mut child = Command::new(&self.program)
            .arg("cli")
            .args(args)
            .stdin(if input.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AgentError::Pane {
                reason: format!("{label}: {e}"),
            })?;

        if let (Some(text), Some(mut stdin)) = (input, child.stdin.take()) {
            stdin.write_all(text.as_bytes()).await?;
            stdin.shutdown().await?;
        }

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| AgentError::PaneTimeout {
                command: label.clone(),
                timeout_secs: self.timeout.as_secs(),
            })??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            tracing::debug!(command = %label, %stderr, "wezterm cli failed");
            return Err(AgentError::Pane {
                reason: format!("{label} exited with {}: {stderr}", output.status),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl Multiplexer for WezTerm {
    async fn list_panes(&self) -> Result<Vec<PaneInfo>> {
        let stdout = self.cli(&["list", "--format", "json"], None).await?;
        Ok(serde_json::from_str(&stdout)?)
    }

    async fn get_text(&self, pane: PaneId) -> Result<String> {
        self.cli(&["get-text", "--pane-id", &pane.to_string()], None)
            .await
    }

    async fn send_keys(&self, pane: PaneId, keys: &str) -> Result<()> {
        self.cli(
            &["send-text", "--pane-id", &pane.to_string(), "--no-paste"],
            Some(keys),
        )
        .await
        .map(drop)
    }

    async fn send_text(&self, pane: PaneId, text: &str) -> Result<()> {
        self.cli(&["send-text", "--pane-id", &pane.to_string()], Some(text))
            .await
            .map(drop)
    }

    async fn kill_pane(&self, pane: PaneId) -> Result<()> {
        self.cli(&["kill-pane", "--pane-id", &pane.to_string()], None)
            .await
            .map(drop)
    }

    async fn spawn(&self, options: &SpawnOptions) -> Result<PaneId> {
        let mut args: Vec<String> = vec!["spawn".into(), "--new-window".into()];
        if let Some(workspace) = &options.workspace {
            args.extend(["--workspace".into(), workspace.clone()]);
        }
        if let Some(cwd) = &options.cwd {
            args.extend(["--cwd".into(), cwd.to_string_lossy().into_owned()]);
        }
        args.push("--".into());
        args.extend(options.command.iter().cloned());

        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let stdout = self.cli(&args, None).await?;
        stdout.trim().parse().map_err(|_| AgentError::Pane {
            reason: format!("unexpected spawn output: {:?}", stdout.trim()),
        })
    }
}
