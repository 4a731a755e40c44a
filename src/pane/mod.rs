//! Terminal multiplexer panes hosting agent processes.

pub mod wezterm;

pub use wezterm::WezTerm;

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Multiplexer-assigned pane handle.
pub type PaneId = u64;

pub const ESCAPE: &str = "\x1b";
pub const ENTER: &str = "\r";

/// One entry of the multiplexer's pane listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaneInfo {
    pub pane_id: PaneId,
    #[serde(default)]
    pub workspace: String,
    #[serde(default)]
    pub title: String,
}

/// How to start a new pane.
#[derive(Debug, Clone, Default)]
pub struct SpawnOptions {
    pub command: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub workspace: Option<String>,
}

/// Pane operations the coordinator and the auto-approver rely on.
///
/// Every call may block on an external process, so none of them may be
/// made while the pane registry lock is held.
#[async_trait]
pub trait Multiplexer: Send + Sync {
    /// All panes, in the multiplexer's listing order.
    async fn list_panes(&self) -> Result<Vec<PaneInfo>>;

    /// Visible text of a pane.
    async fn get_text(&self, pane: PaneId) -> Result<String>;

    /// Send raw keystrokes, bypassing bracketed paste.
    async fn send_keys(&self, pane: PaneId, keys: &str) -> Result<()>;

    /// Paste text into a pane.
    async fn send_text(&self, pane: PaneId, text: &str) -> Result<()>;

    async fn kill_pane(&self, pane: PaneId) -> Result<()>;

    async fn spawn(&self, options: &SpawnOptions) -> Result<PaneId>;

    /// Pane ids in `workspace`, in listing order.
    async fn list_workspace(&self, workspace: &str) -> Result<Vec<PaneId>> {
        Ok(self
            .list_panes()
            .await?
            .into_iter()
            .filter(|p| p.workspace == workspace)
            .map(|p| p.pane_id)
            .collect())
    }

    async fn is_alive(&self, pane: PaneId) -> Result<bool> {
        Ok(self.list_panes().await?.iter().any(|p| p.pane_id == pane))
    }

    /// Kill every pane in `workspace`. Returns how many were killed.
    async fn kill_workspace(&self, workspace: &str) -> Result<usize> {
        let mut killed = 0;
        for pane in self.list_workspace(workspace).await? {
            match self.kill_pane(pane).await {
                Ok(()) => killed += 1,
                Err(e) => tracing::warn!(pane, error = %e, "failed to kill pane"),
            }
        }
        Ok(killed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputStep {
    Keys(String),
    Text(String),
    Pause(Duration),
}

/// A scripted series of keystrokes, pastes and pauses for one pane.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputSequence {
    steps: Vec<InputStep>,
}

impl InputSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(mut self, keys: impl Into<String>) -> Self {
        self.steps.push(InputStep::Keys(keys.into()));
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.steps.push(InputStep::Text(text.into()));
        self
    }

    pub fn pause(mut self, duration: Duration) -> Self {
        if !duration.is_zero() {
            self.steps.push(InputStep::Pause(duration));
        }
        self
    }

    /// Escape out of whatever the agent is showing, paste `text`, submit it.
    pub fn submit(text: &str, pause: Duration) -> Self {
        Self::new()
            .keys(ESCAPE)
            .pause(pause)
            .text(text)
            .pause(pause)
            .keys(ENTER)
    }

    pub fn steps(&self) -> &[InputStep] {
        &self.steps
    }

    /// Run every step in order, stopping at the first failure.
    pub async fn send(&self, mux: &dyn Multiplexer, pane: PaneId) -> Result<()> {
        for step in &self.steps {
            match step {
                InputStep::Keys(keys) => mux.send_keys(pane, keys).await?,
                InputStep::Text(text) => mux.send_text(pane, text).await?,
                InputStep::Pause(duration) => tokio::time::sleep(*duration).await,
            }
        }
        Ok(())
    }
}
