//! In-memory multiplexer shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use repokit_agent::error::{AgentError, Result};
use repokit_agent::pane::{Multiplexer, PaneId, PaneInfo, SpawnOptions};

/// One call made against the fake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MuxCall {
    Keys(PaneId, String),
    Text(PaneId, String),
    Kill(PaneId),
    Spawn(Vec<String>),
}

#[derive(Default)]
pub struct FakeMux {
    panes: Mutex<Vec<PaneInfo>>,
    screens: Mutex<HashMap<PaneId, Vec<String>>>,
    calls: Mutex<Vec<MuxCall>>,
    next_id: Mutex<PaneId>,
}

impl FakeMux {
    pub fn new() -> Self {
        Self {
            next_id: Mutex::new(100),
            ..Self::default()
        }
    }

    /// Panes listed under `workspace`, in order.
    pub fn with_workspace(self, workspace: &str, panes: &[PaneId]) -> Self {
        self.panes.lock().unwrap().extend(panes.iter().map(|&id| PaneInfo {
            pane_id: id,
            workspace: workspace.into(),
            title: String::new(),
        }));
        self
    }

    /// Screens returned by successive `get_text` calls; the last one sticks.
    pub fn set_screens(&self, pane: PaneId, screens: &[&str]) {
        self.screens
            .lock()
            .unwrap()
            .insert(pane, screens.iter().map(|s| s.to_string()).collect());
    }

    pub fn list_workspace_ids(&self, workspace: &str) -> Vec<PaneId> {
        self.panes
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.workspace == workspace)
            .map(|p| p.pane_id)
            .collect()
    }

    pub fn calls(&self) -> Vec<MuxCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, pane: PaneId) -> Vec<MuxCall> {
        self.calls()
            .into_iter()
            .filter(|c| match c {
                MuxCall::Keys(p, _) | MuxCall::Text(p, _) | MuxCall::Kill(p) => *p == pane,
                MuxCall::Spawn(_) => false,
            })
            .collect()
    }

    pub fn texts_for(&self, pane: PaneId) -> Vec<String> {
        self.calls_for(pane)
            .into_iter()
            .filter_map(|c| match c {
                MuxCall::Text(_, text) => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn killed(&self) -> Vec<PaneId> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                MuxCall::Kill(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: MuxCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn check_alive(&self, pane: PaneId) -> Result<()> {
        if self.panes.lock().unwrap().iter().any(|p| p.pane_id == pane) {
            Ok(())
        } else {
            Err(AgentError::Pane {
                reason: format!("no pane {pane}"),
            })
        }
    }
}

#[async_trait]
impl Multiplexer for FakeMux {
    async fn list_panes(&self) -> Result<Vec<PaneInfo>> {
        Ok(self.panes.lock().unwrap().clone())
    }

    async fn get_text(&self, pane: PaneId) -> Result<String> {
        let mut screens = self.screens.lock().unwrap();
        let Some(queue) = screens.get_mut(&pane) else {
            return Ok(String::new());
        };
        if queue.len() > 1 {
            Ok(queue.remove(0))
        } else {
            Ok(queue.first().cloned().unwrap_or_default())
        }
    }

    async fn send_keys(&self, pane: PaneId, keys: &str) -> Result<()> {
        self.check_alive(pane)?;
        self.record(MuxCall::Keys(pane, keys.into()));
        Ok(())
    }

    async fn send_text(&self, pane: PaneId, text: &str) -> Result<()> {
        self.check_alive(pane)?;
        self.record(MuxCall::Text(pane, text.into()));
        Ok(())
    }

    async fn kill_pane(&self, pane: PaneId) -> Result<()> {
        self.record(MuxCall::Kill(pane));
        self.check_alive(pane)?;
        self.panes.lock().unwrap().retain(|p| p.pane_id != pane);
        Ok(())
    }

    async fn spawn(&self, options: &SpawnOptions) -> Result<PaneId> {
        let id = {
            let mut next = self.next_id.lock().unwrap();
            *next += 1;
            *next
        };
        self.record(MuxCall::Spawn(options.command.clone()));
        self.panes.lock().unwrap().push(PaneInfo {
            pane_id: id,
            workspace: options.workspace.clone().unwrap_or_default(),
            title: String::new(),
        });
        Ok(id)
    }
}
