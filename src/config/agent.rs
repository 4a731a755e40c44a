use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AgentError, Result};

/// Built-in rule file, used when the project does not ship its own.
pub const DEFAULT_RULES: &str = include_str!("../rules/default_rules.toml");

/// The `agent:` section of `config.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Rule file path, relative to the project root.
    #[serde(default)]
    pub rules: Option<PathBuf>,

    /// Agent backend name. Default: "claude".
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Seconds an idle pane waits between reminders. Default: 120.
    #[serde(default = "default_reminder_interval")]
    pub idle_reminder_interval: u64,

    /// Reminders sent before an idle pane is killed. Default: 3.
    #[serde(default = "default_reminder_limit")]
    pub idle_reminder_limit: u32,

    /// Acceptance criteria appended to every new ticket.
    #[serde(default)]
    pub required_criteria: Vec<String>,
}

fn default_backend() -> String {
    "claude".into()
}
fn default_reminder_interval() -> u64 {
    120
}
fn default_reminder_limit() -> u32 {
    3
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            rules: None,
            backend: default_backend(),
            idle_reminder_interval: 120,
            idle_reminder_limit: 3,
            required_criteria: Vec::new(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ProjectConfig {
    #[serde(default)]
    agent: Option<AgentConfig>,
}

impl AgentConfig {
    /// Load the `agent:` section from a YAML file. Returns default if the
    /// file or the section doesn't exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        let project: ProjectConfig =
            serde_yaml::from_str(&contents).map_err(|e| AgentError::ConfigParse {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        Ok(project.agent.unwrap_or_default())
    }

    /// Load from `<project_root>/config.yaml`.
    pub fn load_project(project_root: &Path) -> Result<Self> {
        Self::load_from(&project_root.join("config.yaml"))
    }

    /// Locate the rule file for a project.
    ///
    /// Order: `agent.rules` from config, then `tools/agent/rules.toml`, then
    /// the built-in rules written out to `_agent/rules.toml`.
    pub fn resolve_rules_path(&self, project_root: &Path) -> Result<PathBuf> {
        if let Some(rules) = &self.rules {
            let path = project_root.join(rules);
            if !path.exists() {
                return Err(AgentError::RulesNotFound { path });
            }
            return Ok(path);
        }

        let project_rules = project_root.join("tools").join("agent").join("rules.toml");
        if project_rules.exists() {
            return Ok(project_rules);
        }

        let fallback = super::agent_dir(project_root).join("rules.toml");
        if !fallback.exists() {
            std::fs::create_dir_all(super::agent_dir(project_root))?;
            std::fs::write(&fallback, DEFAULT_RULES)?;
        }
        Ok(fallback)
    }
}
