pub mod agent;

pub use agent::*;

use std::path::{Path, PathBuf};

/// Name of the per-project scratch directory holding tickets, plugin files and logs.
pub const AGENT_DIR: &str = "_agent";

/// Returns `<project_root>/_agent`.
pub fn agent_dir(project_root: &Path) -> PathBuf {
    project_root.join(AGENT_DIR)
}
