//! Small hooks the agent CLI runs around tool calls and turns.

use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::path::Path;

use serde::Deserialize;
use tokio::io::AsyncReadExt;

use crate::decision::{Decision, HookOutput};
use crate::error::Result;
use crate::ipc::client::CoordinatorClient;
use crate::pane::wezterm;

/// Append `[HH:MM:SS] decision  "subject"  # reason` to a debug log.
/// Failures are ignored; a log must never break a hook.
pub fn write_log(path: &Path, subject: &str, decision: Decision, reason: &str) {
    let mut line = format!(
        "[{}] {:5}  {subject:?}",
        chrono::Local::now().format("%H:%M:%S"),
        decision.to_string()
    );
    if !reason.is_empty() {
        line.push_str("  # ");
        line.push_str(reason);
    }
    line.push('\n');

    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let appended = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .and_then(|mut f| f.write_all(line.as_bytes()));
    if let Err(e) = appended {
        tracing::debug!(path = %path.display(), error = %e, "could not write hook log");
    }
}

/// Stop hook. Always succeeds: outside a pane, or without a server, there
/// is nothing to report.
pub async fn idle(port: u16) -> Result<()> {
    let mut event = String::new();
    let _ = tokio::io::stdin().read_to_string(&mut event).await;

    let Some(pane) = wezterm::current_pane() else {
        return Ok(());
    };
    match CoordinatorClient::new(port) {
        Ok(client) => {
            if let Err(e) = client.idle(pane).await {
                tracing::debug!(pane, port, error = %e, "idle signal not delivered");
            }
        }
        Err(e) => tracing::debug!(error = %e, "could not build HTTP client"),
    }
    Ok(())
}

#[derive(Debug, Default, Deserialize)]
struct PermissionEvent {
    #[serde(default)]
    tool_name: String,
}

/// PermissionRequest hook: MCP tools are always allowed.
pub fn approve_mcp(debug_log: Option<&Path>) -> Result<()> {
    let mut stdin = String::new();
    std::io::stdin().read_to_string(&mut stdin)?;
    let event: PermissionEvent = serde_json::from_str(&stdin).unwrap_or_default();

    if let Some(log) = debug_log {
        let subject = if event.tool_name.is_empty() {
            "mcp_tool"
        } else {
            event.tool_name.as_str()
        };
        write_log(log, subject, Decision::Allow, "auto-approved MCP tool");
    }

    let output = HookOutput::permission_request(Decision::Allow);
    println!("{}", serde_json::to_string(&output)?);
    Ok(())
}
