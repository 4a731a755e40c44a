use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::{project_root_or_cwd, RunArgs};
use crate::approver::{ApproverConfig, ApproverTimings, AutoApprover};
use crate::backend::{AgentBackend, BackendRegistry, LaunchOptions};
use crate::config::AgentConfig;
use crate::coordination::Registration;
use crate::error::Result;
use crate::ipc::client::CoordinatorClient;
use crate::pane::{Multiplexer, PaneId, SpawnOptions, WezTerm};

/// A launched agent pane.
pub struct Launched {
    pub pane: PaneId,
    pub backend: Arc<dyn AgentBackend>,
    pub rules_path: PathBuf,
    pub project_root: PathBuf,
}

/// Build the backend's launch command and spawn it in a new pane. Team
/// members with a ticket are registered with the coordination server.
pub async fn launch(args: &RunArgs, mux: &dyn Multiplexer) -> Result<Launched> {
    let project_root = project_root_or_cwd(args.project_root.clone());
    let config = AgentConfig::load_project(&project_root)?;
    let backends = BackendRegistry::with_defaults();
    let backend = backends.get(args.backend.as_deref().unwrap_or(&config.backend))?;
    let rules_path = match &args.rules {
        Some(path) => path.clone(),
        None => config.resolve_rules_path(&project_root)?,
    };

    let options = LaunchOptions {
        prompt: args.prompt.clone(),
        role: args.role.map(|r| r.as_str().to_string()),
        role_prompt: args.role_prompt.clone(),
        rules_path: Some(rules_path.clone()),
        project_root: Some(project_root.clone()),
        cwd: None,
        debug_hooks: args.debug_hooks,
        worktree: args.worktree.clone(),
        max_turns: args.max_turns,
        mcp_port: args.mcp_port,
        hook_program: std::env::current_exe()?,
    };
    let command = backend.build_launch_command(&options)?;
    let pane = mux
        .spawn(&SpawnOptions {
            command,
            cwd: Some(project_root.clone()),
            workspace: args.workstream.clone(),
        })
        .await?;
    eprintln!("repokit-agent: {} running in pane {pane}", backend.name());

    if let (Some(port), Some(role), Some(workstream), Some(ticket)) =
        (args.mcp_port, args.role, &args.workstream, &args.ticket)
    {
        let registration = Registration {
            pane_id: pane,
            role: role.as_str().to_string(),
            workstream: workstream.clone(),
            ticket: ticket.clone(),
        };
        match CoordinatorClient::new(port) {
            Ok(client) => {
                if let Err(e) = client.register(&registration).await {
                    tracing::warn!(pane, port, error = %e, "pane registration failed");
                }
            }
            Err(e) => tracing::warn!(error = %e, "could not build HTTP client"),
        }
    }

    Ok(Launched {
        pane,
        backend,
        rules_path,
        project_root,
    })
}

/// `run`: launch an agent and, with `--auto-approve`, answer its prompts
/// until the pane exits or Ctrl-C.
pub async fn run(args: RunArgs) -> Result<()> {
    let mux: Arc<dyn Multiplexer> = Arc::new(WezTerm::detect()?);
    let launched = launch(&args, mux.as_ref()).await?;
    if !args.auto_approve {
        return Ok(());
    }

    let approver = AutoApprover::start(ApproverConfig {
        backend: launched.backend.clone(),
        mux: mux.clone(),
        pane: launched.pane,
        rules_path: launched.rules_path,
        role: args.role.map(|r| r.as_str().to_string()),
        project_root: Some(launched.project_root),
        cwd: None,
        timings: ApproverTimings::default(),
    })?;
    eprintln!("repokit-agent: auto-approving pane {} (Ctrl-C to stop)", launched.pane);

    let interrupted = super::interrupted();
    tokio::pin!(interrupted);
    loop {
        tokio::select! {
            _ = &mut interrupted => {
                eprintln!("repokit-agent: interrupted");
                break;
            }
            _ = tokio::time::sleep(Duration::from_secs(1)) => {
                if !mux.is_alive(launched.pane).await.unwrap_or(false) {
                    break;
                }
            }
        }
    }

    approver.stop().await;
    if let Err(e) = mux.kill_pane(launched.pane).await {
        tracing::debug!(pane = launched.pane, error = %e, "pane already gone");
    }
    eprintln!("repokit-agent: session closed");
    Ok(())
}
