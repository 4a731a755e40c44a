use std::path::Path;
use std::sync::Arc;

use tokio::net::TcpListener;

use super::{project_root_or_cwd, RunArgs, TeamCommand};
use crate::config::{agent_dir, AgentConfig};
use crate::coordination::{find_free_port, validate_workstream, Coordinator, CoordinatorConfig};
use crate::error::{AgentError, Result};
use crate::pane::{Multiplexer, WezTerm};
use crate::review::CodeRabbitCli;
use crate::tickets::Role;

pub async fn run(command: TeamCommand) -> Result<()> {
    match command {
        TeamCommand::Start {
            workstream,
            project_root,
            backend,
        } => start(&workstream, &project_root_or_cwd(project_root), backend).await,
        TeamCommand::Serve {
            workstream,
            port,
            project_root,
        } => {
            let root = project_root_or_cwd(project_root);
            let mux: Arc<dyn Multiplexer> = Arc::new(WezTerm::detect()?);
            serve(&workstream, port, &root, mux).await
        }
    }
}

async fn start(workstream: &str, project_root: &Path, backend: Option<String>) -> Result<()> {
    let mux: Arc<dyn Multiplexer> = Arc::new(WezTerm::detect()?);
    validate_workstream(workstream)?;
    init_workstream(project_root, workstream)?;

    let port = find_free_port()?;
    std::fs::write(
        agent_dir(project_root).join(workstream).join("mcp.port"),
        port.to_string(),
    )?;

    let orchestrator = RunArgs {
        backend,
        auto_approve: false,
        project_root: Some(project_root.to_path_buf()),
        rules: None,
        role: Some(Role::Orchestrator),
        role_prompt: None,
        workstream: Some(workstream.to_string()),
        ticket: None,
        mcp_port: Some(port),
        prompt: None,
        max_turns: None,
        worktree: None,
        debug_hooks: false,
    };
    super::run::launch(&orchestrator, mux.as_ref()).await?;

    serve(workstream, port, project_root, mux).await
}

/// Create `_agent/<workstream>/` with its skeleton on first use.
pub fn init_workstream(project_root: &Path, workstream: &str) -> Result<()> {
    let dir = agent_dir(project_root).join(workstream);
    if dir.exists() {
        eprintln!("repokit-agent: resuming workstream '{workstream}' at {}", dir.display());
        return Ok(());
    }
    std::fs::create_dir_all(dir.join("tickets"))?;
    std::fs::create_dir_all(dir.join("worktrees"))?;
    std::fs::write(
        dir.join("plan.toml"),
        format!(
            "[workstream]\nid = \"{workstream}\"\ndescription = \"\"\n\n\
[[goal]]\nid = \"G1\"\ndescription = \"\"\n\n\
[[acceptance]]\ncriterion = \"\"\n"
        ),
    )?;
    eprintln!("repokit-agent: workstream '{workstream}' created at {}", dir.display());
    Ok(())
}

async fn serve(
    workstream: &str,
    port: u16,
    project_root: &Path,
    mux: Arc<dyn Multiplexer>,
) -> Result<()> {
    let config = AgentConfig::load_project(project_root)?;
    let coordinator = Coordinator::new(
        CoordinatorConfig::from_agent_config(workstream, &config),
        mux,
        Arc::new(CodeRabbitCli::new()),
    );
    let listener = TcpListener::bind(("127.0.0.1", port))
        .await
        .map_err(|e| AgentError::Server {
            reason: format!("failed to bind 127.0.0.1:{port}: {e}"),
        })?;
    eprintln!("repokit-agent: team server on http://127.0.0.1:{port} (workstream '{workstream}')");
    eprintln!("Press Ctrl-C to stop the session and kill all agent panes.");

    coordinator
        .run(listener, async {
            super::interrupted().await;
            eprintln!("repokit-agent: stopping team session");
        })
        .await
}
