use clap::Parser;
use tracing_subscriber::EnvFilter;

use repokit_agent::cli::{self, Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr: hooks and stdio servers own stdout.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.command.default_log_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match cli.command {
        Commands::CheckBash(args) => cli::check_bash::run(&args)?,
        Commands::Idle { port } => cli::hooks::idle(port).await?,
        Commands::ApproveMcp { debug_log } => cli::hooks::approve_mcp(debug_log.as_deref())?,
        Commands::Run(args) => cli::run::run(args).await?,
        Commands::Team { command } => cli::team::run(command).await?,
        Commands::TicketsMcp { project_root, role } => {
            cli::serve::tickets(&project_root, role).await?
        }
        Commands::ReviewMcp => cli::serve::review().await?,
    }

    Ok(())
}
