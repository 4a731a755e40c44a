use std::path::Path;

use crate::error::Result;
use crate::ipc::stdio::serve_stdio;
use crate::review::{CodeRabbitCli, ReviewServer};
use crate::tickets::{Role, TicketServer, TicketStore};

pub async fn tickets(project_root: &Path, role: Option<Role>) -> Result<()> {
    let store = TicketStore::open(project_root)?;
    tracing::debug!(dir = %store.dir().display(), ?role, "serving tickets");
    serve_stdio(&TicketServer::new(store, role)).await
}

pub async fn review() -> Result<()> {
    serve_stdio(&ReviewServer::new(CodeRabbitCli::new())).await
}
