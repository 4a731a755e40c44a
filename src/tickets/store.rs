use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{ticket_error, validate_id, validate_transition, ReviewResult, Role, Status, Ticket};
use crate::config::{agent_dir, AgentConfig};
use crate::error::{AgentError, Result};

/// Listing entry. Unreadable tickets are reported, not skipped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TicketSummary {
    pub id: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewTicket {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub criteria: Vec<String>,
}

/// Fields `update` may change. Absent fields are left alone.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TicketUpdate {
    pub status: Option<Status>,
    pub notes: Option<String>,
    pub result: Option<ReviewResult>,
    pub feedback: Option<String>,
    pub description: Option<String>,
}

impl TicketUpdate {
    /// Names of the fields present, in a fixed order.
    pub fn fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.status.is_some() {
            fields.push("status");
        }
        if self.notes.is_some() {
            fields.push("notes");
        }
        if self.result.is_some() {
            fields.push("result");
        }
        if self.feedback.is_some() {
            fields.push("feedback");
        }
        if self.description.is_some() {
            fields.push("description");
        }
        fields
    }
}

/// Tickets under `<root>/_agent/tickets`, one `<id>.json` each.
#[derive(Debug, Clone)]
pub struct TicketStore {
    dir: PathBuf,
    required_criteria: Vec<String>,
}

impl TicketStore {
    pub fn new(project_root: &Path) -> Self {
        Self {
            dir: agent_dir(project_root).join("tickets"),
            required_criteria: Vec::new(),
        }
    }

    /// Store for `project_root` with `agent.required_criteria` from its
    /// config.yaml appended to every new ticket.
    pub fn open(project_root: &Path) -> Result<Self> {
        let config = AgentConfig::load_project(project_root)?;
        Ok(Self::new(project_root).with_required_criteria(config.required_criteria))
    }

    pub fn with_required_criteria(mut self, criteria: Vec<String>) -> Self {
        self.required_criteria = criteria;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, id: &str) -> Result<PathBuf> {
        validate_id(id)?;
        Ok(self.dir.join(format!("{id}.json")))
    }

    pub fn list(&self) -> Result<Vec<TicketSummary>> {
        fs::create_dir_all(&self.dir)?;
        let mut paths: Vec<PathBuf> = fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        Ok(paths
            .iter()
            .map(|path| {
                let id = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
                match read_ticket(path, &id) {
                    Ok(ticket) => TicketSummary {
                        id,
                        status: ticket.status().to_string(),
                        error: None,
                    },
                    Err(e) => TicketSummary {
                        id,
                        status: "invalid".into(),
                        error: Some(e.to_string()),
                    },
                }
            })
            .collect())
    }

    pub fn get(&self, id: &str) -> Result<Ticket> {
        read_ticket(&self.path(id)?, id)
    }

    pub fn create(&self, new: NewTicket) -> Result<Ticket> {
        let path = self.path(&new.id)?;
        fs::create_dir_all(&self.dir)?;
        let _lock = FileLock::acquire(&self.dir)?;
        if path.exists() {
            return Err(ticket_error(format!("ticket {:?} already exists", new.id)));
        }

        let mut criteria = new.criteria;
        for required in &self.required_criteria {
            if !criteria.contains(required) {
                criteria.push(required.clone());
            }
        }
        let ticket = Ticket::new(&new.id, &new.title, &new.description, criteria);
        ticket.validate()?;
        write_ticket(&path, &ticket)?;
        tracing::debug!(id = %new.id, "ticket created");
        Ok(ticket)
    }

    /// Apply `update`. Non-status fields land first so the transition check
    /// sees the new review state. Returns the names of the fields changed.
    pub fn update(
        &self,
        id: &str,
        update: &TicketUpdate,
        role: Option<Role>,
    ) -> Result<Vec<&'static str>> {
        let fields = update.fields();
        if let Some(role) = role {
            let forbidden: Vec<&str> = fields
                .iter()
                .copied()
                .filter(|f| !role.update_fields().contains(f))
                .collect();
            if !forbidden.is_empty() {
                return Err(ticket_error(format!(
                    "role {role} cannot update fields: {forbidden:?}"
                )));
            }
        }

        let path = self.path(id)?;
        let _lock = FileLock::acquire(&self.dir)?;
        let mut ticket = read_ticket(&path, id)?;
        if fields.is_empty() {
            return Ok(fields);
        }

        if let Some(notes) = &update.notes {
            ticket.progress.notes = notes.clone();
        }
        if let Some(result) = update.result {
            ticket.review.result = result;
        }
        if let Some(feedback) = &update.feedback {
            ticket.review.feedback = feedback.clone();
        }
        if let Some(description) = &update.description {
            ticket.ticket.description = description.clone();
        }
        if let Some(status) = update.status {
            if status != ticket.status() {
                validate_transition(&ticket, status, role)?;
                ticket.ticket.status = status;
            }
        }

        ticket.validate()?;
        write_ticket(&path, &ticket)?;
        Ok(fields)
    }

    pub fn reset(&self, id: &str) -> Result<Ticket> {
        let path = self.path(id)?;
        let _lock = FileLock::acquire(&self.dir)?;
        let mut ticket = read_ticket(&path, id)?;
        ticket.reset();
        write_ticket(&path, &ticket)?;
        Ok(ticket)
    }

    /// Set `met` on the given criteria. Nothing changes unless every index
    /// is valid.
    pub fn mark_criteria(&self, id: &str, indices: &[i64], met: bool) -> Result<()> {
        if indices.is_empty() {
            return Err(ticket_error("indices must not be empty".into()));
        }
        let path = self.path(id)?;
        let _lock = FileLock::acquire(&self.dir)?;
        let mut ticket = read_ticket(&path, id)?;
        let count = ticket.criteria.len();
        if count == 0 {
            return Err(ticket_error(format!("ticket {id:?} has no criteria")));
        }

        let mut checked = Vec::with_capacity(indices.len());
        for &index in indices {
            let i = usize::try_from(index)
                .map_err(|_| ticket_error(format!("invalid index: {index}")))?;
            if i >= count {
                return Err(ticket_error(format!(
                    "index {i} out of range (ticket has {count} criteria)"
                )));
            }
            checked.push(i);
        }
        for i in checked {
            ticket.criteria[i].met = met;
        }
        write_ticket(&path, &ticket)
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        let path = self.path(id)?;
        let _lock = FileLock::acquire(&self.dir)?;
        if !path.exists() {
            return Err(AgentError::TicketNotFound { id: id.to_string() });
        }
        fs::remove_file(&path)?;
        Ok(())
    }
}

fn read_ticket(path: &Path, id: &str) -> Result<Ticket> {
    if !path.exists() {
        return Err(AgentError::TicketNotFound { id: id.to_string() });
    }
    let contents = fs::read_to_string(path)?;
    let ticket: Ticket = serde_json::from_str(&contents)
        .map_err(|e| ticket_error(format!("ticket {id:?} has invalid schema: {e}")))?;
    ticket
        .validate()
        .map_err(|e| ticket_error(format!("ticket {id:?} has invalid schema: {e}")))?;
    Ok(ticket)
}

fn write_ticket(path: &Path, ticket: &Ticket) -> Result<()> {
    let mut json = serde_json::to_string_pretty(ticket)?;
    json.push('\n');
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(json.as_bytes())?;
    tmp.as_file().sync_all()?;
    set_file_permissions_0600(tmp.path());
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions_0600(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    let _ = fs::set_permissions(path, fs::Permissions::from_mode(0o600));
}

#[cfg(not(unix))]
fn set_file_permissions_0600(_path: &Path) {}

/// Advisory lock on `<tickets dir>/.lock`, held for one read-modify-write.
struct FileLock {
    _file: fs::File,
}

impl FileLock {
    fn acquire(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let file = fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(dir.join(".lock"))?;
        flock_exclusive(&file)?;
        Ok(Self { _file: file })
    }
}

// Dropping the file releases the lock.

#[cfg(unix)]
fn flock_exclusive(file: &fs::File) -> Result<()> {
    use std::os::unix::io::AsRawFd;
    let ret = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) };
    if ret != 0 {
        return Err(AgentError::Io(std::io::Error::last_os_error()));
    }
    Ok(())
}

#[cfg(not(unix))]
fn flock_exclusive(_file: &fs::File) -> Result<()> {
    Ok(())
}
