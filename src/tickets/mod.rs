//! File-backed tickets and the status machine the team roles share.
//!
//! ```text
//! todo ──► in_progress ──► verify ──► closed
//!   │                        │
//!   └────────────────────────┤
//!   ◄────────────────────────┘ (review failed)
//! ```

pub mod mcp;
pub mod store;

pub use mcp::TicketServer;
pub use store::TicketStore;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};

/// Agent role in a team session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Orchestrator,
    Worker,
    Reviewer,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Orchestrator, Role::Worker, Role::Reviewer];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Orchestrator => "orchestrator",
            Role::Worker => "worker",
            Role::Reviewer => "reviewer",
        }
    }

    /// Ticket tools this role may call.
    pub fn allowed_tools(&self) -> &'static [&'static str] {
        match self {
            Role::Orchestrator => &[
                "list_tickets",
                "get_ticket",
                "create_ticket",
                "update_ticket",
                "reset_ticket",
                "mark_criteria",
                "delete_ticket",
            ],
            Role::Worker => &["list_tickets", "get_ticket", "update_ticket"],
            Role::Reviewer => &["list_tickets", "get_ticket", "update_ticket", "mark_criteria"],
        }
    }

    /// Fields this role may set through `update_ticket`.
    pub fn update_fields(&self) -> &'static [&'static str] {
        match self {
            Role::Orchestrator => &["status", "notes", "result", "feedback", "description"],
            Role::Worker => &["status", "notes"],
            Role::Reviewer => &["status", "result", "feedback"],
        }
    }

    pub fn can_transition(&self, from: Status, to: Status) -> bool {
        use Status::*;
        match self {
            Role::Orchestrator => from.can_move_to(to),
            Role::Worker => matches!((from, to), (Todo, InProgress) | (Todo, Verify) | (InProgress, Verify)),
            Role::Reviewer => matches!((from, to), (Verify, Closed) | (Verify, Todo)),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "orchestrator" => Ok(Role::Orchestrator),
            "worker" => Ok(Role::Worker),
            "reviewer" => Ok(Role::Reviewer),
            other => Err(format!(
                "unknown role {other:?} (expected orchestrator, worker or reviewer)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Todo,
    InProgress,
    Verify,
    Closed,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Todo => "todo",
            Status::InProgress => "in_progress",
            Status::Verify => "verify",
            Status::Closed => "closed",
        }
    }

    /// Statuses reachable in one step, regardless of role.
    pub fn successors(&self) -> &'static [Status] {
        match self {
            Status::Todo => &[Status::InProgress, Status::Verify],
            Status::InProgress => &[Status::Verify],
            Status::Verify => &[Status::Closed, Status::Todo],
            Status::Closed => &[],
        }
    }

    pub fn can_move_to(&self, to: Status) -> bool {
        self.successors().contains(&to)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewResult {
    #[default]
    #[serde(rename = "")]
    Pending,
    Pass,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketInfo {
    pub id: String,
    pub title: String,
    pub description: String,
    pub status: Status,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    pub criterion: String,
    pub met: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub notes: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub result: ReviewResult,
    pub feedback: String,
}

/// One ticket document, as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub ticket: TicketInfo,
    #[serde(default)]
    pub criteria: Vec<Criterion>,
    pub progress: Progress,
    pub review: Review,
}

impl Ticket {
    pub fn new(id: &str, title: &str, description: &str, criteria: Vec<String>) -> Self {
        Self {
            ticket: TicketInfo {
                id: id.to_string(),
                title: title.to_string(),
                description: description.to_string(),
                status: Status::Todo,
            },
            criteria: criteria
                .into_iter()
                .map(|criterion| Criterion {
                    criterion,
                    met: false,
                })
                .collect(),
            progress: Progress::default(),
            review: Review::default(),
        }
    }

    pub fn id(&self) -> &str {
        &self.ticket.id
    }

    pub fn status(&self) -> Status {
        self.ticket.status
    }

    /// Checks serde cannot express: required strings must be non-empty.
    pub fn validate(&self) -> Result<()> {
        validate_id(&self.ticket.id)?;
        for (field, value) in [
            ("title", &self.ticket.title),
            ("description", &self.ticket.description),
        ] {
            if value.is_empty() {
                return Err(ticket_error(format!("ticket.{field} must be a non-empty string")));
            }
        }
        Ok(())
    }

    pub fn unmet_criteria(&self) -> Vec<&str> {
        self.criteria
            .iter()
            .filter(|c| !c.met)
            .map(|c| c.criterion.as_str())
            .collect()
    }

    /// Back to `todo` with progress, review and every criterion cleared.
    pub fn reset(&mut self) {
        self.ticket.status = Status::Todo;
        self.progress = Progress::default();
        self.review = Review::default();
        for criterion in &mut self.criteria {
            criterion.met = false;
        }
    }
}

/// Check that `to` is reachable from the ticket's current status, for `role`
/// if one is given, and that the review state permits it.
pub fn validate_transition(ticket: &Ticket, to: Status, role: Option<Role>) -> Result<()> {
    let from = ticket.status();
    if !from.can_move_to(to) {
        let allowed: Vec<&str> = from.successors().iter().map(Status::as_str).collect();
        return Err(ticket_error(format!(
            "invalid transition: {from} -> {to} (allowed: [{}])",
            allowed.join(", ")
        )));
    }

    if let Some(role) = role {
        if !role.can_transition(from, to) {
            return Err(ticket_error(format!(
                "role {role} cannot transition {from} -> {to}"
            )));
        }
    }

    if to == Status::Closed {
        if ticket.review.result != ReviewResult::Pass {
            return Err(ticket_error(
                "cannot close ticket: review.result must be 'pass'".into(),
            ));
        }
        let unmet = ticket.unmet_criteria();
        if !unmet.is_empty() {
            return Err(ticket_error(format!(
                "cannot close ticket: unmet criteria: {unmet:?}"
            )));
        }
    }

    if from == Status::Verify && to == Status::Todo && ticket.review.result != ReviewResult::Fail {
        return Err(ticket_error(
            "cannot reopen from verify: review.result must be 'fail'".into(),
        ));
    }

    Ok(())
}

/// Ticket ids become file names, so only `[A-Za-z0-9_-]+` is accepted.
pub fn validate_id(id: &str) -> Result<()> {
    let ok = !id.is_empty()
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
    if ok {
        Ok(())
    } else {
        Err(AgentError::InvalidId { id: id.to_string() })
    }
}

pub(crate) fn ticket_error(reason: String) -> AgentError {
    AgentError::Ticket { reason }
}
