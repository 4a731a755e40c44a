use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::store::{NewTicket, TicketStore, TicketUpdate};
use super::Role;
use crate::error::{AgentError, Result};
use crate::ipc::{str_arg, unknown_tool, ToolHandler, ToolOutcome};

const TOOL_NAMES: &[&str] = &[
    "list_tickets",
    "get_ticket",
    "create_ticket",
    "update_ticket",
    "reset_ticket",
    "mark_criteria",
    "delete_ticket",
];

/// Ticket tools over JSON-RPC, gated by the caller's role when one is set.
pub struct TicketServer {
    store: TicketStore,
    role: Option<Role>,
}

#[derive(Deserialize)]
struct MarkArgs {
    #[serde(default)]
    indices: Vec<i64>,
    #[serde(default = "default_met")]
    met: bool,
}

fn default_met() -> bool {
    true
}

impl TicketServer {
    pub fn new(store: TicketStore, role: Option<Role>) -> Self {
        Self { store, role }
    }

    fn run(&self, name: &str, args: &Value) -> Result<String> {
        match name {
            "list_tickets" => Ok(serde_json::to_string(&self.store.list()?)?),
            "get_ticket" => {
                let ticket = self.store.get(str_arg(args, "ticket_id"))?;
                Ok(serde_json::to_string_pretty(&ticket)?)
            }
            "create_ticket" => {
                let mut new: NewTicket = parse_args(args)?;
                new.id = new.id.trim().to_string();
                let ticket = self.store.create(new)?;
                Ok(format!("Ticket '{}' created", ticket.id()))
            }
            "update_ticket" => {
                let id = str_arg(args, "ticket_id");
                let update: TicketUpdate = parse_args(args)?;
                let fields = self.store.update(id, &update, self.role)?;
                if fields.is_empty() {
                    Ok("No fields to update".into())
                } else {
                    Ok(format!("Ticket '{id}' updated: {}", fields.join(", ")))
                }
            }
            "reset_ticket" => {
                let id = str_arg(args, "ticket_id");
                self.store.reset(id)?;
                Ok(format!("Ticket '{id}' reset to todo"))
            }
            "mark_criteria" => {
                let id = str_arg(args, "ticket_id");
                let mark: MarkArgs = parse_args(args)?;
                self.store.mark_criteria(id, &mark.indices, mark.met)?;
                Ok(format!(
                    "Ticket '{id}' criteria updated: indices {:?} -> met={}",
                    mark.indices, mark.met
                ))
            }
            "delete_ticket" => {
                let id = str_arg(args, "ticket_id");
                self.store.delete(id)?;
                Ok(format!("Ticket '{id}' deleted"))
            }
            other => Err(AgentError::Ticket {
                reason: format!("no handler for {other}"),
            }),
        }
    }
}

fn parse_args<T: serde::de::DeserializeOwned>(args: &Value) -> Result<T> {
    serde_json::from_value(args.clone()).map_err(|e| AgentError::Ticket {
        reason: format!("invalid arguments: {e}"),
    })
}

#[async_trait]
impl ToolHandler for TicketServer {
    fn server_name(&self) -> &str {
        "tickets"
    }

    fn tools(&self) -> Vec<Value> {
        tool_definitions()
    }

    async fn call_tool(&self, name: &str, arguments: &Value) -> Result<ToolOutcome> {
        if !TOOL_NAMES.contains(&name) {
            return Ok(unknown_tool(name));
        }
        if let Some(role) = self.role {
            if !role.allowed_tools().contains(&name) {
                return Ok(ToolOutcome::error(format!(
                    "role {role:?} cannot use tool {name:?}",
                    role = role.as_str()
                )));
            }
        }
        Ok(match self.run(name, arguments) {
            Ok(text) => ToolOutcome::ok(text),
            Err(e) => ToolOutcome::error(e.to_string()),
        })
    }
}

fn id_schema() -> Value {
    json!({"type": "string", "description": "Ticket identifier."})
}

fn tool_definitions() -> Vec<Value> {
    vec![
        json!({
            "name": "list_tickets",
            "description": "List all tickets with their id and status.",
            "inputSchema": {"type": "object", "properties": {}},
        }),
        json!({
            "name": "get_ticket",
            "description": "Return the full JSON content of a ticket.",
            "inputSchema": {
                "type": "object",
                "properties": {"ticket_id": id_schema()},
                "required": ["ticket_id"],
            },
        }),
        json!({
            "name": "create_ticket",
            "description": "Create a new ticket JSON file.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "id": {
                        "type": "string",
                        "description": "Short descriptive kebab-case id (e.g. 'add-auth-hook').",
                    },
                    "title": {"type": "string", "description": "Short task title."},
                    "description": {
                        "type": "string",
                        "description": "Detailed implementation instructions.",
                    },
                    "criteria": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Acceptance criteria (optional).",
                    },
                },
                "required": ["id", "title", "description"],
            },
        }),
        json!({
            "name": "update_ticket",
            "description": "Update fields on an existing ticket. Only provided fields are changed.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "ticket_id": id_schema(),
                    "status": {
                        "type": "string",
                        "enum": ["todo", "in_progress", "verify", "closed"],
                        "description": "New ticket status.",
                    },
                    "notes": {"type": "string", "description": "Progress notes to set."},
                    "result": {
                        "type": "string",
                        "enum": ["pass", "fail", ""],
                        "description": "Review result.",
                    },
                    "feedback": {"type": "string", "description": "Review feedback."},
                    "description": {"type": "string", "description": "New ticket description."},
                },
                "required": ["ticket_id"],
            },
        }),
        json!({
            "name": "reset_ticket",
            "description": "Reset a ticket to 'todo' status, clearing progress and review.",
            "inputSchema": {
                "type": "object",
                "properties": {"ticket_id": id_schema()},
                "required": ["ticket_id"],
            },
        }),
        json!({
            "name": "mark_criteria",
            "description": "Mark specific acceptance criteria as met or unmet.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "ticket_id": id_schema(),
                    "indices": {
                        "type": "array",
                        "items": {"type": "integer"},
                        "description": "Zero-based indices of criteria to update.",
                    },
                    "met": {
                        "type": "boolean",
                        "description": "Whether to mark as met (default true).",
                    },
                },
                "required": ["ticket_id", "indices"],
            },
        }),
        json!({
            "name": "delete_ticket",
            "description": "Delete a ticket JSON file.",
            "inputSchema": {
                "type": "object",
                "properties": {"ticket_id": id_schema()},
                "required": ["ticket_id"],
            },
        }),
    ]
}
