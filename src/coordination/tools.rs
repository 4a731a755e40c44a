use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use super::{Coordinator, SERVER_NAME};
use crate::error::Result;
use crate::ipc::{str_arg, unknown_tool, ToolHandler, ToolOutcome};
use crate::pane::{InputSequence, PaneId};
use crate::review::{review_args, review_tool_definition, REVIEW_TOOL};

pub const SEND_MESSAGE: &str = "send_message";

const ORCHESTRATOR: &str = "orchestrator";

impl Coordinator {
    /// Relay `message` to the orchestrating pane (the workstream's first
    /// pane) or to a pane by numeric id.
    ///
    /// Naming a ticket counts as activity for the pane holding it. With
    /// `done` set, that pane is killed shortly after delivery.
    pub async fn send_message(&self, arguments: &Value) -> ToolOutcome {
        let target = match str_arg(arguments, "target") {
            "" => ORCHESTRATOR,
            target => target,
        };
        let workstream = match str_arg(arguments, "workstream") {
            "" => self.config().workstream.as_str(),
            ws => ws,
        };
        let ticket = str_arg(arguments, "ticket");
        let message = arguments
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let done = arguments
            .get("done")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        if !ticket.is_empty() {
            self.notify_active(workstream, ticket);
        }
        // Resolve the caller before delivery, while its route still exists.
        let caller = if done && !ticket.is_empty() {
            self.route(workstream, ticket)
        } else {
            None
        };

        let panes = match self.mux().list_workspace(workstream).await {
            Ok(panes) => panes,
            Err(e) => return ToolOutcome::error(format!("Failed to list panes: {e}")),
        };
        let Some(&orchestrator) = panes.first() else {
            return ToolOutcome::error(format!("No panes in workspace '{workstream}'"));
        };

        let target_pane = if target == ORCHESTRATOR {
            orchestrator
        } else {
            let Ok(id) = target.parse::<PaneId>() else {
                return ToolOutcome::error(format!("Invalid target: {target:?}"));
            };
            if !panes.contains(&id) {
                return ToolOutcome::error(format!(
                    "Target '{target}' not found in '{workstream}'"
                ));
            }
            id
        };

        let delivered = InputSequence::submit(message, self.config().input_pause)
            .send(self.mux(), target_pane)
            .await;
        if let Err(e) = delivered {
            return ToolOutcome::error(format!(
                "Failed to deliver message to pane {target_pane}: {e}"
            ));
        }
        info!(pane = target_pane, text = message, "send_message delivered");

        match caller {
            Some(pane) => {
                self.schedule_cleanup(pane);
                ToolOutcome::ok("Message sent. Your pane will be cleaned up automatically.")
            }
            None => ToolOutcome::ok("Message sent."),
        }
    }

    pub async fn review(&self, arguments: &Value) -> ToolOutcome {
        match review_args(arguments, None) {
            Ok((path, mode)) => self.reviewer().run_review(&path, &mode).await,
            Err(outcome) => outcome,
        }
    }
}

#[async_trait]
impl ToolHandler for Coordinator {
    fn server_name(&self) -> &str {
        SERVER_NAME
    }

    fn tools(&self) -> Vec<Value> {
        vec![review_tool_definition(true), send_message_definition()]
    }

    async fn call_tool(&self, name: &str, arguments: &Value) -> Result<ToolOutcome> {
        Ok(match name {
            SEND_MESSAGE => self.send_message(arguments).await,
            REVIEW_TOOL => self.review(arguments).await,
            other => unknown_tool(other),
        })
    }
}

fn send_message_definition() -> Value {
    json!({
        "name": SEND_MESSAGE,
        "description": "Relay a status message to the orchestrator. \
Use this to report ticket status (verify/closed/open) when your work is done. \
Calling this tool resets your idle timer. \
Set done=true on your final call; the server will kill your pane automatically \
so you do not need to /exit.",
        "inputSchema": {
            "type": "object",
            "properties": {
                "target": {
                    "type": "string",
                    "description": "Target: 'orchestrator' (default) or numeric pane_id",
                    "default": "orchestrator",
                },
                "workstream": {"type": "string", "description": "Workstream ID"},
                "ticket": {
                    "type": "string",
                    "description": "Your ticket ID; resets your idle reminder counter",
                },
                "message": {
                    "type": "string",
                    "description": "Message text, e.g. 'TICKET G1_1: status=verify notes=...'",
                },
                "done": {
                    "type": "boolean",
                    "description": "Set true on your final send_message call. \
The server will terminate your pane a few seconds after delivery.",
                    "default": false,
                },
            },
            "required": ["workstream", "message"],
        },
    })
}
