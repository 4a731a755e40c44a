use serde::{Deserialize, Serialize};

/// The two possible outcomes of a permission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Allow,
    Deny,
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Decision::Allow => write!(f, "allow"),
            Decision::Deny => write!(f, "deny"),
        }
    }
}

/// Result of checking one command against a rule set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub decision: Decision,

    /// Denial explanation. Empty when allowed.
    pub reason: String,

    /// Name of the rule that decided, if any rule did.
    pub rule: Option<String>,
}

impl Verdict {
    pub fn allow(rule: Option<String>) -> Self {
        Self {
            decision: Decision::Allow,
            reason: String::new(),
            rule,
        }
    }

    pub fn deny(reason: impl Into<String>, rule: Option<String>) -> Self {
        Self {
            decision: Decision::Deny,
            reason: reason.into(),
            rule,
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.decision == Decision::Allow
    }
}

/// Hook event delivered on stdin by the agent CLI.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HookInput {
    #[serde(default)]
    pub tool_name: Option<String>,
    #[serde(default)]
    pub tool_input: serde_json::Value,
    #[serde(default)]
    pub cwd: Option<String>,
}

impl HookInput {
    /// The shell command carried by a Bash tool call.
    pub fn command(&self) -> Option<&str> {
        self.tool_input.get("command").and_then(|c| c.as_str())
    }
}

/// Hook response printed to stdout.
#[derive(Debug, Clone, Serialize)]
pub struct HookOutput {
    #[serde(rename = "hookSpecificOutput")]
    pub hook_specific_output: HookSpecificOutput,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum HookSpecificOutput {
    PreToolUse {
        #[serde(rename = "hookEventName")]
        hook_event_name: &'static str,
        #[serde(rename = "permissionDecision")]
        permission_decision: Decision,
        #[serde(
            rename = "permissionDecisionReason",
            skip_serializing_if = "Option::is_none"
        )]
        permission_decision_reason: Option<String>,
    },
    PermissionRequest {
        #[serde(rename = "hookEventName")]
        hook_event_name: &'static str,
        decision: PermissionBehavior,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct PermissionBehavior {
    pub behavior: Decision,
}

impl HookOutput {
    pub fn pre_tool_use(decision: Decision, reason: Option<String>) -> Self {
        Self {
            hook_specific_output: HookSpecificOutput::PreToolUse {
                hook_event_name: "PreToolUse",
                permission_decision: decision,
                permission_decision_reason: reason,
            },
        }
    }

    pub fn permission_request(decision: Decision) -> Self {
        Self {
            hook_specific_output: HookSpecificOutput::PermissionRequest {
                hook_event_name: "PermissionRequest",
                decision: PermissionBehavior { behavior: decision },
            },
        }
    }
}
