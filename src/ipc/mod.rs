//! JSON-RPC 2.0 tool servers, shared by the stdio servers and the
//! coordination server's HTTP endpoint.

pub mod client;
pub mod stdio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::Result;

pub const PROTOCOL_VERSION: &str = "2024-11-05";

pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INTERNAL_ERROR: i64 = -32603;

/// Incoming JSON-RPC message. A missing or null `id` marks a notification.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl RpcRequest {
    pub fn is_notification(&self) -> bool {
        self.id.is_none() || self.method.starts_with("notifications/")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    pub fn result(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
        }
    }
}

/// Text result of one tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutcome {
    pub text: String,
    pub is_error: bool,
}

impl ToolOutcome {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: false,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: true,
        }
    }

    /// The `tools/call` result object. `isError` is present only when set.
    pub fn to_result(&self) -> Value {
        let mut result = json!({"content": [{"type": "text", "text": self.text}]});
        if self.is_error {
            result["isError"] = Value::Bool(true);
        }
        result
    }
}

/// A set of tools served over JSON-RPC.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// `serverInfo.name` reported by `initialize`.
    fn server_name(&self) -> &str;

    fn server_version(&self) -> &str {
        "0.1"
    }

    /// Tool definitions for `tools/list`.
    fn tools(&self) -> Vec<Value>;

    /// Run one tool. Tool-level failures, including unknown tool names, are
    /// reported through [`ToolOutcome::error`]; `Err` becomes an internal
    /// error response.
    async fn call_tool(&self, name: &str, arguments: &Value) -> Result<ToolOutcome>;
}

pub fn unknown_tool(name: &str) -> ToolOutcome {
    ToolOutcome::error(format!("Unknown tool: {name:?}"))
}

/// Answer one request. Notifications produce `None`.
pub async fn dispatch(handler: &dyn ToolHandler, request: &RpcRequest) -> Option<RpcResponse> {
    if request.is_notification() {
        return None;
    }
    let id = request.id.clone().unwrap_or(Value::Null);

    let response = match request.method.as_str() {
        "initialize" => RpcResponse::result(
            id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {"tools": {"listChanged": false}},
                "serverInfo": {"name": handler.server_name(), "version": handler.server_version()},
            }),
        ),
        "ping" => RpcResponse::result(id, json!({})),
        "tools/list" => RpcResponse::result(id, json!({"tools": handler.tools()})),
        "tools/call" => {
            let name = request
                .params
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let arguments = request
                .params
                .get("arguments")
                .cloned()
                .unwrap_or_else(|| json!({}));
            match handler.call_tool(name, &arguments).await {
                Ok(outcome) => RpcResponse::result(id, outcome.to_result()),
                Err(e) => {
                    tracing::error!(tool = name, error = %e, "tool call failed");
                    RpcResponse::error(id, INTERNAL_ERROR, "Internal error")
                }
            }
        }
        other => RpcResponse::error(id, METHOD_NOT_FOUND, format!("Method not found: {other}")),
    };
    Some(response)
}

/// Extract a string argument, trimmed. Missing or non-string gives "".
pub fn str_arg<'a>(arguments: &'a Value, key: &str) -> &'a str {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default()
}
