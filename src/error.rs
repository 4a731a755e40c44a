use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("rules file not found: {path}")]
    RulesNotFound { path: PathBuf },

    #[error("rules parse error in {path}: {reason}")]
    RulesParse { path: PathBuf, reason: String },

    #[error("{section}[{index}] ({name:?}): {reason}")]
    InvalidRule {
        section: String,
        index: usize,
        name: String,
        reason: String,
    },

    #[error("unknown dir constraint: {spec:?}")]
    UnknownDirConstraint { spec: String },

    #[error("config parse error in {path}: {reason}")]
    ConfigParse { path: PathBuf, reason: String },

    #[error("unknown backend: {name}")]
    UnknownBackend { name: String },

    #[error("backend error: {reason}")]
    Backend { reason: String },

    #[error("multiplexer not found: {reason}")]
    MultiplexerNotFound { reason: String },

    #[error("pane error: {reason}")]
    Pane { reason: String },

    #[error("pane command timed out after {timeout_secs}s: {command}")]
    PaneTimeout { command: String, timeout_secs: u64 },

    #[error("ticket error: {reason}")]
    Ticket { reason: String },

    #[error("ticket not found: {id}")]
    TicketNotFound { id: String },

    #[error("invalid id {id:?}: must match [A-Za-z0-9_-]+")]
    InvalidId { id: String },

    #[error("server error: {reason}")]
    Server { reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, AgentError>;
