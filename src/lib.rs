//! Terminal coding agents under rule-based supervision.
//!
//! - [`rules`]: parse shell commands and decide them against a TOML rule file.
//! - [`approver`]: answer an agent's on-screen permission prompts.
//! - [`coordination`]: pane registry, idle watchdog and message relay for
//!   multi-agent team sessions.
//! - [`tickets`]: file-backed work tickets with a role-gated status machine.

pub mod approver;
pub mod backend;
pub mod cli;
pub mod config;
pub mod coordination;
pub mod decision;
pub mod error;
pub mod ipc;
pub mod pane;
pub mod review;
pub mod rules;
pub mod tickets;

pub use error::{AgentError, Result};
