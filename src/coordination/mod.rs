//! Team coordination server for one workstream.
//!
//! Tracks the agent panes of a team session, nudges panes that sit idle,
//! kills the ones that never respond, and relays `send_message` calls
//! between panes. Hook processes talk to it over two plain HTTP endpoints
//! (`/register`, `/idle`); agents call its tools over JSON-RPC (`/mcp`).
//!
//! All pane state lives behind one mutex. Pane I/O goes through the
//! [`Multiplexer`] and is never performed while that mutex is held.

pub mod http;
pub mod tools;
pub mod watchdog;

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::config::AgentConfig;
use crate::error::{AgentError, Result};
use crate::pane::{Multiplexer, PaneId};
use crate::review::ReviewRunner;

/// `serverInfo.name` reported to agents.
pub const SERVER_NAME: &str = "repokit-team";

/// Largest request body accepted by the HTTP surface.
pub const MAX_BODY_SIZE: usize = 1_048_576;

pub const IDLE_REMINDER: &str = "You appear idle. Use the send_message tool to report your \
ticket status, or /exit if your work is complete.";

/// Body of `POST /register`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub pane_id: PaneId,
    pub role: String,
    pub workstream: String,
    pub ticket: String,
}

/// One registered agent pane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaneState {
    pub pane_id: PaneId,
    pub role: String,
    pub workstream: String,
    pub ticket: String,
    /// Set when the agent finished a turn; cleared by activity.
    pub idle_since: Option<Instant>,
    pub reminder_count: u32,
    pub last_reminder: Option<Instant>,
}

impl PaneState {
    fn new(registration: Registration) -> Self {
        Self {
            pane_id: registration.pane_id,
            role: registration.role,
            workstream: registration.workstream,
            ticket: registration.ticket,
            idle_since: None,
            reminder_count: 0,
            last_reminder: None,
        }
    }

    fn mark_active(&mut self) {
        self.idle_since = None;
        self.reminder_count = 0;
        self.last_reminder = None;
    }
}

/// Pane table plus the `(workstream, ticket) -> pane` index. Both are only
/// ever touched together, under [`Coordinator`]'s lock.
#[derive(Debug, Default)]
pub(crate) struct PaneRegistry {
    pub(crate) panes: HashMap<PaneId, PaneState>,
    routes: HashMap<(String, String), PaneId>,
}

impl PaneRegistry {
    fn insert(&mut self, registration: Registration) {
        let pane_id = registration.pane_id;
        if let Some(old) = self.panes.remove(&pane_id) {
            self.unroute(&old);
        }
        self.routes.insert(
            (registration.workstream.clone(), registration.ticket.clone()),
            pane_id,
        );
        self.panes.insert(pane_id, PaneState::new(registration));
    }

    pub(crate) fn remove(&mut self, pane: PaneId) -> Option<PaneState> {
        let state = self.panes.remove(&pane)?;
        self.unroute(&state);
        Some(state)
    }

    /// Drop the route for `state`, unless a newer pane has taken it over.
    fn unroute(&mut self, state: &PaneState) {
        let key = (state.workstream.clone(), state.ticket.clone());
        if self.routes.get(&key) == Some(&state.pane_id) {
            self.routes.remove(&key);
        }
    }

    fn route(&self, workstream: &str, ticket: &str) -> Option<PaneId> {
        self.routes
            .get(&(workstream.to_string(), ticket.to_string()))
            .copied()
    }
}

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Default workstream for `send_message` calls that name none.
    pub workstream: String,
    /// Idle time before the first reminder, and between reminders.
    pub reminder_interval: Duration,
    /// Reminders counted before the pane is killed.
    pub reminder_limit: u32,
    pub tick: Duration,
    /// Grace period between `send_message(done=true)` and the pane kill.
    pub done_delay: Duration,
    pub input_pause: Duration,
}

impl CoordinatorConfig {
    pub fn new(workstream: impl Into<String>) -> Self {
        Self {
            workstream: workstream.into(),
            reminder_interval: Duration::from_secs(120),
            reminder_limit: 3,
            tick: Duration::from_secs(10),
            done_delay: Duration::from_secs(5),
            input_pause: Duration::from_millis(300),
        }
    }

    pub fn from_agent_config(workstream: impl Into<String>, config: &AgentConfig) -> Self {
        Self {
            reminder_interval: Duration::from_secs(config.idle_reminder_interval),
            reminder_limit: config.idle_reminder_limit,
            ..Self::new(workstream)
        }
    }
}

struct Shared {
    config: CoordinatorConfig,
    registry: Mutex<PaneRegistry>,
    mux: Arc<dyn Multiplexer>,
    reviewer: Arc<dyn ReviewRunner>,
}

/// Cheap to clone; clones share one registry.
#[derive(Clone)]
pub struct Coordinator {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("config", &self.shared.config)
            .field("panes", &self.pane_ids())
            .finish()
    }
}

impl Coordinator {
    pub fn new(
        config: CoordinatorConfig,
        mux: Arc<dyn Multiplexer>,
        reviewer: Arc<dyn ReviewRunner>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                registry: Mutex::new(PaneRegistry::default()),
                mux,
                reviewer,
            }),
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.shared.config
    }

    pub(crate) fn mux(&self) -> &dyn Multiplexer {
        self.shared.mux.as_ref()
    }

    pub(crate) fn reviewer(&self) -> &dyn ReviewRunner {
        self.shared.reviewer.as_ref()
    }

    /// Never hold the guard across an `.await`.
    pub(crate) fn registry(&self) -> MutexGuard<'_, PaneRegistry> {
        self.shared
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a pane, replacing any earlier record with the same id.
    pub fn register_pane(&self, registration: Registration) {
        info!(
            pane = registration.pane_id,
            role = %registration.role,
            workstream = %registration.workstream,
            ticket = %registration.ticket,
            "registered pane"
        );
        self.registry().insert(registration);
    }

    /// Remove a pane. A no-op if it is already gone.
    pub fn deregister_pane(&self, pane: PaneId) -> Option<PaneState> {
        self.registry().remove(pane)
    }

    /// The agent in `pane` finished a turn. Unknown panes are ignored and an
    /// idle period already in progress is kept.
    pub fn notify_idle(&self, pane: PaneId) {
        self.notify_idle_at(pane, Instant::now());
    }

    pub fn notify_idle_at(&self, pane: PaneId, now: Instant) {
        let mut registry = self.registry();
        if let Some(state) = registry.panes.get_mut(&pane) {
            if state.idle_since.is_none() {
                debug!(pane, "pane idle");
                state.idle_since = Some(now);
            }
        }
    }

    /// The agent holding `ticket` in `workstream` reported in; clear its idle
    /// tracking.
    pub fn notify_active(&self, workstream: &str, ticket: &str) {
        let mut registry = self.registry();
        if let Some(pane) = registry.route(workstream, ticket) {
            if let Some(state) = registry.panes.get_mut(&pane) {
                state.mark_active();
            }
        }
    }

    pub fn pane(&self, pane: PaneId) -> Option<PaneState> {
        self.registry().panes.get(&pane).cloned()
    }

    pub fn route(&self, workstream: &str, ticket: &str) -> Option<PaneId> {
        self.registry().route(workstream, ticket)
    }

    pub fn pane_ids(&self) -> Vec<PaneId> {
        let mut ids: Vec<PaneId> = self.registry().panes.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Kill every registered pane, best effort. Returns how many kills
    /// succeeded.
    pub async fn shutdown_all_panes(&self) -> usize {
        let panes = self.pane_ids();
        let mut killed = 0;
        for pane in panes {
            match self.mux().kill_pane(pane).await {
                Ok(()) => {
                    info!(pane, "killed pane");
                    killed += 1;
                }
                Err(e) => debug!(pane, error = %e, "failed to kill pane"),
            }
            self.deregister_pane(pane);
        }
        info!(workstream = %self.config().workstream, "team session ended");
        killed
    }

    /// Serve on `listener` with the watchdog running until `shutdown`
    /// resolves, then kill every registered pane.
    pub async fn run<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        info!(
            %addr,
            workstream = %self.config().workstream,
            "team server listening"
        );

        let (stop_tx, stop_rx) = watch::channel(false);
        let watchdog = tokio::spawn(self.clone().watchdog(stop_rx));

        let served = axum::serve(listener, http::router(self.clone()))
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| AgentError::Server {
                reason: format!("HTTP server error: {e}"),
            });

        let _ = stop_tx.send(true);
        if let Err(e) = watchdog.await {
            debug!(error = %e, "watchdog task ended abnormally");
        }
        self.shutdown_all_panes().await;
        served
    }
}

/// A TCP port on 127.0.0.1 that was free a moment ago.
pub fn find_free_port() -> Result<u16> {
    let listener = std::net::TcpListener::bind(("127.0.0.1", 0))?;
    Ok(listener.local_addr()?.port())
}

/// Workstream ids become directory names.
pub fn validate_workstream(id: &str) -> Result<()> {
    crate::tickets::validate_id(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reg(pane_id: PaneId, ticket: &str) -> Registration {
        Registration {
            pane_id,
            role: "worker".into(),
            workstream: "ws1".into(),
            ticket: ticket.into(),
        }
    }

    #[test]
    fn reregistering_a_pane_moves_its_route() {
        let mut registry = PaneRegistry::default();
        registry.insert(reg(7, "A"));
        registry.insert(reg(7, "B"));
        assert_eq!(registry.route("ws1", "A"), None);
        assert_eq!(registry.route("ws1", "B"), Some(7));
        assert_eq!(registry.panes.len(), 1);
    }

    #[test]
    fn removing_a_stale_pane_keeps_the_newer_route() {
        let mut registry = PaneRegistry::default();
        registry.insert(reg(1, "A"));
        registry.insert(reg(2, "A"));
        registry.remove(1);
        assert_eq!(registry.route("ws1", "A"), Some(2));
        assert!(registry.remove(1).is_none());
    }

    #[test]
    fn free_port_is_nonzero() {
        assert_ne!(find_free_port().unwrap(), 0);
    }
}
