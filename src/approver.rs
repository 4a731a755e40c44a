//! Unattended approval of an agent's permission prompts.
//!
//! The poller watches one pane, asks the backend whether the screen shows a
//! permission prompt, checks shell commands against the rule set and
//! answers with the backend's approve or deny keystroke. Errors are logged
//! and polling continues until [`AutoApprover::stop`] is called.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::backend::{AgentBackend, ToolRequest};
use crate::decision::Verdict;
use crate::error::Result;
use crate::pane::{Multiplexer, PaneId};
use crate::rules::{self, segment::unwrap_screen_command, RuleSet};

const STOP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct ApproverTimings {
    pub poll_interval: Duration,
    /// Pause after answering a prompt, so half-redrawn screens are ignored.
    pub cooldown: Duration,
    /// How long to wait for a denied prompt to disappear.
    pub clear_timeout: Duration,
    pub clear_poll: Duration,
    /// Extra wait once the prompt is gone, before typing the explanation.
    pub settle: Duration,
    /// Gap between the steps of typed input.
    pub input_pause: Duration,
}

impl Default for ApproverTimings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(800),
            cooldown: Duration::from_secs(2),
            clear_timeout: Duration::from_secs(5),
            clear_poll: Duration::from_millis(300),
            settle: Duration::from_millis(500),
            input_pause: Duration::from_millis(300),
        }
    }
}

pub struct ApproverConfig {
    pub backend: Arc<dyn AgentBackend>,
    pub mux: Arc<dyn Multiplexer>,
    pub pane: PaneId,
    pub rules_path: PathBuf,
    pub role: Option<String>,
    pub project_root: Option<PathBuf>,
    /// Directory commands are assumed to run in. Defaults to the project root.
    pub cwd: Option<PathBuf>,
    pub timings: ApproverTimings,
}

/// Decide a detected request. Anything other than a shell command is allowed.
pub fn evaluate(
    request: &ToolRequest,
    rules: &RuleSet,
    project_root: Option<&Path>,
    cwd: Option<&Path>,
) -> Verdict {
    if !request.is_shell() {
        return Verdict::allow(None);
    }
    let command = request.command.as_deref().map(unwrap_screen_command);
    rules::check_command(command.as_deref(), rules, project_root, cwd)
}

/// Handle to a running poller.
pub struct AutoApprover {
    stop_tx: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl AutoApprover {
    /// Load the rule file and start polling on a background task.
    pub fn start(config: ApproverConfig) -> Result<Self> {
        let rules = rules::load_rules(&config.rules_path, config.role.as_deref())?;
        info!(
            pane = config.pane,
            rules = rules.len(),
            path = %config.rules_path.display(),
            "auto-approver loaded rules"
        );
        let (stop_tx, stop_rx) = watch::channel(false);
        let cwd = config.cwd.clone().or_else(|| config.project_root.clone());
        let poller = Poller {
            backend: config.backend,
            mux: config.mux,
            pane: config.pane,
            rules,
            rules_path: config.rules_path,
            project_root: config.project_root,
            cwd,
            timings: config.timings,
            last_hash: None,
            stop: stop_rx,
        };
        let handle = tokio::spawn(poller.run());
        Ok(Self {
            stop_tx,
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signal the poller and wait up to five seconds for it to exit.
    pub async fn stop(mut self) {
        let _ = self.stop_tx.send(true);
        if let Some(handle) = self.handle.take() {
            if tokio::time::timeout(STOP_TIMEOUT, handle).await.is_err() {
                warn!("auto-approver did not stop within {}s", STOP_TIMEOUT.as_secs());
            }
        }
    }
}

struct Poller {
    backend: Arc<dyn AgentBackend>,
    mux: Arc<dyn Multiplexer>,
    pane: PaneId,
    rules: RuleSet,
    rules_path: PathBuf,
    project_root: Option<PathBuf>,
    cwd: Option<PathBuf>,
    timings: ApproverTimings,
    last_hash: Option<[u8; 32]>,
    stop: watch::Receiver<bool>,
}

impl Poller {
    async fn run(mut self) {
        loop {
            if *self.stop.borrow() {
                break;
            }
            let delay = match self.poll_once().await {
                Ok(true) => self.timings.cooldown,
                Ok(false) => self.timings.poll_interval,
                Err(e) => {
                    debug!(pane = self.pane, error = %e, "auto-approve poll failed");
                    self.timings.poll_interval
                }
            };
            if self.sleep_or_stop(delay).await {
                break;
            }
        }
        debug!(pane = self.pane, "auto-approver stopped");
    }

    /// Returns true when the stop signal arrived first.
    async fn sleep_or_stop(&mut self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => false,
            _ = self.stop.changed() => true,
        }
    }

    /// One poll. Returns true if a prompt was answered.
    async fn poll_once(&mut self) -> Result<bool> {
        let text = self.mux.get_text(self.pane).await?;
        if text.is_empty() {
            return Ok(false);
        }
        let hash: [u8; 32] = Sha256::digest(text.as_bytes()).into();
        if self.last_hash == Some(hash) {
            return Ok(false);
        }
        self.last_hash = Some(hash);

        let Some(request) = self.backend.detect_prompt(&text) else {
            return Ok(false);
        };
        let verdict = evaluate(
            &request,
            &self.rules,
            self.project_root.as_deref(),
            self.cwd.as_deref(),
        );
        if verdict.is_allowed() {
            info!(pane = self.pane, %request, "auto-approving");
            self.mux
                .send_keys(self.pane, self.backend.approve_keystroke())
                .await?;
        } else {
            warn!(pane = self.pane, %request, reason = %verdict.reason, "denying");
            self.deny(&verdict.reason).await?;
        }
        Ok(true)
    }

    async fn deny(&mut self, reason: &str) -> Result<()> {
        self.mux
            .send_keys(self.pane, self.backend.deny_keystroke())
            .await?;
        self.wait_for_prompt_clear().await;
        let message = format!(
            "This command was denied: {reason}. See @{} for the rules",
            self.rules_path.display()
        );
        self.backend
            .submit_text(&message, self.timings.input_pause)
            .send(self.mux.as_ref(), self.pane)
            .await
    }

    async fn wait_for_prompt_clear(&mut self) {
        let deadline = Instant::now() + self.timings.clear_timeout;
        while Instant::now() < deadline {
            if self.sleep_or_stop(self.timings.clear_poll).await {
                return;
            }
            let text = self.mux.get_text(self.pane).await.unwrap_or_default();
            if self.backend.detect_prompt(&text).is_none() {
                self.sleep_or_stop(self.timings.settle).await;
                return;
            }
        }
        debug!(pane = self.pane, "timed out waiting for prompt to clear");
    }
}
