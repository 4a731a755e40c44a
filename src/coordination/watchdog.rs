use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::{Coordinator, PaneRegistry, IDLE_REMINDER};
use crate::pane::{InputSequence, PaneId};

/// A pane that used up its reminders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stalled {
    pub pane_id: PaneId,
    pub workstream: String,
    pub ticket: String,
    pub reminders: u32,
}

/// What one tick decided, computed under the registry lock.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickPlan {
    /// `(pane, reminder number)`.
    pub remind: Vec<(PaneId, u32)>,
    pub kill: Vec<Stalled>,
}

impl TickPlan {
    pub fn is_empty(&self) -> bool {
        self.remind.is_empty() && self.kill.is_empty()
    }
}

/// Count a reminder for every idle pane due one and sort them into
/// reminders and kills. Panes are visited in id order.
pub(crate) fn plan_tick(
    registry: &mut PaneRegistry,
    now: Instant,
    interval: Duration,
    limit: u32,
) -> TickPlan {
    let mut plan = TickPlan::default();
    let mut ids: Vec<PaneId> = registry.panes.keys().copied().collect();
    ids.sort_unstable();

    for id in ids {
        let Some(state) = registry.panes.get_mut(&id) else {
            continue;
        };
        let Some(idle_since) = state.idle_since else {
            continue;
        };
        let since = state.last_reminder.unwrap_or(idle_since);
        if now.saturating_duration_since(since) < interval {
            continue;
        }
        state.reminder_count += 1;
        state.last_reminder = Some(now);
        if state.reminder_count >= limit {
            plan.kill.push(Stalled {
                pane_id: id,
                workstream: state.workstream.clone(),
                ticket: state.ticket.clone(),
                reminders: state.reminder_count,
            });
        } else {
            plan.remind.push((id, state.reminder_count));
        }
    }
    plan
}

pub fn kill_notice(ticket: &str, reminders: u32) -> String {
    format!(
        "TICKET {ticket}: status=open notes='agent killed after {reminders} idle reminders \
- possible context rot or non-compliance'"
    )
}

impl Coordinator {
    pub(crate) async fn watchdog(self, mut stop: watch::Receiver<bool>) {
        let tick = self.config().tick;
        loop {
            tokio::select! {
                _ = tokio::time::sleep(tick) => {}
                _ = stop.changed() => break,
            }
            self.tick().await;
        }
        debug!("watchdog stopped");
    }

    pub async fn tick(&self) -> TickPlan {
        self.tick_at(Instant::now()).await
    }

    /// One watchdog pass as of `now`. Sends the reminders and performs the
    /// kills it decided on; failures are logged and the pass continues.
    pub async fn tick_at(&self, now: Instant) -> TickPlan {
        let plan = {
            let config = self.config();
            let mut registry = self.registry();
            plan_tick(
                &mut registry,
                now,
                config.reminder_interval,
                config.reminder_limit,
            )
        };

        for &(pane, count) in &plan.remind {
            let reminder = InputSequence::submit(IDLE_REMINDER, self.config().input_pause);
            match reminder.send(self.mux(), pane).await {
                Ok(()) => info!(pane, count, "sent idle reminder"),
                Err(e) => debug!(pane, error = %e, "idle reminder failed"),
            }
        }
        for stalled in &plan.kill {
            self.kill_stalled(stalled).await;
        }
        plan
    }

    async fn kill_stalled(&self, stalled: &Stalled) {
        let pane = stalled.pane_id;
        if self.pane(pane).is_none() {
            return;
        }
        warn!(
            pane,
            workstream = %stalled.workstream,
            ticket = %stalled.ticket,
            reminders = stalled.reminders,
            "killing stalled pane"
        );
        if let Err(e) = self.mux().kill_pane(pane).await {
            debug!(pane, error = %e, "kill failed");
        }
        self.deregister_pane(pane);

        let notice = kill_notice(&stalled.ticket, stalled.reminders);
        let orchestrator = match self.mux().list_workspace(&stalled.workstream).await {
            Ok(panes) => panes.first().copied(),
            Err(e) => {
                debug!(error = %e, "could not list workspace panes");
                None
            }
        };
        if let Some(orchestrator) = orchestrator {
            let sent = InputSequence::submit(&notice, self.config().input_pause)
                .send(self.mux(), orchestrator)
                .await;
            if let Err(e) = sent {
                debug!(pane = orchestrator, error = %e, "orchestrator notify failed");
            }
        }
    }

    /// Kill and deregister a pane that reported it is done. A no-op if the
    /// pane is already gone.
    pub async fn cleanup_pane(&self, pane: PaneId) {
        if self.pane(pane).is_none() {
            return;
        }
        info!(pane, "auto-cleanup: killing pane");
        if let Err(e) = self.mux().kill_pane(pane).await {
            debug!(pane, error = %e, "cleanup kill failed");
        }
        self.deregister_pane(pane);
    }

    /// Run [`cleanup_pane`](Self::cleanup_pane) after the configured delay.
    pub(crate) fn schedule_cleanup(&self, pane: PaneId) {
        let this = self.clone();
        let delay = self.config().done_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            this.cleanup_pane(pane).await;
        });
        info!(pane, delay_secs = delay.as_secs(), "pane scheduled for cleanup");
    }
}
