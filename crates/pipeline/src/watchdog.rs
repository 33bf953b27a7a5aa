//! Reliability watchdog
//!
//! One periodic task per session. Whenever the session has sat in a busy
//! state longer than allowed it is forced back to LISTENING, the stuck turn
//! task is aborted and the client is told. The watchdog never ends a session.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use parley_config::WatchdogConfig;
use parley_core::ServerEvent;

use crate::conversation::Conversation;
use crate::error::TurnError;
use crate::metrics;
use crate::state::TurnState;

#[derive(Debug, Clone, Copy)]
pub struct ReliabilityWatchdog {
    tick: Duration,
    max_state_duration: Duration,
}

impl ReliabilityWatchdog {
    pub fn new(config: &WatchdogConfig) -> Self {
        Self {
            tick: config.tick(),
            max_state_duration: config.max_state_duration(),
        }
    }

    pub fn tick(&self) -> Duration {
        self.tick
    }

    pub fn max_state_duration(&self) -> Duration {
        self.max_state_duration
    }

    /// One watchdog pass. Resets at most once.
    pub fn check(&self, conv: &Conversation) -> Option<TurnError> {
        let expired = conv.machine().expire_overdue(self.max_state_duration)?;
        conv.cancel_turn(expired.ticket);

        let error = TurnError::WatchdogForcedReset {
            state: expired.state,
            elapsed: expired.elapsed,
        };
        conv.fail_open_turn(error.reason());
        tracing::warn!(
            session_id = %conv.id(),
            state = %expired.state,
            elapsed_ms = expired.elapsed.as_millis() as u64,
            "Watchdog forced reset"
        );
        metrics::record_watchdog_reset(expired.state);
        conv.emit(ServerEvent::error(error.to_string(), error.reason()));
        Some(error)
    }

    /// Start the periodic task for `conv`
    pub fn spawn(self, conv: Arc<Conversation>) -> WatchdogHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(self.tick);
            interval_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = interval_timer.tick() => {
                        if conv.state() == TurnState::Disconnected {
                            break;
                        }
                        self.check(&conv);
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!(session_id = %conv.id(), "Watchdog stopped");
        });

        WatchdogHandle {
            shutdown: shutdown_tx,
            task,
        }
    }
}

/// Owner of a running watchdog task
pub struct WatchdogHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl WatchdogHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Signal the task and wait for it to exit
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            if e.is_panic() {
                tracing::error!(error = %e, "Watchdog task panicked");
            }
        }
    }
}
