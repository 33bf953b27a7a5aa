//! Conversational turn state
//!
//! One guarded cell per session holds the state, when it was entered, the
//! turn epoch and the inbound audio buffer. The pipeline and the watchdog
//! both go through it, so every transition is a single critical section.

use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

use crate::ingest::{AudioIngestBuffer, Readiness};
use crate::vad::Observation;

/// Session conversational state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    /// Waiting for the user; the only state that buffers audio
    Listening,
    /// Transcribing the buffered utterance
    Processing,
    /// Generating and speaking a reply
    Responding,
    /// Torn down; terminal
    Disconnected,
}

impl TurnState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnState::Listening => "listening",
            TurnState::Processing => "processing",
            TurnState::Responding => "responding",
            TurnState::Disconnected => "disconnected",
        }
    }

    /// Ordinary transitions. Forced resets and teardown bypass this table.
    pub fn can_transition_to(&self, to: TurnState) -> bool {
        matches!(
            (self, to),
            (TurnState::Listening, TurnState::Processing)
                | (TurnState::Processing, TurnState::Responding)
                | (TurnState::Processing, TurnState::Listening)
                | (TurnState::Responding, TurnState::Listening)
        )
    }
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Proof that a caller started the current turn.
///
/// Issued when the session enters PROCESSING. Any forced reset or teardown
/// invalidates outstanding tickets, so a turn task that lost the race with
/// the watchdog can no longer move the state or speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnTicket(u64);

impl TurnTicket {
    pub fn epoch(&self) -> u64 {
        self.0
    }
}

/// What happened to an inbound audio chunk
#[derive(Debug, Clone, PartialEq)]
pub enum IngestAction {
    /// Not listening; the chunk was dropped
    Ignored(TurnState),
    /// Buffered, not ready yet
    Buffering,
    /// Buffer dropped as noise
    Discarded { mean_energy: f32 },
    /// Utterance complete. The session is now PROCESSING under `ticket`.
    Ready { audio: Vec<u8>, ticket: TurnTicket },
}

#[derive(Debug, Clone, PartialEq)]
pub struct IngestOutcome {
    /// Detector verdict; `None` when the chunk was ignored
    pub observation: Option<Observation>,
    pub action: IngestAction,
}

/// A state that outlived its deadline and was reset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expired {
    pub state: TurnState,
    pub elapsed: Duration,
    /// Ticket of the turn that was cut off
    pub ticket: TurnTicket,
}

struct MachineInner {
    state: TurnState,
    entered_at: Instant,
    epoch: u64,
    ingest: AudioIngestBuffer,
}

impl MachineInner {
    fn enter(&mut self, to: TurnState) {
        match to {
            TurnState::Processing => {
                self.ingest.clear();
                self.epoch += 1;
            }
            TurnState::Listening => self.ingest.reset_speech_flag(),
            TurnState::Responding => {}
            TurnState::Disconnected => {
                self.ingest.clear();
                self.epoch += 1;
            }
        }
        self.state = to;
        self.entered_at = Instant::now();
    }

    fn is_current(&self, ticket: TurnTicket) -> bool {
        self.epoch == ticket.0 && self.state != TurnState::Disconnected
    }

    fn reset_to_listening(&mut self) {
        self.ingest.clear();
        self.epoch += 1;
        self.enter(TurnState::Listening);
    }
}

pub struct TurnStateMachine {
    inner: Mutex<MachineInner>,
}

impl TurnStateMachine {
    pub fn new(ingest: AudioIngestBuffer) -> Self {
        Self {
            inner: Mutex::new(MachineInner {
                state: TurnState::Listening,
                entered_at: Instant::now(),
                epoch: 0,
                ingest,
            }),
        }
    }

    pub fn state(&self) -> TurnState {
        self.inner.lock().state
    }

    /// Time spent in the current state
    pub fn state_age(&self) -> Duration {
        self.inner.lock().entered_at.elapsed()
    }

    pub fn buffered_bytes(&self) -> usize {
        self.inner.lock().ingest.len()
    }

    /// Feed one inbound chunk.
    ///
    /// Outside LISTENING the chunk is ignored. When the buffer becomes ready
    /// the session moves to PROCESSING in the same critical section and the
    /// buffered audio is handed back with the new turn's ticket.
    pub fn ingest(&self, bytes: &[u8]) -> IngestOutcome {
        let mut inner = self.inner.lock();
        if inner.state != TurnState::Listening {
            return IngestOutcome {
                observation: None,
                action: IngestAction::Ignored(inner.state),
            };
        }

        let report = inner.ingest.append(bytes, Instant::now());
        let action = match report.readiness {
            Readiness::Pending => IngestAction::Buffering,
            Readiness::Discarded { mean_energy } => IngestAction::Discarded { mean_energy },
            Readiness::Ready => {
                let audio = inner.ingest.take();
                inner.enter(TurnState::Processing);
                IngestAction::Ready {
                    audio,
                    ticket: TurnTicket(inner.epoch),
                }
            }
        };

        IngestOutcome {
            observation: Some(report.observation),
            action,
        }
    }

    /// Start a turn that does not come from buffered audio (typed text, a
    /// greeting). Fails with the current state unless LISTENING.
    pub fn begin_turn(&self) -> Result<TurnTicket, TurnState> {
        let mut inner = self.inner.lock();
        if inner.state != TurnState::Listening {
            return Err(inner.state);
        }
        inner.enter(TurnState::Processing);
        Ok(TurnTicket(inner.epoch))
    }

    /// Move the turn owned by `ticket` to `to`.
    ///
    /// Returns false, changing nothing, when the ticket is stale or the
    /// transition is not an ordinary one. PROCESSING is only entered through
    /// [`ingest`](Self::ingest) or [`begin_turn`](Self::begin_turn).
    pub fn advance(&self, ticket: TurnTicket, to: TurnState) -> bool {
        let mut inner = self.inner.lock();
        if !inner.is_current(ticket)
            || to == TurnState::Processing
            || !inner.state.can_transition_to(to)
        {
            return false;
        }
        let from = inner.state;
        inner.enter(to);
        tracing::trace!(from = %from, to = %to, epoch = ticket.0, "Turn state changed");
        true
    }

    pub fn is_current(&self, ticket: TurnTicket) -> bool {
        self.inner.lock().is_current(ticket)
    }

    /// Run `f` while holding the state lock, only if `ticket` is current.
    /// Keeps a stale turn from emitting after the reset that superseded it.
    pub fn run_if_current<R>(&self, ticket: TurnTicket, f: impl FnOnce() -> R) -> Option<R> {
        let inner = self.inner.lock();
        if !inner.is_current(ticket) {
            return None;
        }
        Some(f())
    }

    /// Return to LISTENING from any live state, dropping buffered audio and
    /// invalidating outstanding tickets. Returns the state left, or `None`
    /// once disconnected.
    pub fn force_reset(&self, reason: &str) -> Option<TurnState> {
        let mut inner = self.inner.lock();
        if inner.state == TurnState::Disconnected {
            return None;
        }
        let from = inner.state;
        inner.reset_to_listening();
        tracing::debug!(from = %from, reason, "Forced reset to listening");
        Some(from)
    }

    /// [`force_reset`](Self::force_reset) only if `ticket` still owns the
    /// session
    pub fn force_reset_turn(&self, ticket: TurnTicket, reason: &str) -> bool {
        let mut inner = self.inner.lock();
        if !inner.is_current(ticket) {
            return false;
        }
        let from = inner.state;
        inner.reset_to_listening();
        tracing::debug!(from = %from, reason, "Turn aborted, back to listening");
        true
    }

    /// Reset if a busy state has lasted longer than `max`. Checking and
    /// resetting happen under one lock, so a turn finishing concurrently is
    /// never clobbered.
    pub fn expire_overdue(&self, max: Duration) -> Option<Expired> {
        let mut inner = self.inner.lock();
        if !matches!(inner.state, TurnState::Processing | TurnState::Responding) {
            return None;
        }
        let elapsed = inner.entered_at.elapsed();
        if elapsed <= max {
            return None;
        }
        let state = inner.state;
        let ticket = TurnTicket(inner.epoch);
        inner.reset_to_listening();
        Some(Expired {
            state,
            elapsed,
            ticket,
        })
    }

    /// Enter the terminal state
    pub fn disconnect(&self) {
        let mut inner = self.inner.lock();
        if inner.state != TurnState::Disconnected {
            inner.enter(TurnState::Disconnected);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_config::{DetectorConfig, IngestConfig};
    use parley_core::samples_to_pcm16;
    use std::sync::Arc;

    fn machine() -> TurnStateMachine {
        TurnStateMachine::new(AudioIngestBuffer::new(
            IngestConfig::default(),
            DetectorConfig::default(),
        ))
    }

    fn loud_chunk() -> Vec<u8> {
        samples_to_pcm16(&[3000; 1600])
    }

    /// Feed loud audio until the buffer is handed over
    async fn feed_until_ready(machine: &TurnStateMachine) -> (Vec<u8>, TurnTicket) {
        for _ in 0..50 {
            if let IngestAction::Ready { audio, ticket } = machine.ingest(&loud_chunk()).action {
                return (audio, ticket);
            }
            tokio::time::advance(Duration::from_millis(100)).await;
        }
        panic!("buffer never became ready");
    }

    #[test]
    fn test_transition_table() {
        use TurnState::*;
        assert!(Listening.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Responding));
        assert!(Processing.can_transition_to(Listening));
        assert!(Responding.can_transition_to(Listening));
        assert!(!Listening.can_transition_to(Responding));
        assert!(!Responding.can_transition_to(Processing));
        assert!(!Disconnected.can_transition_to(Listening));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_enters_processing() {
        let machine = machine();
        let (audio, ticket) = feed_until_ready(&machine).await;

        assert_eq!(audio.len(), 32_000);
        assert_eq!(machine.state(), TurnState::Processing);
        assert_eq!(machine.buffered_bytes(), 0);
        assert!(machine.is_current(ticket));

        let outcome = machine.ingest(&loud_chunk());
        assert_eq!(outcome.action, IngestAction::Ignored(TurnState::Processing));
        assert!(outcome.observation.is_none());
        assert_eq!(machine.buffered_bytes(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_turn_cycle() {
        let machine = machine();
        let ticket = machine.begin_turn().unwrap();

        assert!(!machine.advance(ticket, TurnState::Processing));
        assert!(machine.advance(ticket, TurnState::Responding));
        assert_eq!(machine.begin_turn(), Err(TurnState::Responding));
        assert!(machine.advance(ticket, TurnState::Listening));
        assert_eq!(machine.state(), TurnState::Listening);
        assert!(!machine.advance(ticket, TurnState::Responding));
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_reset_invalidates_ticket() {
        let machine = machine();
        let ticket = machine.begin_turn().unwrap();

        assert_eq!(machine.force_reset("test"), Some(TurnState::Processing));
        assert_eq!(machine.state(), TurnState::Listening);
        assert!(!machine.is_current(ticket));
        assert!(!machine.advance(ticket, TurnState::Responding));
        assert!(!machine.force_reset_turn(ticket, "late"));

        let next = machine.begin_turn().unwrap();
        assert_ne!(next, ticket);
        assert!(machine.is_current(next));
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_reset_clears_buffer() {
        let machine = machine();
        machine.ingest(&loud_chunk());
        assert_eq!(machine.buffered_bytes(), 3200);
        assert_eq!(machine.force_reset("test"), Some(TurnState::Listening));
        assert_eq!(machine.buffered_bytes(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expire_overdue() {
        let machine = machine();
        let max = Duration::from_secs(7);

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(machine.expire_overdue(max), None, "listening never expires");

        let ticket = machine.begin_turn().unwrap();
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(machine.expire_overdue(max), None);

        // a transition restarts the clock
        assert!(machine.advance(ticket, TurnState::Responding));
        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(machine.expire_overdue(max), None);
        assert_eq!(machine.state_age(), Duration::from_secs(6));

        tokio::time::advance(Duration::from_secs(2)).await;
        let expired = machine.expire_overdue(max).unwrap();
        assert_eq!(expired.state, TurnState::Responding);
        assert_eq!(expired.ticket, ticket);
        assert!(expired.elapsed > max);
        assert_eq!(machine.state(), TurnState::Listening);
        assert!(!machine.is_current(ticket));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_is_terminal() {
        let machine = machine();
        let ticket = machine.begin_turn().unwrap();
        machine.disconnect();

        assert_eq!(machine.state(), TurnState::Disconnected);
        assert!(!machine.is_current(ticket));
        assert_eq!(machine.force_reset("late"), None);
        assert_eq!(machine.begin_turn(), Err(TurnState::Disconnected));
        assert_eq!(
            machine.ingest(&loud_chunk()).action,
            IngestAction::Ignored(TurnState::Disconnected)
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_only_one_turn_starts() {
        let machine = Arc::new(machine());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let machine = machine.clone();
            handles.push(tokio::spawn(async move { machine.begin_turn().is_ok() }));
        }

        let mut started = 0;
        for handle in handles {
            if handle.await.unwrap() {
                started += 1;
            }
        }
        assert_eq!(started, 1);
        assert_eq!(machine.state(), TurnState::Processing);
    }
}
