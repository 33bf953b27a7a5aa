//! Per-session conversation core
//!
//! Bundles what the pipeline, the watchdog and the connection share for one
//! session: the guarded turn state (with its audio buffer), the bounded turn
//! history, the bound character, the outbound event sink and the handle of
//! the turn task currently in flight.

use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::task::AbortHandle;

use parley_config::TurnConfig;
use parley_core::{ConversationHistory, ServerEvent, Turn};

use crate::events::EventSink;
use crate::ingest::AudioIngestBuffer;
use crate::metrics;
use crate::state::{IngestAction, IngestOutcome, TurnState, TurnStateMachine, TurnTicket};

pub struct Conversation {
    id: String,
    machine: TurnStateMachine,
    history: Mutex<ConversationHistory>,
    turn_count: AtomicU64,
    character: RwLock<String>,
    events: EventSink,
    in_flight: Mutex<Option<(TurnTicket, AbortHandle)>>,
}

impl Conversation {
    pub fn new(
        id: impl Into<String>,
        character: impl Into<String>,
        config: &TurnConfig,
        events: EventSink,
    ) -> Self {
        let ingest = AudioIngestBuffer::new(config.ingest.clone(), config.detector.clone());
        Self {
            id: id.into(),
            machine: TurnStateMachine::new(ingest),
            history: Mutex::new(ConversationHistory::new(config.history_limit)),
            turn_count: AtomicU64::new(0),
            character: RwLock::new(character.into()),
            events,
            in_flight: Mutex::new(None),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn machine(&self) -> &TurnStateMachine {
        &self.machine
    }

    pub fn state(&self) -> TurnState {
        self.machine.state()
    }

    pub fn character(&self) -> String {
        self.character.read().clone()
    }

    pub fn set_character(&self, character: impl Into<String>) {
        *self.character.write() = character.into();
    }

    /// Number of turns with a non-empty transcript so far
    pub fn turn_count(&self) -> u64 {
        self.turn_count.load(Ordering::SeqCst)
    }

    /// Feed one inbound audio chunk, reporting detector triggers and noise
    /// discards to the client side. A `Ready` action carries the utterance and
    /// the ticket of the turn that now owns the session.
    pub fn ingest(&self, bytes: &[u8]) -> IngestAction {
        let IngestOutcome {
            observation,
            action,
        } = self.machine.ingest(bytes);

        if let Some(obs) = observation.filter(|o| o.triggered) {
            tracing::debug!(
                session_id = %self.id,
                confidence = obs.confidence,
                energy = obs.energy,
                "Speech detected"
            );
            self.emit(ServerEvent::SpeechDetected {
                confidence: obs.confidence,
                energy: obs.energy,
            });
        }

        if let IngestAction::Discarded { mean_energy } = action {
            tracing::debug!(session_id = %self.id, mean_energy, "Discarded buffer as noise");
            metrics::record_discarded_buffer();
        }

        action
    }

    pub fn emit(&self, event: ServerEvent) -> bool {
        self.events.emit(event)
    }

    /// Emit on behalf of a turn, dropping the event if the turn was
    /// superseded
    pub fn emit_for(&self, ticket: TurnTicket, event: ServerEvent) -> bool {
        self.machine
            .run_if_current(ticket, || self.events.emit(event))
            .unwrap_or(false)
    }

    pub fn is_current(&self, ticket: TurnTicket) -> bool {
        self.machine.is_current(ticket)
    }

    /// Count a new turn and append it to history. Returns its 1-based number.
    pub fn begin_user_turn(&self, user_text: &str) -> u64 {
        let number = self.turn_count.fetch_add(1, Ordering::SeqCst) + 1;
        self.history.lock().push(Turn::new(number, user_text));
        number
    }

    /// Mutate a turn still present in history
    pub fn update_turn(&self, turn_number: u64, f: impl FnOnce(&mut Turn)) {
        if let Some(turn) = self.history.lock().turn_mut(turn_number) {
            f(turn);
        }
    }

    /// Mark the newest turn failed if it has neither completed nor failed
    pub fn fail_open_turn(&self, reason: &str) {
        let open = self
            .history
            .lock()
            .last()
            .filter(|t| !t.success && t.error_reason.is_none())
            .map(|t| t.turn_number);
        if let Some(number) = open {
            self.update_turn(number, |t| t.fail(reason));
        }
    }

    pub fn history_snapshot(&self) -> Vec<Turn> {
        self.history.lock().snapshot()
    }

    pub fn last_turn(&self) -> Option<Turn> {
        self.history.lock().last().cloned()
    }

    /// Remember the task running the turn owned by `ticket`
    pub fn track(&self, ticket: TurnTicket, handle: AbortHandle) {
        *self.in_flight.lock() = Some((ticket, handle));
    }

    /// Abort the in-flight task if it belongs to `ticket`
    pub fn cancel_turn(&self, ticket: TurnTicket) -> bool {
        let mut in_flight = self.in_flight.lock();
        match in_flight.take() {
            Some((owner, handle)) if owner == ticket => {
                handle.abort();
                true
            }
            other => {
                *in_flight = other;
                false
            }
        }
    }

    /// Enter DISCONNECTED and abandon any in-flight turn
    pub fn shutdown(&self) {
        self.machine.disconnect();
        if let Some((_, handle)) = self.in_flight.lock().take() {
            handle.abort();
        }
        tracing::debug!(session_id = %self.id, "Conversation shut down");
    }
}
