//! WebSocket Handler
//!
//! One [`Connection`] per socket. Inbound frames are handled in order on the
//! socket's own task; everything outbound goes through the session's
//! [`EventSink`] and a single writer task, so the client sees events in the
//! order they were emitted.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, Interval};

use parley_core::{ClientMessage, ServerEvent};
use parley_pipeline::{EventSink, IngestAction, TurnError};

use crate::session::Session;
use crate::state::AppState;
use crate::ServerError;

/// How long queued events may take to flush after the session ends
const WRITER_DRAIN: Duration = Duration::from_secs(2);

/// Protocol state for one socket
pub struct Connection {
    id: String,
    state: AppState,
    events: EventSink,
    session: Option<Arc<Session>>,
}

impl Connection {
    pub fn new(state: AppState, events: EventSink) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            state,
            events,
            session: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn session(&self) -> Option<&Arc<Session>> {
        self.session.as_ref()
    }

    /// Announce the connection id
    pub fn open(&self) {
        self.events.emit(ServerEvent::Connected {
            session_id: self.id.clone(),
        });
    }

    /// Handle one JSON text frame
    pub async fn on_text(&mut self, text: &str) {
        self.touch();

        let message = match serde_json::from_str::<ClientMessage>(text) {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!(session_id = %self.id, error = %e, "Unparseable client frame");
                let err = TurnError::Protocol(e.to_string());
                self.events.emit(ServerEvent::error(err.to_string(), err.reason()));
                return;
            }
        };

        match message {
            ClientMessage::Initialize { character } => self.initialize(character.as_deref()).await,
            ClientMessage::TextMessage { text } => self.text_message(&text),
            ClientMessage::SwitchCharacter { character } => self.switch_character(&character),
            ClientMessage::Ping => {
                self.events.emit(ServerEvent::Pong);
            }
            ClientMessage::Pong => {}
        }
    }

    /// Handle one binary frame of PCM16 audio
    pub fn on_binary(&self, bytes: &[u8]) {
        let Some(session) = self.require_session() else {
            return;
        };
        session.touch();

        if bytes.len() % 2 != 0 {
            tracing::debug!(session_id = %self.id, bytes = bytes.len(), "Odd-length audio frame");
            let err = TurnError::Protocol(format!(
                "audio frame of {} bytes is not whole PCM16 samples",
                bytes.len()
            ));
            self.events.emit(ServerEvent::error(err.to_string(), err.reason()));
            return;
        }

        let conversation = session.conversation();
        if let IngestAction::Ready { audio, ticket } = conversation.ingest(bytes) {
            tracing::debug!(
                session_id = %self.id,
                bytes = audio.len(),
                "Utterance ready, starting turn"
            );
            self.state
                .orchestrator
                .spawn_audio_turn(Arc::clone(conversation), audio, ticket);
        }
    }

    /// Record inbound activity, including transport-level pongs
    pub fn touch(&self) {
        if let Some(session) = &self.session {
            session.touch();
        }
    }

    /// Signal that flips once the session is torn down elsewhere
    pub fn closed_signal(&self) -> Option<watch::Receiver<bool>> {
        self.session.as_ref().map(|s| s.subscribe_closed())
    }

    /// Tear down and unregister the session, if one was bound
    pub async fn close(&mut self) {
        if let Some(session) = self.session.take() {
            self.state.sessions.remove(&session.id).await;
        }
    }

    async fn initialize(&mut self, requested: Option<&str>) {
        let character = self.state.characters().resolve(requested);

        if let Some(session) = &self.session {
            session.conversation().set_character(character.clone());
            tracing::info!(session_id = %self.id, character = %character, "Session re-initialized");
            self.events.emit(ServerEvent::Initialized { character });
            return;
        }

        let session = match self
            .state
            .sessions
            .create(&self.id, character.clone(), self.events.clone())
            .await
        {
            Ok(session) => session,
            Err(e) => {
                self.reject(&e);
                return;
            }
        };

        self.events.emit(ServerEvent::Initialized {
            character: character.clone(),
        });

        if let Some(greeting) = self.state.characters().greeting(&character) {
            if let Err(e) = self
                .state
                .orchestrator
                .start_greeting(Arc::clone(session.conversation()), greeting)
            {
                tracing::debug!(session_id = %self.id, error = %e, "Greeting skipped");
            }
        }

        self.session = Some(session);
    }

    fn text_message(&self, text: &str) {
        let Some(session) = self.require_session() else {
            return;
        };

        let started = self
            .state
            .orchestrator
            .start_text_turn(Arc::clone(session.conversation()), text);
        if let Err(e) = started {
            tracing::debug!(session_id = %self.id, reason = e.reason(), "Text turn rejected");
            self.events.emit(ServerEvent::error(e.to_string(), e.reason()));
        }
    }

    fn switch_character(&self, requested: &str) {
        let Some(session) = self.require_session() else {
            return;
        };

        let character = self.state.characters().resolve(Some(requested));
        session.conversation().set_character(character.clone());
        tracing::info!(session_id = %self.id, character = %character, "Character switched");
        self.events.emit(ServerEvent::Initialized { character });
    }

    fn require_session(&self) -> Option<&Arc<Session>> {
        if self.session.is_none() {
            self.reject(&ServerError::NotInitialized);
        }
        self.session.as_ref()
    }

    fn reject(&self, error: &ServerError) {
        self.events
            .emit(ServerEvent::error(error.to_string(), error.reason()));
    }
}

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let (events, mut outbound) = EventSink::channel();

    let keepalive_period = state.config.server.keepalive();
    let handshake_timeout = state.sessions.idle_timeout();

    let mut conn = Connection::new(state, events.clone());
    let id = conn.id().to_string();
    tracing::info!(session_id = %id, "WebSocket connected");

    // Single writer: drains the sink until every sender is gone
    let writer_id = id.clone();
    let mut writer = tokio::spawn(async move {
        while let Some(event) = outbound.recv().await {
            let json = match event.to_json() {
                Ok(json) => json,
                Err(e) => {
                    tracing::warn!(session_id = %writer_id, error = %e, "Failed to encode event");
                    continue;
                }
            };
            if let Err(e) = sender.send(Message::Text(json)).await {
                tracing::debug!(session_id = %writer_id, error = %e, "Socket closed while sending");
                break;
            }
        }
        let _ = sender.close().await;
    });

    conn.open();

    let mut keepalive = keepalive_period
        .map(|period| tokio::time::interval_at(Instant::now() + period, period));
    let mut closed = None;
    let mut last_inbound = Instant::now();

    loop {
        if closed.is_none() {
            closed = conn.closed_signal();
        }
        let awaiting_init = conn.session().is_none();

        tokio::select! {
            frame = receiver.next() => {
                last_inbound = Instant::now();
                match frame {
                    Some(Ok(Message::Text(text))) => conn.on_text(&text).await,
                    Some(Ok(Message::Binary(bytes))) => conn.on_binary(&bytes),
                    Some(Ok(Message::Pong(_))) => conn.touch(),
                    Some(Ok(Message::Ping(_))) => {}
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::info!(session_id = %id, "WebSocket closed by client");
                        break;
                    }
                    Some(Err(e)) => {
                        tracing::warn!(session_id = %id, error = %e, "WebSocket receive error");
                        break;
                    }
                }
            }
            _ = tick(&mut keepalive) => {
                events.emit(ServerEvent::Ping);
            }
            _ = wait_closed(&mut closed) => {
                tracing::info!(session_id = %id, "Session ended, closing socket");
                break;
            }
            _ = tokio::time::sleep_until(last_inbound + handshake_timeout), if awaiting_init => {
                tracing::info!(session_id = %id, "No initialize received, closing socket");
                break;
            }
        }
    }

    conn.close().await;
    drop(conn);
    drop(events);

    if tokio::time::timeout(WRITER_DRAIN, &mut writer).await.is_err() {
        writer.abort();
    }
    tracing::info!(session_id = %id, "WebSocket disconnected");
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn wait_closed(signal: &mut Option<watch::Receiver<bool>>) {
    let Some(rx) = signal else {
        return std::future::pending().await;
    };
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}
