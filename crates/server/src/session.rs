//! Session Management
//!
//! One [`Session`] per initialized connection. The [`SessionRegistry`] is the
//! only state shared across sessions: a concurrent map from connection id to
//! session, plus the idle sweep that tears down silent sessions.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

use parley_config::{ServerConfig, TurnConfig};
use parley_pipeline::{
    Conversation, EventSink, ReliabilityWatchdog, TurnState, WatchdogHandle,
};

use crate::ServerError;

/// A live session
pub struct Session {
    pub id: String,
    conversation: Arc<Conversation>,
    pub created_at: Instant,
    last_activity: RwLock<Instant>,
    active: AtomicBool,
    watchdog: Mutex<Option<WatchdogHandle>>,
    closed: watch::Sender<bool>,
}

impl Session {
    /// Build the conversation and start its watchdog
    fn start(id: &str, character: String, turn: &TurnConfig, events: EventSink) -> Self {
        let conversation = Arc::new(Conversation::new(id, character, turn, events));
        let watchdog = ReliabilityWatchdog::new(&turn.watchdog).spawn(Arc::clone(&conversation));
        let (closed, _) = watch::channel(false);
        let now = Instant::now();

        Self {
            id: id.to_string(),
            conversation,
            created_at: now,
            last_activity: RwLock::new(now),
            active: AtomicBool::new(true),
            watchdog: Mutex::new(Some(watchdog)),
            closed,
        }
    }

    pub fn conversation(&self) -> &Arc<Conversation> {
        &self.conversation
    }

    /// Update last activity time
    pub fn touch(&self) {
        *self.last_activity.write() = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity.read().elapsed()
    }

    /// Check if session is expired
    pub fn is_expired(&self, timeout: Duration) -> bool {
        self.idle_for() > timeout
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Resolves once the session has been torn down
    pub fn subscribe_closed(&self) -> watch::Receiver<bool> {
        self.closed.subscribe()
    }

    /// Deactivate, abandon the in-flight turn and join the watchdog. Safe to
    /// call more than once; only the first call does any work.
    pub async fn teardown(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }

        self.conversation.shutdown();
        let watchdog = self.watchdog.lock().take();
        if let Some(handle) = watchdog {
            handle.stop().await;
        }
        self.closed.send_replace(true);

        tracing::debug!(session_id = %self.id, "Session torn down");
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id.clone(),
            character: self.conversation.character(),
            state: self.conversation.state(),
            turn_count: self.conversation.turn_count(),
            idle_secs: self.idle_for().as_secs(),
            age_secs: self.created_at.elapsed().as_secs(),
        }
    }
}

/// Listing entry for the sessions endpoint
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub id: String,
    pub character: String,
    pub state: TurnState,
    pub turn_count: u64,
    pub idle_secs: u64,
    pub age_secs: u64,
}

/// Session registry
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<Session>>,
    /// Slots taken, reserved before a session is inserted
    reserved: AtomicUsize,
    turn: TurnConfig,
    max_sessions: usize,
    idle_timeout: Duration,
    cleanup_interval: Duration,
}

impl SessionRegistry {
    pub fn new(server: &ServerConfig, turn: TurnConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            reserved: AtomicUsize::new(0),
            turn,
            max_sessions: server.max_sessions,
            idle_timeout: server.idle_timeout(),
            cleanup_interval: server.cleanup_interval(),
        }
    }

    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Register a session for connection `id`. At capacity, idle sessions are
    /// swept first; if none could be reclaimed the request is refused.
    pub async fn create(
        &self,
        id: &str,
        character: String,
        events: EventSink,
    ) -> Result<Arc<Session>, ServerError> {
        if self.sessions.contains_key(id) {
            return Err(ServerError::Session(format!("Session {} already exists", id)));
        }

        if !self.try_reserve() {
            self.cleanup_idle().await;
            if !self.try_reserve() {
                tracing::warn!(
                    session_id = %id,
                    max_sessions = self.max_sessions,
                    "Refusing session, server at capacity"
                );
                return Err(ServerError::Capacity(self.max_sessions));
            }
        }

        let session = match self.sessions.entry(id.to_string()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                let session = Arc::new(Session::start(id, character, &self.turn, events));
                slot.insert(Arc::clone(&session));
                Some(session)
            }
        };
        let Some(session) = session else {
            self.release();
            return Err(ServerError::Session(format!("Session {} already exists", id)));
        };

        tracing::info!(
            session_id = %id,
            character = %session.conversation.character(),
            sessions = self.count(),
            "Session created"
        );
        Ok(session)
    }

    /// Take a slot if one is free
    fn try_reserve(&self) -> bool {
        self.reserved
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |taken| {
                (taken < self.max_sessions).then_some(taken + 1)
            })
            .is_ok()
    }

    fn release(&self) {
        self.reserved.fetch_sub(1, Ordering::AcqRel);
    }

    /// Get a session by ID
    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Tear the session down, then drop it from the map
    pub async fn remove(&self, id: &str) -> bool {
        let Some(session) = self.get(id) else {
            return false;
        };

        session.teardown().await;
        let removed = self.sessions.remove(id).is_some();
        if removed {
            self.release();
            tracing::info!(
                session_id = %id,
                turns = session.conversation.turn_count(),
                sessions = self.count(),
                "Session removed"
            );
        }
        removed
    }

    /// Get active session count
    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    pub fn list(&self) -> Vec<SessionSummary> {
        let mut summaries: Vec<SessionSummary> =
            self.sessions.iter().map(|entry| entry.value().summary()).collect();
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        summaries
    }

    /// Tear down every session idle longer than the configured window.
    /// Returns how many were removed.
    pub async fn cleanup_idle(&self) -> usize {
        let expired: Vec<String> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().is_expired(self.idle_timeout))
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = 0;
        for id in expired {
            tracing::info!(session_id = %id, "Session idle, tearing down");
            if self.remove(&id).await {
                removed += 1;
            }
        }
        removed
    }

    /// Tear down everything, used on server shutdown
    pub async fn shutdown_all(&self) {
        let ids: Vec<String> = self.sessions.iter().map(|entry| entry.key().clone()).collect();
        for id in ids {
            self.remove(&id).await;
        }
    }

    /// Start the idle sweep. Send `true` on the returned channel to stop it.
    pub fn start_cleanup_task(self: &Arc<Self>) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let registry = Arc::clone(self);
        let interval = registry.cleanup_interval;

        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(interval);
            interval_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = interval_timer.tick() => {
                        let removed = registry.cleanup_idle().await;
                        if removed > 0 {
                            tracing::info!(
                                "Session cleanup: removed {} idle sessions ({} remaining)",
                                removed,
                                registry.count()
                            );
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            tracing::info!("Session cleanup task shutting down");
                            break;
                        }
                    }
                }
            }
        });

        shutdown_tx
    }
}
