//! Conversation turns and bounded history

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::time::Duration;

/// Backend stage of a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Speech to text
    Stt,
    /// Reply generation
    Llm,
    /// Text to speech
    Tts,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Stt => "stt",
            Stage::Llm => "llm",
            Stage::Tts => "tts",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accumulated wall time per stage. Repeated stages (one synthesis call per
/// chunk) are summed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageTimings(BTreeMap<Stage, Duration>);

impl StageTimings {
    pub fn record(&mut self, stage: Stage, elapsed: Duration) {
        *self.0.entry(stage).or_default() += elapsed;
    }

    pub fn get(&self, stage: Stage) -> Option<Duration> {
        self.0.get(&stage).copied()
    }

    pub fn total(&self) -> Duration {
        self.0.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One user utterance and the agent's reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// 1-based position in the session
    pub turn_number: u64,
    /// What the user said (transcript or typed text)
    pub user_text: String,
    /// Agent reply, absent until generation succeeds
    pub agent_text: Option<String>,
    /// Time spent per backend stage
    pub stage_timings: StageTimings,
    /// Whether the turn ran to completion
    pub success: bool,
    /// Wire reason for an aborted turn
    pub error_reason: Option<String>,
    /// When the transcript was accepted
    pub started_at: DateTime<Utc>,
}

impl Turn {
    pub fn new(turn_number: u64, user_text: impl Into<String>) -> Self {
        Self {
            turn_number,
            user_text: user_text.into(),
            agent_text: None,
            stage_timings: StageTimings::default(),
            success: false,
            error_reason: None,
            started_at: Utc::now(),
        }
    }

    /// Mark the turn finished with the given reply
    pub fn complete(&mut self, agent_text: impl Into<String>) {
        self.agent_text = Some(agent_text.into());
        self.success = true;
        self.error_reason = None;
    }

    /// Mark the turn aborted
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.success = false;
        self.error_reason = Some(reason.into());
    }
}

/// Bounded turn history. The oldest turn is evicted once capacity is reached.
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    turns: VecDeque<Turn>,
    capacity: usize,
}

impl ConversationHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            turns: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, turn: Turn) {
        while self.turns.len() >= self.capacity {
            self.turns.pop_front();
        }
        self.turns.push_back(turn);
    }

    /// Mutable access to a turn still held in history
    pub fn turn_mut(&mut self, turn_number: u64) -> Option<&mut Turn> {
        self.turns
            .iter_mut()
            .rev()
            .find(|t| t.turn_number == turn_number)
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.back()
    }

    /// Owned copy of the turns, oldest first
    pub fn snapshot(&self) -> Vec<Turn> {
        self.turns.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}
