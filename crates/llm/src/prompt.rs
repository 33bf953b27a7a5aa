//! Prompt assembly
//!
//! Turns the bound character and the bounded turn history into a chat
//! message list.

use serde::{Deserialize, Serialize};
use std::fmt;

use parley_core::Turn;

/// Placeholder in the system prompt replaced by the character key
pub const CHARACTER_PLACEHOLDER: &str = "{character}";

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// Chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// System prompt, then one user message per turn followed by the agent reply
/// when there is one. Aborted turns keep their user message so the model sees
/// what was asked.
pub fn build_messages(system_prompt: &str, character: &str, history: &[Turn]) -> Vec<Message> {
    let mut messages = Vec::with_capacity(history.len() * 2 + 1);

    let system = system_prompt.replace(CHARACTER_PLACEHOLDER, character);
    if !system.trim().is_empty() {
        messages.push(Message::new(Role::System, system));
    }

    for turn in history {
        messages.push(Message::new(Role::User, turn.user_text.as_str()));
        if let Some(reply) = turn.agent_text.as_deref().filter(|r| !r.is_empty()) {
            messages.push(Message::new(Role::Assistant, reply));
        }
    }

    messages
}
