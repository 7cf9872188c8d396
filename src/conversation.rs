//! Conversation turns and the append-only session log

use serde::{Deserialize, Serialize};

/// Author of a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The person asking questions
    User,
    /// The model answering as the profile
    Assistant,
}

impl Role {
    /// Wire name used by chat-completion APIs
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One exchange unit, immutable once created
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationTurn {
    role: Role,
    content: String,
    /// Assistant turn rendered from a failed completion
    #[serde(skip)]
    failed: bool,
}

impl ConversationTurn {
    /// Create a user turn
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            failed: false,
        }
    }

    /// Create an assistant turn
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            failed: false,
        }
    }

    /// Create the assistant turn shown in place of a failed reply
    #[must_use]
    pub fn failure(error: &impl std::fmt::Display) -> Self {
        Self {
            role: Role::Assistant,
            content: format!("Error: {error}"),
            failed: true,
        }
    }

    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Whether this turn reports a failed completion
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        self.failed
    }
}

/// Ordered record of a session; insertion order is chronological order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationLog {
    turns: Vec<ConversationTurn>,
}

impl ConversationLog {
    #[must_use]
    pub const fn new() -> Self {
        Self { turns: Vec::new() }
    }

    pub(crate) fn push(&mut self, turn: ConversationTurn) {
        self.turns.push(turn);
    }

    #[must_use]
    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    #[must_use]
    pub fn last(&self) -> Option<&ConversationTurn> {
        self.turns.last()
    }

    /// Prior turns to send with the next completion request
    ///
    /// Failed exchanges (the user turn and the error reply that answered it)
    /// stay visible in the log but are never sent back to the model. With a
    /// `limit`, only the most recent `limit` turns are kept, and a leading
    /// assistant turn orphaned by the cut is dropped.
    #[must_use]
    pub fn completion_history(&self, limit: Option<usize>) -> Vec<ConversationTurn> {
        let mut history: Vec<ConversationTurn> = Vec::with_capacity(self.turns.len());

        for turn in &self.turns {
            if turn.is_failure() {
                if history.last().is_some_and(|t| t.role() == Role::User) {
                    history.pop();
                }
                continue;
            }
            history.push(turn.clone());
        }

        if let Some(limit) = limit
            && history.len() > limit
        {
            let excess = history.len() - limit;
            history.drain(..excess);
            if history.first().is_some_and(|t| t.role() == Role::Assistant) {
                history.remove(0);
            }
        }

        history
    }
}
