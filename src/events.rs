//! Events surfaced to the embedding UI.

use std::fmt;

/// Who produced a transcript line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Map a wire role label. Anything unrecognized reads as the assistant,
    /// which only affects display.
    pub fn from_label(label: &str) -> Self {
        if label.eq_ignore_ascii_case("user") {
            Role::User
        } else {
            Role::Assistant
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// Coarse sentiment attached to the conversation by the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

impl Sentiment {
    pub fn from_label(label: &str) -> Self {
        if label.eq_ignore_ascii_case("positive") {
            Sentiment::Positive
        } else if label.eq_ignore_ascii_case("negative") {
            Sentiment::Negative
        } else {
            Sentiment::Neutral
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sentiment::Positive => write!(f, "positive"),
            Sentiment::Negative => write!(f, "negative"),
            Sentiment::Neutral => write!(f, "neutral"),
        }
    }
}

/// Everything the session reports upward. Transport details stay below
/// this boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    /// A finished transcript line, either side of the conversation.
    Transcript { role: Role, text: String },
    /// The agent's voice started or stopped being audible.
    Speaking(bool),
    Sentiment(Sentiment),
    /// The session died and will not recover.
    Fatal(String),
}
