//! Session lifecycle.

use std::fmt;

/// Where the session is in its life. Terminal states stay terminal; a new
/// conversation means a new session object, never a restart of this one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Ready,
    Streaming,
    Closed,
    Error,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Error)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Ready => "ready",
            SessionState::Streaming => "streaming",
            SessionState::Closed => "closed",
            SessionState::Error => "error",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::SessionState;

    #[test]
    fn only_closed_and_error_are_terminal() {
        assert!(SessionState::Closed.is_terminal());
        assert!(SessionState::Error.is_terminal());
        assert!(!SessionState::Idle.is_terminal());
        assert!(!SessionState::Connecting.is_terminal());
        assert!(!SessionState::Ready.is_terminal());
        assert!(!SessionState::Streaming.is_terminal());
    }
}
