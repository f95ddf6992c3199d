use thiserror::Error;

/// Errors surfaced by a streaming STT session.
///
/// Configuration problems are caught by the provider factory and never reach
/// an adapter. Handshake failures reject `start()`; everything after a
/// successful connect is reported through session events instead of being
/// raised, so a mid-conversation transport failure cannot crash the host.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Authentication rejected: {0}")]
    Auth(String),

    #[error("Quota exhausted: {0}")]
    Quota(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

impl SessionError {
    /// True for error classes where retrying the same session/credential
    /// cannot succeed.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SessionError::Auth(_) | SessionError::Quota(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_and_quota_are_fatal() {
        assert!(SessionError::Auth("bad key".into()).is_fatal());
        assert!(SessionError::Quota("limit reached".into()).is_fatal());
    }

    #[test]
    fn transport_errors_are_retriable() {
        assert!(!SessionError::Connection("refused".into()).is_fatal());
        assert!(!SessionError::Transport("reset".into()).is_fatal());
        assert!(!SessionError::Protocol("bad frame".into()).is_fatal());
    }
}
