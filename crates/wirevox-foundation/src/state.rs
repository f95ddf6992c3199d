use parking_lot::RwLock;

/// Transport connection state of a streaming STT session.
///
/// Exactly one connection attempt may be in flight per session instance;
/// adapters use [`StateCell::begin_connecting`] to make a second concurrent
/// `start()` an idempotent no-op rather than a second socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    Disconnected,
}

impl Default for ConnectionState {
    fn default() -> Self {
        ConnectionState::Idle
    }
}

#[derive(Debug, Default)]
struct Inner {
    state: ConnectionState,
    /// Monotonic connect-attempt counter. A resuming `start()` may only
    /// promote or fail the attempt it began; a concurrent `stop()` or a
    /// newer `start()` invalidates the token.
    attempt: u64,
}

/// Shared, lock-guarded connection state with logged transitions.
#[derive(Debug, Default)]
pub struct StateCell {
    inner: RwLock<Inner>,
}

impl StateCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> ConnectionState {
        self.inner.read().state
    }

    pub fn is_connected(&self) -> bool {
        self.current() == ConnectionState::Connected
    }

    /// Attempt to enter `Connecting`. Returns the attempt token to hand to
    /// [`StateCell::complete_connect`] / [`StateCell::fail_connect`], or
    /// `None` if a connect attempt is already in flight.
    pub fn begin_connecting(&self) -> Option<u64> {
        let mut inner = self.inner.write();
        if inner.state == ConnectionState::Connecting {
            return None;
        }
        tracing::debug!("State transition: {:?} -> Connecting", inner.state);
        inner.state = ConnectionState::Connecting;
        inner.attempt += 1;
        Some(inner.attempt)
    }

    /// Attempt the `Connecting -> Connected` transition for the given
    /// attempt. Returns false when the state changed underneath — a
    /// concurrent `stop()` reset it, or a newer `start()` superseded it —
    /// in which case the caller must discard its connection.
    pub fn complete_connect(&self, token: u64) -> bool {
        let mut inner = self.inner.write();
        if inner.state != ConnectionState::Connecting || inner.attempt != token {
            return false;
        }
        tracing::debug!("State transition: Connecting -> Connected");
        inner.state = ConnectionState::Connected;
        true
    }

    /// Reset a failed connect attempt to `Idle`, but only if that attempt
    /// still owns the state.
    pub fn fail_connect(&self, token: u64) {
        let mut inner = self.inner.write();
        if inner.state == ConnectionState::Connecting && inner.attempt == token {
            tracing::debug!("State transition: Connecting -> Idle");
            inner.state = ConnectionState::Idle;
        }
    }

    pub fn set(&self, new_state: ConnectionState) {
        let mut inner = self.inner.write();
        if inner.state != new_state {
            tracing::debug!("State transition: {:?} -> {:?}", inner.state, new_state);
            inner.state = new_state;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_cell_is_idle() {
        let cell = StateCell::new();
        assert_eq!(cell.current(), ConnectionState::Idle);
        assert!(!cell.is_connected());
    }

    #[test]
    fn second_begin_connecting_is_rejected() {
        let cell = StateCell::new();
        assert!(cell.begin_connecting().is_some());
        assert!(cell.begin_connecting().is_none());
    }

    #[test]
    fn complete_connect_promotes_the_owning_attempt() {
        let cell = StateCell::new();
        let token = cell.begin_connecting().unwrap();
        assert!(cell.complete_connect(token));
        assert!(cell.is_connected());
    }

    #[test]
    fn complete_connect_refused_after_reset() {
        let cell = StateCell::new();
        let token = cell.begin_connecting().unwrap();
        // stop() resets the state while the handshake is still in flight
        cell.set(ConnectionState::Idle);
        assert!(!cell.complete_connect(token));
        assert_eq!(cell.current(), ConnectionState::Idle);
    }

    #[test]
    fn stale_attempt_cannot_promote_or_fail_a_newer_one() {
        let cell = StateCell::new();
        let first = cell.begin_connecting().unwrap();
        cell.set(ConnectionState::Idle);
        let second = cell.begin_connecting().unwrap();

        assert!(!cell.complete_connect(first));
        cell.fail_connect(first);
        assert_eq!(cell.current(), ConnectionState::Connecting);

        assert!(cell.complete_connect(second));
        assert!(cell.is_connected());
    }

    #[test]
    fn connecting_allowed_again_after_disconnect() {
        let cell = StateCell::new();
        let token = cell.begin_connecting().unwrap();
        assert!(cell.complete_connect(token));
        cell.set(ConnectionState::Disconnected);
        assert!(cell.begin_connecting().is_some());
    }
}
