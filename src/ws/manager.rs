//! Connection lifecycle state machine
//!
//! Owns `ConnectionState` and the retry context. Pure: every input returns
//! the [`Action`] the session task has to carry out (connect, arm a backoff
//! timer, halt), so the whole lifecycle is testable without a socket.

use crate::backoff::BackoffPolicy;
use std::time::Duration;

/// Why the client reached its terminal state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// `stop()` was called
    Stopped,
    /// Every allowed retry failed
    RetriesExhausted,
}

/// Connection state visible to the UI layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Constructed, not started
    Idle,
    /// Handshake in progress
    Connecting,
    /// Connected and ready
    Open,
    /// Waiting out a backoff before the next attempt
    Reconnecting,
    /// Terminal
    Closed(CloseReason),
}

impl ConnectionState {
    /// Short label for logs and the status API
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Closed(CloseReason::Stopped) => "stopped",
            ConnectionState::Closed(CloseReason::RetriesExhausted) => "exhausted",
        }
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        matches!(self, ConnectionState::Closed(_))
    }
}

/// Recoverable connection failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    /// Transport never reached open (includes connect timeout)
    Handshake(String),
    /// Peer closed an open connection
    Closed,
    /// Send/receive error on an open connection
    Transport(String),
    /// Probe unanswered within the ping interval
    LivenessTimeout,
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Failure::Handshake(e) => write!(f, "handshake failed: {}", e),
            Failure::Closed => write!(f, "connection closed by peer"),
            Failure::Transport(e) => write!(f, "transport error: {}", e),
            Failure::LivenessTimeout => write!(f, "liveness probe timed out"),
        }
    }
}

/// Retry bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryContext {
    /// Retries scheduled since the last successful open
    pub attempt: u32,
    /// Delay of the most recently scheduled retry
    pub next_delay: Duration,
}

/// Work the session task must perform after a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Start a transport handshake
    Connect,
    /// Arm the backoff timer
    Retry(Duration),
    /// Stop for good
    Halt(CloseReason),
}

/// Connection lifecycle manager
#[derive(Debug)]
pub struct ConnectionManager {
    state: ConnectionState,
    retry: RetryContext,
    backoff: BackoffPolicy,
    max_retries: u32,
    /// Successful opens, for stats
    opens: u64,
}

impl ConnectionManager {
    /// Create idle manager
    pub fn new(backoff: BackoffPolicy, max_retries: u32) -> Self {
        Self {
            state: ConnectionState::Idle,
            retry: RetryContext::default(),
            backoff,
            max_retries,
            opens: 0,
        }
    }

    /// Current state
    #[inline(always)]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Retry context snapshot
    #[inline]
    pub fn retry(&self) -> RetryContext {
        self.retry
    }

    /// Successful opens since construction
    pub fn opens(&self) -> u64 {
        self.opens
    }

    /// Begin connecting
    ///
    /// Accepted from `Idle` and after retry exhaustion (fresh retry budget);
    /// ignored anywhere else.
    pub fn start(&mut self) -> Option<Action> {
        match self.state {
            ConnectionState::Idle | ConnectionState::Closed(CloseReason::RetriesExhausted) => {
                self.retry = RetryContext::default();
                self.state = ConnectionState::Connecting;
                Some(Action::Connect)
            }
            _ => None,
        }
    }

    /// Handshake succeeded; returns false if no attempt was pending
    pub fn on_open(&mut self) -> bool {
        if self.state != ConnectionState::Connecting {
            return false;
        }
        self.state = ConnectionState::Open;
        self.retry = RetryContext::default();
        self.opens += 1;
        true
    }

    /// Handshake failure, peer close, transport error or liveness timeout
    ///
    /// Schedules the next retry, or halts once `max_retries` retries have
    /// been used up. Stale failures outside `Connecting`/`Open` are ignored.
    pub fn on_failure(&mut self, failure: &Failure) -> Option<Action> {
        if !matches!(self.state, ConnectionState::Connecting | ConnectionState::Open) {
            tracing::trace!(state = self.state.as_str(), %failure, "ignoring stale failure");
            return None;
        }

        if self.retry.attempt >= self.max_retries {
            self.state = ConnectionState::Closed(CloseReason::RetriesExhausted);
            return Some(Action::Halt(CloseReason::RetriesExhausted));
        }

        let delay = self.backoff.next_delay(self.retry.attempt);
        self.retry.attempt += 1;
        self.retry.next_delay = delay;
        self.state = ConnectionState::Reconnecting;
        Some(Action::Retry(delay))
    }

    /// Backoff timer fired
    pub fn on_retry_timer(&mut self) -> Option<Action> {
        if self.state != ConnectionState::Reconnecting {
            return None;
        }
        self.state = ConnectionState::Connecting;
        Some(Action::Connect)
    }

    /// Explicit stop; terminal. Returns false if already closed.
    pub fn stop(&mut self) -> bool {
        if self.state.is_closed() {
            return false;
        }
        self.state = ConnectionState::Closed(CloseReason::Stopped);
        true
    }
}
