//! Session state machine
//!
//! State transitions:
//! ```text
//! IDLE → CONNECTING → AWAITING_HANDSHAKE → RUNNING → DISCONNECTING → CLOSED
//!            ↓                ↓               ↓
//!            └──────────→ ABORTED ←───────────┘
//! ```
//!
//! `Aborted` and `Closed` are absorbing.

use crate::error::{ProtocolError, Result};

/// Lifecycle state of one session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Nothing attempted yet
    #[default]
    Idle,

    /// Opening the transport
    Connecting,

    /// CONNECT sent, waiting for the single reply frame
    AwaitingHandshake,

    /// Subscribed; outbound pump and inbound listener active
    Running,

    /// Interruption observed, sending DISCONNECT and closing
    Disconnecting,

    /// Teardown finished
    Closed,

    /// Session ended on a failure
    Aborted,
}

impl SessionState {
    /// Validates a state transition
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;

        match (self, next) {
            (Idle, Connecting) => true,

            (Connecting, AwaitingHandshake) => true,
            (Connecting, Aborted) => true, // refused, DNS, TLS, timeout

            (AwaitingHandshake, Running) => true,
            (AwaitingHandshake, Aborted) => true, // ERROR reply or timeout

            (Running, Disconnecting) => true,
            (Running, Aborted) => true, // transport failure

            (Disconnecting, Closed) => true,

            (a, b) if a == &b => true,

            _ => false,
        }
    }

    /// Attempts to transition to a new state
    pub fn transition_to(&mut self, next: SessionState) -> Result<()> {
        if self.can_transition_to(next) {
            *self = next;
            Ok(())
        } else {
            Err(ProtocolError::InvalidStateTransition {
                from: *self,
                to: next,
            })
        }
    }

    /// Returns true once the session can no longer change state
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Aborted)
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        matches!(self, SessionState::Running)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Idle => write!(f, "Idle"),
            SessionState::Connecting => write!(f, "Connecting"),
            SessionState::AwaitingHandshake => write!(f, "AwaitingHandshake"),
            SessionState::Running => write!(f, "Running"),
            SessionState::Disconnecting => write!(f, "Disconnecting"),
            SessionState::Closed => write!(f, "Closed"),
            SessionState::Aborted => write!(f, "Aborted"),
        }
    }
}
