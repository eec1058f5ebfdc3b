//! Session state machine using rust-fsm.
//!
//! ## State Diagram
//!
//! ```text
//!                 LoginSucceeded / SessionRestored
//! ┌─────────────┐ ───────────────────────────────► ┌─────────────┐
//! │  NoSession  │                                  │   Active    │◄──┐
//! └─────────────┘ ◄─────────────────────────────── └──────┬──────┘   │
//!        ▲        LogoutRequested / SessionEnded          │          │
//!        │                                 RefreshStarted │          │ RefreshSucceeded
//!        │                                                ▼          │
//!        │   RefreshFailed / LogoutRequested    ┌──────────────────┐ │
//!        └───────────────────────────────────── │ RefreshInFlight  │─┘
//!                                               └──────────────────┘
//! ```
//!
//! `LoginSucceeded` is accepted in every state: a fresh login replaces
//! whatever session existed.

use rust_fsm::*;
use serde::{Deserialize, Serialize};

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub session_machine(NoSession)

    NoSession => {
        LoginSucceeded => Active,
        SessionRestored => Active
    },
    Active => {
        LoginSucceeded => Active,
        RefreshStarted => RefreshInFlight,
        LogoutRequested => NoSession,
        SessionEnded => NoSession
    },
    RefreshInFlight => {
        LoginSucceeded => Active,
        RefreshSucceeded => Active,
        RefreshFailed => NoSession,
        LogoutRequested => NoSession,
        SessionEnded => NoSession
    }
}

pub use session_machine::Input as SessionMachineInput;
pub use session_machine::State as SessionMachineState;
pub use session_machine::StateMachine as SessionMachine;

/// Session state for external consumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No tokens stored.
    NoSession,
    /// Tokens stored and, unless a renewal failed, a renewal timer armed.
    Active,
    /// A refresh call is outstanding. Requests wait on its outcome.
    RefreshInFlight,
}

impl SessionState {
    pub fn has_session(&self) -> bool {
        !matches!(self, SessionState::NoSession)
    }
}

impl From<&SessionMachineState> for SessionState {
    fn from(state: &SessionMachineState) -> Self {
        match state {
            SessionMachineState::NoSession => SessionState::NoSession,
            SessionMachineState::Active => SessionState::Active,
            SessionMachineState::RefreshInFlight => SessionState::RefreshInFlight,
        }
    }
}

/// Payload for session state change events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateChangedPayload {
    /// State entered.
    pub state: SessionState,
    /// Access token expiry, RFC 3339, when a session exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
}
