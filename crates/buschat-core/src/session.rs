//! Session State Machine
//!
//! Pure transition function for the single chat session. Holds no locks and
//! makes no native calls; the callback bridge applies it under the session
//! state mutex and `SessionStateMachine` performs the native side effects.
//!
//! ```text
//! Disconnected --Connect--> Connecting --ParticipantJoined--> Owner | Joined
//!      ^                        |                                  |
//!      +------ConnectFailed-----+                                  |
//!      +---------------------------Disconnect----------------------+
//! ```

use serde::{Deserialize, Serialize};

use crate::errors::StateTransitionError;
use crate::types::{SessionId, SessionMode, Timestamp};

// ----------------------------------------------------------------------------
// Session State Types
// ----------------------------------------------------------------------------

/// Lifecycle state of the session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// No bus connection
    Disconnected,
    /// Native advertise/join issued, waiting for the first participant
    Connecting(ConnectingState),
    /// Advertising, at least one joiner reported
    Owner(Session),
    /// Joined an advertised session
    Joined(Session),
}

/// State while waiting for the first participant notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectingState {
    pub mode: SessionMode,
    pub session_name: String,
    pub handle: String,
    /// Set once the native advertise/join call has returned
    pub session_id: Option<SessionId>,
    /// A participant was reported before the native call returned
    pub joined_early: bool,
    pub started_at: Timestamp,
}

/// The materialized session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub mode: SessionMode,
    pub id: SessionId,
    pub name: String,
    pub handle: String,
    pub established_at: Timestamp,
}

// ----------------------------------------------------------------------------
// State Transition Events
// ----------------------------------------------------------------------------

/// Events that drive the session lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// User asked to connect
    Connect {
        mode: SessionMode,
        session_name: String,
        handle: String,
    },
    /// Native advertise/join returned successfully
    NativeAccepted { session_id: SessionId },
    /// Native advertise/join reported failure
    ConnectFailed { reason: String },
    /// The bus reported a participant
    ParticipantJoined,
    /// User asked to disconnect
    Disconnect,
}

/// Result of a state transition
#[derive(Debug, Clone)]
pub struct StateTransition {
    pub new_state: SessionState,
    /// Set when this transition created the session object
    pub materialized: Option<Session>,
    pub audit_entry: AuditEntry,
}

/// Audit trail entry for state transitions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: Timestamp,
    pub from_state: String,
    pub to_state: String,
    pub event: String,
}

// ----------------------------------------------------------------------------
// State Machine Implementation
// ----------------------------------------------------------------------------

impl Default for SessionState {
    fn default() -> Self {
        SessionState::Disconnected
    }
}

impl SessionState {
    /// Get current state name for logging/audit
    pub fn state_name(&self) -> &'static str {
        match self {
            SessionState::Disconnected => "Disconnected",
            SessionState::Connecting(_) => "Connecting",
            SessionState::Owner(_) => "Owner",
            SessionState::Joined(_) => "Joined",
        }
    }

    /// The established session, if any
    pub fn session(&self) -> Option<&Session> {
        match self {
            SessionState::Owner(session) | SessionState::Joined(session) => Some(session),
            _ => None,
        }
    }

    /// Session id known to the native side, established or not
    pub fn session_id(&self) -> Option<SessionId> {
        match self {
            SessionState::Disconnected => None,
            SessionState::Connecting(state) => state.session_id,
            SessionState::Owner(session) | SessionState::Joined(session) => Some(session.id),
        }
    }

    pub fn is_disconnected(&self) -> bool {
        matches!(self, SessionState::Disconnected)
    }

    /// Check if state allows message sending
    pub fn can_send_messages(&self) -> bool {
        self.session().is_some()
    }

    /// Compute the state that follows `event`
    pub fn transition(&self, event: SessionEvent) -> Result<StateTransition, StateTransitionError> {
        let from_state = self.state_name();
        let event_name = format!("{:?}", event);
        let mut materialized = None;

        let new_state = match (self, event) {
            // From Disconnected
            (
                SessionState::Disconnected,
                SessionEvent::Connect {
                    mode,
                    session_name,
                    handle,
                },
            ) => SessionState::Connecting(ConnectingState {
                mode,
                session_name,
                handle,
                session_id: None,
                joined_early: false,
                started_at: Timestamp::now(),
            }),

            // From Connecting
            (SessionState::Connecting(state), SessionEvent::NativeAccepted { session_id })
                if state.session_id.is_none() =>
            {
                let mut state = state.clone();
                state.session_id = Some(session_id);
                if state.joined_early {
                    let (next, session) = materialize(&state, session_id);
                    materialized = Some(session);
                    next
                } else {
                    SessionState::Connecting(state)
                }
            }

            (SessionState::Connecting(_), SessionEvent::ConnectFailed { .. }) => {
                SessionState::Disconnected
            }

            (SessionState::Connecting(state), SessionEvent::ParticipantJoined) => {
                match state.session_id {
                    Some(session_id) => {
                        let (next, session) = materialize(state, session_id);
                        materialized = Some(session);
                        next
                    }
                    None => {
                        let mut state = state.clone();
                        state.joined_early = true;
                        SessionState::Connecting(state)
                    }
                }
            }

            // Further joins leave an established session unchanged
            (
                SessionState::Owner(_) | SessionState::Joined(_),
                SessionEvent::ParticipantJoined,
            ) => self.clone(),

            // Disconnect from any active state
            (
                SessionState::Connecting(_) | SessionState::Owner(_) | SessionState::Joined(_),
                SessionEvent::Disconnect,
            ) => SessionState::Disconnected,

            // Invalid transitions
            (_, event) => {
                return Err(StateTransitionError::InvalidTransition {
                    from_state,
                    event: event_name,
                    reason: format!("Event {:?} not valid for state {}", event, from_state),
                });
            }
        };

        let audit_entry = AuditEntry {
            timestamp: Timestamp::now(),
            from_state: from_state.to_string(),
            to_state: new_state.state_name().to_string(),
            event: event_name,
        };

        Ok(StateTransition {
            new_state,
            materialized,
            audit_entry,
        })
    }
}

fn materialize(state: &ConnectingState, session_id: SessionId) -> (SessionState, Session) {
    let session = Session {
        mode: state.mode,
        id: session_id,
        name: state.session_name.clone(),
        handle: state.handle.clone(),
        established_at: Timestamp::now(),
    };
    let next = match state.mode {
        SessionMode::Owner => SessionState::Owner(session.clone()),
        SessionMode::Joiner => SessionState::Joined(session.clone()),
    };
    (next, session)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn connect_event(mode: SessionMode) -> SessionEvent {
        SessionEvent::Connect {
            mode,
            session_name: "chat1".to_string(),
            handle: "alice".to_string(),
        }
    }

    fn accepted(id: u32) -> SessionEvent {
        SessionEvent::NativeAccepted {
            session_id: SessionId::new(id),
        }
    }

    #[test]
    fn test_initial_state() {
        let state = SessionState::default();
        assert_eq!(state.state_name(), "Disconnected");
        assert!(!state.can_send_messages());
        assert_eq!(state.session_id(), None);
    }

    #[test]
    fn test_owner_flow() {
        let state = SessionState::Disconnected;

        let transition = state.transition(connect_event(SessionMode::Owner)).unwrap();
        assert_eq!(transition.new_state.state_name(), "Connecting");
        assert_eq!(transition.audit_entry.from_state, "Disconnected");

        let state = transition.new_state.transition(accepted(7)).unwrap().new_state;
        assert_eq!(state.state_name(), "Connecting");
        assert_eq!(state.session_id(), Some(SessionId::new(7)));

        let transition = state.transition(SessionEvent::ParticipantJoined).unwrap();
        assert_eq!(transition.new_state.state_name(), "Owner");
        let session = transition.materialized.unwrap();
        assert_eq!(session.id, SessionId::new(7));
        assert_eq!(session.handle, "alice");
        assert!(transition.new_state.can_send_messages());
    }

    #[test]
    fn test_joiner_materializes_as_joined() {
        let state = SessionState::Disconnected
            .transition(connect_event(SessionMode::Joiner))
            .unwrap()
            .new_state
            .transition(accepted(3))
            .unwrap()
            .new_state;

        let transition = state.transition(SessionEvent::ParticipantJoined).unwrap();
        assert_eq!(transition.new_state.state_name(), "Joined");
        assert!(transition.materialized.is_some());
    }

    #[test]
    fn test_join_before_native_return_defers_materialization() {
        let state = SessionState::Disconnected
            .transition(connect_event(SessionMode::Owner))
            .unwrap()
            .new_state;

        let transition = state.transition(SessionEvent::ParticipantJoined).unwrap();
        assert_eq!(transition.new_state.state_name(), "Connecting");
        assert!(transition.materialized.is_none());

        let transition = transition.new_state.transition(accepted(9)).unwrap();
        assert_eq!(transition.new_state.state_name(), "Owner");
        assert!(transition.materialized.is_some());
    }

    #[test]
    fn test_second_join_does_not_rematerialize() {
        let state = SessionState::Disconnected
            .transition(connect_event(SessionMode::Owner))
            .unwrap()
            .new_state
            .transition(accepted(1))
            .unwrap()
            .new_state
            .transition(SessionEvent::ParticipantJoined)
            .unwrap()
            .new_state;

        let transition = state.transition(SessionEvent::ParticipantJoined).unwrap();
        assert!(transition.materialized.is_none());
        assert_eq!(transition.new_state, state);
    }

    #[test]
    fn test_connect_rejected_while_active() {
        let state = SessionState::Disconnected
            .transition(connect_event(SessionMode::Owner))
            .unwrap()
            .new_state;

        let result = state.transition(connect_event(SessionMode::Joiner));
        match result {
            Err(StateTransitionError::InvalidTransition { from_state, .. }) => {
                assert_eq!(from_state, "Connecting");
            }
            Ok(_) => panic!("Expected InvalidTransition error"),
        }
    }

    #[test]
    fn test_connect_failure_reverts() {
        let state = SessionState::Disconnected
            .transition(connect_event(SessionMode::Joiner))
            .unwrap()
            .new_state;

        let transition = state
            .transition(SessionEvent::ConnectFailed {
                reason: "no such name".to_string(),
            })
            .unwrap();
        assert!(transition.new_state.is_disconnected());
    }

    #[test]
    fn test_disconnect_requires_active_state() {
        assert!(SessionState::Disconnected
            .transition(SessionEvent::Disconnect)
            .is_err());
        assert!(SessionState::Disconnected
            .transition(SessionEvent::ParticipantJoined)
            .is_err());
    }
}
