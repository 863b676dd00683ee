//! BusChat Core
//!
//! Bridges a native, callback-driven message bus to chat session state. The
//! native side calls two `extern "C"` trampolines on threads it owns; this
//! crate turns those calls into a participant registry, a transcript and a
//! single session lifecycle, and exposes a control API to connect as owner
//! or joiner, send, and disconnect.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod bridge;
pub mod bus;
pub mod config;
pub mod errors;
pub mod events;
pub mod ffi;
pub mod machine;
pub mod registry;
pub mod session;
pub mod transcript;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use bridge::{CallbackBridge, Installation, TrampolineAnchor};
pub use bus::{BusHandle, NativeBus, NativeOperation};
pub use config::{BusConfig, BusTarget};
pub use errors::{
    BusChatError, BusChatResult, CallbackFault, ConfigurationError, NativeCallError, Result,
    SessionError, StateTransitionError,
};
pub use events::BridgeEvent;
pub use ffi::{CallbackTable, MessageCallback, ParticipantCallback};
pub use machine::SessionStateMachine;
pub use registry::{Participant, ParticipantRegistry};
pub use session::{Session, SessionEvent, SessionState};
pub use transcript::{TranscriptEntry, TranscriptLog};
pub use types::{InformType, Origin, SessionId, SessionMode, Timestamp};
