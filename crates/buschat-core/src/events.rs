//! Events published to display collaborators
//!
//! Delivered through a `tokio::sync::broadcast` channel so native threads
//! never wait on a slow reader: a lagging receiver loses the oldest events
//! and can resynchronize from `TranscriptLog::since`.

use crate::registry::Participant;
use crate::session::Session;
use crate::transcript::TranscriptEntry;

/// Something observable happened on the bridge
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    /// An entry was appended to the transcript
    Transcript(TranscriptEntry),
    /// A handle was registered for the first time
    ParticipantJoined(Participant),
    /// The session object materialized after the first join notification
    SessionEstablished(Session),
    /// The session was torn down by an explicit disconnect
    Disconnected,
}
