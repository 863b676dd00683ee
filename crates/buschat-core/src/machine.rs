//! Session controller
//!
//! Control-thread API over the bridge: connect, send, disconnect and the
//! snapshots a display reads. Control operations are serialized by the link
//! mutex, which callbacks never touch; native calls are made without holding
//! the session state lock so callbacks can always make progress.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};

use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::bridge::{CallbackBridge, Installation, TrampolineAnchor};
use crate::bus::{BusHandle, NativeBus};
use crate::config::BusConfig;
use crate::errors::{
    BusChatError, BusChatResult, ConfigurationError, NativeCallError, SessionError,
    StateTransitionError,
};
use crate::events::BridgeEvent;
use crate::registry::Participant;
use crate::session::{Session, SessionEvent, SessionState};
use crate::transcript::TranscriptEntry;
use crate::types::{InformType, Origin, SessionMode};

/// Native resources held while a session is open
///
/// Torn down in a fixed order: leave, clear callbacks, release the anchor,
/// then drop the handle.
struct ActiveLink {
    handle: BusHandle,
    anchor: TrampolineAnchor,
    session_name: String,
}

/// Owner of the single chat session
pub struct SessionStateMachine {
    config: BusConfig,
    bus: Arc<dyn NativeBus>,
    bridge: CallbackBridge,
    link: Mutex<Option<ActiveLink>>,
}

impl SessionStateMachine {
    pub fn new(bus: Arc<dyn NativeBus>, config: BusConfig) -> BusChatResult<Self> {
        config.validate()?;
        let bridge = CallbackBridge::new(config.event_buffer_size);
        Ok(Self {
            config,
            bus,
            bridge,
            link: Mutex::new(None),
        })
    }

    fn link(&self) -> MutexGuard<'_, Option<ActiveLink>> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn system(&self, inform_type: InformType, text: String) {
        self.bridge
            .transcript()
            .append(TranscriptEntry::system(inform_type, text));
    }

    // ------------------------------------------------------------------------
    // Display accessors
    // ------------------------------------------------------------------------

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    pub fn bridge(&self) -> &CallbackBridge {
        &self.bridge
    }

    /// See `CallbackBridge::install`
    pub fn install<M, P>(&self, on_message: M, on_participant: P) -> Installation
    where
        M: Fn(&TranscriptEntry) + Send + Sync + 'static,
        P: Fn(&Participant) + Send + Sync + 'static,
    {
        self.bridge.install(on_message, on_participant)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.bridge.subscribe()
    }

    pub fn state(&self) -> SessionState {
        self.bridge.state()
    }

    pub fn session(&self) -> Option<Session> {
        self.bridge.state().session().cloned()
    }

    pub fn get_participants(&self) -> Vec<Participant> {
        self.bridge.registry().list()
    }

    pub fn get_transcript(&self) -> Vec<TranscriptEntry> {
        self.bridge.transcript().snapshot()
    }

    pub fn sessions_established(&self) -> u64 {
        self.bridge.sessions_established()
    }

    pub fn trampolines_anchored(&self) -> bool {
        self.bridge.anchored()
    }

    // ------------------------------------------------------------------------
    // Control operations
    // ------------------------------------------------------------------------

    /// Open a session as owner or joiner
    ///
    /// Returns once the native advertise/join call returns. The session
    /// object materializes later, on the first participant notification.
    pub fn connect(&self, mode: SessionMode, session_name: &str, handle: &str) -> BusChatResult<()> {
        if session_name.trim().is_empty() {
            return Err(ConfigurationError::EmptySessionName.into());
        }
        if handle.trim().is_empty() {
            return Err(ConfigurationError::EmptyHandle.into());
        }

        let mut link = match self.link.try_lock() {
            Ok(link) => link,
            Err(TryLockError::WouldBlock) => return Err(SessionError::ControlBusy.into()),
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };

        let context = self.bridge.context();
        context
            .apply(SessionEvent::Connect {
                mode,
                session_name: session_name.to_string(),
                handle: handle.to_string(),
            })
            .map_err(|StateTransitionError::InvalidTransition { from_state, .. }| {
                SessionError::AlreadyActive { state: from_state }
            })?;

        let bus_handle = BusHandle::new(self.bus.clone(), self.config.target());
        let anchor = self.bridge.anchor();

        if let Err(failure) = bus_handle.register_callbacks(anchor.table()) {
            // The table was refused, so nothing native can hold it.
            self.abort_connect(&failure);
            return Err(failure.into());
        }

        let well_known = bus_handle.target().well_known_name(session_name);
        info!("Connecting to {} as {}", well_known, mode);
        self.system(InformType::Status, format!("{} is {}", well_known, mode));

        let session_id = match bus_handle.open_session(mode, session_name) {
            Ok(session_id) => session_id,
            Err(failure) => {
                match bus_handle.clear_callbacks() {
                    Ok(()) => drop(anchor),
                    Err(clear_failure) => {
                        error!("Cannot confirm callbacks stopped: {}", clear_failure);
                        anchor.leak();
                    }
                }
                self.abort_connect(&failure);
                return Err(failure.into());
            }
        };

        if let Err(transition) = context.apply(SessionEvent::NativeAccepted { session_id }) {
            warn!("Unexpected state after native accept: {}", transition);
        }

        *link = Some(ActiveLink {
            handle: bus_handle,
            anchor,
            session_name: session_name.to_string(),
        });
        info!("Native {} call returned session {}", mode, session_id);
        Ok(())
    }

    fn abort_connect(&self, failure: &NativeCallError) {
        if let Err(transition) = self.bridge.context().apply(SessionEvent::ConnectFailed {
            reason: failure.to_string(),
        }) {
            warn!("Unexpected state while reverting connect: {}", transition);
        }
        self.system(InformType::Error, format!("Connect failed: {}", failure));
    }

    /// Emit `text` on the established session
    pub fn send(&self, text: &str) -> BusChatResult<()> {
        if text.len() > self.config.max_message_len {
            return Err(ConfigurationError::MessageTooLong {
                len: text.len(),
                max: self.config.max_message_len,
            }
            .into());
        }

        let link = self.link();
        let state = self.bridge.state();
        let session = match state.session() {
            Some(session) if state.can_send_messages() => session,
            _ => {
                return Err(SessionError::NotEstablished {
                    state: state.state_name(),
                }
                .into())
            }
        };
        let Some(active) = link.as_ref() else {
            return Err(SessionError::NotConnected.into());
        };

        active.handle.send(session.id, text)?;
        self.bridge.transcript().append(TranscriptEntry::new(
            Origin::Outbound,
            InformType::Status,
            format!("{}: {}", session.handle, text),
        ));
        Ok(())
    }

    /// Leave the session and release the native resources
    ///
    /// A failed native leave keeps the session intact and is returned to the
    /// caller; the trampolines stay anchored.
    pub fn disconnect(&self) -> BusChatResult<()> {
        let mut link = self.link();
        let state = self.bridge.state();
        if state.is_disconnected() {
            return Err(SessionError::NotConnected.into());
        }
        let Some(active) = link.as_ref() else {
            return Err(SessionError::NotConnected.into());
        };

        if let Some(session_id) = state.session_id() {
            active.handle.leave(session_id)?;
        }
        let cleared = active.handle.clear_callbacks();

        let Some(ActiveLink {
            handle,
            anchor,
            session_name,
        }) = link.take()
        else {
            return Err(SessionError::NotConnected.into());
        };

        if let Err(transition) = self.bridge.context().apply(SessionEvent::Disconnect) {
            warn!("Unexpected state while disconnecting: {}", transition);
        }
        self.system(
            InformType::Status,
            format!("Disconnected from {}", handle.target().well_known_name(&session_name)),
        );
        self.bridge.context().publish(BridgeEvent::Disconnected);

        match &cleared {
            Ok(()) => drop(anchor),
            Err(failure) => {
                error!("Cannot confirm callbacks stopped: {}", failure);
                anchor.leak();
            }
        }
        drop(handle);
        info!("Disconnected from {}", session_name);

        cleared.map_err(BusChatError::from)
    }
}

impl Drop for SessionStateMachine {
    fn drop(&mut self) {
        let Some(active) = self.link().take() else {
            return;
        };
        warn!("Session controller dropped while connected, leaving {}", active.session_name);
        if let Some(session_id) = self.bridge.state().session_id() {
            if let Err(failure) = active.handle.leave(session_id) {
                warn!("Leave during drop failed: {}", failure);
            }
        }
        match active.handle.clear_callbacks() {
            Ok(()) => drop(active.anchor),
            Err(_) => active.anchor.leak(),
        }
    }
}
