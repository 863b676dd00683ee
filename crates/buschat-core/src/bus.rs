//! Native bus call surface
//!
//! `NativeBus` is the seam to the external message bus. `BusHandle` owns one
//! connection to it for the lifetime of a session: it is created on connect
//! and dropped by disconnect, so no call can be issued through a released
//! handle.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::BusTarget;
use crate::errors::NativeCallError;
use crate::ffi::CallbackTable;
use crate::types::{SessionId, SessionMode};

// ----------------------------------------------------------------------------
// Native Operations
// ----------------------------------------------------------------------------

/// Native calls the bridge issues, used in errors and logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NativeOperation {
    RegisterCallbacks,
    ClearCallbacks,
    Advertise,
    DiscoverAndJoin,
    Leave,
    Send,
}

impl fmt::Display for NativeOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NativeOperation::RegisterCallbacks => "register_callbacks",
            NativeOperation::ClearCallbacks => "clear_callbacks",
            NativeOperation::Advertise => "advertise",
            NativeOperation::DiscoverAndJoin => "discover_and_join",
            NativeOperation::Leave => "leave",
            NativeOperation::Send => "send",
        };
        f.write_str(name)
    }
}

// ----------------------------------------------------------------------------
// Native Bus Trait
// ----------------------------------------------------------------------------

/// Synchronous call surface of the native message bus
///
/// Every method may block the caller and must never be invoked from inside a
/// callback delivered through the registered `CallbackTable`.
pub trait NativeBus: Send + Sync {
    /// Hand the trampoline table to the native side
    fn register_callbacks(&self, table: CallbackTable) -> Result<(), NativeCallError>;

    /// Stop invoking the registered table
    ///
    /// Must not return while a callback through the table is still running.
    fn clear_callbacks(&self) -> Result<(), NativeCallError>;

    /// Advertise `session_name` and host a session for joiners
    fn advertise(&self, target: &BusTarget, session_name: &str)
        -> Result<SessionId, NativeCallError>;

    /// Find an advertised `session_name` and join it
    fn discover_and_join(
        &self,
        target: &BusTarget,
        session_name: &str,
    ) -> Result<SessionId, NativeCallError>;

    /// Leave the session, or cancel the advertisement when hosting it
    fn leave(&self, session: SessionId) -> Result<(), NativeCallError>;

    /// Emit a chat signal on the session
    fn send(&self, session: SessionId, text: &str) -> Result<(), NativeCallError>;
}

// ----------------------------------------------------------------------------
// Bus Handle
// ----------------------------------------------------------------------------

/// Owning handle to one native bus connection
pub struct BusHandle {
    bus: Arc<dyn NativeBus>,
    target: BusTarget,
}

impl fmt::Debug for BusHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BusHandle")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

impl BusHandle {
    pub fn new(bus: Arc<dyn NativeBus>, target: BusTarget) -> Self {
        Self { bus, target }
    }

    pub fn interface_name(&self) -> &str {
        &self.target.interface_name
    }

    pub fn name_prefix(&self) -> &str {
        &self.target.name_prefix
    }

    pub fn object_path(&self) -> &str {
        &self.target.object_path
    }

    pub fn session_port(&self) -> u16 {
        self.target.session_port
    }

    pub fn target(&self) -> &BusTarget {
        &self.target
    }

    pub fn register_callbacks(&self, table: CallbackTable) -> Result<(), NativeCallError> {
        debug!("Registering trampolines with native bus");
        self.bus.register_callbacks(table).map_err(log_failure)
    }

    pub fn clear_callbacks(&self) -> Result<(), NativeCallError> {
        debug!("Clearing trampolines from native bus");
        self.bus.clear_callbacks().map_err(log_failure)
    }

    /// Advertise or join depending on `mode`
    pub fn open_session(
        &self,
        mode: SessionMode,
        session_name: &str,
    ) -> Result<SessionId, NativeCallError> {
        debug!(
            "Opening session {} as {}",
            self.target.well_known_name(session_name),
            mode
        );
        let result = match mode {
            SessionMode::Owner => self.bus.advertise(&self.target, session_name),
            SessionMode::Joiner => self.bus.discover_and_join(&self.target, session_name),
        };
        result.map_err(log_failure)
    }

    pub fn leave(&self, session: SessionId) -> Result<(), NativeCallError> {
        debug!("Leaving session {}", session);
        self.bus.leave(session).map_err(log_failure)
    }

    pub fn send(&self, session: SessionId, text: &str) -> Result<(), NativeCallError> {
        self.bus.send(session, text).map_err(log_failure)
    }
}

fn log_failure(error: NativeCallError) -> NativeCallError {
    warn!("{}", error);
    error
}
