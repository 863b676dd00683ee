//! Error types for the bus session bridge
//!
//! This module contains all error types used by the bridge: configuration
//! errors rejected before any native call, native call failures, session
//! lifecycle errors, and the faults that are contained at the callback
//! boundary and written to the transcript instead of being returned.

use crate::bus::NativeOperation;

// ----------------------------------------------------------------------------
// Specific Error Types
// ----------------------------------------------------------------------------

/// Configuration errors, rejected before the native bus is touched
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("Session name must not be empty")]
    EmptySessionName,
    #[error("Handle must not be empty")]
    EmptyHandle,
    #[error("Invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
    #[error("Message too long: {len} bytes (max: {max})")]
    MessageTooLong { len: usize, max: usize },
}

/// A native bus call that reported failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Native {operation} failed (status {status}): {reason}")]
pub struct NativeCallError {
    pub operation: NativeOperation,
    pub status: i32,
    pub reason: String,
}

impl NativeCallError {
    pub fn new<R: Into<String>>(operation: NativeOperation, status: i32, reason: R) -> Self {
        Self {
            operation,
            status,
            reason: reason.into(),
        }
    }
}

/// Session lifecycle errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Session already active in state {state}")]
    AlreadyActive { state: &'static str },
    #[error("Not connected")]
    NotConnected,
    #[error("Session not established (state {state})")]
    NotEstablished { state: &'static str },
    #[error("Another connect or disconnect is in progress")]
    ControlBusy,
}

/// Faults contained at the native callback boundary
///
/// These never cross back into native code. They are rendered into the
/// transcript with the `Error` inform type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallbackFault {
    #[error("{callback}: null {argument} pointer")]
    NullPointer {
        callback: &'static str,
        argument: &'static str,
    },
    #[error("{callback}: negative size {size}")]
    NegativeSize { callback: &'static str, size: i32 },
    #[error("{callback}: handler panicked: {message}")]
    Panicked {
        callback: &'static str,
        message: String,
    },
}

/// Errors raised by the session state machine
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateTransitionError {
    #[error("Invalid transition from {from_state} on event {event}: {reason}")]
    InvalidTransition {
        from_state: &'static str,
        event: String,
        reason: String,
    },
}

// ----------------------------------------------------------------------------
// Main Error Type
// ----------------------------------------------------------------------------

/// Core error type for the bus session bridge
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BusChatError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Native call error: {0}")]
    Native(#[from] NativeCallError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),
}

impl BusChatError {
    /// Create an invalid configuration field error
    pub fn invalid_config<R: Into<String>>(field: &'static str, reason: R) -> Self {
        BusChatError::Configuration(ConfigurationError::InvalidField {
            field,
            reason: reason.into(),
        })
    }

    /// Create a native call failure
    pub fn native<R: Into<String>>(operation: NativeOperation, status: i32, reason: R) -> Self {
        BusChatError::Native(NativeCallError::new(operation, status, reason))
    }

    /// Whether the error was produced by the native bus rather than local validation
    pub fn is_native(&self) -> bool {
        matches!(self, BusChatError::Native(_))
    }
}

// ----------------------------------------------------------------------------
// Type Aliases
// ----------------------------------------------------------------------------

pub type Result<T> = core::result::Result<T, BusChatError>;
pub type BusChatResult<T> = Result<T>;
