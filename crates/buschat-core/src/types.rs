//! Core types for the bus session bridge
//!
//! Newtypes and small enums shared by the registry, the transcript and the
//! session state machine.

use core::fmt;
use core::ops::{Add, Sub};
use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Timestamp
// ----------------------------------------------------------------------------

/// Millisecond timestamp since Unix epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Add<u64> for Timestamp {
    type Output = Timestamp;

    fn add(self, other: u64) -> Timestamp {
        Timestamp(self.0 + other)
    }
}

impl Sub for Timestamp {
    type Output = u64;

    fn sub(self, other: Timestamp) -> u64 {
        self.0.saturating_sub(other.0)
    }
}

impl Timestamp {
    /// Create a new timestamp
    pub fn new(millis: u64) -> Self {
        Self(millis)
    }

    /// Current wall-clock time
    pub fn now() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self(duration.as_millis() as u64)
    }

    /// Get the raw milliseconds
    pub fn as_millis(&self) -> u64 {
        self.0
    }
}

// ----------------------------------------------------------------------------
// Session Identity
// ----------------------------------------------------------------------------

/// Session identifier assigned by the native bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(u32);

impl SessionId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role requested when connecting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionMode {
    /// Advertise the session name and wait for joiners
    Owner,
    /// Discover an advertised session and attach to it
    Joiner,
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionMode::Owner => write!(f, "advertiser"),
            SessionMode::Joiner => write!(f, "joiner"),
        }
    }
}

// ----------------------------------------------------------------------------
// Transcript Classification
// ----------------------------------------------------------------------------

/// Severity code the native side attaches to each text line
///
/// Only used to prefix rendered transcript lines. Codes the bridge does not
/// know are kept as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InformType {
    Error,
    Remote,
    Status,
    System,
    Other(i32),
}

impl InformType {
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => InformType::Error,
            1 => InformType::Remote,
            2 => InformType::Status,
            3 => InformType::System,
            other => InformType::Other(other),
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            InformType::Error => 0,
            InformType::Remote => 1,
            InformType::Status => 2,
            InformType::System => 3,
            InformType::Other(code) => *code,
        }
    }
}

impl From<i32> for InformType {
    fn from(code: i32) -> Self {
        InformType::from_code(code)
    }
}

/// Where a transcript line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Origin {
    /// Generated locally by the bridge (status, banner, contained faults)
    System,
    /// Delivered by the native bus on one of its threads
    Inbound,
    /// Sent by the local user through `send`
    Outbound,
}
