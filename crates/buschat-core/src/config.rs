//! Bus Configuration
//!
//! Names the chat service is published under, plus the limits the bridge
//! enforces. Fixed at construction; a `BusHandle` copies them into an
//! immutable `BusTarget`.

use serde::{Deserialize, Serialize};

use crate::errors::{BusChatError, BusChatResult};

pub const DEFAULT_INTERFACE_NAME: &str = "org.alljoyn.bus.samples.chat";
pub const DEFAULT_NAME_PREFIX: &str = "org.alljoyn.bus.samples.chat.";
pub const DEFAULT_OBJECT_PATH: &str = "/chatService";
pub const DEFAULT_SESSION_PORT: u16 = 27;

// ----------------------------------------------------------------------------
// Bus Target
// ----------------------------------------------------------------------------

/// Interface, name prefix and object path a session is advertised under
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusTarget {
    pub interface_name: String,
    pub name_prefix: String,
    pub object_path: String,
    /// Contact port the session is bound to or joined on
    pub session_port: u16,
}

impl BusTarget {
    /// Well-known bus name for a session: prefix followed by the session name
    pub fn well_known_name(&self, session_name: &str) -> String {
        format!("{}{}", self.name_prefix, session_name)
    }
}

// ----------------------------------------------------------------------------
// Bus Configuration
// ----------------------------------------------------------------------------

/// Configuration for the session bridge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// D-Bus style interface name of the chat object
    pub interface_name: String,
    /// Prefix prepended to session names to form well-known names
    pub name_prefix: String,
    /// Object path the chat object is registered at
    pub object_path: String,
    /// Contact port for session joiners
    pub session_port: u16,
    /// Longest outbound message accepted by `send`, in bytes
    pub max_message_len: usize,
    /// Capacity of the display event channel
    pub event_buffer_size: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            interface_name: DEFAULT_INTERFACE_NAME.to_string(),
            name_prefix: DEFAULT_NAME_PREFIX.to_string(),
            object_path: DEFAULT_OBJECT_PATH.to_string(),
            session_port: DEFAULT_SESSION_PORT,
            max_message_len: 1024,
            event_buffer_size: 64,
        }
    }
}

impl BusConfig {
    /// Create configuration for tests, with a roomy event channel
    pub fn testing() -> Self {
        Self {
            event_buffer_size: 1024,
            ..Self::default()
        }
    }

    pub fn target(&self) -> BusTarget {
        BusTarget {
            interface_name: self.interface_name.clone(),
            name_prefix: self.name_prefix.clone(),
            object_path: self.object_path.clone(),
            session_port: self.session_port,
        }
    }

    /// Validate the configuration for consistency
    pub fn validate(&self) -> BusChatResult<()> {
        if self.interface_name.is_empty() {
            return Err(BusChatError::invalid_config("interface_name", "must not be empty"));
        }
        if !self.name_prefix.ends_with('.') {
            return Err(BusChatError::invalid_config(
                "name_prefix",
                format!("'{}' must end with '.'", self.name_prefix),
            ));
        }
        if !self.object_path.starts_with('/') {
            return Err(BusChatError::invalid_config(
                "object_path",
                format!("'{}' must start with '/'", self.object_path),
            ));
        }
        if self.max_message_len == 0 {
            return Err(BusChatError::invalid_config("max_message_len", "must be greater than 0"));
        }
        if self.event_buffer_size == 0 {
            return Err(BusChatError::invalid_config("event_buffer_size", "must be greater than 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = BusConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.session_port, 27);
        assert_eq!(config.target().session_port, 27);
        assert_eq!(
            config.target().well_known_name("chat1"),
            "org.alljoyn.bus.samples.chat.chat1"
        );
    }

    #[test]
    fn test_validation_rejects_bad_names() {
        let config = BusConfig {
            name_prefix: "org.example".to_string(),
            ..BusConfig::default()
        };
        assert!(config.validate().is_err());

        let config = BusConfig {
            object_path: "chatService".to_string(),
            ..BusConfig::default()
        };
        assert!(config.validate().is_err());

        let config = BusConfig {
            event_buffer_size: 0,
            ..BusConfig::testing()
        };
        assert!(config.validate().is_err());
    }
}
