//! Participant registry
//!
//! Thread-safe set of session participants keyed by display handle. Fed only
//! by participant-subscribed callbacks. Membership never shrinks: the bus
//! reports joins but not departures.

use std::sync::{Mutex, MutexGuard, PoisonError};

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::types::Timestamp;

/// A peer that joined the session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub name: String,
    pub joined_at: Timestamp,
}

#[derive(Debug, Default)]
struct Members {
    /// Index into `order` by handle
    by_name: HashMap<String, usize>,
    /// Participants in registration order
    order: Vec<Participant>,
}

/// Registry of participants, safe to share between the native callback
/// thread and display readers
#[derive(Debug, Default)]
pub struct ParticipantRegistry {
    members: Mutex<Members>,
}

impl ParticipantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn members(&self) -> MutexGuard<'_, Members> {
        self.members.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert `name`, or do nothing if it is already present
    ///
    /// Returns `true` only for the call that actually inserted the handle.
    pub fn register(&self, name: &str) -> bool {
        self.register_at(name, Timestamp::now()).is_some()
    }

    /// Like `register`, returning the new participant record
    pub fn register_at(&self, name: &str, joined_at: Timestamp) -> Option<Participant> {
        let mut members = self.members();
        if members.by_name.contains_key(name) {
            return None;
        }
        let participant = Participant {
            name: name.to_string(),
            joined_at,
        };
        let index = members.order.len();
        members.order.push(participant.clone());
        members.by_name.insert(name.to_string(), index);
        Some(participant)
    }

    /// Snapshot of all participants in registration order
    pub fn list(&self) -> Vec<Participant> {
        self.members().order.clone()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.members().by_name.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.members().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
