//! Append-only transcript
//!
//! One ordered record of everything the session produced: inbound messages,
//! local status lines and contained callback faults. Appends from the native
//! callback thread and the control thread are totally ordered by a single
//! lock; each entry gets its position as `sequence`.

use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::events::BridgeEvent;
use crate::types::{InformType, Origin, Timestamp};

// ----------------------------------------------------------------------------
// Transcript Entry
// ----------------------------------------------------------------------------

/// One immutable line of the transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    /// Position in the log, assigned on append
    pub sequence: u64,
    pub timestamp: Timestamp,
    pub origin: Origin,
    pub inform_type: InformType,
    pub text: String,
}

impl TranscriptEntry {
    pub fn new<T: Into<String>>(origin: Origin, inform_type: InformType, text: T) -> Self {
        Self {
            sequence: 0,
            timestamp: Timestamp::now(),
            origin,
            inform_type,
            text: text.into(),
        }
    }

    pub fn system<T: Into<String>>(inform_type: InformType, text: T) -> Self {
        Self::new(Origin::System, inform_type, text)
    }

    pub fn inbound<T: Into<String>>(inform_type: InformType, text: T) -> Self {
        Self::new(Origin::Inbound, inform_type, text)
    }

    /// Display form, prefixed with the inform type code: `"1:hello"`
    pub fn render(&self) -> String {
        format!("{}:{}", self.inform_type.code(), self.text)
    }
}

// ----------------------------------------------------------------------------
// Transcript Log
// ----------------------------------------------------------------------------

/// Thread-safe append-only sequence of transcript entries
#[derive(Debug)]
pub struct TranscriptLog {
    entries: Mutex<Vec<TranscriptEntry>>,
    events: Option<broadcast::Sender<BridgeEvent>>,
}

impl Default for TranscriptLog {
    fn default() -> Self {
        Self::new()
    }
}

impl TranscriptLog {
    /// Create a log that starts with the `New Session` banner
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Create a log that also publishes every appended entry
    pub fn with_events(events: broadcast::Sender<BridgeEvent>) -> Self {
        Self::build(Some(events))
    }

    fn build(events: Option<broadcast::Sender<BridgeEvent>>) -> Self {
        let log = Self {
            entries: Mutex::new(Vec::new()),
            events,
        };
        let opened = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        log.append(TranscriptEntry::system(
            InformType::System,
            format!("New Session {}", opened),
        ));
        log
    }

    fn entries(&self) -> MutexGuard<'_, Vec<TranscriptEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append `entry` at the end of the log and return it as stored
    ///
    /// The event is published while the lock is held so subscribers observe
    /// entries in log order.
    pub fn append(&self, mut entry: TranscriptEntry) -> TranscriptEntry {
        let mut entries = self.entries();
        entry.sequence = entries.len() as u64;
        entries.push(entry.clone());
        if let Some(events) = &self.events {
            // No receivers is fine: nobody is displaying yet.
            let _ = events.send(BridgeEvent::Transcript(entry.clone()));
        }
        entry
    }

    /// Copy of the full ordered sequence
    pub fn snapshot(&self) -> Vec<TranscriptEntry> {
        self.entries().clone()
    }

    /// Entries with `sequence >= from`, for displays that poll incrementally
    pub fn since(&self, from: u64) -> Vec<TranscriptEntry> {
        let entries = self.entries();
        let start = (from as usize).min(entries.len());
        entries[start..].to_vec()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_log_starts_with_banner() {
        let log = TranscriptLog::new();
        let entries = log.snapshot();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].sequence, 0);
        assert_eq!(entries[0].origin, Origin::System);
        assert!(entries[0].text.starts_with("New Session "));
    }

    #[test]
    fn test_append_assigns_sequence_and_renders_prefix() {
        let log = TranscriptLog::new();
        let stored = log.append(TranscriptEntry::inbound(InformType::Remote, "hello"));

        assert_eq!(stored.sequence, 1);
        assert_eq!(stored.render(), "1:hello");
        assert_eq!(log.since(1), vec![stored]);
        assert!(log.since(50).is_empty());
    }

    #[test]
    fn test_concurrent_appends_are_all_kept_in_order() {
        let log = Arc::new(TranscriptLog::new());

        let handles: Vec<_> = (0..4)
            .map(|writer| {
                let log = log.clone();
                thread::spawn(move || {
                    for i in 0..100 {
                        log.append(TranscriptEntry::inbound(
                            InformType::Remote,
                            format!("{writer}-{i}"),
                        ));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let entries = log.snapshot();
        assert_eq!(entries.len(), 401);
        for (index, entry) in entries.iter().enumerate() {
            assert_eq!(entry.sequence, index as u64);
        }

        // Each writer's own entries keep their program order.
        for writer in 0..4 {
            let own: Vec<usize> = entries
                .iter()
                .filter_map(|e| e.text.strip_prefix(&format!("{writer}-")))
                .map(|i| i.parse().unwrap())
                .collect();
            assert_eq!(own, (0..100).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_events_follow_log_order() {
        let (sender, mut receiver) = broadcast::channel(16);
        let log = TranscriptLog::with_events(sender);
        log.append(TranscriptEntry::inbound(InformType::Remote, "first"));

        let banner = receiver.try_recv().unwrap();
        let first = receiver.try_recv().unwrap();
        match (banner, first) {
            (BridgeEvent::Transcript(a), BridgeEvent::Transcript(b)) => {
                assert_eq!(a.sequence, 0);
                assert_eq!(b.text, "first");
            }
            other => panic!("unexpected events: {other:?}"),
        }
    }
}
