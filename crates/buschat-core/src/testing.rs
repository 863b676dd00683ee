//! In-process loopback bus
//!
//! Stands in for the native message bus in tests and demos. Deliveries go
//! through the registered `CallbackTable`, so they exercise the real
//! `extern "C"` trampolines. A delivery holds the table read lock for its
//! whole duration and `clear_callbacks` takes the write lock, which gives the
//! same "no callback still running" guarantee the native bus provides.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use hashbrown::HashSet;
use tracing::debug;

use crate::bus::{NativeBus, NativeOperation};
use crate::config::BusTarget;
use crate::errors::NativeCallError;
use crate::ffi::CallbackTable;
use crate::types::SessionId;

/// Status reported for injected failures
pub const INJECTED_FAILURE_STATUS: i32 = 0x9000;

type LeaveHook = Box<dyn Fn(&LoopbackBus) + Send + Sync>;

#[derive(Debug, Default)]
struct LoopbackLog {
    operations: Vec<NativeOperation>,
    failures: HashSet<NativeOperation>,
    sent: Vec<(SessionId, String)>,
    next_session: u32,
    open: Option<SessionId>,
    targets: Vec<BusTarget>,
}

/// Loopback implementation of `NativeBus`
#[derive(Default)]
pub struct LoopbackBus {
    table: RwLock<Option<CallbackTable>>,
    log: Mutex<LoopbackLog>,
    leave_hook: Mutex<Option<LeaveHook>>,
}

impl LoopbackBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn log(&self) -> MutexGuard<'_, LoopbackLog> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the next call of `operation` report failure
    pub fn fail_next(&self, operation: NativeOperation) {
        self.log().failures.insert(operation);
    }

    /// Run `hook` inside the next native leave calls, before they return
    pub fn on_leave<F>(&self, hook: F)
    where
        F: Fn(&LoopbackBus) + Send + Sync + 'static,
    {
        *self
            .leave_hook
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Box::new(hook));
    }

    /// Every native call received, in order
    pub fn operations(&self) -> Vec<NativeOperation> {
        self.log().operations.clone()
    }

    /// Texts passed to `send`, with their session
    pub fn sent(&self) -> Vec<(SessionId, String)> {
        self.log().sent.clone()
    }

    /// Target of the most recent advertise or join
    pub fn last_target(&self) -> Option<BusTarget> {
        self.log().targets.last().cloned()
    }

    pub fn open_session(&self) -> Option<SessionId> {
        self.log().open
    }

    pub fn is_registered(&self) -> bool {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Run `f` against the registered table while holding the read lock
    ///
    /// Returns `None` when no table is registered.
    pub fn with_table<R>(&self, f: impl FnOnce(&CallbackTable) -> R) -> Option<R> {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        table.as_ref().map(f)
    }

    /// Deliver a text line through the trampolines
    pub fn deliver_message(&self, text: &str, inform_type: i32) -> bool {
        self.with_table(|table| {
            // SAFETY: a registered table is only cleared before its anchor is
            // released, and clearing waits for this read lock.
            unsafe { table.deliver_message(text.as_bytes(), inform_type) }
        })
        .is_some()
    }

    /// Deliver a participant notification through the trampolines
    pub fn deliver_participant(&self, name: &str) -> bool {
        self.with_table(|table| {
            // SAFETY: see `deliver_message`.
            unsafe { table.deliver_participant(name.as_bytes()) }
        })
        .is_some()
    }

    /// Record `operation` and consume a pending injected failure for it
    fn record(&self, operation: NativeOperation) -> Result<(), NativeCallError> {
        let mut log = self.log();
        log.operations.push(operation);
        if log.failures.remove(&operation) {
            debug!("Loopback failing {}", operation);
            return Err(NativeCallError::new(
                operation,
                INJECTED_FAILURE_STATUS,
                "injected failure",
            ));
        }
        Ok(())
    }

    fn open(&self, operation: NativeOperation, target: &BusTarget) -> Result<SessionId, NativeCallError> {
        self.record(operation)?;
        let mut log = self.log();
        log.targets.push(target.clone());
        if log.open.is_some() {
            return Err(NativeCallError::new(operation, 1, "session already open"));
        }
        log.next_session += 1;
        let session = SessionId::new(log.next_session);
        log.open = Some(session);
        Ok(session)
    }
}

impl NativeBus for LoopbackBus {
    fn register_callbacks(&self, table: CallbackTable) -> Result<(), NativeCallError> {
        self.record(NativeOperation::RegisterCallbacks)?;
        *self.table.write().unwrap_or_else(PoisonError::into_inner) = Some(table);
        Ok(())
    }

    fn clear_callbacks(&self) -> Result<(), NativeCallError> {
        self.record(NativeOperation::ClearCallbacks)?;
        *self.table.write().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }

    fn advertise(&self, target: &BusTarget, session_name: &str) -> Result<SessionId, NativeCallError> {
        debug!(
            "Loopback advertising {} on port {}",
            target.well_known_name(session_name),
            target.session_port
        );
        self.open(NativeOperation::Advertise, target)
    }

    fn discover_and_join(
        &self,
        target: &BusTarget,
        session_name: &str,
    ) -> Result<SessionId, NativeCallError> {
        debug!(
            "Loopback joining {} on port {}",
            target.well_known_name(session_name),
            target.session_port
        );
        self.open(NativeOperation::DiscoverAndJoin, target)
    }

    fn leave(&self, session: SessionId) -> Result<(), NativeCallError> {
        self.record(NativeOperation::Leave)?;
        if let Some(hook) = self
            .leave_hook
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            hook(self);
        }
        let mut log = self.log();
        if log.open != Some(session) {
            return Err(NativeCallError::new(
                NativeOperation::Leave,
                1,
                format!("session {} is not open", session),
            ));
        }
        log.open = None;
        Ok(())
    }

    fn send(&self, session: SessionId, text: &str) -> Result<(), NativeCallError> {
        self.record(NativeOperation::Send)?;
        let mut log = self.log();
        if log.open != Some(session) {
            return Err(NativeCallError::new(
                NativeOperation::Send,
                1,
                format!("session {} is not open", session),
            ));
        }
        log.sent.push((session, text.to_string()));
        Ok(())
    }
}
