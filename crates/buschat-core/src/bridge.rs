//! Callback Bridge
//!
//! Owns the two `extern "C"` entry points the native bus calls on its own
//! threads and turns each invocation into typed updates of the shared
//! session state:
//! - message received: appended to the transcript
//! - participant subscribed: registered, and the session materialized on the
//!   first notification while connecting
//!
//! The native side only ever sees a `CallbackTable` whose context pointer is
//! an `Arc<BridgeContext>` leaked into a `TrampolineAnchor`. The anchor is
//! the only thing keeping that pointer valid; it must outlive every callback
//! the native side can still make.
//!
//! Nothing unwinds across the boundary: decode errors and panics are caught
//! and written to the transcript as `Error` lines.

use std::any::Any;
use std::ffi::{c_char, c_int, c_void};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::errors::{CallbackFault, StateTransitionError};
use crate::events::BridgeEvent;
use crate::ffi::{decode_native_text, CallbackTable};
use crate::registry::{Participant, ParticipantRegistry};
use crate::session::{SessionEvent, SessionState, StateTransition};
use crate::transcript::{TranscriptEntry, TranscriptLog};
use crate::types::{InformType, Timestamp};

const ON_MESSAGE: &str = "on_message_received";
const ON_PARTICIPANT: &str = "on_participant_subscribed";

type MessageHandler = Box<dyn Fn(&TranscriptEntry) + Send + Sync>;
type ParticipantHandler = Box<dyn Fn(&Participant) + Send + Sync>;

struct Handlers {
    on_message: MessageHandler,
    on_participant: ParticipantHandler,
}

/// Outcome of `CallbackBridge::install`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Installation {
    Installed,
    /// Handlers were already present; the new ones were dropped
    AlreadyInstalled,
}

// ----------------------------------------------------------------------------
// Shared Context
// ----------------------------------------------------------------------------

/// State reachable from native callback threads
pub(crate) struct BridgeContext {
    pub(crate) registry: ParticipantRegistry,
    pub(crate) transcript: TranscriptLog,
    state: Mutex<SessionState>,
    handlers: OnceLock<Handlers>,
    events: broadcast::Sender<BridgeEvent>,
    anchors: AtomicUsize,
    materialized: AtomicU64,
}

impl BridgeContext {
    fn new(event_buffer_size: usize) -> Self {
        let (events, _) = broadcast::channel(event_buffer_size.max(1));
        Self {
            registry: ParticipantRegistry::new(),
            transcript: TranscriptLog::with_events(events.clone()),
            state: Mutex::new(SessionState::Disconnected),
            handlers: OnceLock::new(),
            events,
            anchors: AtomicUsize::new(0),
            materialized: AtomicU64::new(0),
        }
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn state_snapshot(&self) -> SessionState {
        self.state().clone()
    }

    pub(crate) fn publish(&self, event: BridgeEvent) {
        // No receivers is fine: nobody is displaying yet.
        let _ = self.events.send(event);
    }

    /// Apply `event` under the state lock; side effects run after release
    pub(crate) fn apply(&self, event: SessionEvent) -> Result<StateTransition, StateTransitionError> {
        let transition = {
            let mut state = self.state();
            let transition = state.transition(event)?;
            *state = transition.new_state.clone();
            transition
        };

        let audit = &transition.audit_entry;
        debug!(
            "Session transition {} -> {} on {}",
            audit.from_state, audit.to_state, audit.event
        );

        if let Some(session) = &transition.materialized {
            self.materialized.fetch_add(1, Ordering::SeqCst);
            info!(
                "Session {} established as {} ({})",
                session.id,
                transition.new_state.state_name(),
                session.name
            );
            self.transcript.append(TranscriptEntry::system(
                InformType::Status,
                format!(
                    "Session {} established as {}",
                    session.id,
                    transition.new_state.state_name()
                ),
            ));
            self.publish(BridgeEvent::SessionEstablished(session.clone()));
        }

        Ok(transition)
    }

    fn on_message_received(&self, text: String, inform_type: i32) {
        let entry = self
            .transcript
            .append(TranscriptEntry::inbound(InformType::from_code(inform_type), text));
        if let Some(handlers) = self.handlers.get() {
            (handlers.on_message)(&entry);
        }
    }

    fn on_participant_subscribed(&self, name: String) {
        match self.registry.register_at(&name, Timestamp::now()) {
            Some(participant) => {
                info!("Participant {} joined", participant.name);
                self.transcript.append(TranscriptEntry::system(
                    InformType::Status,
                    format!("{} joined", participant.name),
                ));
                self.publish(BridgeEvent::ParticipantJoined(participant.clone()));
                if let Some(handlers) = self.handlers.get() {
                    (handlers.on_participant)(&participant);
                }
            }
            None => debug!("Participant {} already registered", name),
        }

        // The state lock decides the single materialization, however the
        // notifications interleave.
        if let Err(error) = self.apply(SessionEvent::ParticipantJoined) {
            debug!("Participant notification ignored: {}", error);
        }
    }

    /// Run one callback body, containing every failure
    fn guard<F>(&self, callback: &'static str, body: F)
    where
        F: FnOnce() -> Result<(), CallbackFault>,
    {
        match panic::catch_unwind(AssertUnwindSafe(body)) {
            Ok(Ok(())) => {}
            Ok(Err(fault)) => self.record_fault(fault),
            Err(payload) => self.record_fault(CallbackFault::Panicked {
                callback,
                message: panic_message(payload.as_ref()),
            }),
        }
    }

    fn record_fault(&self, fault: CallbackFault) {
        warn!("Contained callback fault: {}", fault);
        let recorded = panic::catch_unwind(AssertUnwindSafe(|| {
            self.transcript
                .append(TranscriptEntry::system(InformType::Error, fault.to_string()));
        }));
        if recorded.is_err() {
            warn!("Failed to record callback fault in transcript");
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ----------------------------------------------------------------------------
// Trampolines
// ----------------------------------------------------------------------------

unsafe extern "C" fn message_trampoline(
    context: *mut c_void,
    text: *const c_char,
    size: c_int,
    inform_type: c_int,
) {
    // SAFETY: `context` comes from a live `TrampolineAnchor`; the native side
    // stops calling before the anchor is dropped.
    let Some(context) = (unsafe { context.cast::<BridgeContext>().cast_const().as_ref() }) else {
        return;
    };
    context.guard(ON_MESSAGE, || {
        // SAFETY: the native caller guarantees `size` readable bytes.
        let text = unsafe { decode_native_text(ON_MESSAGE, "text", text, size) }?;
        context.on_message_received(text, inform_type);
        Ok(())
    });
}

unsafe extern "C" fn participant_trampoline(
    context: *mut c_void,
    name: *const c_char,
    size: c_int,
) {
    // SAFETY: see `message_trampoline`.
    let Some(context) = (unsafe { context.cast::<BridgeContext>().cast_const().as_ref() }) else {
        return;
    };
    context.guard(ON_PARTICIPANT, || {
        // SAFETY: the native caller guarantees `size` readable bytes.
        let name = unsafe { decode_native_text(ON_PARTICIPANT, "name", name, size) }?;
        context.on_participant_subscribed(name);
        Ok(())
    });
}

// ----------------------------------------------------------------------------
// Trampoline Anchor
// ----------------------------------------------------------------------------

/// Keeps the callback context alive for the native side
///
/// Dropping it releases the context; only do so after the native bus has
/// confirmed it will not call through the table again.
#[derive(Debug)]
pub struct TrampolineAnchor {
    context: *const BridgeContext,
    table: CallbackTable,
}

// The pointer is an `Arc<BridgeContext>` payload and `BridgeContext` is Sync.
unsafe impl Send for TrampolineAnchor {}
unsafe impl Sync for TrampolineAnchor {}

impl TrampolineAnchor {
    fn new(context: &Arc<BridgeContext>) -> Self {
        let raw = Arc::into_raw(context.clone());
        context.anchors.fetch_add(1, Ordering::SeqCst);
        let table = CallbackTable {
            context: raw.cast_mut().cast::<c_void>(),
            on_message: message_trampoline,
            on_participant: participant_trampoline,
        };
        debug!("Trampolines anchored at {:p}", raw);
        Self {
            context: raw,
            table,
        }
    }

    /// Table to hand to the native bus
    pub fn table(&self) -> CallbackTable {
        self.table
    }

    /// Give up on releasing the context
    ///
    /// Used when the native side could not confirm it stopped calling back:
    /// the context then lives for the rest of the process.
    pub fn leak(self) {
        warn!("Trampolines leaked: native side did not confirm shutdown");
        std::mem::forget(self);
    }
}

impl Drop for TrampolineAnchor {
    fn drop(&mut self) {
        // SAFETY: `context` was produced by `Arc::into_raw` in `new` and is
        // released exactly once, here.
        let context = unsafe { Arc::from_raw(self.context) };
        context.anchors.fetch_sub(1, Ordering::SeqCst);
        debug!("Trampolines released at {:p}", self.context);
    }
}

// ----------------------------------------------------------------------------
// Callback Bridge
// ----------------------------------------------------------------------------

/// Native-facing side of the session
pub struct CallbackBridge {
    context: Arc<BridgeContext>,
}

impl CallbackBridge {
    pub fn new(event_buffer_size: usize) -> Self {
        Self {
            context: Arc::new(BridgeContext::new(event_buffer_size)),
        }
    }

    pub(crate) fn context(&self) -> &BridgeContext {
        &self.context
    }

    /// Register the display handlers, once per bridge
    ///
    /// A second call keeps the first pair and reports `AlreadyInstalled`.
    pub fn install<M, P>(&self, on_message: M, on_participant: P) -> Installation
    where
        M: Fn(&TranscriptEntry) + Send + Sync + 'static,
        P: Fn(&Participant) + Send + Sync + 'static,
    {
        let handlers = Handlers {
            on_message: Box::new(on_message),
            on_participant: Box::new(on_participant),
        };
        match self.context.handlers.set(handlers) {
            Ok(()) => {
                debug!("Bridge handlers installed");
                Installation::Installed
            }
            Err(_) => {
                debug!("Bridge handlers already installed, keeping existing pair");
                Installation::AlreadyInstalled
            }
        }
    }

    pub fn is_installed(&self) -> bool {
        self.context.handlers.get().is_some()
    }

    /// Subscribe to bridge events
    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.context.events.subscribe()
    }

    /// Pin the context and build the table for the native bus
    pub fn anchor(&self) -> TrampolineAnchor {
        TrampolineAnchor::new(&self.context)
    }

    /// Whether any anchor currently keeps the trampolines valid
    pub fn anchored(&self) -> bool {
        self.context.anchors.load(Ordering::SeqCst) > 0
    }

    /// Number of session objects materialized over the bridge's lifetime
    pub fn sessions_established(&self) -> u64 {
        self.context.materialized.load(Ordering::SeqCst)
    }

    /// Deliver a message without going through the C ABI
    pub fn on_message_received(&self, text: &str, inform_type: i32) {
        let context = &self.context;
        context.guard(ON_MESSAGE, || {
            context.on_message_received(text.to_string(), inform_type);
            Ok(())
        });
    }

    /// Deliver a participant notification without going through the C ABI
    pub fn on_participant_subscribed(&self, name: &str) {
        let context = &self.context;
        context.guard(ON_PARTICIPANT, || {
            context.on_participant_subscribed(name.to_string());
            Ok(())
        });
    }

    pub fn registry(&self) -> &ParticipantRegistry {
        &self.context.registry
    }

    pub fn transcript(&self) -> &TranscriptLog {
        &self.context.transcript
    }

    pub fn state(&self) -> SessionState {
        self.context.state_snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn last_entry(bridge: &CallbackBridge) -> TranscriptEntry {
        bridge.transcript().snapshot().pop().unwrap()
    }

    #[test]
    fn test_install_is_single_registration() {
        let bridge = CallbackBridge::new(8);
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let counter = first.clone();
        assert_eq!(
            bridge.install(move |_| { counter.fetch_add(1, Ordering::SeqCst); }, |_| {}),
            Installation::Installed
        );
        let counter = second.clone();
        assert_eq!(
            bridge.install(move |_| { counter.fetch_add(1, Ordering::SeqCst); }, |_| {}),
            Installation::AlreadyInstalled
        );

        bridge.on_message_received("hello", 1);
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_trampoline_appends_inbound_entry() {
        let bridge = CallbackBridge::new(8);
        let anchor = bridge.anchor();
        let table = anchor.table();

        unsafe { table.deliver_message(b"hi there", 1) };

        let entry = last_entry(&bridge);
        assert_eq!(entry.text, "hi there");
        assert_eq!(entry.render(), "1:hi there");
    }

    #[test]
    fn test_null_text_is_contained() {
        let bridge = CallbackBridge::new(8);
        let anchor = bridge.anchor();
        let table = anchor.table();

        unsafe { (table.on_message)(table.context, std::ptr::null(), 4, 1) };

        let entry = last_entry(&bridge);
        assert_eq!(entry.inform_type, InformType::Error);
        assert!(entry.text.contains("null text pointer"));
    }

    #[test]
    fn test_handler_panic_is_contained() {
        let bridge = CallbackBridge::new(8);
        bridge.install(|_| panic!("display crashed"), |_| {});
        let anchor = bridge.anchor();

        unsafe { anchor.table().deliver_message(b"boom", 1) };

        let entries = bridge.transcript().snapshot();
        let fault = entries.last().unwrap();
        assert_eq!(fault.inform_type, InformType::Error);
        assert!(fault.text.contains("display crashed"));
        // The message itself was recorded before the handler ran.
        assert_eq!(entries[entries.len() - 2].text, "boom");
    }

    #[test]
    fn test_anchor_pins_context() {
        let bridge = CallbackBridge::new(8);
        assert!(!bridge.anchored());

        let strong_before = Arc::strong_count(&bridge.context);
        let anchor = bridge.anchor();
        assert!(bridge.anchored());
        assert_eq!(Arc::strong_count(&bridge.context), strong_before + 1);

        drop(anchor);
        assert!(!bridge.anchored());
        assert_eq!(Arc::strong_count(&bridge.context), strong_before);
    }

    #[test]
    fn test_participant_outside_session_only_registers() {
        let bridge = CallbackBridge::new(8);
        bridge.on_participant_subscribed("bob");

        assert!(bridge.registry().contains("bob"));
        assert!(bridge.state().is_disconnected());
        assert_eq!(bridge.sessions_established(), 0);
    }
}
