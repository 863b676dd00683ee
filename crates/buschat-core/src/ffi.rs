//! C ABI shared with the native bus
//!
//! The native side receives a `CallbackTable` holding two function pointers
//! and an opaque context pointer, and calls back on threads it owns. The
//! context is only valid while the `TrampolineAnchor` that produced the table
//! is alive; see `bridge.rs`.

use std::ffi::{c_char, c_int, c_void};
use std::slice;

use crate::errors::CallbackFault;

/// Invoked for every text line the bus delivers
pub type MessageCallback =
    unsafe extern "C" fn(context: *mut c_void, text: *const c_char, size: c_int, inform_type: c_int);

/// Invoked when the bus reports a participant joining the session
pub type ParticipantCallback =
    unsafe extern "C" fn(context: *mut c_void, name: *const c_char, size: c_int);

/// Entry points handed to the native bus
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct CallbackTable {
    pub context: *mut c_void,
    pub on_message: MessageCallback,
    pub on_participant: ParticipantCallback,
}

// The context pointer is an `Arc` payload whose target is `Sync`; the table
// itself is plain data.
unsafe impl Send for CallbackTable {}
unsafe impl Sync for CallbackTable {}

impl CallbackTable {
    /// Deliver a text line the way the native bus does
    ///
    /// # Safety
    ///
    /// The anchor that produced this table must still be alive.
    pub unsafe fn deliver_message(&self, text: &[u8], inform_type: i32) {
        (self.on_message)(
            self.context,
            text.as_ptr().cast::<c_char>(),
            text.len() as c_int,
            inform_type,
        );
    }

    /// Deliver a participant notification the way the native bus does
    ///
    /// # Safety
    ///
    /// The anchor that produced this table must still be alive.
    pub unsafe fn deliver_participant(&self, name: &[u8]) {
        (self.on_participant)(self.context, name.as_ptr().cast::<c_char>(), name.len() as c_int);
    }
}

/// Copy a native `(pointer, size)` string into an owned `String`
///
/// The text ends at `size` bytes or at the first NUL, whichever comes first.
/// Invalid UTF-8 is replaced rather than rejected.
///
/// # Safety
///
/// When non-null, `text` must point to at least `size` readable bytes for
/// the duration of the call.
pub unsafe fn decode_native_text(
    callback: &'static str,
    argument: &'static str,
    text: *const c_char,
    size: c_int,
) -> Result<String, CallbackFault> {
    if text.is_null() {
        return Err(CallbackFault::NullPointer { callback, argument });
    }
    if size < 0 {
        return Err(CallbackFault::NegativeSize { callback, size });
    }
    let bytes = slice::from_raw_parts(text.cast::<u8>(), size as usize);
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
}
