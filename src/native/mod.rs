//! Boundary to the native tokenization engine.
//!
//! [`NativeInterop`] mirrors a C-style engine interface: opaque handles,
//! caller-owned output buffers, integer status codes (`0` = success) and an
//! explicit free function for every allocation the engine hands out. The
//! client side ([`crate::tokenizer`]) wraps every returned pointer in one of
//! the RAII guards from [`guard`] so it is copied and freed in the same scope.
//!
//! [`engine::HfEngine`] is the in-process engine backed by the `tokenizers`
//! crate. Tests plug in a counting fake through the same trait.

pub mod engine;
pub(crate) mod guard;
pub mod handle;

#[cfg(test)]
pub(crate) mod fake;

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int};

use crate::error::TokenizerError;

pub use engine::HfEngine;
pub use handle::NativeHandle;

/// Status code reported for a successful native call.
pub const STATUS_OK: c_int = 0;

/// Sentinel used on the wire for "no word" / "no sequence".
pub const NONE_INDEX: i32 = -1;

/// Opaque native tokenizer object.
#[repr(C)]
pub struct RawTokenizer {
    _private: [u8; 0],
}

/// Opaque native encoding object.
#[repr(C)]
pub struct RawEncoding {
    _private: [u8; 0],
}

/// Character span as laid out by the engine.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawOffset {
    pub start: u32,
    pub end: u32,
}

/// Caller-owned destination slices for [`NativeInterop::encoding_copy_numeric`].
///
/// Every slice must have exactly the length the engine reported for the
/// encoding.
pub struct NumericDest<'a> {
    pub ids: &'a mut [u32],
    pub type_ids: &'a mut [u32],
    pub attention_mask: &'a mut [u32],
    pub special_tokens_mask: &'a mut [u32],
    pub offsets: &'a mut [RawOffset],
    /// `-1` for tokens without a word.
    pub word_ids: &'a mut [i32],
    /// `-1` for tokens without a sequence.
    pub sequence_ids: &'a mut [i32],
}

/// Padding direction on the wire.
pub const DIRECTION_LEFT: c_int = 0;
pub const DIRECTION_RIGHT: c_int = 1;

/// Truncation strategy on the wire.
pub const STRATEGY_LONGEST_FIRST: c_int = 0;
pub const STRATEGY_ONLY_FIRST: c_int = 1;
pub const STRATEGY_ONLY_SECOND: c_int = 2;

/// Arguments of [`NativeInterop::enable_padding`].
#[derive(Debug)]
pub struct PaddingRequest<'a> {
    pub direction: c_int,
    pub pad_id: u32,
    pub pad_type_id: u32,
    pub pad_token: &'a CStr,
    /// Fixed length, or `-1` to pad to the longest item of each batch.
    pub length: c_int,
    /// `0` when no multiple is requested.
    pub pad_to_multiple_of: c_int,
}

/// Arguments of [`NativeInterop::enable_truncation`].
#[derive(Debug, Clone, Copy)]
pub struct TruncationRequest {
    pub max_length: usize,
    pub stride: usize,
    pub strategy: c_int,
    pub direction: c_int,
}

/// The native engine contract.
///
/// Methods that take a raw handle are `unsafe`: the caller guarantees the
/// pointer was produced by this same interop and has not been freed. Output
/// pointers returned by the engine are owned by the caller until passed back
/// to the matching free function. On a non-zero `status`, [`last_error`]
/// describes the failure for the current thread.
///
/// [`last_error`]: NativeInterop::last_error
pub trait NativeInterop: Send + Sync {
    /// Message of the most recent failure on this thread, if any.
    fn last_error(&self) -> Option<String>;

    fn tokenizer_create(&self, json: &CStr, status: &mut c_int) -> *mut RawTokenizer;

    fn tokenizer_from_pretrained(
        &self,
        identifier: &CStr,
        revision: Option<&CStr>,
        auth_token: Option<&CStr>,
        status: &mut c_int,
    ) -> *mut RawTokenizer;

    unsafe fn tokenizer_free(&self, handle: *mut RawTokenizer);

    /// Encode `text` (and optionally `pair`), writing the token count to `length`.
    unsafe fn encode(
        &self,
        handle: *mut RawTokenizer,
        text: &CStr,
        pair: Option<&CStr>,
        add_special_tokens: bool,
        length: &mut usize,
        status: &mut c_int,
    ) -> *mut RawEncoding;

    unsafe fn encoding_free(&self, encoding: *mut RawEncoding);

    /// Copy every numeric field into `dest`; returns the number of tokens copied.
    unsafe fn encoding_copy_numeric(
        &self,
        encoding: *const RawEncoding,
        dest: &mut NumericDest<'_>,
        status: &mut c_int,
    ) -> usize;

    /// Fill `out` with one owned string per token; returns the number written.
    unsafe fn encoding_tokens(
        &self,
        encoding: *const RawEncoding,
        out: &mut [*mut c_char],
        status: &mut c_int,
    ) -> usize;

    unsafe fn encoding_overflowing_count(&self, encoding: *const RawEncoding) -> usize;

    /// Owned copy of the overflow encoding at `index`.
    unsafe fn encoding_overflowing(
        &self,
        encoding: *const RawEncoding,
        index: usize,
        length: &mut usize,
        status: &mut c_int,
    ) -> *mut RawEncoding;

    unsafe fn decode(
        &self,
        handle: *mut RawTokenizer,
        ids: &[u32],
        skip_special_tokens: bool,
        status: &mut c_int,
    ) -> *mut c_char;

    /// Decode `lengths.len()` sequences packed back to back in `flat_ids`.
    ///
    /// Writes one owned string into `output` per non-empty sequence and
    /// leaves slots of empty sequences null. Returns the number of
    /// sequences decoded.
    unsafe fn decode_batch_flat(
        &self,
        handle: *mut RawTokenizer,
        flat_ids: &[u32],
        lengths: &[usize],
        skip_special_tokens: bool,
        output: &mut [*mut c_char],
        status: &mut c_int,
    ) -> c_int;

    unsafe fn free_string(&self, value: *mut c_char);

    unsafe fn enable_padding(
        &self,
        handle: *mut RawTokenizer,
        request: &PaddingRequest<'_>,
        status: &mut c_int,
    ) -> c_int;

    unsafe fn disable_padding(&self, handle: *mut RawTokenizer);

    /// Current padding configuration as JSON, or null when disabled.
    unsafe fn padding(&self, handle: *mut RawTokenizer, status: &mut c_int) -> *mut c_char;

    unsafe fn enable_truncation(
        &self,
        handle: *mut RawTokenizer,
        request: &TruncationRequest,
        status: &mut c_int,
    ) -> c_int;

    unsafe fn disable_truncation(&self, handle: *mut RawTokenizer);

    /// Current truncation configuration as JSON, or null when disabled.
    unsafe fn truncation(&self, handle: *mut RawTokenizer, status: &mut c_int) -> *mut c_char;

    /// Vocabulary id of `token`, or `-1` when it is unknown.
    unsafe fn token_to_id(
        &self,
        handle: *mut RawTokenizer,
        token: &CStr,
        status: &mut c_int,
    ) -> c_int;

    /// Token text for `id`, or null when the id is unknown.
    unsafe fn id_to_token(
        &self,
        handle: *mut RawTokenizer,
        id: c_int,
        status: &mut c_int,
    ) -> *mut c_char;

    unsafe fn vocab_size(&self, handle: *mut RawTokenizer, with_added_tokens: bool) -> usize;

    /// Full tokenizer configuration serialized as JSON.
    unsafe fn config_json(
        &self,
        handle: *mut RawTokenizer,
        pretty: bool,
        status: &mut c_int,
    ) -> *mut c_char;
}

/// Turn a non-zero `status` into [`TokenizerError::Native`].
pub(crate) fn check_status(
    interop: &dyn NativeInterop,
    operation: &'static str,
    status: c_int,
) -> Result<(), TokenizerError> {
    if status == STATUS_OK {
        Ok(())
    } else {
        Err(TokenizerError::native(operation, interop.last_error()))
    }
}

/// Copy `value` into a NUL-terminated string for the engine.
pub(crate) fn to_cstring(what: &str, value: &str) -> Result<CString, TokenizerError> {
    CString::new(value).map_err(|e| {
        TokenizerError::InvalidArgument(format!(
            "{} contains a NUL byte at position {}",
            what,
            e.nul_position()
        ))
    })
}

/// Convert a wire index (`-1` = none) into an option.
pub(crate) fn optional_index(raw: i32) -> Option<u32> {
    u32::try_from(raw).ok()
}
