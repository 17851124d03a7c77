//! In-process engine over the `tokenizers` crate.
//!
//! Tokenizer and encoding objects are boxed and handed out as opaque
//! pointers; strings are `CString`s released by [`NativeInterop::free_string`].
//! Failures set a thread-local message that [`NativeInterop::last_error`]
//! reads back.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int};
use std::ptr;
use std::str::FromStr;

use tokenizers::utils::padding::{PaddingDirection, PaddingParams, PaddingStrategy};
use tokenizers::utils::truncation::{TruncationDirection, TruncationParams, TruncationStrategy};
use tokenizers::{Encoding as HfEncoding, Tokenizer as HfTokenizer};
use tracing::trace;

use super::{
    NativeInterop, NumericDest, PaddingRequest, RawEncoding, RawOffset, RawTokenizer,
    TruncationRequest, DIRECTION_LEFT, NONE_INDEX, STATUS_OK, STRATEGY_ONLY_FIRST,
    STRATEGY_ONLY_SECOND,
};

const STATUS_ERROR: c_int = 1;

thread_local! {
    static LAST_ERROR: RefCell<Option<String>> = const { RefCell::new(None) };
}

fn fail(status: &mut c_int, message: impl Into<String>) {
    let message = message.into();
    trace!(%message, "engine call failed");
    LAST_ERROR.with(|slot| *slot.borrow_mut() = Some(message));
    *status = STATUS_ERROR;
}

/// Mark a call successful and drop any message left by an earlier failure.
fn succeed(status: &mut c_int) {
    LAST_ERROR.with(|slot| slot.borrow_mut().take());
    *status = STATUS_OK;
}

fn utf8<'a>(value: &'a CStr, what: &str, status: &mut c_int) -> Option<&'a str> {
    match value.to_str() {
        Ok(s) => Some(s),
        Err(e) => {
            fail(status, format!("{} is not valid UTF-8: {}", what, e));
            None
        }
    }
}

fn owned_string(value: String, status: &mut c_int) -> *mut c_char {
    match CString::new(value) {
        Ok(s) => {
            succeed(status);
            s.into_raw()
        }
        Err(e) => {
            fail(status, format!("output contains a NUL byte at {}", e.nul_position()));
            ptr::null_mut()
        }
    }
}

fn boxed_tokenizer(tokenizer: HfTokenizer, status: &mut c_int) -> *mut RawTokenizer {
    succeed(status);
    Box::into_raw(Box::new(tokenizer)).cast()
}

fn boxed_encoding(encoding: HfEncoding) -> *mut RawEncoding {
    Box::into_raw(Box::new(encoding)).cast()
}

unsafe fn tokenizer_ref<'a>(handle: *mut RawTokenizer) -> &'a HfTokenizer {
    &*handle.cast::<HfTokenizer>()
}

unsafe fn tokenizer_mut<'a>(handle: *mut RawTokenizer) -> &'a mut HfTokenizer {
    &mut *handle.cast::<HfTokenizer>()
}

unsafe fn encoding_ref<'a>(encoding: *const RawEncoding) -> &'a HfEncoding {
    &*encoding.cast::<HfEncoding>()
}

fn direction_name(direction: c_int) -> &'static str {
    if direction == DIRECTION_LEFT {
        "left"
    } else {
        "right"
    }
}

/// Engine backed by `tokenizers::Tokenizer`.
#[derive(Debug, Default, Clone, Copy)]
pub struct HfEngine;

impl HfEngine {
    pub fn new() -> Self {
        Self
    }
}

impl NativeInterop for HfEngine {
    fn last_error(&self) -> Option<String> {
        LAST_ERROR.with(|slot| slot.borrow().clone())
    }

    fn tokenizer_create(&self, json: &CStr, status: &mut c_int) -> *mut RawTokenizer {
        let Some(json) = utf8(json, "tokenizer json", status) else {
            return ptr::null_mut();
        };
        match HfTokenizer::from_str(json) {
            Ok(tokenizer) => boxed_tokenizer(tokenizer, status),
            Err(e) => {
                fail(status, e.to_string());
                ptr::null_mut()
            }
        }
    }

    #[cfg(feature = "http")]
    fn tokenizer_from_pretrained(
        &self,
        identifier: &CStr,
        revision: Option<&CStr>,
        auth_token: Option<&CStr>,
        status: &mut c_int,
    ) -> *mut RawTokenizer {
        use tokenizers::FromPretrainedParameters;

        let Some(identifier) = utf8(identifier, "identifier", status) else {
            return ptr::null_mut();
        };
        let mut params = FromPretrainedParameters::default();
        if let Some(revision) = revision {
            params.revision = revision.to_string_lossy().into_owned();
        }
        params.token = auth_token.map(|t| t.to_string_lossy().into_owned());

        match HfTokenizer::from_pretrained(identifier, Some(params)) {
            Ok(tokenizer) => boxed_tokenizer(tokenizer, status),
            Err(e) => {
                fail(status, e.to_string());
                ptr::null_mut()
            }
        }
    }

    #[cfg(not(feature = "http"))]
    fn tokenizer_from_pretrained(
        &self,
        _identifier: &CStr,
        _revision: Option<&CStr>,
        _auth_token: Option<&CStr>,
        status: &mut c_int,
    ) -> *mut RawTokenizer {
        fail(status, "loading by identifier requires the `http` feature");
        ptr::null_mut()
    }

    unsafe fn tokenizer_free(&self, handle: *mut RawTokenizer) {
        if !handle.is_null() {
            drop(Box::from_raw(handle.cast::<HfTokenizer>()));
        }
    }

    unsafe fn encode(
        &self,
        handle: *mut RawTokenizer,
        text: &CStr,
        pair: Option<&CStr>,
        add_special_tokens: bool,
        length: &mut usize,
        status: &mut c_int,
    ) -> *mut RawEncoding {
        let tokenizer = tokenizer_ref(handle);
        let Some(text) = utf8(text, "text", status) else {
            return ptr::null_mut();
        };
        let result = match pair {
            Some(pair) => {
                let Some(pair) = utf8(pair, "pair text", status) else {
                    return ptr::null_mut();
                };
                tokenizer.encode_char_offsets((text, pair), add_special_tokens)
            }
            None => tokenizer.encode_char_offsets(text, add_special_tokens),
        };

        match result {
            Ok(encoding) => {
                *length = encoding.len();
                succeed(status);
                boxed_encoding(encoding)
            }
            Err(e) => {
                fail(status, e.to_string());
                ptr::null_mut()
            }
        }
    }

    unsafe fn encoding_free(&self, encoding: *mut RawEncoding) {
        if !encoding.is_null() {
            drop(Box::from_raw(encoding.cast::<HfEncoding>()));
        }
    }

    unsafe fn encoding_copy_numeric(
        &self,
        encoding: *const RawEncoding,
        dest: &mut NumericDest<'_>,
        status: &mut c_int,
    ) -> usize {
        let encoding = encoding_ref(encoding);
        let n = encoding.len();
        let sizes = [
            dest.ids.len(),
            dest.type_ids.len(),
            dest.attention_mask.len(),
            dest.special_tokens_mask.len(),
            dest.offsets.len(),
            dest.word_ids.len(),
            dest.sequence_ids.len(),
        ];
        if sizes.iter().any(|&len| len != n) {
            fail(status, format!("destination buffers must hold {} entries", n));
            return 0;
        }

        dest.ids.copy_from_slice(encoding.get_ids());
        dest.type_ids.copy_from_slice(encoding.get_type_ids());
        dest.attention_mask
            .copy_from_slice(encoding.get_attention_mask());
        dest.special_tokens_mask
            .copy_from_slice(encoding.get_special_tokens_mask());

        for (slot, &(start, end)) in dest.offsets.iter_mut().zip(encoding.get_offsets()) {
            match (u32::try_from(start), u32::try_from(end)) {
                (Ok(start), Ok(end)) => *slot = RawOffset { start, end },
                _ => {
                    fail(status, format!("offset ({}, {}) exceeds u32", start, end));
                    return 0;
                }
            }
        }
        for (slot, word) in dest.word_ids.iter_mut().zip(encoding.get_word_ids()) {
            *slot = word
                .and_then(|w| i32::try_from(w).ok())
                .unwrap_or(NONE_INDEX);
        }
        for (slot, sequence) in dest
            .sequence_ids
            .iter_mut()
            .zip(encoding.get_sequence_ids())
        {
            *slot = sequence
                .and_then(|s| i32::try_from(s).ok())
                .unwrap_or(NONE_INDEX);
        }

        succeed(status);
        n
    }

    unsafe fn encoding_tokens(
        &self,
        encoding: *const RawEncoding,
        out: &mut [*mut c_char],
        status: &mut c_int,
    ) -> usize {
        let encoding = encoding_ref(encoding);
        let mut written = 0;
        for (slot, token) in out.iter_mut().zip(encoding.get_tokens()) {
            let ptr = owned_string(token.clone(), status);
            if ptr.is_null() {
                return written;
            }
            *slot = ptr;
            written += 1;
        }
        succeed(status);
        written
    }

    unsafe fn encoding_overflowing_count(&self, encoding: *const RawEncoding) -> usize {
        encoding_ref(encoding).get_overflowing().len()
    }

    unsafe fn encoding_overflowing(
        &self,
        encoding: *const RawEncoding,
        index: usize,
        length: &mut usize,
        status: &mut c_int,
    ) -> *mut RawEncoding {
        match encoding_ref(encoding).get_overflowing().get(index) {
            Some(overflow) => {
                *length = overflow.len();
                succeed(status);
                boxed_encoding(overflow.clone())
            }
            None => {
                fail(status, format!("no overflowing encoding at index {}", index));
                ptr::null_mut()
            }
        }
    }

    unsafe fn decode(
        &self,
        handle: *mut RawTokenizer,
        ids: &[u32],
        skip_special_tokens: bool,
        status: &mut c_int,
    ) -> *mut c_char {
        match tokenizer_ref(handle).decode(ids, skip_special_tokens) {
            Ok(text) => owned_string(text, status),
            Err(e) => {
                fail(status, e.to_string());
                ptr::null_mut()
            }
        }
    }

    unsafe fn decode_batch_flat(
        &self,
        handle: *mut RawTokenizer,
        flat_ids: &[u32],
        lengths: &[usize],
        skip_special_tokens: bool,
        output: &mut [*mut c_char],
        status: &mut c_int,
    ) -> c_int {
        if output.len() != lengths.len() {
            fail(status, "output table does not match the lengths table");
            return 0;
        }
        if lengths.iter().sum::<usize>() != flat_ids.len() {
            fail(status, "lengths table does not cover the flattened ids");
            return 0;
        }

        let mut slices: Vec<&[u32]> = Vec::with_capacity(lengths.len());
        let mut targets = Vec::with_capacity(lengths.len());
        let mut offset = 0;
        for (index, &len) in lengths.iter().enumerate() {
            if len > 0 {
                slices.push(&flat_ids[offset..offset + len]);
                targets.push(index);
            }
            offset += len;
        }

        let decoded = match tokenizer_ref(handle).decode_batch(&slices, skip_special_tokens) {
            Ok(decoded) => decoded,
            Err(e) => {
                fail(status, e.to_string());
                return 0;
            }
        };

        for (text, index) in decoded.into_iter().zip(targets) {
            let ptr = owned_string(text, status);
            if ptr.is_null() {
                return 0;
            }
            output[index] = ptr;
        }

        succeed(status);
        lengths.len() as c_int
    }

    unsafe fn free_string(&self, value: *mut c_char) {
        if !value.is_null() {
            drop(CString::from_raw(value));
        }
    }

    unsafe fn enable_padding(
        &self,
        handle: *mut RawTokenizer,
        request: &PaddingRequest<'_>,
        status: &mut c_int,
    ) -> c_int {
        let strategy = match usize::try_from(request.length) {
            Ok(length) => PaddingStrategy::Fixed(length),
            Err(_) => PaddingStrategy::BatchLongest,
        };
        let direction = if request.direction == DIRECTION_LEFT {
            PaddingDirection::Left
        } else {
            PaddingDirection::Right
        };
        let params = PaddingParams {
            strategy,
            direction,
            pad_to_multiple_of: usize::try_from(request.pad_to_multiple_of)
                .ok()
                .filter(|&m| m > 0),
            pad_id: request.pad_id,
            pad_type_id: request.pad_type_id,
            pad_token: request.pad_token.to_string_lossy().into_owned(),
        };
        trace!(direction = direction_name(request.direction), "enable padding");
        tokenizer_mut(handle).with_padding(Some(params));
        succeed(status);
        STATUS_OK
    }

    unsafe fn disable_padding(&self, handle: *mut RawTokenizer) {
        tokenizer_mut(handle).with_padding(None);
    }

    unsafe fn padding(&self, handle: *mut RawTokenizer, status: &mut c_int) -> *mut c_char {
        match tokenizer_ref(handle).get_padding() {
            Some(params) => match serde_json::to_string(params) {
                Ok(json) => owned_string(json, status),
                Err(e) => {
                    fail(status, e.to_string());
                    ptr::null_mut()
                }
            },
            None => {
                succeed(status);
                ptr::null_mut()
            }
        }
    }

    unsafe fn enable_truncation(
        &self,
        handle: *mut RawTokenizer,
        request: &TruncationRequest,
        status: &mut c_int,
    ) -> c_int {
        let strategy = match request.strategy {
            STRATEGY_ONLY_FIRST => TruncationStrategy::OnlyFirst,
            STRATEGY_ONLY_SECOND => TruncationStrategy::OnlySecond,
            _ => TruncationStrategy::LongestFirst,
        };
        let direction = if request.direction == DIRECTION_LEFT {
            TruncationDirection::Left
        } else {
            TruncationDirection::Right
        };
        let params = TruncationParams {
            direction,
            max_length: request.max_length,
            strategy,
            stride: request.stride,
        };
        trace!(direction = direction_name(request.direction), "enable truncation");
        match tokenizer_mut(handle).with_truncation(Some(params)) {
            Ok(_) => {
                succeed(status);
                STATUS_OK
            }
            Err(e) => {
                fail(status, e.to_string());
                STATUS_ERROR
            }
        }
    }

    unsafe fn disable_truncation(&self, handle: *mut RawTokenizer) {
        // Disabling cannot fail validation.
        let _ = tokenizer_mut(handle).with_truncation(None);
    }

    unsafe fn truncation(&self, handle: *mut RawTokenizer, status: &mut c_int) -> *mut c_char {
        match tokenizer_ref(handle).get_truncation() {
            Some(params) => match serde_json::to_string(params) {
                Ok(json) => owned_string(json, status),
                Err(e) => {
                    fail(status, e.to_string());
                    ptr::null_mut()
                }
            },
            None => {
                succeed(status);
                ptr::null_mut()
            }
        }
    }

    unsafe fn token_to_id(
        &self,
        handle: *mut RawTokenizer,
        token: &CStr,
        status: &mut c_int,
    ) -> c_int {
        let Some(token) = utf8(token, "token", status) else {
            return -1;
        };
        succeed(status);
        match tokenizer_ref(handle).token_to_id(token) {
            Some(id) => c_int::try_from(id).unwrap_or_else(|_| {
                fail(status, format!("id {} exceeds the engine index width", id));
                -1
            }),
            None => -1,
        }
    }

    unsafe fn id_to_token(
        &self,
        handle: *mut RawTokenizer,
        id: c_int,
        status: &mut c_int,
    ) -> *mut c_char {
        succeed(status);
        let Ok(id) = u32::try_from(id) else {
            return ptr::null_mut();
        };
        match tokenizer_ref(handle).id_to_token(id) {
            Some(token) => owned_string(token, status),
            None => ptr::null_mut(),
        }
    }

    unsafe fn vocab_size(&self, handle: *mut RawTokenizer, with_added_tokens: bool) -> usize {
        tokenizer_ref(handle).get_vocab_size(with_added_tokens)
    }

    unsafe fn config_json(
        &self,
        handle: *mut RawTokenizer,
        pretty: bool,
        status: &mut c_int,
    ) -> *mut c_char {
        match tokenizer_ref(handle).to_string(pretty) {
            Ok(json) => owned_string(json, status),
            Err(e) => {
                fail(status, e.to_string());
                ptr::null_mut()
            }
        }
    }
}
