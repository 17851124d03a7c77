//! Copying engine output into managed values.
//!
//! Every pointer the engine returns is wrapped in a guard before its status is
//! checked, so failures free whatever was allocated.

use std::ffi::CStr;
use std::os::raw::{c_char, c_int};

use tracing::trace;

use crate::encoding::Encoding;
use crate::error::TokenizerError;
use crate::native::guard::{NativeEncoding, NativeString, OutputTable};
use crate::native::{
    check_status, optional_index, NativeInterop, NumericDest, RawOffset, RawTokenizer, STATUS_OK,
};

/// Largest length the engine's `c_int` indices can address.
pub(crate) const MAX_WIRE_LENGTH: usize = i32::MAX as usize;

/// Take ownership of a string result, then check the call's status.
pub(crate) fn take_string(
    interop: &dyn NativeInterop,
    operation: &'static str,
    ptr: *mut c_char,
    status: c_int,
) -> Result<Option<String>, TokenizerError> {
    // SAFETY: `ptr` was just returned by `interop` and is owned by us.
    let owned = unsafe { NativeString::new(interop, ptr) };
    check_status(interop, operation, status)?;
    Ok(owned.map(|s| s.to_string_lossy()))
}

/// Encode one text (or pair) and copy the result.
pub(crate) fn encode_one(
    interop: &dyn NativeInterop,
    raw: *mut RawTokenizer,
    text: &CStr,
    pair: Option<&CStr>,
    add_special_tokens: bool,
) -> Result<Encoding, TokenizerError> {
    let mut length = 0usize;
    let mut status = STATUS_OK;
    let encoding = unsafe {
        let ptr = interop.encode(raw, text, pair, add_special_tokens, &mut length, &mut status);
        NativeEncoding::new(interop, ptr)
    };
    check_status(interop, "encode", status)?;
    let encoding = encoding.ok_or_else(|| {
        TokenizerError::native("encode", Some("engine returned a null encoding".to_string()))
    })?;

    copy_encoding(interop, &encoding, length)
}

/// Copy a native encoding of `length` tokens, including its overflow list.
pub(crate) fn copy_encoding(
    interop: &dyn NativeInterop,
    encoding: &NativeEncoding<'_>,
    length: usize,
) -> Result<Encoding, TokenizerError> {
    if length > MAX_WIRE_LENGTH {
        return Err(TokenizerError::UnsupportedSize(format!(
            "encoding of {} tokens exceeds {}",
            length, MAX_WIRE_LENGTH
        )));
    }

    let mut ids = vec![0u32; length];
    let mut type_ids = vec![0u32; length];
    let mut attention_mask = vec![0u32; length];
    let mut special_tokens_mask = vec![0u32; length];
    let mut offsets = vec![RawOffset::default(); length];
    let mut word_ids = vec![0i32; length];
    let mut sequence_ids = vec![0i32; length];

    let mut status = STATUS_OK;
    let copied = {
        let mut dest = NumericDest {
            ids: &mut ids,
            type_ids: &mut type_ids,
            attention_mask: &mut attention_mask,
            special_tokens_mask: &mut special_tokens_mask,
            offsets: &mut offsets,
            word_ids: &mut word_ids,
            sequence_ids: &mut sequence_ids,
        };
        unsafe { interop.encoding_copy_numeric(encoding.as_ptr(), &mut dest, &mut status) }
    };
    check_status(interop, "encoding_copy_numeric", status)?;
    expect_count("encoding_copy_numeric", copied, length)?;

    let tokens = copy_tokens(interop, encoding, length)?;
    let overflowing = copy_overflowing(interop, encoding)?;
    trace!(length, overflowing = overflowing.len(), "copied native encoding");

    Encoding::new(
        ids,
        tokens,
        offsets
            .into_iter()
            .map(|o| (o.start as usize, o.end as usize))
            .collect(),
        type_ids,
        attention_mask,
        special_tokens_mask,
        word_ids.into_iter().map(optional_index).collect(),
        sequence_ids
            .into_iter()
            .map(|s| optional_index(s).map(|s| s as usize))
            .collect(),
        overflowing,
    )
}

fn expect_count(
    operation: &'static str,
    actual: usize,
    expected: usize,
) -> Result<(), TokenizerError> {
    if actual == expected {
        Ok(())
    } else {
        Err(TokenizerError::native(
            operation,
            Some(format!("engine copied {} of {} entries", actual, expected)),
        ))
    }
}

fn copy_tokens(
    interop: &dyn NativeInterop,
    encoding: &NativeEncoding<'_>,
    length: usize,
) -> Result<Vec<String>, TokenizerError> {
    let mut table = OutputTable::new(interop, length);
    let mut status = STATUS_OK;
    let written =
        unsafe { interop.encoding_tokens(encoding.as_ptr(), table.as_mut_slice(), &mut status) };
    check_status(interop, "encoding_tokens", status)?;
    expect_count("encoding_tokens", written, length)?;

    Ok((0..length).map(|i| table.take(i)).collect())
}

fn copy_overflowing(
    interop: &dyn NativeInterop,
    encoding: &NativeEncoding<'_>,
) -> Result<Vec<Encoding>, TokenizerError> {
    let count = unsafe { interop.encoding_overflowing_count(encoding.as_ptr()) };
    let mut overflowing = Vec::with_capacity(count);

    for index in 0..count {
        let mut length = 0usize;
        let mut status = STATUS_OK;
        let overflow = unsafe {
            let ptr =
                interop.encoding_overflowing(encoding.as_ptr(), index, &mut length, &mut status);
            NativeEncoding::new(interop, ptr)
        };
        check_status(interop, "encoding_overflowing", status)?;
        let overflow = overflow.ok_or_else(|| {
            TokenizerError::native(
                "encoding_overflowing",
                Some(format!("engine returned no overflow at index {}", index)),
            )
        })?;
        overflowing.push(copy_encoding(interop, &overflow, length)?);
    }

    Ok(overflowing)
}
