//! Batch decode over a single engine call.
//!
//! Ragged id sequences are packed back to back into one buffer with a
//! parallel lengths table, so a batch of any size crosses the boundary once.

use std::os::raw::c_int;

use tracing::debug;

use super::marshal::MAX_WIRE_LENGTH;
use crate::error::TokenizerError;
use crate::native::guard::OutputTable;
use crate::native::{NativeInterop, RawTokenizer, STATUS_OK};

/// Id sequences flattened for the engine.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct FlatBatch {
    pub(crate) ids: Vec<u32>,
    pub(crate) lengths: Vec<usize>,
}

impl FlatBatch {
    /// Pack `sequences`, rejecting batches the engine cannot index.
    ///
    /// The size check runs before anything is allocated.
    pub(crate) fn pack<S: AsRef<[u32]>>(sequences: &[S]) -> Result<Self, TokenizerError> {
        if sequences.len() > MAX_WIRE_LENGTH {
            return Err(TokenizerError::UnsupportedSize(format!(
                "batch of {} sequences exceeds {}",
                sequences.len(),
                MAX_WIRE_LENGTH
            )));
        }
        let total = checked_total(sequences.iter().map(|s| s.as_ref().len()))?;

        let mut ids = Vec::with_capacity(total);
        let mut lengths = Vec::with_capacity(sequences.len());
        for sequence in sequences {
            let sequence = sequence.as_ref();
            ids.extend_from_slice(sequence);
            lengths.push(sequence.len());
        }
        Ok(Self { ids, lengths })
    }

    pub(crate) fn len(&self) -> usize {
        self.lengths.len()
    }
}

/// Sum `lengths`, failing once the total no longer fits the engine's index width.
pub(crate) fn checked_total<I>(lengths: I) -> Result<usize, TokenizerError>
where
    I: IntoIterator<Item = usize>,
{
    lengths
        .into_iter()
        .try_fold(0usize, |total, len| {
            total.checked_add(len).filter(|&t| t <= MAX_WIRE_LENGTH)
        })
        .ok_or_else(|| {
            TokenizerError::UnsupportedSize(format!(
                "batch total length exceeds {}",
                MAX_WIRE_LENGTH
            ))
        })
}

/// Decode every sequence of `batch` in one engine call.
///
/// An empty batch and a batch of only empty sequences never reach the
/// engine. On failure every slot the engine already filled is freed before
/// the error is returned.
pub(crate) fn decode_flat(
    interop: &dyn NativeInterop,
    raw: *mut RawTokenizer,
    batch: &FlatBatch,
    skip_special_tokens: bool,
) -> Result<Vec<String>, TokenizerError> {
    let count = batch.len();
    if count == 0 {
        return Ok(Vec::new());
    }
    if batch.ids.is_empty() {
        return Ok(vec![String::new(); count]);
    }

    let mut table = OutputTable::new(interop, count);
    let mut status = STATUS_OK;
    let decoded = unsafe {
        interop.decode_batch_flat(
            raw,
            &batch.ids,
            &batch.lengths,
            skip_special_tokens,
            table.as_mut_slice(),
            &mut status,
        )
    };

    if status != STATUS_OK {
        let detail = interop.last_error();
        let freed = table.release_all();
        debug!(freed, count, "batch decode failed; released partial output");
        return Err(TokenizerError::native("decode_batch", detail));
    }
    if decoded != count as c_int {
        let freed = table.release_all();
        debug!(freed, decoded, count, "batch decode count mismatch");
        return Err(TokenizerError::native(
            "decode_batch",
            Some(format!("engine decoded {} of {} sequences", decoded, count)),
        ));
    }

    debug!(count, total = batch.ids.len(), "batch decoded");
    Ok((0..count).map(|i| table.take(i)).collect())
}
