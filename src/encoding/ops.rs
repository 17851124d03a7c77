//! Merge, pad and truncate.
//!
//! Every operation here is pure: it reads one or more [`Encoding`] values and
//! either returns a freshly built one or, when nothing would change, borrows
//! the input back through [`Cow::Borrowed`].

use std::borrow::Cow;

use serde::Serialize;

use super::Encoding;
use crate::error::TokenizerError;

/// Side on which padding tokens are inserted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum PaddingDirection {
    Left,
    #[default]
    Right,
}

/// Side from which tokens are dropped when truncating.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum TruncationDirection {
    Left,
    #[default]
    Right,
}

impl Encoding {
    /// Concatenate encodings in order.
    ///
    /// Returns `None` for an empty input. With `growing_offsets`, each
    /// encoding's offsets are shifted by the end of the last offset already
    /// emitted, so spans keep increasing across the merged result. Overflow
    /// lists are concatenated as-is.
    pub fn merge<'a, I>(encodings: I, growing_offsets: bool) -> Option<Encoding>
    where
        I: IntoIterator<Item = &'a Encoding>,
    {
        let encodings: Vec<&Encoding> = encodings.into_iter().collect();
        if encodings.is_empty() {
            return None;
        }

        let total: usize = encodings.iter().map(|e| e.len()).sum();
        let mut merged = Encoding {
            ids: Vec::with_capacity(total),
            tokens: Vec::with_capacity(total),
            offsets: Vec::with_capacity(total),
            type_ids: Vec::with_capacity(total),
            attention_mask: Vec::with_capacity(total),
            special_tokens_mask: Vec::with_capacity(total),
            word_ids: Vec::with_capacity(total),
            sequence_ids: Vec::with_capacity(total),
            overflowing: Vec::new(),
        };

        let mut shift = 0usize;
        for encoding in encodings {
            merged.ids.extend_from_slice(&encoding.ids);
            merged.tokens.extend_from_slice(&encoding.tokens);
            merged.type_ids.extend_from_slice(&encoding.type_ids);
            merged.attention_mask.extend_from_slice(&encoding.attention_mask);
            merged
                .special_tokens_mask
                .extend_from_slice(&encoding.special_tokens_mask);
            merged.word_ids.extend_from_slice(&encoding.word_ids);
            merged.sequence_ids.extend_from_slice(&encoding.sequence_ids);

            if growing_offsets {
                merged.offsets.extend(
                    encoding
                        .offsets
                        .iter()
                        .map(|&(start, end)| (start + shift, end + shift)),
                );
                if let Some(&(_, end)) = merged.offsets.last() {
                    shift = end;
                }
            } else {
                merged.offsets.extend_from_slice(&encoding.offsets);
            }

            merged
                .overflowing
                .extend(encoding.overflowing.iter().cloned());
        }

        Some(merged)
    }

    /// Pad to `target_length` tokens.
    ///
    /// Padding tokens get `pad_id`, `pad_token`, offset `(0, 0)`,
    /// `pad_type_id`, attention 0, special 1 and no word or sequence. A target
    /// at or below the current length leaves the encoding untouched; padding
    /// never truncates.
    pub fn pad(
        &self,
        target_length: usize,
        pad_id: u32,
        pad_type_id: u32,
        pad_token: &str,
        direction: PaddingDirection,
    ) -> Cow<'_, Encoding> {
        if target_length <= self.len() {
            return Cow::Borrowed(self);
        }

        let pad_count = target_length - self.len();
        let mut padded = Encoding {
            ids: Vec::with_capacity(target_length),
            tokens: Vec::with_capacity(target_length),
            offsets: Vec::with_capacity(target_length),
            type_ids: Vec::with_capacity(target_length),
            attention_mask: Vec::with_capacity(target_length),
            special_tokens_mask: Vec::with_capacity(target_length),
            word_ids: Vec::with_capacity(target_length),
            sequence_ids: Vec::with_capacity(target_length),
            overflowing: self.overflowing.clone(),
        };

        let push_padding = |enc: &mut Encoding| {
            for _ in 0..pad_count {
                enc.ids.push(pad_id);
                enc.tokens.push(pad_token.to_string());
                enc.offsets.push((0, 0));
                enc.type_ids.push(pad_type_id);
                enc.attention_mask.push(0);
                enc.special_tokens_mask.push(1);
                enc.word_ids.push(None);
                enc.sequence_ids.push(None);
            }
        };
        let push_original = |enc: &mut Encoding| {
            enc.ids.extend_from_slice(&self.ids);
            enc.tokens.extend_from_slice(&self.tokens);
            enc.offsets.extend_from_slice(&self.offsets);
            enc.type_ids.extend_from_slice(&self.type_ids);
            enc.attention_mask.extend_from_slice(&self.attention_mask);
            enc.special_tokens_mask
                .extend_from_slice(&self.special_tokens_mask);
            enc.word_ids.extend_from_slice(&self.word_ids);
            enc.sequence_ids.extend_from_slice(&self.sequence_ids);
        };

        match direction {
            PaddingDirection::Left => {
                push_padding(&mut padded);
                push_original(&mut padded);
            }
            PaddingDirection::Right => {
                push_original(&mut padded);
                push_padding(&mut padded);
            }
        }

        Cow::Owned(padded)
    }

    /// Truncate to at most `max_length` tokens.
    ///
    /// `Left` keeps the last `max_length` tokens and produces no overflow.
    /// `Right` keeps the first `max_length`; with a non-zero `stride` the
    /// dropped tail is also returned as overlapping overflow segments, each
    /// starting `max_length - stride` tokens after the previous one.
    ///
    /// Truncating to 0 yields an empty encoding. A `max_length` at or above
    /// the current length is a no-op regardless of `stride`; otherwise
    /// `stride >= max_length` is rejected with
    /// [`TokenizerError::InvalidArgument`].
    pub fn truncate(
        &self,
        max_length: usize,
        stride: usize,
        direction: TruncationDirection,
    ) -> Result<Cow<'_, Encoding>, TokenizerError> {
        if max_length == 0 {
            return Ok(Cow::Owned(Encoding::default()));
        }
        if max_length >= self.len() {
            return Ok(Cow::Borrowed(self));
        }
        if stride >= max_length {
            return Err(TokenizerError::InvalidArgument(format!(
                "stride ({}) must be less than max_length ({})",
                stride, max_length
            )));
        }

        let n = self.len();
        if direction == TruncationDirection::Left {
            return self
                .segment(n - max_length, max_length, Vec::new())
                .map(Cow::Owned);
        }

        let mut overflowing = Vec::new();
        if stride > 0 {
            let step = max_length - stride;
            let mut start = step;
            while start < n {
                let len = max_length.min(n - start);
                overflowing.push(self.segment(start, len, Vec::new())?);
                if start + len >= n {
                    break;
                }
                start += step;
            }
        }

        self.segment(0, max_length, overflowing).map(Cow::Owned)
    }
}
