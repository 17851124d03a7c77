//! The immutable result of one encode operation.
//!
//! An [`Encoding`] holds eight parallel per-token sequences plus the list of
//! overflow segments produced by truncation. All eight sequences always have
//! the same length; constructors reject anything else, and the operations in
//! [`ops`] and [`mapping`] only ever derive new values that keep it.
//!
//! An `Encoding` is plain owned data. It never refers back to the tokenizer
//! or the native engine that produced it, so it stays valid after the
//! tokenizer has been released and can be shared freely across threads.

pub mod mapping;
pub mod ops;

use serde::Serialize;

use crate::error::TokenizerError;

pub use ops::{PaddingDirection, TruncationDirection};

/// Half-open character span `(start, end)` into the original input.
///
/// `(0, 0)` marks synthetic tokens such as padding.
pub type Offsets = (usize, usize);

/// Tokenized text (or text pair) as parallel per-token sequences.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Encoding {
    ids: Vec<u32>,
    tokens: Vec<String>,
    offsets: Vec<Offsets>,
    type_ids: Vec<u32>,
    attention_mask: Vec<u32>,
    special_tokens_mask: Vec<u32>,
    word_ids: Vec<Option<u32>>,
    sequence_ids: Vec<Option<usize>>,
    overflowing: Vec<Encoding>,
}

impl Encoding {
    /// Build an encoding from all of its fields.
    ///
    /// Fails with [`TokenizerError::InvalidArgument`] when any per-token
    /// field has a different length from `ids`. Overflow entries are already
    /// `Encoding` values and therefore already valid.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ids: Vec<u32>,
        tokens: Vec<String>,
        offsets: Vec<Offsets>,
        type_ids: Vec<u32>,
        attention_mask: Vec<u32>,
        special_tokens_mask: Vec<u32>,
        word_ids: Vec<Option<u32>>,
        sequence_ids: Vec<Option<usize>>,
        overflowing: Vec<Encoding>,
    ) -> Result<Self, TokenizerError> {
        let n = ids.len();
        let lengths = [
            ("tokens", tokens.len()),
            ("offsets", offsets.len()),
            ("type_ids", type_ids.len()),
            ("attention_mask", attention_mask.len()),
            ("special_tokens_mask", special_tokens_mask.len()),
            ("word_ids", word_ids.len()),
            ("sequence_ids", sequence_ids.len()),
        ];
        if let Some((field, len)) = lengths.iter().find(|(_, len)| *len != n) {
            return Err(TokenizerError::InvalidArgument(format!(
                "encoding field '{}' has {} entries, expected {}",
                field, len, n
            )));
        }

        Ok(Self {
            ids,
            tokens,
            offsets,
            type_ids,
            attention_mask,
            special_tokens_mask,
            word_ids,
            sequence_ids,
            overflowing,
        })
    }

    /// Build an encoding from ids, tokens and offsets only.
    ///
    /// The remaining fields get the values of an ordinary first-sequence
    /// token: type id 0, attention 1, not special, no word, no sequence.
    pub fn from_tokens(
        ids: Vec<u32>,
        tokens: Vec<String>,
        offsets: Vec<Offsets>,
    ) -> Result<Self, TokenizerError> {
        let n = ids.len();
        Self::new(
            ids,
            tokens,
            offsets,
            vec![0; n],
            vec![1; n],
            vec![0; n],
            vec![None; n],
            vec![None; n],
            Vec::new(),
        )
    }

    /// Number of tokens.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[u32] {
        &self.ids
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn offsets(&self) -> &[Offsets] {
        &self.offsets
    }

    /// Segment id per token: 0 for the first sequence of a pair, 1 for the second.
    pub fn type_ids(&self) -> &[u32] {
        &self.type_ids
    }

    /// 1 for real tokens, 0 for padding.
    pub fn attention_mask(&self) -> &[u32] {
        &self.attention_mask
    }

    /// 1 for special or synthetic tokens.
    pub fn special_tokens_mask(&self) -> &[u32] {
        &self.special_tokens_mask
    }

    pub fn word_ids(&self) -> &[Option<u32>] {
        &self.word_ids
    }

    pub fn sequence_ids(&self) -> &[Option<usize>] {
        &self.sequence_ids
    }

    /// Segments discarded by truncation, in order.
    pub fn overflowing(&self) -> &[Encoding] {
        &self.overflowing
    }

    /// Copy `len` tokens starting at `start` into a new encoding that carries
    /// `overflowing` as its overflow list.
    fn segment(
        &self,
        start: usize,
        len: usize,
        overflowing: Vec<Encoding>,
    ) -> Result<Encoding, TokenizerError> {
        let end = start
            .checked_add(len)
            .filter(|&end| end <= self.len())
            .ok_or_else(|| {
                TokenizerError::OutOfRange(format!(
                    "segment {}..{} exceeds encoding of length {}",
                    start,
                    start.saturating_add(len),
                    self.len()
                ))
            })?;

        Ok(Encoding {
            ids: self.ids[start..end].to_vec(),
            tokens: self.tokens[start..end].to_vec(),
            offsets: self.offsets[start..end].to_vec(),
            type_ids: self.type_ids[start..end].to_vec(),
            attention_mask: self.attention_mask[start..end].to_vec(),
            special_tokens_mask: self.special_tokens_mask[start..end].to_vec(),
            word_ids: self.word_ids[start..end].to_vec(),
            sequence_ids: self.sequence_ids[start..end].to_vec(),
            overflowing,
        })
    }
}
