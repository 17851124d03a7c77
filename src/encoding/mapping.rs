//! Word, token and character position queries.
//!
//! Tokens whose sequence id is unset count as belonging to sequence 0 for
//! every query that filters by sequence. [`Encoding::token_to_sequence`] is
//! the exception and reports the raw value.

use std::ops::Range;

use super::{Encoding, Offsets};

fn matches_sequence(sequence_id: Option<usize>, sequence: usize) -> bool {
    sequence_id.unwrap_or(0) == sequence
}

impl Encoding {
    /// Indices of tokens in `sequence` that belong to `word`.
    fn word_tokens(&self, word: u32, sequence: usize) -> impl Iterator<Item = usize> + '_ {
        (0..self.len()).filter(move |&i| {
            matches_sequence(self.sequence_ids[i], sequence) && self.word_ids[i] == Some(word)
        })
    }

    /// Token range `first..last + 1` covering `word` in `sequence`.
    pub fn word_to_tokens(&self, word: u32, sequence: usize) -> Option<Range<usize>> {
        let mut matches = self.word_tokens(word, sequence);
        let first = matches.next()?;
        let last = matches.last().unwrap_or(first);
        Some(first..last + 1)
    }

    /// Character span covering every token of `word` in `sequence`.
    pub fn word_to_chars(&self, word: u32, sequence: usize) -> Option<Offsets> {
        self.word_tokens(word, sequence)
            .map(|i| self.offsets[i])
            .reduce(|(start, end), (s, e)| (start.min(s), end.max(e)))
    }

    /// The raw sequence id of `token`.
    ///
    /// Returns `None` both for an out-of-range index and for a token whose
    /// sequence id is unset.
    pub fn token_to_sequence(&self, token: usize) -> Option<usize> {
        self.sequence_ids.get(token).copied().flatten()
    }

    /// Sequence index and character span of `token`.
    pub fn token_to_chars(&self, token: usize) -> Option<(usize, Offsets)> {
        let sequence = self.sequence_ids.get(token)?.unwrap_or(0);
        Some((sequence, self.offsets[token]))
    }

    /// Sequence index and word id of `token`.
    pub fn token_to_word(&self, token: usize) -> Option<(usize, Option<u32>)> {
        let sequence = self.sequence_ids.get(token)?.unwrap_or(0);
        Some((sequence, self.word_ids[token]))
    }

    /// First token of `sequence` whose span contains `pos`.
    ///
    /// A zero-width span `(p, p)` matches only `pos == p`, so synthetic
    /// `(0, 0)` tokens only answer for position 0.
    pub fn char_to_token(&self, pos: usize, sequence: usize) -> Option<usize> {
        (0..self.len()).find(|&i| {
            if !matches_sequence(self.sequence_ids[i], sequence) {
                return false;
            }
            let (start, end) = self.offsets[i];
            if start == end {
                pos == start
            } else {
                start <= pos && pos < end
            }
        })
    }

    /// Word id of the token at `pos` in `sequence`.
    pub fn char_to_word(&self, pos: usize, sequence: usize) -> Option<u32> {
        let token = self.char_to_token(pos, sequence)?;
        self.word_ids[token]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::tests::{hello_world, sequential};
    use crate::encoding::PaddingDirection;

    /// "[CLS] un ##able [SEP] ok [SEP]" for the pair ("unable", "ok").
    fn pair() -> Encoding {
        Encoding::new(
            vec![101, 4895, 3085, 102, 7929, 102],
            ["[CLS]", "un", "##able", "[SEP]", "ok", "[SEP]"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            vec![(0, 0), (0, 2), (2, 6), (0, 0), (0, 2), (0, 0)],
            vec![0, 0, 0, 0, 1, 1],
            vec![1; 6],
            vec![1, 0, 0, 1, 0, 1],
            vec![None, Some(0), Some(0), None, Some(0), None],
            vec![None, Some(0), Some(0), None, Some(1), None],
            Vec::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_word_to_tokens_spans_subwords() {
        let e = pair();
        assert_eq!(e.word_to_tokens(0, 0), Some(1..3));
        assert_eq!(e.word_to_tokens(0, 1), Some(4..5));
        assert_eq!(e.word_to_tokens(1, 0), None);
    }

    #[test]
    fn test_word_to_tokens_contains_each_token() {
        let e = hello_world();
        for t in 0..e.len() {
            let word = e.word_ids()[t].unwrap();
            let sequence = e.sequence_ids()[t].unwrap_or(0);
            let range = e.word_to_tokens(word, sequence).unwrap();
            assert!(range.contains(&t), "{:?} does not contain {}", range, t);
        }
    }

    #[test]
    fn test_unset_sequence_matches_zero() {
        let e = Encoding::from_tokens(
            vec![1, 2],
            vec!["a".into(), "b".into()],
            vec![(0, 1), (1, 2)],
        )
        .unwrap();
        assert_eq!(e.char_to_token(1, 0), Some(1));
        assert_eq!(e.char_to_token(1, 1), None);
    }

    #[test]
    fn test_word_to_chars() {
        let e = pair();
        assert_eq!(e.word_to_chars(0, 0), Some((0, 6)));
        assert_eq!(e.word_to_chars(0, 1), Some((0, 2)));
        assert_eq!(e.word_to_chars(3, 0), None);
    }

    #[test]
    fn test_token_to_sequence_is_raw() {
        let e = pair();
        assert_eq!(e.token_to_sequence(0), None);
        assert_eq!(e.token_to_sequence(4), Some(1));
        assert_eq!(e.token_to_sequence(99), None);
    }

    #[test]
    fn test_token_to_chars_defaults_sequence() {
        let e = pair();
        assert_eq!(e.token_to_chars(0), Some((0, (0, 0))));
        assert_eq!(e.token_to_chars(2), Some((0, (2, 6))));
        assert_eq!(e.token_to_chars(4), Some((1, (0, 2))));
        assert_eq!(e.token_to_chars(6), None);
    }

    #[test]
    fn test_token_to_word() {
        let e = pair();
        assert_eq!(e.token_to_word(3), Some((0, None)));
        assert_eq!(e.token_to_word(4), Some((1, Some(0))));
        assert_eq!(e.token_to_word(42), None);
    }

    #[test]
    fn test_char_to_token_covers_offsets() {
        let e = sequential(5);
        for t in 0..e.len() {
            let (start, end) = e.offsets()[t];
            for c in start..end {
                let found = e.char_to_token(c, 0).unwrap();
                let (s, e2) = e.offsets()[found];
                assert!(s <= c && c < e2);
            }
        }
        assert_eq!(e.char_to_token(5, 0), None);
    }

    #[test]
    fn test_char_to_token_zero_width_only_at_start() {
        let padded = hello_world().pad(4, 0, 0, "[PAD]", PaddingDirection::Left).into_owned();
        assert_eq!(padded.char_to_token(0, 0), Some(0));
        assert_eq!(padded.char_to_token(3, 0), Some(2));
        assert_eq!(padded.char_to_token(7, 0), Some(3));
    }

    #[test]
    fn test_char_to_token_by_sequence() {
        let e = pair();
        assert_eq!(e.char_to_token(1, 0), Some(1));
        assert_eq!(e.char_to_token(1, 1), Some(4));
        assert_eq!(e.char_to_token(3, 0), Some(2));
    }

    #[test]
    fn test_char_to_word() {
        let e = pair();
        assert_eq!(e.char_to_word(4, 0), Some(0));
        assert_eq!(e.char_to_word(0, 0), None);
        assert_eq!(e.char_to_word(9, 0), None);
    }
}
