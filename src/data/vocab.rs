//! Character vocabulary for next-character prediction.
//!
//! Maps between characters and indices for one-hot encoding. The vocabulary
//! is fitted on the training corpus: its distinct characters in ascending
//! Unicode scalar order.

use ndarray::{Array1, Array2, ArrayView1};
use std::collections::{BTreeSet, HashMap};

use crate::error::{CharRnnError, Result};
use crate::utils::argmax;

/// Character-to-index vocabulary for one-hot encoding.
///
/// ## Invariants
/// - `chars` is sorted and free of duplicates
/// - `char_to_idx[chars[i]] == i` for every `i`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vocabulary {
    chars: Vec<char>,
    char_to_idx: HashMap<char, usize>,
}

impl Vocabulary {
    /// Fit a vocabulary on the distinct characters of `text`.
    #[must_use]
    pub fn from_chars<'a, I>(text: I) -> Self
    where
        I: IntoIterator<Item = &'a char>,
    {
        let distinct: BTreeSet<char> = text.into_iter().copied().collect();
        let chars: Vec<char> = distinct.into_iter().collect();
        let char_to_idx = chars.iter().enumerate().map(|(i, &c)| (c, i)).collect();
        Self { chars, char_to_idx }
    }

    /// Fit a vocabulary on the distinct characters of a string.
    #[must_use]
    pub fn from_text(text: &str) -> Self {
        let chars: Vec<char> = text.chars().collect();
        Self::from_chars(&chars)
    }

    /// Number of characters in the vocabulary.
    #[must_use]
    pub fn size(&self) -> usize {
        self.chars.len()
    }

    /// Characters in index order.
    #[must_use]
    pub fn chars(&self) -> &[char] {
        &self.chars
    }

    /// Get the index for a character, or `None` if not in vocabulary.
    #[must_use]
    pub fn char_to_index(&self, c: char) -> Option<usize> {
        self.char_to_idx.get(&c).copied()
    }

    /// Get the character for an index, or `None` if out of bounds.
    #[must_use]
    pub fn index_to_char(&self, idx: usize) -> Option<char> {
        self.chars.get(idx).copied()
    }

    /// Index lookup that fails on characters outside the vocabulary.
    ///
    /// # Errors
    ///
    /// Returns `UnknownCharacter` if `c` was not seen when fitting.
    pub fn index_of(&self, c: char) -> Result<usize> {
        self.char_to_index(c)
            .ok_or(CharRnnError::UnknownCharacter(c))
    }

    /// Character lookup that fails on indices outside the vocabulary.
    ///
    /// # Errors
    ///
    /// Returns `ShapeMismatch` if `idx >= self.size()`.
    pub fn char_at(&self, idx: usize) -> Result<char> {
        self.index_to_char(idx).ok_or_else(|| {
            CharRnnError::ShapeMismatch(format!(
                "index {idx} outside vocabulary of size {}",
                self.size()
            ))
        })
    }

    /// One-hot encode a single character as a vector of length `self.size()`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownCharacter` if `c` is not in the vocabulary.
    pub fn one_hot(&self, c: char) -> Result<Array1<f32>> {
        let mut v = Array1::zeros(self.size());
        v[self.index_of(c)?] = 1.0;
        Ok(v)
    }

    /// Decode a one-hot (or soft) vector back to a character using argmax.
    #[must_use]
    pub fn decode_argmax(&self, v: ArrayView1<'_, f32>) -> Option<char> {
        if v.is_empty() {
            return None;
        }
        self.index_to_char(argmax(v))
    }

    /// One-hot encode a window of characters as a `(window.len(), size)` matrix.
    ///
    /// Row `t` is the one-hot vector of `window[t]`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownCharacter` on the first character outside the vocabulary.
    pub fn encode_window(&self, window: &[char]) -> Result<Array2<f32>> {
        let mut m = Array2::zeros((window.len(), self.size()));
        for (t, &c) in window.iter().enumerate() {
            m[[t, self.index_of(c)?]] = 1.0;
        }
        Ok(m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sorted_distinct() {
        let vocab = Vocabulary::from_text("hello world");
        assert_eq!(vocab.chars(), &[' ', 'd', 'e', 'h', 'l', 'o', 'r', 'w']);
        assert_eq!(vocab.size(), 8);
    }

    #[test]
    fn test_char_round_trip() {
        let vocab = Vocabulary::from_text("the quick brown fox, 42!");
        for (i, &c) in vocab.chars().iter().enumerate() {
            assert_eq!(vocab.char_to_index(c), Some(i));
            assert_eq!(vocab.index_to_char(i), Some(c));
        }
    }

    #[test]
    fn test_unknown_char() {
        let vocab = Vocabulary::from_text("abc");
        assert_eq!(vocab.char_to_index('z'), None);
        assert_eq!(vocab.index_to_char(3), None);
        assert!(matches!(
            vocab.index_of('z'),
            Err(CharRnnError::UnknownCharacter('z'))
        ));
        assert!(vocab.one_hot('z').is_err());
        assert!(vocab.char_at(3).is_err());
    }

    #[test]
    fn test_one_hot_encode() {
        let vocab = Vocabulary::from_text("abc");
        let v = vocab.one_hot('b').unwrap();
        assert_eq!(v.len(), 3);
        assert_eq!(v[1], 1.0);
        assert_eq!(v.sum(), 1.0);
    }

    #[test]
    fn test_decode_argmax() {
        let vocab = Vocabulary::from_text("xyz");
        let v = vocab.one_hot('z').unwrap();
        assert_eq!(vocab.decode_argmax(v.view()), Some('z'));
    }

    #[test]
    fn test_encode_window() {
        let vocab = Vocabulary::from_text("helo");
        let window = ['h', 'e', 'l', 'l', 'o'];
        let encoded = vocab.encode_window(&window).unwrap();
        assert_eq!(encoded.shape(), &[5, 4]);
        for row in encoded.rows() {
            assert_eq!(row.sum(), 1.0);
        }
        assert_eq!(encoded[[2, vocab.char_to_index('l').unwrap()]], 1.0);
    }

    #[test]
    fn test_encode_window_unknown() {
        let vocab = Vocabulary::from_text("ab");
        assert!(vocab.encode_window(&['a', '?']).is_err());
    }
}
