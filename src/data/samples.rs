//! Corpus-to-sample conversion for next-character prediction.
//!
//! Slides a fixed window over the corpus at a fixed stride. Each window is
//! paired with the character immediately after it, and both are one-hot
//! encoded against the fitted vocabulary.

use ndarray::{s, Array2, Array3};

use super::vocab::Vocabulary;
use crate::error::{CharRnnError, Result};

/// Configuration for sample generation from text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleConfig {
    /// Number of characters in each input window.
    pub window_size: usize,
    /// Step size between consecutive windows.
    pub stride: usize,
}

impl Default for SampleConfig {
    fn default() -> Self {
        Self {
            window_size: 60,
            stride: 3,
        }
    }
}

impl SampleConfig {
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the window size or stride is zero.
    pub fn validate(&self) -> Result<()> {
        if self.window_size == 0 {
            return Err(CharRnnError::InvalidConfig("window_size must be > 0".into()));
        }
        if self.stride == 0 {
            return Err(CharRnnError::InvalidConfig("stride must be > 0".into()));
        }
        Ok(())
    }
}

/// One-hot encoded training set.
///
/// - `inputs` has shape `(n_windows, window_size, vocab_size)`
/// - `targets` has shape `(n_windows, vocab_size)`
#[derive(Debug, Clone)]
pub struct EncodedDataset {
    pub inputs: Array3<f32>,
    pub targets: Array2<f32>,
}

impl EncodedDataset {
    /// Number of (window, target) pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.targets.nrows()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Start offsets of every window whose target character exists.
///
/// Yields `0, S, 2S, ...` for every offset `o` with `o + W < len`; a trailing
/// window without a target is dropped, never padded.
pub fn window_offsets(len: usize, config: &SampleConfig) -> impl Iterator<Item = usize> {
    let end = len.saturating_sub(config.window_size);
    (0..end).step_by(config.stride.max(1))
}

/// Count the windows a corpus of `len` characters produces.
///
/// `floor((len - W - 1) / S) + 1` when `len > W`, otherwise zero.
#[must_use]
pub fn count_windows(len: usize, config: &SampleConfig) -> usize {
    if len > config.window_size {
        (len - config.window_size - 1) / config.stride.max(1) + 1
    } else {
        0
    }
}

/// `(snippet, target)` pairs over the corpus, in offset order.
pub fn windows<'a>(
    corpus: &'a [char],
    config: &SampleConfig,
) -> impl Iterator<Item = (&'a [char], char)> + 'a {
    let window_size = config.window_size;
    window_offsets(corpus.len(), config)
        .map(move |o| (&corpus[o..o + window_size], corpus[o + window_size]))
}

/// Convert the corpus into one-hot training samples.
///
/// # Errors
///
/// - `InvalidConfig` for a zero window size or stride
/// - `CorpusTooShort` if the corpus yields no window
/// - `UnknownCharacter` if the corpus contains a character the vocabulary lacks
pub fn text_to_samples(
    corpus: &[char],
    vocab: &Vocabulary,
    config: &SampleConfig,
) -> Result<EncodedDataset> {
    config.validate()?;

    let n_samples = count_windows(corpus.len(), config);
    if n_samples == 0 {
        return Err(CharRnnError::CorpusTooShort {
            len: corpus.len(),
            window: config.window_size,
        });
    }

    let vocab_size = vocab.size();
    let mut inputs = Array3::zeros((n_samples, config.window_size, vocab_size));
    let mut targets = Array2::zeros((n_samples, vocab_size));

    for (sample_idx, (window, target_char)) in windows(corpus, config).enumerate() {
        for (t, &c) in window.iter().enumerate() {
            inputs[[sample_idx, t, vocab.index_of(c)?]] = 1.0;
        }
        targets[[sample_idx, vocab.index_of(target_char)?]] = 1.0;
    }

    Ok(EncodedDataset { inputs, targets })
}

/// Gather the given sample rows into a contiguous mini-batch.
///
/// # Errors
///
/// Returns `ShapeMismatch` if an index is out of range.
pub fn gather_batch(
    dataset: &EncodedDataset,
    indices: &[usize],
) -> Result<(Array3<f32>, Array2<f32>)> {
    let (_, window_size, vocab_size) = dataset.inputs.dim();
    let mut inputs = Array3::zeros((indices.len(), window_size, vocab_size));
    let mut targets = Array2::zeros((indices.len(), vocab_size));

    for (row, &idx) in indices.iter().enumerate() {
        if idx >= dataset.len() {
            return Err(CharRnnError::ShapeMismatch(format!(
                "sample index {idx} outside dataset of {}",
                dataset.len()
            )));
        }
        inputs
            .slice_mut(s![row, .., ..])
            .assign(&dataset.inputs.slice(s![idx, .., ..]));
        targets.row_mut(row).assign(&dataset.targets.row(idx));
    }

    Ok((inputs, targets))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Axis;

    fn chars(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    #[test]
    fn test_window_enumeration() {
        let corpus = chars("ab ab ab");
        let config = SampleConfig {
            window_size: 2,
            stride: 1,
        };
        let pairs: Vec<(String, char)> = windows(&corpus, &config)
            .map(|(w, t)| (w.iter().collect(), t))
            .collect();
        let expected = vec![
            ("ab".to_string(), ' '),
            ("b ".to_string(), 'a'),
            (" a".to_string(), 'b'),
            ("ab".to_string(), ' '),
            ("b ".to_string(), 'a'),
            (" a".to_string(), 'b'),
        ];
        assert_eq!(pairs, expected);
        assert_eq!(count_windows(corpus.len(), &config), 6);
    }

    #[test]
    fn test_count_matches_offsets() {
        for len in 0..40 {
            for window_size in 1..8 {
                for stride in 1..5 {
                    let config = SampleConfig { window_size, stride };
                    assert_eq!(
                        window_offsets(len, &config).count(),
                        count_windows(len, &config),
                        "len={len} W={window_size} S={stride}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_stride_drops_partial_window() {
        // "abcdefg" = 7 chars, window 3, stride 2: offsets 0 (abc->d), 2 (cde->f)
        let corpus = chars("abcdefg");
        let config = SampleConfig {
            window_size: 3,
            stride: 2,
        };
        let offsets: Vec<usize> = window_offsets(corpus.len(), &config).collect();
        assert_eq!(offsets, vec![0, 2]);
    }

    #[test]
    fn test_text_to_samples_dimensions() {
        let corpus = chars("hello world");
        let vocab = Vocabulary::from_chars(&corpus);
        let config = SampleConfig {
            window_size: 4,
            stride: 3,
        };
        let dataset = text_to_samples(&corpus, &vocab, &config).unwrap();
        // (11 - 4 - 1) / 3 + 1 = 3
        assert_eq!(dataset.inputs.dim(), (3, 4, vocab.size()));
        assert_eq!(dataset.targets.dim(), (3, vocab.size()));
    }

    #[test]
    fn test_text_to_samples_content() {
        let corpus = chars("abcd");
        let vocab = Vocabulary::from_chars(&corpus);
        let config = SampleConfig {
            window_size: 3,
            stride: 1,
        };
        let dataset = text_to_samples(&corpus, &vocab, &config).unwrap();
        assert_eq!(dataset.len(), 1);
        assert_eq!(dataset.inputs[[0, 0, 0]], 1.0); // 'a'
        assert_eq!(dataset.inputs[[0, 1, 1]], 1.0); // 'b'
        assert_eq!(dataset.inputs[[0, 2, 2]], 1.0); // 'c'
        assert_eq!(dataset.targets[[0, 3]], 1.0); // 'd'
    }

    #[test]
    fn test_rows_are_one_hot() {
        let corpus = chars("the cat sat on the mat");
        let vocab = Vocabulary::from_chars(&corpus);
        let config = SampleConfig {
            window_size: 5,
            stride: 2,
        };
        let dataset = text_to_samples(&corpus, &vocab, &config).unwrap();
        for s in dataset.inputs.sum_axis(Axis(2)).iter() {
            assert_eq!(*s, 1.0);
        }
        for s in dataset.targets.sum_axis(Axis(1)).iter() {
            assert_eq!(*s, 1.0);
        }
    }

    #[test]
    fn test_corpus_not_longer_than_window() {
        let corpus = chars("hi");
        let vocab = Vocabulary::from_chars(&corpus);
        let config = SampleConfig {
            window_size: 2,
            stride: 1,
        };
        assert!(matches!(
            text_to_samples(&corpus, &vocab, &config),
            Err(CharRnnError::CorpusTooShort { len: 2, window: 2 })
        ));
    }

    #[test]
    fn test_out_of_vocabulary_corpus() {
        let corpus = chars("abcabc!");
        let vocab = Vocabulary::from_text("abc");
        let config = SampleConfig {
            window_size: 2,
            stride: 1,
        };
        assert!(matches!(
            text_to_samples(&corpus, &vocab, &config),
            Err(CharRnnError::UnknownCharacter('!'))
        ));
    }

    #[test]
    fn test_gather_batch() {
        let corpus = chars("abcdefgh");
        let vocab = Vocabulary::from_chars(&corpus);
        let config = SampleConfig {
            window_size: 2,
            stride: 1,
        };
        let dataset = text_to_samples(&corpus, &vocab, &config).unwrap();
        let (inputs, targets) = gather_batch(&dataset, &[3, 0]).unwrap();
        assert_eq!(inputs.dim(), (2, 2, vocab.size()));
        assert_eq!(targets.row(0), dataset.targets.row(3));
        assert_eq!(inputs.slice(s![1, .., ..]), dataset.inputs.slice(s![0, .., ..]));
        assert!(gather_batch(&dataset, &[99]).is_err());
    }
}
