//! Temperature sampling and autoregressive generation.
//!
//! The model's next-character distribution `p` is reshaped by a temperature
//! `T` before a single categorical draw:
//!
//! ```text
//! q_i ∝ exp(ln(p_i) / T)
//! ```
//!
//! `T < 1` sharpens towards the argmax, `T > 1` flattens towards uniform over
//! the characters with `p_i > 0`, and `T = 1` leaves `p` unchanged.

use log::trace;
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use std::io::Write;

use crate::core::CharRnn;
use crate::data::Vocabulary;
use crate::error::{CharRnnError, Result};

/// Temperature-adjusted copy of `probs`, normalised to sum to one.
///
/// The largest log-probability is subtracted before exponentiating; this
/// cancels in the normalisation and keeps very low temperatures from
/// underflowing every entry to zero. Zero probabilities stay zero.
///
/// # Errors
///
/// - `InvalidConfig` if `temperature` is not a positive finite number
/// - `DegenerateDistribution` if `probs` is empty, has a negative or
///   non-finite entry, or is all zeros
pub fn temperature_distribution(probs: &[f32], temperature: f32) -> Result<Vec<f64>> {
    if !(temperature.is_finite() && temperature > 0.0) {
        return Err(CharRnnError::InvalidConfig(format!(
            "temperature must be positive, got {temperature}"
        )));
    }
    if let Some((i, p)) = probs
        .iter()
        .enumerate()
        .find(|(_, p)| !(p.is_finite() && **p >= 0.0))
    {
        return Err(CharRnnError::DegenerateDistribution(format!(
            "probability {p} at index {i}"
        )));
    }

    let t = f64::from(temperature);
    let logits: Vec<f64> = probs.iter().map(|&p| f64::from(p).ln() / t).collect();
    let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return Err(CharRnnError::DegenerateDistribution(
            "all probabilities are zero".into(),
        ));
    }

    let scaled: Vec<f64> = logits.iter().map(|&l| (l - max).exp()).collect();
    let sum: f64 = scaled.iter().sum();
    Ok(scaled.into_iter().map(|s| s / sum).collect())
}

/// Draw the index of the next character.
///
/// # Errors
///
/// Same as [`temperature_distribution`].
pub fn sample_next<R: Rng + ?Sized>(probs: &[f32], temperature: f32, rng: &mut R) -> Result<usize> {
    let weights = temperature_distribution(probs, temperature)?;
    let dist = WeightedIndex::new(&weights)
        .map_err(|e| CharRnnError::DegenerateDistribution(e.to_string()))?;
    Ok(dist.sample(rng))
}

/// Fixed-capacity sliding window of characters.
///
/// Pushing a character overwrites the oldest one, so the buffer always
/// holds exactly `capacity` characters and never reallocates.
#[derive(Debug, Clone)]
pub struct GenerationBuffer {
    ring: Vec<char>,
    /// Index of the oldest character.
    head: usize,
}

impl GenerationBuffer {
    /// Start from a seed; its length fixes the capacity.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for an empty seed.
    pub fn new(seed: &[char]) -> Result<Self> {
        if seed.is_empty() {
            return Err(CharRnnError::InvalidConfig("generation seed is empty".into()));
        }
        Ok(Self {
            ring: seed.to_vec(),
            head: 0,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Append `c`, dropping the oldest character.
    pub fn push(&mut self, c: char) {
        self.ring[self.head] = c;
        self.head = (self.head + 1) % self.ring.len();
    }

    /// Characters from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = char> + '_ {
        let (newer, older) = self.ring.split_at(self.head);
        older.iter().chain(newer.iter()).copied()
    }

    /// Copy the window, oldest first, into `out` (cleared first).
    pub fn copy_into(&self, out: &mut Vec<char>) {
        out.clear();
        out.extend(self.iter());
    }
}

impl std::fmt::Display for GenerationBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.iter().try_for_each(|c| write!(f, "{c}"))
    }
}

/// Extend `seed` by `length` sampled characters.
///
/// Each step encodes the current window, predicts, samples at
/// `temperature`, writes the character to `sink` and slides the window.
/// Returns the generated characters (seed excluded).
///
/// # Errors
///
/// Propagates vocabulary, shape, sampling and sink write errors.
pub fn generate<R, W>(
    model: &CharRnn,
    vocab: &Vocabulary,
    seed: &[char],
    temperature: f32,
    length: usize,
    rng: &mut R,
    sink: &mut W,
) -> Result<String>
where
    R: Rng + ?Sized,
    W: Write + ?Sized,
{
    let mut buffer = GenerationBuffer::new(seed)?;
    let mut window = Vec::with_capacity(buffer.len());
    let mut generated = String::with_capacity(length);

    for _ in 0..length {
        buffer.copy_into(&mut window);
        let encoded = vocab.encode_window(&window)?;
        let probs = model.predict(encoded.view())?;
        let probs = probs
            .as_slice()
            .ok_or_else(|| CharRnnError::ShapeMismatch("non-contiguous prediction".into()))?;

        let idx = sample_next(probs, temperature, rng)?;
        let next = vocab.char_at(idx)?;
        trace!("sampled {next:?} (index {idx}, p={:.4})", probs[idx]);

        write!(sink, "{next}")?;
        sink.flush()?;
        generated.push(next);
        buffer.push(next);
    }

    Ok(generated)
}
