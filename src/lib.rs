//! # char-rnn
//!
//! A character-level recurrent text generator trained on a small corpus of
//! short statements.
//!
//! ## Overview
//!
//! The pipeline is linear: load a delimited corpus file into one lowercase
//! string, slide a fixed window over it to build one-hot encoded
//! `(snippet, next character)` pairs, train a single LSTM layer followed by a
//! softmax classifier, and after selected epochs extend a random corpus
//! window one character at a time by temperature-scaled sampling.
//!
//! ## Structure
//!
//! - [`core`] — LSTM + dense softmax network, BPTT, RMSprop
//! - [`data`] — Corpus loading, vocabulary, windowing and one-hot encoding
//! - [`sampling`] — Temperature sampling and the sliding generation buffer
//! - [`training`] — Run context, epoch loop and generation reports
//! - [`utils`] — Activations and small numeric helpers

pub mod core;
pub mod data;
pub mod error;
pub mod sampling;
pub mod training;
pub mod utils;

pub use crate::core::{ActivationKind, CharRnn, LayerKind, LayerSpec, ModelSpec, OptimizerKind};
pub use data::{Corpus, CorpusOptions, EncodedDataset, SampleConfig, TextEncoding, Vocabulary};
pub use error::{CharRnnError, Result};
pub use sampling::{generate, sample_next, temperature_distribution, GenerationBuffer};
pub use training::{run, EpochMetrics, GeneratedSample, RunContext, RunReport};

use serde::{Deserialize, Serialize};

/// Run configuration for windowing, training and generation.
///
/// Used by [`RunContext::build`] and [`run`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub window_size: usize,
    pub stride: usize,
    pub hidden_units: usize,
    pub learning_rate: f32,
    pub batch_size: usize,
    pub epochs: usize,
    /// Epochs (1-based) after which text is generated.
    pub report_epochs: Vec<usize>,
    pub temperatures: Vec<f32>,
    /// Characters generated per (epoch, temperature) pair.
    pub generate_length: usize,
    pub seed: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            window_size: 60,
            stride: 3,
            hidden_units: 128,
            learning_rate: 0.01,
            batch_size: 128,
            epochs: 30,
            report_epochs: vec![1, 5, 10, 20, 30],
            temperatures: vec![0.2, 0.5, 1.0, 1.2],
            generate_length: 150,
            seed: 42,
        }
    }
}

impl Config {
    /// Window parameters as a [`SampleConfig`].
    #[must_use]
    pub fn sample_config(&self) -> SampleConfig {
        SampleConfig {
            window_size: self.window_size,
            stride: self.stride,
        }
    }

    /// Check the values that the model and sampler cannot work around.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        self.sample_config().validate()?;
        if self.hidden_units == 0 {
            return Err(CharRnnError::InvalidConfig("hidden_units must be > 0".into()));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(CharRnnError::InvalidConfig(format!(
                "learning_rate must be a positive number, got {}",
                self.learning_rate
            )));
        }
        if self.batch_size == 0 {
            return Err(CharRnnError::InvalidConfig("batch_size must be > 0".into()));
        }
        if let Some(&epoch) = self
            .report_epochs
            .iter()
            .find(|&&e| e == 0 || e > self.epochs)
        {
            return Err(CharRnnError::InvalidConfig(format!(
                "report epoch {epoch} outside 1..={}",
                self.epochs
            )));
        }
        if let Some(&t) = self
            .temperatures
            .iter()
            .find(|t| !(t.is_finite() && **t > 0.0))
        {
            return Err(CharRnnError::InvalidConfig(format!(
                "temperature must be positive, got {t}"
            )));
        }
        Ok(())
    }
}
