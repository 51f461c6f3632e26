//! Epoch loop, per-epoch metrics and generation reports.
//!
//! A run moves through a fixed sequence of stages:
//!
//! ```text
//! load corpus -> vocabulary -> encoded dataset
//!   -> for epoch in 1..=E: fit one epoch
//!        -> (reporting epoch) draw seed -> for each T: generate
//! ```
//!
//! Any error aborts the whole run. The corpus, vocabulary and dataset are
//! built once in [`RunContext::build`] and only read afterwards.

use log::{debug, info};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::time::Instant;

use crate::core::{CharRnn, ModelSpec};
use crate::data::{text_to_samples, Corpus, EncodedDataset, Vocabulary};
use crate::error::{CharRnnError, Result};
use crate::sampling::generate;
use crate::Config;

/// Loss and accuracy after one training epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// 1-based epoch number.
    pub epoch: usize,
    pub avg_loss: f32,
    pub accuracy: f32,
    pub num_samples: usize,
    pub elapsed_secs: f64,
}

/// One generated continuation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedSample {
    pub epoch: usize,
    pub temperature: f32,
    /// Corpus window the generation started from.
    pub seed: String,
    pub text: String,
}

/// Everything a run produced, in order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub epochs: Vec<EpochMetrics>,
    pub samples: Vec<GeneratedSample>,
}

impl RunReport {
    /// Metrics of the last completed epoch.
    #[must_use]
    pub fn last_epoch(&self) -> Option<&EpochMetrics> {
        self.epochs.last()
    }
}

/// Read-only state shared by training and generation.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub corpus: Corpus,
    pub vocab: Vocabulary,
    pub dataset: EncodedDataset,
}

impl RunContext {
    /// Fit the vocabulary to `corpus` and encode every window.
    ///
    /// # Errors
    ///
    /// - `InvalidConfig` if `config` does not validate
    /// - `CorpusTooShort` if the corpus yields no window
    pub fn build(corpus: Corpus, config: &Config) -> Result<Self> {
        config.validate()?;

        let vocab = Vocabulary::from_chars(corpus.chars());
        info!("Vocabulary: {} distinct characters", vocab.size());

        let dataset = text_to_samples(corpus.chars(), &vocab, &config.sample_config())?;
        info!(
            "Encoded {} windows of {} characters (stride {})",
            dataset.len(),
            config.window_size,
            config.stride
        );

        Ok(Self {
            corpus,
            vocab,
            dataset,
        })
    }

    /// Model layout for this context's vocabulary.
    #[must_use]
    pub fn model_spec(&self, config: &Config) -> ModelSpec {
        ModelSpec::char_rnn(
            config.window_size,
            self.vocab.size(),
            config.hidden_units,
            config.learning_rate,
        )
    }

    /// Uniformly chosen corpus window of `window_size` characters.
    ///
    /// # Errors
    ///
    /// Returns `CorpusTooShort` if the corpus is not longer than the window.
    pub fn draw_seed<R: Rng + ?Sized>(&self, window_size: usize, rng: &mut R) -> Result<&[char]> {
        let chars = self.corpus.chars();
        if chars.len() <= window_size {
            return Err(CharRnnError::CorpusTooShort {
                len: chars.len(),
                window: window_size,
            });
        }
        let offset = rng.gen_range(0..chars.len() - window_size);
        debug!("seed offset {offset}");
        Ok(&chars[offset..offset + window_size])
    }
}

/// Train for `config.epochs` epochs, generating text after each reporting
/// epoch.
///
/// Every random decision is drawn from `rng` in a fixed order (weight
/// initialisation, then per epoch the shuffle, the seed offset and the
/// sampling draws), so the same seed and corpus reproduce the output byte
/// for byte. Annotation lines and generated characters go to `out`;
/// progress goes to the log.
///
/// # Errors
///
/// Propagates configuration, model, sampling and write errors.
#[allow(clippy::cast_precision_loss)]
pub fn run<R, W>(ctx: &RunContext, config: &Config, rng: &mut R, out: &mut W) -> Result<RunReport>
where
    R: Rng + ?Sized,
    W: Write + ?Sized,
{
    config.validate()?;

    let spec = ctx.model_spec(config);
    let mut model = CharRnn::new(&spec, rng)?;
    info!(
        "Model: LSTM({}) -> dense softmax({}), {} parameters",
        model.hidden_units(),
        ctx.vocab.size(),
        model.num_parameters()
    );

    let mut report = RunReport::default();

    for epoch in 1..=config.epochs {
        let start = Instant::now();
        let fit = model.fit_one_epoch(&ctx.dataset, config.batch_size, rng)?;
        let metrics = EpochMetrics {
            epoch,
            avg_loss: fit.avg_loss,
            accuracy: fit.accuracy,
            num_samples: fit.num_samples,
            elapsed_secs: start.elapsed().as_secs_f64(),
        };
        info!(
            "Epoch {}/{}: loss={:.4} acc={:.2}% ({:.1}s)",
            epoch,
            config.epochs,
            metrics.avg_loss,
            metrics.accuracy * 100.0,
            metrics.elapsed_secs
        );
        report.epochs.push(metrics);

        if !config.report_epochs.contains(&epoch) {
            continue;
        }

        let seed = ctx.draw_seed(config.window_size, rng)?;
        let seed_text: String = seed.iter().collect();
        writeln!(out, "----- Generating text after epoch {epoch}")?;
        writeln!(out, "----- Seed: \"{seed_text}\"")?;

        for &temperature in &config.temperatures {
            writeln!(out, "----- temperature: {temperature}")?;
            write!(out, "{seed_text}")?;
            let text = generate(
                &model,
                &ctx.vocab,
                seed,
                temperature,
                config.generate_length,
                rng,
                out,
            )?;
            writeln!(out)?;

            report.samples.push(GeneratedSample {
                epoch,
                temperature,
                seed: seed_text.clone(),
                text,
            });
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn tiny_config() -> Config {
        Config {
            window_size: 8,
            stride: 2,
            hidden_units: 12,
            batch_size: 16,
            epochs: 3,
            report_epochs: vec![1, 3],
            temperatures: vec![0.5, 1.0],
            generate_length: 20,
            ..Config::default()
        }
    }

    fn tiny_context(config: &Config) -> RunContext {
        let corpus = Corpus::from_rows([
            "The cat sat on the mat",
            "A dog ran in the park",
            "The sun is hot today",
        ])
        .unwrap();
        RunContext::build(corpus, config).unwrap()
    }

    #[test]
    fn test_context_shapes() {
        let config = tiny_config();
        let ctx = tiny_context(&config);
        let k = ctx.vocab.size();
        assert_eq!(ctx.dataset.inputs.dim().1, 8);
        assert_eq!(ctx.dataset.inputs.dim().2, k);
        assert_eq!(ctx.dataset.targets.dim().1, k);
        assert_eq!(ctx.model_spec(&config).vocab_size, k);
    }

    #[test]
    fn test_build_rejects_short_corpus() {
        let config = tiny_config();
        let corpus = Corpus::from_rows(["short"]).unwrap();
        assert!(matches!(
            RunContext::build(corpus, &config),
            Err(CharRnnError::CorpusTooShort { .. })
        ));
    }

    #[test]
    fn test_draw_seed_is_corpus_window() {
        let config = tiny_config();
        let ctx = tiny_context(&config);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        for _ in 0..50 {
            let seed = ctx.draw_seed(8, &mut rng).unwrap();
            assert_eq!(seed.len(), 8);
            assert!(ctx.corpus.chars().windows(8).any(|w| w == seed));
        }
    }

    #[test]
    fn test_run_reports_requested_pairs() {
        let config = tiny_config();
        let ctx = tiny_context(&config);
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        let mut out = Vec::new();

        let report = run(&ctx, &config, &mut rng, &mut out).unwrap();

        assert_eq!(report.epochs.len(), 3);
        assert_eq!(report.samples.len(), 4);
        for sample in &report.samples {
            assert_eq!(sample.text.chars().count(), 20);
            assert_eq!(sample.seed.chars().count(), 8);
        }
        let epochs: Vec<usize> = report.samples.iter().map(|s| s.epoch).collect();
        assert_eq!(epochs, vec![1, 1, 3, 3]);
        // one seed per reporting epoch, shared by its temperatures
        assert_eq!(report.samples[0].seed, report.samples[1].seed);

        let printed = String::from_utf8(out).unwrap();
        for sample in &report.samples {
            assert!(printed.contains(&format!("{}{}", sample.seed, sample.text)));
        }
    }

    #[test]
    fn test_run_is_reproducible() {
        let config = tiny_config();
        let ctx = tiny_context(&config);

        let mut first = Vec::new();
        let a = run(&ctx, &config, &mut ChaCha8Rng::seed_from_u64(7), &mut first).unwrap();
        let mut second = Vec::new();
        let b = run(&ctx, &config, &mut ChaCha8Rng::seed_from_u64(7), &mut second).unwrap();

        assert_eq!(first, second);
        assert_eq!(a.samples, b.samples);
    }

    #[test]
    fn test_run_without_reports() {
        let config = Config {
            report_epochs: vec![],
            epochs: 1,
            ..tiny_config()
        };
        let ctx = tiny_context(&config);
        let mut out = Vec::new();
        let report = run(&ctx, &config, &mut ChaCha8Rng::seed_from_u64(0), &mut out).unwrap();
        assert!(report.samples.is_empty());
        assert!(out.is_empty());
        assert_eq!(report.last_epoch().map(|m| m.epoch), Some(1));
    }
}
