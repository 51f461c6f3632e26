//! Character-level text generator training binary.
//!
//! Loads a delimited file of statements, trains the LSTM for a fixed number
//! of epochs and prints generated text at several temperatures after each
//! reporting epoch. Generated text goes to stdout; progress goes to the log
//! (`RUST_LOG`, default `info`).

use anyhow::{bail, Context, Result};
use char_rnn::data::TextColumn;
use char_rnn::{run, Config, Corpus, CorpusOptions, RunContext, TextEncoding};
use clap::Parser;
use log::{debug, info};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "char-rnn-train",
    about = "Train a character-level LSTM on a corpus of statements and sample text"
)]
struct Args {
    /// Delimited file holding one statement per row
    #[arg(long, default_value = "data/statements.csv")]
    corpus: PathBuf,

    /// Header name of the text column
    #[arg(long, default_value = "text", conflicts_with = "column_index")]
    column: String,

    /// Zero-based index of the text column (instead of --column)
    #[arg(long)]
    column_index: Option<usize>,

    /// Field delimiter (single ASCII character)
    #[arg(long, default_value_t = ',')]
    delimiter: char,

    /// The file has no header row
    #[arg(long, default_value_t = false)]
    no_header: bool,

    /// File encoding: utf-8 or latin-1
    #[arg(long, default_value = "utf-8")]
    encoding: TextEncoding,

    /// Characters per input window
    #[arg(long, default_value_t = 60)]
    window_size: usize,

    /// Offset between consecutive windows
    #[arg(long, default_value_t = 3)]
    stride: usize,

    /// LSTM hidden units
    #[arg(long, default_value_t = 128)]
    hidden_units: usize,

    /// RMSprop learning rate
    #[arg(long, default_value_t = 0.01)]
    learning_rate: f32,

    /// Mini-batch size
    #[arg(long, default_value_t = 128)]
    batch_size: usize,

    /// Number of training epochs
    #[arg(long, default_value_t = 30)]
    epochs: usize,

    /// Epochs after which text is generated (comma separated)
    #[arg(long, value_delimiter = ',', default_values_t = [1, 5, 10, 20, 30])]
    report_epochs: Vec<usize>,

    /// Sampling temperatures (comma separated)
    #[arg(long, value_delimiter = ',', default_values_t = [0.2, 0.5, 1.0, 1.2])]
    temperatures: Vec<f32>,

    /// Characters generated per temperature
    #[arg(long, default_value_t = 150)]
    generate_length: usize,

    /// Random seed for initialisation, shuffling and sampling
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Write per-epoch metrics and all generated samples as JSON
    #[arg(long)]
    report: Option<PathBuf>,
}

impl Args {
    fn config(&self) -> Config {
        Config {
            window_size: self.window_size,
            stride: self.stride,
            hidden_units: self.hidden_units,
            learning_rate: self.learning_rate,
            batch_size: self.batch_size,
            epochs: self.epochs,
            report_epochs: self.report_epochs.clone(),
            temperatures: self.temperatures.clone(),
            generate_length: self.generate_length,
            seed: self.seed,
        }
    }

    fn corpus_options(&self) -> Result<CorpusOptions> {
        if !self.delimiter.is_ascii() {
            bail!("delimiter must be a single ASCII character, got {:?}", self.delimiter);
        }
        let column = match self.column_index {
            Some(i) => TextColumn::Index(i),
            None => TextColumn::Name(self.column.clone()),
        };
        Ok(CorpusOptions {
            delimiter: self.delimiter as u8,
            has_headers: !self.no_header,
            column,
            encoding: self.encoding,
        })
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = args.config();
    config.validate().context("invalid configuration")?;
    debug!("Config: {}", serde_json::to_string(&config)?);

    let corpus = Corpus::load(&args.corpus, &args.corpus_options()?)
        .with_context(|| format!("failed to load corpus {}", args.corpus.display()))?;
    let ctx = RunContext::build(corpus, &config).context("failed to encode corpus")?;

    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    let report = run(&ctx, &config, &mut rng, &mut out).context("training run failed")?;
    out.flush()?;

    if let Some(last) = report.last_epoch() {
        info!(
            "Done: {} epochs, final loss={:.4} acc={:.2}%",
            last.epoch,
            last.avg_loss,
            last.accuracy * 100.0
        );
    }

    if let Some(path) = &args.report {
        let file = File::create(path)
            .with_context(|| format!("failed to create report {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &report)?;
        writer.flush()?;
        info!("Report written to {}", path.display());
    }

    Ok(())
}
