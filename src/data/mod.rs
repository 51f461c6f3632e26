//! Corpus loading, vocabulary management and dataset encoding.
//!
//! ## Submodules
//!
//! - [`corpus`] — Delimited-file reader producing the lowercase corpus
//! - [`vocab`] — Character vocabulary and one-hot encoding
//! - [`samples`] — Sliding windows and the encoded training set

pub mod corpus;
pub mod samples;
pub mod vocab;

pub use corpus::{Corpus, CorpusOptions, TextColumn, TextEncoding};
pub use samples::{
    count_windows, gather_batch, text_to_samples, window_offsets, windows, EncodedDataset,
    SampleConfig,
};
pub use vocab::Vocabulary;
