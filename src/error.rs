//! Error types shared by every stage of the pipeline.

use thiserror::Error;

/// Errors raised while loading, encoding, training or sampling.
///
/// Every variant is fatal to a run; callers propagate rather than recover.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum CharRnnError {
    /// Corpus file could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Delimited file is malformed.
    #[error("malformed corpus file: {0}")]
    Csv(#[from] csv::Error),

    /// Corpus content is unusable (missing column, empty, bad encoding).
    #[error("corpus error: {0}")]
    Corpus(String),

    /// Corpus has no room for a single (window, target) pair.
    #[error("corpus has {len} characters, need more than the window size {window}")]
    CorpusTooShort { len: usize, window: usize },

    /// Character absent from the fitted vocabulary.
    #[error("character {0:?} is not in the vocabulary")]
    UnknownCharacter(char),

    /// Probability vector cannot be sampled from.
    #[error("degenerate distribution: {0}")]
    DegenerateDistribution(String),

    /// Tensor shapes disagree with the model or dataset layout.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Invalid model or run configuration.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, CharRnnError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = CharRnnError::UnknownCharacter('é');
        assert_eq!(err.to_string(), "character 'é' is not in the vocabulary");

        let err = CharRnnError::CorpusTooShort { len: 5, window: 60 };
        assert!(err.to_string().contains("60"));
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: CharRnnError = io.into();
        assert!(matches!(err, CharRnnError::Io(_)));
    }
}
