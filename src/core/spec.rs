//! Explicit description of the network's layer stack.
//!
//! A [`ModelSpec`] is a plain record handed to [`super::CharRnn::new`]; the
//! network is built from it and nothing else.

use serde::{Deserialize, Serialize};

use crate::error::{CharRnnError, Result};

/// Kind of layer in the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayerKind {
    /// Long short-term memory layer consuming the whole window; emits its
    /// final hidden state.
    Lstm,
    /// Fully connected layer.
    Dense,
}

/// Output nonlinearity of a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivationKind {
    Tanh,
    Softmax,
}

/// One layer of the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerSpec {
    pub kind: LayerKind,
    pub width: usize,
    pub activation: ActivationKind,
}

impl LayerSpec {
    #[must_use]
    pub fn lstm(width: usize) -> Self {
        Self {
            kind: LayerKind::Lstm,
            width,
            activation: ActivationKind::Tanh,
        }
    }

    #[must_use]
    pub fn dense_softmax(width: usize) -> Self {
        Self {
            kind: LayerKind::Dense,
            width,
            activation: ActivationKind::Softmax,
        }
    }
}

/// Gradient step rule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum OptimizerKind {
    /// Plain gradient descent.
    Sgd,
    /// Running average of squared gradients scales each step.
    RmsProp { rho: f32, epsilon: f32 },
}

impl Default for OptimizerKind {
    fn default() -> Self {
        Self::RmsProp {
            rho: 0.9,
            epsilon: 1e-7,
        }
    }
}

/// Complete network configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Sequence length of every input window.
    pub window_size: usize,
    /// One-hot width of every input row and of the output distribution.
    pub vocab_size: usize,
    pub layers: Vec<LayerSpec>,
    pub learning_rate: f32,
    pub optimizer: OptimizerKind,
}

impl ModelSpec {
    /// One LSTM layer of `hidden_units` followed by a softmax over the vocabulary.
    #[must_use]
    pub fn char_rnn(
        window_size: usize,
        vocab_size: usize,
        hidden_units: usize,
        learning_rate: f32,
    ) -> Self {
        Self {
            window_size,
            vocab_size,
            layers: vec![
                LayerSpec::lstm(hidden_units),
                LayerSpec::dense_softmax(vocab_size),
            ],
            learning_rate,
            optimizer: OptimizerKind::default(),
        }
    }

    /// Check the stack is one recurrent layer feeding one softmax classifier
    /// over the vocabulary, and return the recurrent width.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` describing the first violated constraint.
    pub fn validate(&self) -> Result<usize> {
        let invalid = |msg: String| Err(CharRnnError::InvalidConfig(msg));

        if self.window_size == 0 {
            return invalid("window_size must be > 0".into());
        }
        if self.vocab_size == 0 {
            return invalid("vocab_size must be > 0".into());
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return invalid(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            ));
        }
        if let OptimizerKind::RmsProp { rho, epsilon } = self.optimizer {
            if !(0.0..1.0).contains(&rho) || !(epsilon > 0.0) {
                return invalid(format!("bad RMSprop parameters rho={rho} epsilon={epsilon}"));
            }
        }

        let [recurrent, output] = self.layers.as_slice() else {
            return invalid(format!(
                "expected exactly 2 layers (recurrent, dense), got {}",
                self.layers.len()
            ));
        };

        if recurrent.kind != LayerKind::Lstm || recurrent.activation != ActivationKind::Tanh {
            return invalid(format!("first layer must be a tanh LSTM, got {recurrent:?}"));
        }
        if recurrent.width == 0 {
            return invalid("recurrent width must be > 0".into());
        }
        if output.kind != LayerKind::Dense || output.activation != ActivationKind::Softmax {
            return invalid(format!("last layer must be a softmax dense layer, got {output:?}"));
        }
        if output.width != self.vocab_size {
            return invalid(format!(
                "output width {} does not match vocabulary size {}",
                output.width, self.vocab_size
            ));
        }

        Ok(recurrent.width)
    }
}
