//! Recurrent next-character classifier.
//!
//! One LSTM layer reads a one-hot window and hands its final hidden state to
//! a dense softmax layer over the vocabulary:
//!
//! ```text
//! z_t = x_t W_x + h_{t-1} W_h + b          (gates i, f, g, o stacked)
//! c_t = σ(f) ⊙ c_{t-1} + σ(i) ⊙ tanh(g)
//! h_t = σ(o) ⊙ tanh(c_t)
//! p   = softmax(h_T W_out + b_out)
//! ```
//!
//! Training minimises batch-mean categorical cross-entropy with
//! backpropagation through time and one optimizer step per mini-batch.

mod spec;

pub use spec::{ActivationKind, LayerKind, LayerSpec, ModelSpec, OptimizerKind};

use log::debug;
use ndarray::{s, Array1, Array2, ArrayView2, ArrayView3, Axis, Zip};
use ndarray_rand::RandomExt;
use rand::distributions::Uniform;
use rand::seq::SliceRandom;
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::data::samples::{gather_batch, EncodedDataset};
use crate::error::{CharRnnError, Result};
use crate::utils::{argmax, d_sigmoid_from_output, d_tanh_from_output, sigmoid, softmax_rows};

/// Probabilities are clipped to this floor inside the log of the loss.
const LOSS_EPSILON: f32 = 1e-7;

/// Samples per parallel chunk in [`CharRnn::evaluate`].
const EVAL_CHUNK: usize = 256;

/// Loss and accuracy over one pass of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitMetrics {
    /// Mean categorical cross-entropy per sample.
    pub avg_loss: f32,
    /// Fraction of samples whose argmax prediction equals the target.
    pub accuracy: f32,
    pub num_samples: usize,
}

/// Trainable tensors. Gradients and optimizer moments share the layout.
#[derive(Debug, Clone)]
struct Params {
    /// Input-to-gates weights, shape `(vocab, 4 * hidden)`
    w_x: Array2<f32>,
    /// Hidden-to-gates weights, shape `(hidden, 4 * hidden)`
    w_h: Array2<f32>,
    /// Gate biases, shape `(4 * hidden)`
    b: Array1<f32>,
    /// Dense weights, shape `(hidden, vocab)`
    w_out: Array2<f32>,
    /// Dense bias, shape `(vocab)`
    b_out: Array1<f32>,
}

impl Params {
    fn zeros_like(other: &Self) -> Self {
        Self {
            w_x: Array2::zeros(other.w_x.raw_dim()),
            w_h: Array2::zeros(other.w_h.raw_dim()),
            b: Array1::zeros(other.b.raw_dim()),
            w_out: Array2::zeros(other.w_out.raw_dim()),
            b_out: Array1::zeros(other.b_out.raw_dim()),
        }
    }

    fn len(&self) -> usize {
        self.w_x.len() + self.w_h.len() + self.b.len() + self.w_out.len() + self.b_out.len()
    }

    /// Apply `update(param, grad, moment)` elementwise over every tensor.
    fn update<F>(&mut self, grads: &Self, moments: &mut Self, update: F)
    where
        F: Fn(&mut f32, f32, &mut f32) + Copy,
    {
        Zip::from(&mut self.w_x)
            .and(&grads.w_x)
            .and(&mut moments.w_x)
            .for_each(|p, &g, m| update(p, g, m));
        Zip::from(&mut self.w_h)
            .and(&grads.w_h)
            .and(&mut moments.w_h)
            .for_each(|p, &g, m| update(p, g, m));
        Zip::from(&mut self.b)
            .and(&grads.b)
            .and(&mut moments.b)
            .for_each(|p, &g, m| update(p, g, m));
        Zip::from(&mut self.w_out)
            .and(&grads.w_out)
            .and(&mut moments.w_out)
            .for_each(|p, &g, m| update(p, g, m));
        Zip::from(&mut self.b_out)
            .and(&grads.b_out)
            .and(&mut moments.b_out)
            .for_each(|p, &g, m| update(p, g, m));
    }
}

/// Gate activations of one timestep, each `(batch, hidden)`.
#[derive(Debug, Clone)]
struct StepCache {
    i: Array2<f32>,
    f: Array2<f32>,
    g: Array2<f32>,
    o: Array2<f32>,
    tanh_c: Array2<f32>,
}

/// Everything backward needs from a forward pass.
#[derive(Debug, Clone)]
struct ForwardCache {
    steps: Vec<StepCache>,
    /// h_0..h_T
    hiddens: Vec<Array2<f32>>,
    /// c_0..c_T
    cells: Vec<Array2<f32>>,
    probs: Array2<f32>,
}

/// LSTM + softmax character model.
pub struct CharRnn {
    spec: ModelSpec,
    hidden: usize,
    params: Params,
    /// Squared-gradient running averages (RMSprop); unused by SGD.
    moments: Params,
}

impl std::fmt::Debug for CharRnn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CharRnn")
            .field("window_size", &self.spec.window_size)
            .field("vocab_size", &self.spec.vocab_size)
            .field("hidden", &self.hidden)
            .field("optimizer", &self.spec.optimizer)
            .field("params", &format!("<{} parameters>", self.params.len()))
            .finish()
    }
}

impl CharRnn {
    /// Build a network from its spec.
    ///
    /// Weights use Xavier/Glorot uniform initialisation
    /// `U(-limit, limit)` with `limit = sqrt(6 / (fan_in + fan_out))`.
    /// Biases start at zero except the forget gate, which starts at one so
    /// early training keeps the cell state.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the `ModelSpec` does not validate.
    pub fn new<R: Rng + ?Sized>(spec: &ModelSpec, rng: &mut R) -> Result<Self> {
        let hidden = spec.validate()?;
        let vocab = spec.vocab_size;
        let gates = 4 * hidden;

        let mut xavier = |fan_in: usize, fan_out: usize| -> Array2<f32> {
            let limit = (6.0f32 / (fan_in + fan_out) as f32).sqrt();
            Array2::random_using((fan_in, fan_out), Uniform::new(-limit, limit), rng)
        };

        let w_x = xavier(vocab, gates);
        let w_h = xavier(hidden, gates);
        let w_out = xavier(hidden, vocab);

        let mut b = Array1::zeros(gates);
        b.slice_mut(s![hidden..2 * hidden]).fill(1.0);

        let params = Params {
            w_x,
            w_h,
            b,
            w_out,
            b_out: Array1::zeros(vocab),
        };
        let moments = Params::zeros_like(&params);

        Ok(Self {
            spec: spec.clone(),
            hidden,
            params,
            moments,
        })
    }

    #[must_use]
    pub fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    #[must_use]
    pub fn hidden_units(&self) -> usize {
        self.hidden
    }

    /// Total number of trainable scalars.
    #[must_use]
    pub fn num_parameters(&self) -> usize {
        self.params.len()
    }

    /// Next-character distribution for one `(window_size, vocab_size)` window.
    ///
    /// # Errors
    ///
    /// Returns `ShapeMismatch` if the window has the wrong shape.
    pub fn predict(&self, window: ArrayView2<'_, f32>) -> Result<Array1<f32>> {
        let inputs = window.insert_axis(Axis(0));
        self.check_inputs(inputs)?;
        let probs = self.forward_probs(inputs);
        Ok(probs.row(0).to_owned())
    }

    /// Next-character distributions for `(n, window_size, vocab_size)` inputs.
    ///
    /// # Errors
    ///
    /// Returns `ShapeMismatch` if the inputs have the wrong shape.
    pub fn predict_batch(&self, inputs: ArrayView3<'_, f32>) -> Result<Array2<f32>> {
        self.check_inputs(inputs)?;
        Ok(self.forward_probs(inputs))
    }

    /// Run one pass over the whole dataset in shuffled mini-batches.
    ///
    /// The visiting order is drawn from `rng`; each mini-batch (the last one
    /// may be short) gets one forward pass, one BPTT backward pass and one
    /// optimizer step.
    ///
    /// # Errors
    ///
    /// - `InvalidConfig` for a zero batch size
    /// - `ShapeMismatch` if the dataset does not match the `ModelSpec`
    #[allow(clippy::cast_precision_loss)]
    pub fn fit_one_epoch<R: Rng + ?Sized>(
        &mut self,
        dataset: &EncodedDataset,
        batch_size: usize,
        rng: &mut R,
    ) -> Result<FitMetrics> {
        if batch_size == 0 {
            return Err(CharRnnError::InvalidConfig("batch_size must be > 0".into()));
        }
        self.check_dataset(dataset)?;

        let n = dataset.len();
        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(rng);

        let mut loss_sum = 0.0f32;
        let mut correct = 0usize;
        let mut batches = 0usize;

        for indices in order.chunks(batch_size) {
            let (inputs, targets) = gather_batch(dataset, indices)?;
            let cache = self.forward(inputs.view());
            let (batch_loss, batch_correct) = score(&cache.probs, targets.view());
            let grads = self.backward(inputs.view(), targets.view(), &cache);
            self.apply_gradients(&grads);

            loss_sum += batch_loss;
            correct += batch_correct;
            batches += 1;
        }

        debug!("fit_one_epoch: {n} samples in {batches} batches");

        Ok(FitMetrics {
            avg_loss: loss_sum / n as f32,
            accuracy: correct as f32 / n as f32,
            num_samples: n,
        })
    }

    /// Loss and accuracy of the current weights over a dataset.
    ///
    /// Chunks are scored in parallel and reduced in chunk order, so the
    /// result does not depend on the thread count.
    ///
    /// # Errors
    ///
    /// Returns `ShapeMismatch` if the dataset does not match the `ModelSpec`.
    #[allow(clippy::cast_precision_loss)]
    pub fn evaluate(&self, dataset: &EncodedDataset) -> Result<FitMetrics> {
        self.check_dataset(dataset)?;
        let n = dataset.len();

        let starts: Vec<usize> = (0..n).step_by(EVAL_CHUNK).collect();
        let partials: Vec<(f32, usize)> = starts
            .par_iter()
            .map(|&start| {
                let end = (start + EVAL_CHUNK).min(n);
                let inputs = dataset.inputs.slice(s![start..end, .., ..]);
                let targets = dataset.targets.slice(s![start..end, ..]);
                score(&self.forward_probs(inputs), targets)
            })
            .collect();

        let (loss_sum, correct) = partials
            .iter()
            .fold((0.0f32, 0usize), |(l, c), &(pl, pc)| (l + pl, c + pc));

        Ok(FitMetrics {
            avg_loss: loss_sum / n as f32,
            accuracy: correct as f32 / n as f32,
            num_samples: n,
        })
    }

    fn check_inputs(&self, inputs: ArrayView3<'_, f32>) -> Result<()> {
        let (_, steps, width) = inputs.dim();
        if steps != self.spec.window_size || width != self.spec.vocab_size {
            return Err(CharRnnError::ShapeMismatch(format!(
                "expected windows of ({}, {}), got ({steps}, {width})",
                self.spec.window_size, self.spec.vocab_size
            )));
        }
        Ok(())
    }

    fn check_dataset(&self, dataset: &EncodedDataset) -> Result<()> {
        self.check_inputs(dataset.inputs.view())?;
        let (rows, width) = dataset.targets.dim();
        if rows != dataset.inputs.dim().0 || width != self.spec.vocab_size {
            return Err(CharRnnError::ShapeMismatch(format!(
                "targets ({rows}, {width}) do not match {} inputs over {} classes",
                dataset.inputs.dim().0,
                self.spec.vocab_size
            )));
        }
        if rows == 0 {
            return Err(CharRnnError::ShapeMismatch("dataset is empty".into()));
        }
        Ok(())
    }

    /// One LSTM timestep: returns the gate cache, new cell and new hidden state.
    fn lstm_step(
        &self,
        x_t: ArrayView2<'_, f32>,
        h_prev: &Array2<f32>,
        c_prev: &Array2<f32>,
    ) -> (StepCache, Array2<f32>, Array2<f32>) {
        let h = self.hidden;
        let z = x_t.dot(&self.params.w_x) + h_prev.dot(&self.params.w_h) + &self.params.b;

        let i = z.slice(s![.., 0..h]).mapv(sigmoid);
        let f = z.slice(s![.., h..2 * h]).mapv(sigmoid);
        let g = z.slice(s![.., 2 * h..3 * h]).mapv(f32::tanh);
        let o = z.slice(s![.., 3 * h..]).mapv(sigmoid);

        let c = &f * c_prev + &i * &g;
        let tanh_c = c.mapv(f32::tanh);
        let h_new = &o * &tanh_c;

        (StepCache { i, f, g, o, tanh_c }, c, h_new)
    }

    fn forward(&self, inputs: ArrayView3<'_, f32>) -> ForwardCache {
        let (batch, steps, _) = inputs.dim();
        let mut hiddens = Vec::with_capacity(steps + 1);
        let mut cells = Vec::with_capacity(steps + 1);
        let mut cache = Vec::with_capacity(steps);

        hiddens.push(Array2::zeros((batch, self.hidden)));
        cells.push(Array2::zeros((batch, self.hidden)));

        for t in 0..steps {
            let (step, c, h) = self.lstm_step(inputs.index_axis(Axis(1), t), &hiddens[t], &cells[t]);
            cache.push(step);
            cells.push(c);
            hiddens.push(h);
        }

        let logits = hiddens[steps].dot(&self.params.w_out) + &self.params.b_out;
        ForwardCache {
            steps: cache,
            hiddens,
            cells,
            probs: softmax_rows(&logits),
        }
    }

    /// Forward pass that keeps only the running state.
    fn forward_probs(&self, inputs: ArrayView3<'_, f32>) -> Array2<f32> {
        let (batch, steps, _) = inputs.dim();
        let mut h = Array2::zeros((batch, self.hidden));
        let mut c = Array2::zeros((batch, self.hidden));
        for t in 0..steps {
            let (_, c_new, h_new) = self.lstm_step(inputs.index_axis(Axis(1), t), &h, &c);
            c = c_new;
            h = h_new;
        }
        softmax_rows(&(h.dot(&self.params.w_out) + &self.params.b_out))
    }

    /// Gradients of the batch-mean cross-entropy via backpropagation through time.
    #[allow(clippy::cast_precision_loss)]
    fn backward(
        &self,
        inputs: ArrayView3<'_, f32>,
        targets: ArrayView2<'_, f32>,
        cache: &ForwardCache,
    ) -> Params {
        let h = self.hidden;
        let (batch, steps, _) = inputs.dim();
        let mut grads = Params::zeros_like(&self.params);

        // softmax + cross-entropy: dL/dlogits = (p - y) / B
        let d_logits = (&cache.probs - &targets) / batch as f32;
        grads.w_out = cache.hiddens[steps].t().dot(&d_logits);
        grads.b_out = d_logits.sum_axis(Axis(0));

        let mut dh = d_logits.dot(&self.params.w_out.t());
        let mut dc = Array2::<f32>::zeros((batch, h));
        let mut dz = Array2::<f32>::zeros((batch, 4 * h));

        for t in (0..steps).rev() {
            let step = &cache.steps[t];
            let c_prev = &cache.cells[t];
            let h_prev = &cache.hiddens[t];

            dc += &(&dh * &step.o * &step.tanh_c.mapv(d_tanh_from_output));

            let d_i = &dc * &step.g * &step.i.mapv(d_sigmoid_from_output);
            let d_f = &dc * c_prev * &step.f.mapv(d_sigmoid_from_output);
            let d_g = &dc * &step.i * &step.g.mapv(d_tanh_from_output);
            let d_o = &dh * &step.tanh_c * &step.o.mapv(d_sigmoid_from_output);

            dz.slice_mut(s![.., 0..h]).assign(&d_i);
            dz.slice_mut(s![.., h..2 * h]).assign(&d_f);
            dz.slice_mut(s![.., 2 * h..3 * h]).assign(&d_g);
            dz.slice_mut(s![.., 3 * h..]).assign(&d_o);

            grads.w_x += &inputs.index_axis(Axis(1), t).t().dot(&dz);
            grads.w_h += &h_prev.t().dot(&dz);
            grads.b += &dz.sum_axis(Axis(0));

            dh = dz.dot(&self.params.w_h.t());
            dc = &dc * &step.f;
        }

        grads
    }

    fn apply_gradients(&mut self, grads: &Params) {
        let lr = self.spec.learning_rate;
        match self.spec.optimizer {
            OptimizerKind::Sgd => {
                self.params
                    .update(grads, &mut self.moments, move |p, g, _| *p -= lr * g);
            }
            OptimizerKind::RmsProp { rho, epsilon } => {
                self.params.update(grads, &mut self.moments, move |p, g, m| {
                    *m = rho * *m + (1.0 - rho) * g * g;
                    *p -= lr * g / (m.sqrt() + epsilon);
                });
            }
        }
    }
}

/// Summed cross-entropy and number of argmax hits over a batch.
fn score(probs: &Array2<f32>, targets: ArrayView2<'_, f32>) -> (f32, usize) {
    let mut loss = 0.0f32;
    let mut correct = 0usize;
    for (p, y) in probs.rows().into_iter().zip(targets.rows()) {
        let target = argmax(y);
        loss -= p[target].max(LOSS_EPSILON).ln();
        if argmax(p) == target {
            correct += 1;
        }
    }
    (loss, correct)
}
