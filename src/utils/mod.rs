//! Math utilities and activation functions.

use ndarray::{Array2, ArrayView1, Axis};

/// Logistic sigmoid.
#[inline]
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Derivative of sigmoid expressed through its output `s = sigmoid(x)`.
#[inline]
pub fn d_sigmoid_from_output(s: f32) -> f32 {
    s * (1.0 - s)
}

/// Derivative of tanh expressed through its output `t = tanh(x)`.
#[inline]
pub fn d_tanh_from_output(t: f32) -> f32 {
    1.0 - t * t
}

/// Row-wise softmax of a `(rows, classes)` matrix.
///
/// The row max is subtracted first so large logits do not overflow.
#[must_use]
pub fn softmax_rows(logits: &Array2<f32>) -> Array2<f32> {
    let mut out = logits.clone();
    for mut row in out.axis_iter_mut(Axis(0)) {
        let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row.mapv_inplace(|v| v / sum);
    }
    out
}

/// Index of the largest value; ties resolve to the lowest index.
#[must_use]
pub fn argmax(values: ArrayView1<'_, f32>) -> usize {
    let mut best = 0;
    let mut best_val = f32::NEG_INFINITY;
    for (i, &v) in values.iter().enumerate() {
        if v > best_val {
            best_val = v;
            best = i;
        }
    }
    best
}
