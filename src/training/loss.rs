//! Class-weighted cross-entropy

use burn::tensor::{activation::log_softmax, backend::Backend, Int, Tensor};

/// Weighted cross-entropy with weighted-mean reduction
///
/// `sum_i(w[y_i] * -log p_i[y_i]) / sum_i(w[y_i])`
///
/// * `logits` - `[batch, num_classes]`
/// * `targets` - `[batch]` class indices
/// * `class_weights` - `[num_classes]`
pub fn weighted_cross_entropy<B: Backend>(
    logits: Tensor<B, 2>,
    targets: Tensor<B, 1, Int>,
    class_weights: Tensor<B, 1>,
) -> Tensor<B, 1> {
    let [batch_size, _] = logits.dims();

    let log_probs = log_softmax(logits, 1);
    let nll = log_probs
        .gather(1, targets.clone().reshape([batch_size, 1]))
        .reshape([batch_size])
        .neg();

    let sample_weights = class_weights.select(0, targets);
    (nll * sample_weights.clone()).sum() / sample_weights.sum()
}
