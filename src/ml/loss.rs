// ============================================================
// Layer 5 — Masked LM Loss Helpers
// ============================================================
// Tensor helpers shared by the masked LM head:
//
//   gather_indexes   — pick hidden vectors at masked positions
//   pad_to_length    — right-pad / truncate labels along axis 1
//   masked_sparse_cross_entropy
//                    — weighted mean CE, None when no position
//                      carries a weight
//   finite_loss      — drop a NaN / infinite reduced loss
//   LossRegistry     — collects named losses for one step
//
// A NaN loss is never masked in place: mask_fill keeps the
// autodiff graph, and backward() would still write NaN into the
// gradients. Degenerate batches register a graph-free 0 and are
// flagged so the trainer skips the optimiser step.

use burn::{prelude::*, tensor::activation};

/// Gather vectors from `sequence` [batch, seq_len, width] at
/// `positions` [batch, n].
///
/// Positions are relative to their own row. They are shifted
/// into the flattened [batch * seq_len] index space before the
/// select, so the result [batch * n, width] is ordered
/// batch-major and reshapes back to [batch, n, width].
pub fn gather_indexes<B: Backend>(
    sequence:  Tensor<B, 3>,
    positions: Tensor<B, 2, Int>,
) -> Tensor<B, 2> {
    let [batch, seq_len, width] = sequence.dims();
    let [_, n] = positions.dims();

    let offsets = Tensor::<B, 1, Int>::arange(0..batch as i64, &positions.device())
        .mul_scalar(seq_len as i64)
        .reshape([batch, 1])
        .expand([batch, n]);
    let flat_positions = (positions + offsets).reshape([batch * n]);

    sequence
        .reshape([batch * seq_len, width])
        .select(0, flat_positions)
}

/// Right-pad with zeros or truncate `tensor` along axis 1 so it
/// has exactly `len` columns.
pub fn pad_to_length<B: Backend>(tensor: Tensor<B, 2, Int>, len: usize) -> Tensor<B, 2, Int> {
    let [batch, current] = tensor.dims();

    if current == len {
        tensor
    } else if current > len {
        tensor.slice([0..batch, 0..len])
    } else {
        let pad = Tensor::<B, 2, Int>::zeros([batch, len - current], &tensor.device());
        Tensor::cat(vec![tensor, pad], 1)
    }
}

/// Sparse categorical cross-entropy from logits, averaged over the
/// positions whose weight is non-zero.
///
/// `logits` [batch, n, vocab], `labels` and `weights` [batch, n].
/// Returns a one-element tensor, or `None` when the label tensor
/// is empty or every weight is zero.
pub fn masked_sparse_cross_entropy<B: Backend>(
    logits:  Tensor<B, 3>,
    labels:  Tensor<B, 2, Int>,
    weights: Tensor<B, 2, Int>,
) -> Option<Tensor<B, 1>> {
    let [batch, n, vocab] = logits.dims();

    if batch * n * vocab == 0 {
        return None;
    }

    let weights = weights.float();
    let total_weight: f64 = weights.clone().sum().into_scalar().elem::<f64>();
    if total_weight == 0.0 {
        return None;
    }

    let log_probs = activation::log_softmax(logits, 2);
    let nll = log_probs
        .gather(2, labels.reshape([batch, n, 1]))
        .reshape([batch, n])
        .neg();

    Some((nll * weights).sum().div_scalar(total_weight))
}

/// Keep a reduced loss only if its value is finite.
pub fn finite_loss<B: Backend>(loss: Tensor<B, 1>) -> Option<Tensor<B, 1>> {
    let value: f64 = loss.clone().into_scalar().elem::<f64>();
    value.is_finite().then_some(loss)
}

// ─── LossRegistry ─────────────────────────────────────────────────────────────
#[derive(Debug)]
struct LossEntry<B: Backend> {
    name:       String,
    loss:       Tensor<B, 1>,
    /// Constant zero with no graph behind it
    degenerate: bool,
}

/// Losses registered by task heads during one forward pass.
/// The trainer sums them into the step's total loss.
#[derive(Debug)]
pub struct LossRegistry<B: Backend> {
    entries: Vec<LossEntry<B>>,
}

impl<B: Backend> Default for LossRegistry<B> {
    fn default() -> Self {
        Self { entries: Vec::new() }
    }
}

impl<B: Backend> LossRegistry<B> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: impl Into<String>, loss: Tensor<B, 1>) {
        self.entries.push(LossEntry { name: name.into(), loss, degenerate: false });
    }

    /// Register a constant 0 for a task that had nothing to learn
    /// from in this batch (no weighted position, or a NaN loss).
    pub fn add_degenerate(&mut self, name: impl Into<String>, device: &B::Device) {
        self.entries.push(LossEntry {
            name:       name.into(),
            loss:       Tensor::zeros([1], device),
            degenerate: true,
        });
    }

    /// True if at least one registered loss carries a gradient.
    pub fn has_gradient(&self) -> bool {
        self.entries.iter().any(|e| !e.degenerate)
    }

    /// Sum of all registered losses; `None` when nothing was registered.
    pub fn total(&self) -> Option<Tensor<B, 1>> {
        self.entries
            .iter()
            .map(|e| e.loss.clone())
            .reduce(|acc, loss| acc + loss)
    }

    /// Per-task scalar values, for logging.
    pub fn scalars(&self) -> Vec<(String, f64)> {
        self.entries
            .iter()
            .map(|e| (e.name.clone(), e.loss.clone().into_scalar().elem::<f64>()))
            .collect()
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::TensorData;

    type TB = NdArray<f32>;

    fn ints(values: Vec<i64>, shape: [usize; 2]) -> Tensor<TB, 2, Int> {
        Tensor::from_data(TensorData::new(values, shape), &Default::default())
    }

    fn scalar(t: Tensor<TB, 1>) -> f32 {
        t.into_scalar().elem::<f32>()
    }

    #[test]
    fn test_gather_respects_example_boundaries() {
        // value at [b, t, 0] = 10 * b + t
        let values: Vec<f32> = (0..2)
            .flat_map(|b| (0..4).flat_map(move |t| [10.0 * b as f32 + t as f32, 0.0]))
            .collect();
        let seq = Tensor::<TB, 3>::from_data(TensorData::new(values, [2, 4, 2]), &Default::default());
        let positions = ints(vec![3, 0, 1, 2], [2, 2]);

        let out: Vec<f32> = gather_indexes(seq, positions)
            .reshape([2, 2, 2])
            .slice([0..2, 0..2, 0..1])
            .into_data()
            .to_vec()
            .unwrap();
        assert_eq!(out, vec![3.0, 0.0, 11.0, 12.0]);
    }

    #[test]
    fn test_pad_to_length_pads_and_truncates() {
        let labels = ints(vec![5, 6, 7, 8], [2, 2]);

        let padded: Vec<i64> = pad_to_length(labels.clone(), 3)
            .into_data().convert::<i64>().to_vec().unwrap();
        assert_eq!(padded, vec![5, 6, 0, 7, 8, 0]);

        let cut: Vec<i64> = pad_to_length(labels, 1)
            .into_data().convert::<i64>().to_vec().unwrap();
        assert_eq!(cut, vec![5, 7]);
    }

    #[test]
    fn test_all_zero_weights_give_no_loss() {
        let logits  = Tensor::<TB, 3>::random([2, 3, 5], burn::tensor::Distribution::Default, &Default::default());
        let labels  = ints(vec![1, 2, 3, 4, 0, 1], [2, 3]);
        let weights = ints(vec![0; 6], [2, 3]);
        assert!(masked_sparse_cross_entropy(logits, labels, weights).is_none());
    }

    #[test]
    fn test_empty_label_tensor_gives_no_loss() {
        let logits  = Tensor::<TB, 3>::zeros([2, 0, 5], &Default::default());
        let labels  = Tensor::<TB, 2, Int>::zeros([2, 0], &Default::default());
        let weights = Tensor::<TB, 2, Int>::zeros([2, 0], &Default::default());
        assert!(masked_sparse_cross_entropy(logits, labels, weights).is_none());
    }

    #[test]
    fn test_uniform_logits_give_log_vocab() {
        let logits  = Tensor::<TB, 3>::zeros([1, 2, 4], &Default::default());
        let labels  = ints(vec![1, 3], [1, 2]);
        let weights = ints(vec![1, 0], [1, 2]);
        let loss    = scalar(masked_sparse_cross_entropy(logits, labels, weights).unwrap());
        assert!((loss - 4f32.ln()).abs() < 1e-5);
    }

    #[test]
    fn test_weights_select_positions() {
        // Position 0 is confidently right, position 1 confidently wrong.
        let logits = Tensor::<TB, 3>::from_data(
            TensorData::new(vec![10.0f32, -10.0, -10.0, 10.0], [1, 2, 2]),
            &Default::default(),
        );
        let labels = ints(vec![0, 0], [1, 2]);

        let only_right = scalar(masked_sparse_cross_entropy(logits.clone(), labels.clone(), ints(vec![1, 0], [1, 2])).unwrap());
        let both       = scalar(masked_sparse_cross_entropy(logits, labels, ints(vec![1, 1], [1, 2])).unwrap());
        assert!(only_right < 1e-3);
        assert!(both > 5.0);
    }

    #[test]
    fn test_finite_loss_drops_nan_and_inf() {
        let loss = |v: f32| Tensor::<TB, 1>::from_data(TensorData::new(vec![v], [1]), &Default::default());
        assert!(finite_loss(loss(f32::NAN)).is_none());
        assert!(finite_loss(loss(f32::INFINITY)).is_none());
        assert_eq!(scalar(finite_loss(loss(1.5)).unwrap()), 1.5);
    }

    #[test]
    fn test_nan_logits_are_dropped() {
        let logits  = Tensor::<TB, 3>::from_data(
            TensorData::new(vec![f32::NAN; 4], [1, 2, 2]),
            &Default::default(),
        );
        let loss = masked_sparse_cross_entropy(logits, ints(vec![0, 1], [1, 2]), ints(vec![1, 1], [1, 2]))
            .unwrap();
        assert!(scalar(loss.clone()).is_nan());
        assert!(finite_loss(loss).is_none());
    }

    #[test]
    fn test_registry_sums_losses() {
        let device = Default::default();
        let mut registry = LossRegistry::<TB>::new();
        assert!(registry.total().is_none());

        registry.add("a", Tensor::from_data(TensorData::new(vec![1.0f32], [1]), &device));
        registry.add("b", Tensor::from_data(TensorData::new(vec![2.5f32], [1]), &device));

        assert_eq!(scalar(registry.total().unwrap()), 3.5);
        assert_eq!(
            registry.scalars(),
            vec![("a".to_string(), 1.0), ("b".to_string(), 2.5)],
        );
    }

    #[test]
    fn test_registry_tracks_degenerate_entries() {
        let device = Default::default();
        let mut registry = LossRegistry::<TB>::new();
        registry.add_degenerate("a", &device);
        assert_eq!(registry.scalars().len(), 1);
        assert!(!registry.has_gradient());
        assert_eq!(scalar(registry.total().unwrap()), 0.0);

        registry.add("b", Tensor::from_data(TensorData::new(vec![0.5f32], [1]), &device));
        assert!(registry.has_gradient());
        assert_eq!(scalar(registry.total().unwrap()), 0.5);
    }
}
