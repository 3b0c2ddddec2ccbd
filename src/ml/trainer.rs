// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Train + validation loop using Burn's DataLoader and Adam.
//
//   - Training runs on MyBackend (Autodiff<Wgpu>)
//   - model.valid() drops autodiff for validation
//   - The step loss is the sum of everything the heads
//     registered in the LossRegistry
//   - A batch where every head registered a degenerate 0 (no
//     weighted position, or a NaN loss) is not back-propagated
//     and the optimiser does not step; it is counted instead

use anyhow::{Context, Result};
use burn::{
    data::dataloader::DataLoaderBuilder,
    module::AutodiffModule,
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
};

use crate::application::train_use_case::TrainConfig;
use crate::data::{batcher::{MlmBatch, MlmBatcher}, dataset::MlmDataset};
use crate::domain::mode::Mode;
use crate::infra::checkpoint::CheckpointManager;
use crate::infra::metrics::{EpochMetrics, MetricsLogger};
use crate::ml::loss::{pad_to_length, LossRegistry};
use crate::ml::model::{PremaskMlmConfig, PremaskMlmModel};

type MyBackend      = burn::backend::Autodiff<burn::backend::Wgpu>;
type MyInnerBackend = burn::backend::Wgpu;

pub fn run_training(
    cfg:           &TrainConfig,
    train_dataset: MlmDataset,
    val_dataset:   MlmDataset,
    ckpt_manager:  CheckpointManager,
) -> Result<()> {
    let device = burn::backend::wgpu::WgpuDevice::default();
    tracing::info!("Using WGPU device: {:?}", device);
    train_loop(cfg, train_dataset, val_dataset, ckpt_manager, device)
}

/// Summed step loss, and whether any part of it carries a gradient.
fn step_loss<B: Backend>(losses: &LossRegistry<B>) -> Result<(Tensor<B, 1>, bool)> {
    let loss = losses.total().context("No task registered a loss")?;
    Ok((loss, losses.has_gradient()))
}

/// Weighted count of masked slots whose argmax matches the label.
/// Returns (correct, total).
pub fn masked_accuracy<B: Backend>(probs: Tensor<B, 3>, batch: &MlmBatch<B>) -> (i64, i64) {
    let [batch_size, len, _] = probs.dims();
    let labels  = pad_to_length(batch.targets.ids.clone(), len);
    let weights = pad_to_length(batch.targets.weights.clone(), len);

    let predicted = probs.argmax(2).reshape([batch_size, len]);
    let correct: i64 = predicted
        .equal(labels)
        .int()
        .mul(weights.clone())
        .sum()
        .into_scalar()
        .elem::<i64>();
    let total: i64 = weights.sum().into_scalar().elem::<i64>();
    (correct, total)
}

fn train_loop(
    cfg:           &TrainConfig,
    train_dataset: MlmDataset,
    val_dataset:   MlmDataset,
    ckpt_manager:  CheckpointManager,
    device:        burn::backend::wgpu::WgpuDevice,
) -> Result<()> {
    let model_cfg = PremaskMlmConfig::from_train_config(cfg);
    let mut model: PremaskMlmModel<MyBackend> = model_cfg.init(&device);
    tracing::info!(
        "Model ready: {} layers, d_model={}, embedding={}, vocab={}, tied output={}",
        cfg.num_layers,
        cfg.d_model,
        model.encoder.embedding_size(),
        model.head.vocab_size(),
        model.head.share_embedding(),
    );

    let optim_cfg = AdamConfig::new().with_epsilon(1e-8);
    let mut optim = optim_cfg.init();

    let train_batcher = MlmBatcher::<MyBackend>::new(device.clone());
    let train_loader  = DataLoaderBuilder::new(train_batcher)
        .batch_size(cfg.batch_size)
        .shuffle(cfg.seed)
        .num_workers(1)
        .build(train_dataset);

    let val_batcher = MlmBatcher::<MyInnerBackend>::new(device.clone());
    let val_loader  = DataLoaderBuilder::new(val_batcher)
        .batch_size(cfg.batch_size)
        .num_workers(1)
        .build(val_dataset);

    let metrics = MetricsLogger::new(&cfg.checkpoint_dir)?;
    tracing::info!("Writing epoch metrics to {}", metrics.csv_path().display());
    let mut best_val_loss = f64::INFINITY;

    for epoch in 1..=cfg.epochs {

        // ── Training phase ────────────────────────────────────────────────────
        let mut train_loss_sum = 0.0f64;
        let mut train_batches  = 0usize;
        let mut degenerate     = 0usize;

        for batch in train_loader.iter() {
            let mut losses = LossRegistry::new();
            model.forward_batch(&batch, Mode::Train, &mut losses)?;
            let (loss, trainable) = step_loss(&losses)?;

            let loss_val: f64 = loss.clone().into_scalar().elem::<f64>();
            train_loss_sum += loss_val;
            train_batches  += 1;
            tracing::trace!("Step losses: {:?}", losses.scalars());

            // nothing to back-propagate; Adam must not step either
            if !trainable {
                degenerate += 1;
                continue;
            }

            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &model);
            model = optim.step(cfg.lr, model, grads);
        }

        let avg_train_loss = if train_batches > 0 {
            train_loss_sum / train_batches as f64
        } else { f64::NAN };

        if degenerate > 0 {
            tracing::debug!("Epoch {}: {} batches had nothing to learn from", epoch, degenerate);
        }

        // ── Validation phase ──────────────────────────────────────────────────
        let model_valid = model.valid();

        let mut val_loss_sum = 0.0f64;
        let mut val_batches  = 0usize;
        let mut correct      = 0i64;
        let mut total        = 0i64;

        for batch in val_loader.iter() {
            let mut losses = LossRegistry::new();
            let probs = model_valid.forward_batch(&batch, Mode::Eval, &mut losses)?;

            if let Some(loss) = losses.total() {
                val_loss_sum += loss.into_scalar().elem::<f64>();
                val_batches  += 1;
            }

            let (c, t) = masked_accuracy(probs, &batch);
            correct += c;
            total   += t;
        }

        let avg_val_loss = if val_batches > 0 { val_loss_sum / val_batches as f64 } else { f64::NAN };
        let masked_acc   = if total > 0 { correct as f64 / total as f64 } else { 0.0 };

        println!(
            "Epoch {:>3}/{} | train_loss={:.4} | val_loss={:.4} | masked_acc={:.1}%",
            epoch, cfg.epochs, avg_train_loss, avg_val_loss, masked_acc * 100.0,
        );

        let row = EpochMetrics::new(epoch, avg_train_loss, avg_val_loss, masked_acc, degenerate);
        if row.is_improvement(best_val_loss) {
            best_val_loss = row.val_loss;
            tracing::info!("Validation loss improved to {:.4}", best_val_loss);
        }
        metrics.log(&row)?;
        ckpt_manager.save_model(&model, epoch)?;
        tracing::info!("Checkpoint saved for epoch {}", epoch);
    }

    tracing::info!("Training complete!");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::head::MaskedLmTargets;
    use burn::backend::{Autodiff, NdArray};
    use burn::tensor::TensorData;

    type TB = NdArray<f32>;

    fn ints(values: Vec<i64>, shape: [usize; 2]) -> Tensor<TB, 2, Int> {
        Tensor::from_data(TensorData::new(values, shape), &Default::default())
    }

    fn batch(ids: Vec<i64>, weights: Vec<i64>) -> MlmBatch<TB> {
        MlmBatch {
            input_ids:      ints(vec![0, 0], [1, 2]),
            attention_mask: ints(vec![1, 1], [1, 2]),
            targets: MaskedLmTargets {
                positions: ints(vec![0, 0], [1, 2]),
                ids:       ints(ids, [1, 2]),
                weights:   ints(weights, [1, 2]),
            },
        }
    }

    #[test]
    fn test_masked_accuracy_ignores_zero_weights() {
        // argmax is 1 at slot 0 and 0 at slot 1
        let probs = Tensor::<TB, 3>::from_data(
            TensorData::new(vec![0.1f32, 0.9, 0.8, 0.2], [1, 2, 2]),
            &Default::default(),
        );

        assert_eq!(masked_accuracy(probs.clone(), &batch(vec![1, 1], vec![1, 0])), (1, 1));
        assert_eq!(masked_accuracy(probs, &batch(vec![1, 1], vec![1, 1])), (1, 2));
    }

    #[test]
    fn test_step_loss_skips_degenerate_batches() {
        type AB = Autodiff<TB>;
        let device = Default::default();

        let empty = LossRegistry::<AB>::new();
        assert!(step_loss(&empty).is_err());

        let mut losses = LossRegistry::<AB>::new();
        losses.add_degenerate("mlm", &device);
        let (loss, trainable) = step_loss(&losses).unwrap();
        assert!(!trainable);
        assert_eq!(loss.into_scalar().elem::<f32>(), 0.0);

        let weight = Tensor::<AB, 1>::from_data(TensorData::new(vec![2.0f32], [1]), &device)
            .require_grad();
        losses.add("other", weight.clone().mul_scalar(3.0));
        let (loss, trainable) = step_loss(&losses).unwrap();
        assert!(trainable);

        let grads = loss.backward();
        let grad: Vec<f32> = weight.grad(&grads).unwrap().into_data().to_vec().unwrap();
        assert_eq!(grad, vec![3.0]);
    }
}
