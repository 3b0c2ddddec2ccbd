// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores model weights using Burn's CompactRecorder.
//
// Directory layout:
//   checkpoints/
//     model_epoch_1.mpk.gz   ← weights after epoch 1
//     model_epoch_2.mpk.gz
//     ...
//     latest_epoch.json      ← number of the latest epoch
//     train_config.json      ← TrainConfig, including num_classes
//
// The config is needed to rebuild the same architecture before
// the record is loaded into it. A tied head stores no weights of
// its own, so the record of a tied model only carries the
// encoder's table.

use anyhow::{Context, Result};
use std::{fs, path::PathBuf};
use burn::{
    prelude::*,
    record::{CompactRecorder, Recorder},
};

use crate::application::train_use_case::TrainConfig;
use crate::ml::model::PremaskMlmModel;

pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Creates the directory if it doesn't already exist.
    pub fn new(dir: impl Into<String>) -> Result<Self> {
        let dir = PathBuf::from(dir.into());
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create checkpoint dir '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    /// Write `{dir}/model_epoch_{epoch}.mpk.gz` and point
    /// latest_epoch.json at it.
    pub fn save_model<B: Backend>(
        &self,
        model: &PremaskMlmModel<B>,
        epoch: usize,
    ) -> Result<()> {
        let path = self.dir.join(format!("model_epoch_{epoch}"));

        CompactRecorder::new()
            .record(model.clone().into_record(), path.clone())
            .with_context(|| {
                format!("Failed to save checkpoint to '{}'", path.display())
            })?;

        let latest_path = self.dir.join("latest_epoch.json");
        fs::write(&latest_path, serde_json::to_string(&epoch)?)
            .with_context(|| "Failed to write latest_epoch.json")?;

        tracing::debug!("Saved checkpoint: epoch {}", epoch);
        Ok(())
    }

    /// Load the latest saved weights into `model`, which must have
    /// the architecture the checkpoint was written with.
    pub fn load_model<B: Backend>(
        &self,
        model:  PremaskMlmModel<B>,
        device: &B::Device,
    ) -> Result<PremaskMlmModel<B>> {
        let epoch = self.latest_epoch()?;
        let path  = self.dir.join(format!("model_epoch_{epoch}"));

        tracing::info!("Loading checkpoint from epoch {}", epoch);

        let record = CompactRecorder::new()
            .load(path.clone(), device)
            .with_context(|| {
                format!("Cannot load checkpoint '{}'. Have you trained the model first?",
                    path.display())
            })?;

        Ok(model.load_record(record))
    }

    pub fn save_config(&self, cfg: &TrainConfig) -> Result<()> {
        let path = self.dir.join("train_config.json");
        let json = serde_json::to_string_pretty(cfg)?;

        fs::write(&path, json)
            .with_context(|| {
                format!("Cannot write config to '{}'", path.display())
            })?;

        tracing::debug!("Saved training config to '{}'", path.display());
        Ok(())
    }

    pub fn load_config(&self) -> Result<TrainConfig> {
        let path = self.dir.join("train_config.json");

        let json = fs::read_to_string(&path)
            .with_context(|| {
                format!(
                    "Cannot read config from '{}'. \
                     Make sure you have run 'train' before 'predict'.",
                    path.display()
                )
            })?;

        serde_json::from_str(&json)
            .with_context(|| format!("Malformed config in '{}'", path.display()))
    }

    pub fn latest_epoch(&self) -> Result<usize> {
        let path = self.dir.join("latest_epoch.json");

        let s = fs::read_to_string(&path)
            .with_context(|| {
                "Cannot find 'latest_epoch.json'. \
                 Have you run 'train' first?"
            })?;

        Ok(serde_json::from_str::<usize>(&s)?)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::encoder::TextEncoderConfig;
    use crate::ml::model::PremaskMlmConfig;
    use burn::backend::NdArray;

    type TB = NdArray<f32>;

    fn manager() -> (tempfile::TempDir, CheckpointManager) {
        let dir = tempfile::tempdir().unwrap();
        let mgr = CheckpointManager::new(dir.path().to_string_lossy()).unwrap();
        (dir, mgr)
    }

    #[test]
    fn test_config_round_trip() {
        let (_dir, mgr) = manager();
        let cfg = TrainConfig { num_classes: 321, problem: "wiki".to_string(), ..TrainConfig::default() };
        mgr.save_config(&cfg).unwrap();

        let back = mgr.load_config().unwrap();
        assert_eq!(back.num_classes, 321);
        assert_eq!(back.problem, "wiki");
    }

    #[test]
    fn test_missing_checkpoint_is_an_error() {
        let (_dir, mgr) = manager();
        assert!(mgr.latest_epoch().is_err());
        assert!(mgr.load_config().is_err());
    }

    #[test]
    fn test_model_save_and_load() {
        let (dir, mgr) = manager();
        let device     = Default::default();
        let cfg = PremaskMlmConfig::new(
            TextEncoderConfig::new(20, 4, 8, 8, 2, 1, 16, 0.0),
            "mlm".to_string(),
        );

        let model = cfg.init::<TB>(&device);
        mgr.save_model(&model, 3).unwrap();
        assert_eq!(mgr.latest_epoch().unwrap(), 3);
        assert!(dir.path().join("model_epoch_3.mpk.gz").exists());

        let loaded = mgr.load_model(cfg.init::<TB>(&device), &device).unwrap();
        assert!(loaded.head.share_embedding());
        assert_eq!(loaded.encoder.token_embedding.weight.val().dims(), [20, 8]);
    }
}
