// ============================================================
// Layer 2 — PrepareUseCase
// ============================================================
// Runs label synthesis once over a raw corpus and writes the
// result as JSONL, one FeatureRecord per example:
//
//   {"input_ids": [...], "attention_mask": [...],
//    "<problem>_masked_lm_positions": [...],
//    "<problem>_masked_lm_ids": [...],
//    "<problem>_masked_lm_weights": [...]}
//
// Non-text examples are written with no label keys. The
// tokenizer is built (or reused) in the checkpoint directory so
// a later `train --prepared` sees the same vocabulary.

use anyhow::{Context, Result};
use std::{
    fs,
    io::{BufWriter, Write},
    path::Path,
};

use crate::application::train_use_case::{corpus_texts, TrainConfig};
use crate::data::{dataset::SampleBuilder, loader::JsonlLoader};
use crate::domain::traits::ExampleSource;
use crate::infra::tokenizer_store::TokenizerStore;

pub struct PrepareUseCase {
    config:      TrainConfig,
    output_path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrepareSummary {
    pub records:   usize,
    /// Records that carry label keys
    pub labelled:  usize,
}

impl PrepareUseCase {
    pub fn new(config: TrainConfig, output_path: impl Into<String>) -> Self {
        Self { config, output_path: output_path.into() }
    }

    pub fn execute(&self) -> Result<PrepareSummary> {
        let cfg = &self.config;

        let examples  = JsonlLoader::new(&cfg.data_path).load_all()?;
        let tokenizer = TokenizerStore::new(&cfg.checkpoint_dir)
            .load_or_build(&corpus_texts(&examples), cfg.vocab_size)?;
        let builder = SampleBuilder::new(&tokenizer, cfg.max_seq_len, cfg.max_predictions)?;

        let out_path = Path::new(&self.output_path);
        if let Some(parent) = out_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = fs::File::create(out_path)
            .with_context(|| format!("Cannot create '{}'", out_path.display()))?;
        let mut writer = BufWriter::new(file);

        let mut summary = PrepareSummary { records: 0, labelled: 0 };
        for example in &examples {
            let record = builder.build_record(&cfg.problem, example)?;
            if !record.labels.is_empty() {
                summary.labelled += 1;
            }
            serde_json::to_writer(&mut writer, &record)?;
            writer.write_all(b"\n")?;
            summary.records += 1;
        }
        writer.flush()?;

        tracing::info!(
            "Wrote {} records ({} labelled) to '{}'",
            summary.records,
            summary.labelled,
            out_path.display()
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::train_use_case::TrainUseCase;

    #[test]
    fn test_prepared_features_feed_training() {
        let dir  = tempfile::tempdir().unwrap();
        let data = dir.path().join("train.jsonl");
        fs::write(
            &data,
            concat!(
                r#"{"inputs": "the [MASK] sat", "target": "cat"}"#, "\n",
                r#"{"inputs": "noise [MASK]", "target": "hiss", "modality": "audio"}"#, "\n",
            ),
        )
        .unwrap();
        let out = dir.path().join("out").join("features.jsonl");

        let cfg = TrainConfig {
            data_path:       data.to_string_lossy().into_owned(),
            checkpoint_dir:  dir.path().join("ckpt").to_string_lossy().into_owned(),
            problem:         "wiki".to_string(),
            max_seq_len:     8,
            max_predictions: 3,
            ..TrainConfig::default()
        };

        let summary = PrepareUseCase::new(cfg.clone(), out.to_string_lossy())
            .execute()
            .unwrap();
        assert_eq!(summary, PrepareSummary { records: 2, labelled: 1 });

        let text = fs::read_to_string(&out).unwrap();
        assert!(text.lines().next().unwrap().contains("wiki_masked_lm_weights"));

        let prepared = TrainConfig {
            prepared_path: Some(out.to_string_lossy().into_owned()),
            ..cfg
        };
        let (tokenizer, samples) = TrainUseCase::new(prepared).load_samples().unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].labels.positions, vec![2, 0, 0]);
        assert_eq!(samples[0].labels.ids[0], tokenizer.token_to_id("cat").unwrap());
    }

    #[test]
    fn test_prepared_features_with_other_seq_len_are_rejected() {
        let dir  = tempfile::tempdir().unwrap();
        let data = dir.path().join("train.jsonl");
        fs::write(&data, concat!(r#"{"inputs": "the [MASK] sat", "target": "cat"}"#, "\n")).unwrap();
        let out = dir.path().join("features.jsonl");

        let cfg = TrainConfig {
            data_path:       data.to_string_lossy().into_owned(),
            checkpoint_dir:  dir.path().join("ckpt").to_string_lossy().into_owned(),
            max_seq_len:     16,
            max_predictions: 3,
            ..TrainConfig::default()
        };
        PrepareUseCase::new(cfg.clone(), out.to_string_lossy()).execute().unwrap();

        let shorter = TrainConfig {
            prepared_path: Some(out.to_string_lossy().into_owned()),
            max_seq_len:   8,
            ..cfg
        };
        let err = TrainUseCase::new(shorter).load_samples().unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains("max_seq_len is 8"), "{msg}");
        assert!(msg.contains("Prepared record 1"), "{msg}");
    }
}
