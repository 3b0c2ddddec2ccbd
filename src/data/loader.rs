// ============================================================
// Layer 4 — Pre-masked Example Loader
// ============================================================
// Reads pre-masked examples from a JSONL file, one JSON object
// per line:
//
//   {"inputs": "the [MASK] sat", "target": "cat"}
//   {"inputs": "a [MASK] day", "target": "sunny", "modality": "text"}
//
// Blank lines are ignored. A line that fails to parse is logged
// with its line number and skipped, so one bad record does not
// abort a long preprocessing run.
//
// Prepared feature files written by `prepare` use the same JSONL
// framing and are read back with load_feature_records.

use anyhow::{Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::de::DeserializeOwned;

use crate::data::dataset::FeatureRecord;
use crate::domain::example::PremaskedExample;
use crate::domain::traits::ExampleSource;

/// Loads every example from a single `.jsonl` file.
pub struct JsonlLoader {
    path: PathBuf,
}

impl JsonlLoader {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }
}

impl ExampleSource for JsonlLoader {
    fn load_all(&self) -> Result<Vec<PremaskedExample>> {
        let text = fs::read_to_string(&self.path)
            .with_context(|| format!("Cannot read examples from '{}'", self.path.display()))?;

        let examples: Vec<PremaskedExample> = parse_jsonl(&text);
        tracing::info!(
            "Loaded {} examples from '{}'",
            examples.len(),
            self.path.display()
        );
        Ok(examples)
    }
}

/// Read a prepared features file.
pub fn load_feature_records(path: impl AsRef<Path>) -> Result<Vec<FeatureRecord>> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)
        .with_context(|| format!("Cannot read features from '{}'", path.display()))?;

    let records: Vec<FeatureRecord> = parse_jsonl(&text);
    tracing::info!("Loaded {} feature records from '{}'", records.len(), path.display());
    Ok(records)
}

/// Parse JSONL text, skipping blank and malformed lines.
pub fn parse_jsonl<T: DeserializeOwned>(text: &str) -> Vec<T> {
    let mut items = Vec::new();

    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<T>(line) {
            Ok(item) => items.push(item),
            Err(e) => {
                tracing::warn!("Skipping line {}: {}", idx + 1, e);
            }
        }
    }

    items
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::example::Modality;
    use std::io::Write;

    #[test]
    fn test_parse_skips_blank_and_malformed_lines() {
        let text = r#"{"inputs": "the [MASK] sat", "target": "cat"}

not json
{"inputs": "a [MASK]", "target": "b", "modality": "audio"}
"#;
        let examples: Vec<PremaskedExample> = parse_jsonl(text);
        assert_eq!(examples.len(), 2);
        assert_eq!(examples[0].target, "cat");
        assert_eq!(examples[1].modality, Modality::Audio);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"inputs": "x [MASK]", "target": "y"}}"#).unwrap();

        let examples = JsonlLoader::new(file.path()).load_all().unwrap();
        assert_eq!(examples, vec![PremaskedExample::new("x [MASK]", "y")]);
    }

    #[test]
    fn test_load_feature_records() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"input_ids": [101, 103, 102], "attention_mask": [1, 1, 1], "t_masked_lm_positions": [1], "t_masked_lm_ids": [7], "t_masked_lm_weights": [1]}}"#
        )
        .unwrap();
        writeln!(file, r#"{{"input_ids": "oops"}}"#).unwrap();

        let records = load_feature_records(file.path()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].labels["t_masked_lm_ids"], vec![7]);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let loader = JsonlLoader::new("definitely/not/here.jsonl");
        let err    = loader.load_all().unwrap_err();
        assert!(err.to_string().contains("definitely/not/here.jsonl"));
    }
}
