// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Appends one CSV row per epoch to checkpoints/metrics.csv:
//
//   epoch,train_loss,val_loss,masked_acc,degenerate_batches
//   1,6.912300,6.854100,0.031000,0
//   2,5.401200,5.388000,0.094000,1
//
// masked_acc is weighted: padding slots of the label arrays never
// count. degenerate_batches is the number of training batches in
// which no head produced a usable loss (no weighted slot, or a
// NaN / infinite value); they add 0 to train_loss and take no
// optimiser step.

use anyhow::{Context, Result};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::PathBuf,
};
use serde::{Deserialize, Serialize};

const HEADER: &str = "epoch,train_loss,val_loss,masked_acc,degenerate_batches";

/// One row of metrics for a single training epoch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch: usize,

    /// Mean registered loss over all training batches
    pub train_loss: f64,

    /// Mean registered loss over validation batches
    pub val_loss: f64,

    /// Fraction of weighted masked slots predicted correctly, [0.0, 1.0]
    pub masked_acc: f64,

    /// Training batches skipped by the optimiser
    pub degenerate_batches: usize,
}

impl EpochMetrics {
    pub fn new(
        epoch:              usize,
        train_loss:         f64,
        val_loss:           f64,
        masked_acc:         f64,
        degenerate_batches: usize,
    ) -> Self {
        Self { epoch, train_loss, val_loss, masked_acc, degenerate_batches }
    }

    /// Returns true if this epoch improved over the previous best val_loss
    pub fn is_improvement(&self, best_val_loss: f64) -> bool {
        self.val_loss < best_val_loss
    }

    fn csv_row(&self) -> String {
        format!(
            "{},{:.6},{:.6},{:.6},{}",
            self.epoch,
            self.train_loss,
            self.val_loss,
            self.masked_acc,
            self.degenerate_batches,
        )
    }
}

/// Append-only writer for `metrics.csv`.
pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Writes the CSV header if the file doesn't exist yet, so
    /// reruns append to the same log.
    pub fn new(dir: impl Into<String>) -> Result<Self> {
        let dir = PathBuf::from(dir.into());
        fs::create_dir_all(&dir)?;

        let csv_path = dir.join("metrics.csv");
        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)
                .with_context(|| format!("Cannot create '{}'", csv_path.display()))?;
            writeln!(f, "{HEADER}")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    pub fn log(&self, m: &EpochMetrics) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("Cannot open '{}'", self.csv_path.display()))?;

        writeln!(f, "{}", m.csv_row())?;

        tracing::debug!(
            "Logged epoch {} metrics: train_loss={:.4}, val_loss={:.4}, degenerate={}",
            m.epoch,
            m.train_loss,
            m.val_loss,
            m.degenerate_batches,
        );

        Ok(())
    }

    pub fn csv_path(&self) -> &PathBuf {
        &self.csv_path
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_improvement() {
        let m = EpochMetrics::new(2, 2.5, 2.3, 0.2, 0);
        assert!(m.is_improvement(3.0));
        assert!(!m.is_improvement(2.0));
    }

    #[test]
    fn test_one_row_per_epoch() {
        let dir    = tempfile::tempdir().unwrap();
        let logger = MetricsLogger::new(dir.path().to_string_lossy()).unwrap();

        logger.log(&EpochMetrics::new(1, 6.5, 6.25, 0.125, 2)).unwrap();
        logger.log(&EpochMetrics::new(2, 5.0, 5.5, 0.25, 0)).unwrap();

        let text  = fs::read_to_string(logger.csv_path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], HEADER);
        assert_eq!(lines[1], "1,6.500000,6.250000,0.125000,2");
    }

    #[test]
    fn test_reopening_keeps_existing_rows() {
        let dir = tempfile::tempdir().unwrap();
        MetricsLogger::new(dir.path().to_string_lossy())
            .unwrap()
            .log(&EpochMetrics::new(1, 1.0, 1.0, 0.0, 0))
            .unwrap();

        let logger = MetricsLogger::new(dir.path().to_string_lossy()).unwrap();
        let text   = fs::read_to_string(logger.csv_path()).unwrap();
        assert_eq!(text.lines().count(), 2);
    }
}
