// ============================================================
// Layer 3 — Forward Mode
// ============================================================
// The phase a forward pass runs in. Passed explicitly by the
// caller on every call rather than read from global state.
//
//   Train   → labels consumed, loss registered
//   Eval    → labels consumed, loss registered (no updates)
//   Predict → no labels, distribution over every token

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Train,
    Eval,
    Predict,
}

impl Mode {
    /// True when ground-truth labels are consumed and a loss is computed.
    pub fn uses_labels(self) -> bool {
        !matches!(self, Mode::Predict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_predict_skips_labels() {
        assert!(Mode::Train.uses_labels());
        assert!(Mode::Eval.uses_labels());
        assert!(!Mode::Predict.uses_labels());
    }
}
