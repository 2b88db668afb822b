//! Rolling-origin fold generation.
//!
//! Every fold trains strictly before its validation window. Validation
//! windows of one run are disjoint and move forward in time; a trailing
//! remainder too short for a full window is dropped.

use std::ops::Range;

use ronda_traits::{ModelConfiguration, Result, RondaError, TRAIN_WINDOW_KEY};
use serde::{Deserialize, Serialize};

/// One train/validation split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fold {
    /// Position of the fold in the run
    pub index: usize,
    /// Training rows
    pub train: Range<usize>,
    /// Validation rows
    pub validation: Range<usize>,
}

/// How the training window grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowKind {
    /// Train on everything before the origin.
    #[default]
    Expanding,
    /// Train on the `size` rows before the origin.
    Rolling {
        /// Window length in rows
        size: usize,
    },
}

/// Walk-forward fold policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoldPolicy {
    /// Training window shape
    pub window: WindowKind,
    /// Rows before the first origin
    pub initial_train: usize,
    /// Rows per validation window
    pub validation_len: usize,
    /// Rows the origin advances per fold
    pub step: usize,
    /// Rows skipped between training end and validation start
    pub gap: usize,
}

impl Default for FoldPolicy {
    fn default() -> Self {
        Self {
            window: WindowKind::Expanding,
            initial_train: 252,
            validation_len: 21,
            step: 21,
            gap: 0,
        }
    }
}

impl FoldPolicy {
    /// Expanding policy with the given sizes and no gap.
    #[must_use]
    pub const fn expanding(initial_train: usize, validation_len: usize, step: usize) -> Self {
        Self {
            window: WindowKind::Expanding,
            initial_train,
            validation_len,
            step,
            gap: 0,
        }
    }

    /// Set the window shape.
    #[must_use]
    pub const fn with_window(mut self, window: WindowKind) -> Self {
        self.window = window;
        self
    }

    /// Set the embargo gap.
    #[must_use]
    pub const fn with_gap(mut self, gap: usize) -> Self {
        self.gap = gap;
        self
    }

    /// Set the origin step.
    #[must_use]
    pub const fn with_step(mut self, step: usize) -> Self {
        self.step = step;
        self
    }

    /// Checks the policy on its own.
    ///
    /// # Errors
    ///
    /// Returns [`RondaError::InvalidConfig`] for empty windows or a step
    /// shorter than the validation window.
    pub fn validate(&self) -> Result<()> {
        if self.validation_len == 0 {
            return Err(RondaError::InvalidConfig(
                "validation_len must be positive".to_string(),
            ));
        }
        if self.initial_train == 0 {
            return Err(RondaError::InvalidConfig(
                "initial_train must be positive".to_string(),
            ));
        }
        if self.step < self.validation_len {
            return Err(RondaError::InvalidConfig(format!(
                "step {} is shorter than validation_len {}; validation windows would overlap",
                self.step, self.validation_len
            )));
        }
        if let WindowKind::Rolling { size: 0 } = self.window {
            return Err(RondaError::InvalidConfig(
                "rolling window size must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Window in effect for a configuration; `train_window` forces a rolling
    /// window of that length.
    ///
    /// # Errors
    ///
    /// Returns [`RondaError::InvalidConfig`] when `train_window` is not a
    /// positive integer.
    pub fn effective_window(&self, config: &ModelConfiguration) -> Result<WindowKind> {
        if !config.contains(TRAIN_WINDOW_KEY) {
            return Ok(self.window);
        }
        let size = config.usize_or(TRAIN_WINDOW_KEY, 0)?;
        if size == 0 {
            return Err(RondaError::InvalidConfig(
                "train_window must be positive".to_string(),
            ));
        }
        Ok(WindowKind::Rolling { size })
    }

    /// Generates the folds for a series of `n_rows` rows.
    ///
    /// `min_train` is the adapter's minimum training length; the first origin
    /// is never placed before it.
    ///
    /// # Errors
    ///
    /// Returns [`RondaError::InvalidConfig`] when the policy is invalid or a
    /// rolling window is shorter than `min_train`.
    pub fn folds(
        &self,
        n_rows: usize,
        min_train: usize,
        config: &ModelConfiguration,
    ) -> Result<Vec<Fold>> {
        self.validate()?;
        let window = self.effective_window(config)?;

        let mut first_origin = self.initial_train.max(min_train);
        if let WindowKind::Rolling { size } = window {
            if size < min_train {
                return Err(RondaError::InvalidConfig(format!(
                    "rolling window of {size} rows is shorter than the model minimum of {min_train}"
                )));
            }
            first_origin = first_origin.max(size);
        }

        let mut folds = Vec::new();
        let mut origin = first_origin;
        loop {
            let start = origin + self.gap;
            let end = start + self.validation_len;
            if end > n_rows {
                break;
            }
            let train = match window {
                WindowKind::Expanding => 0..origin,
                WindowKind::Rolling { size } => origin - size..origin,
            };
            folds.push(Fold {
                index: folds.len(),
                train,
                validation: start..end,
            });
            origin += self.step;
        }

        Ok(folds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expanding_folds() {
        let policy = FoldPolicy::expanding(60, 5, 5);
        let folds = policy.folds(100, 1, &ModelConfiguration::new()).unwrap();
        assert_eq!(folds.len(), 8);
        assert_eq!(folds[0].train, 0..60);
        assert_eq!(folds[0].validation, 60..65);
        assert_eq!(folds[7].validation, 95..100);
        for fold in &folds {
            assert!(fold.train.end <= fold.validation.start);
        }
        for pair in folds.windows(2) {
            assert!(pair[0].validation.end <= pair[1].validation.start);
        }
    }

    #[test]
    fn test_remainder_dropped() {
        let policy = FoldPolicy::expanding(60, 5, 5);
        let folds = policy.folds(103, 1, &ModelConfiguration::new()).unwrap();
        assert_eq!(folds.len(), 8);
        assert_eq!(folds.last().unwrap().validation.end, 100);
    }

    #[test]
    fn test_rolling_and_gap() {
        let policy = FoldPolicy::expanding(30, 10, 10)
            .with_window(WindowKind::Rolling { size: 20 })
            .with_gap(2);
        let folds = policy.folds(80, 5, &ModelConfiguration::new()).unwrap();
        assert_eq!(folds[0].train, 10..30);
        assert_eq!(folds[0].validation, 32..42);
        assert_eq!(folds[1].train, 20..40);
        assert_eq!(folds.len(), 4);
    }

    #[test]
    fn test_min_train_moves_origin() {
        let policy = FoldPolicy::expanding(10, 5, 5);
        let folds = policy.folds(50, 25, &ModelConfiguration::new()).unwrap();
        assert_eq!(folds[0].train, 0..25);
        assert_eq!(folds.len(), 5);
    }

    #[test]
    fn test_train_window_override() {
        let policy = FoldPolicy::expanding(40, 5, 5);
        let config = ModelConfiguration::new().with(TRAIN_WINDOW_KEY, 30_i64);
        let folds = policy.folds(60, 10, &config).unwrap();
        assert_eq!(folds[0].train, 10..40);
        assert_eq!(folds[3].train, 25..55);

        let short = ModelConfiguration::new().with(TRAIN_WINDOW_KEY, 5_i64);
        assert!(matches!(
            policy.folds(60, 10, &short),
            Err(RondaError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_invalid_policies() {
        let config = ModelConfiguration::new();
        assert!(FoldPolicy::expanding(10, 5, 3).folds(50, 1, &config).is_err());
        assert!(FoldPolicy::expanding(10, 0, 3).folds(50, 1, &config).is_err());
        assert!(FoldPolicy::expanding(0, 5, 5).folds(50, 1, &config).is_err());
    }

    #[test]
    fn test_short_series_yields_nothing() {
        let folds = FoldPolicy::expanding(60, 5, 5)
            .folds(62, 1, &ModelConfiguration::new())
            .unwrap();
        assert!(folds.is_empty());
    }
}
