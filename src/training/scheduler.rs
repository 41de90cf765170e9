//! Learning Rate Scheduler Module
//!
//! Plateau-triggered learning rate reduction. The monitored metric counts as
//! improved only when it beats the best value by a relative threshold; once
//! more than `patience` epochs pass without improvement the rate is multiplied
//! by `factor` (never below `min_lr`) and the counter starts over.

use serde::{Deserialize, Serialize};

/// Mode for plateau detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlateauMode {
    /// Metric should decrease (e.g., loss)
    Min,
    /// Metric should increase (e.g., accuracy)
    Max,
}

/// Settings of the plateau scheduler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlateauConfig {
    pub mode: PlateauMode,
    /// Multiplier applied on reduction
    pub factor: f64,
    /// Bad epochs tolerated before reducing
    pub patience: usize,
    /// Relative improvement needed to reset the counter
    pub threshold: f64,
    /// Floor for the learning rate
    pub min_lr: f64,
}

impl Default for PlateauConfig {
    fn default() -> Self {
        Self {
            mode: PlateauMode::Min,
            factor: 0.1,
            patience: 4,
            threshold: 1e-4,
            min_lr: 1e-6,
        }
    }
}

/// Reductions smaller than this are ignored
const MIN_LR_DELTA: f64 = 1e-8;

/// Reduce-on-plateau state
#[derive(Debug, Clone)]
pub struct ReduceOnPlateau {
    config: PlateauConfig,
    best_metric: f64,
    bad_epochs: usize,
    current_lr: f64,
}

impl ReduceOnPlateau {
    pub fn new(initial_lr: f64, config: PlateauConfig) -> Self {
        let best_metric = match config.mode {
            PlateauMode::Min => f64::INFINITY,
            PlateauMode::Max => f64::NEG_INFINITY,
        };

        Self {
            config,
            best_metric,
            bad_epochs: 0,
            current_lr: initial_lr,
        }
    }

    fn is_better(&self, metric: f64) -> bool {
        let rel = self.config.threshold;
        match self.config.mode {
            PlateauMode::Min => metric < self.best_metric * (1.0 - rel),
            PlateauMode::Max => metric > self.best_metric * (1.0 + rel),
        }
    }

    /// Feed one epoch's metric; returns the learning rate to use next.
    pub fn step(&mut self, metric: f64) -> f64 {
        // NaN compares false, so it counts as a bad epoch
        if self.is_better(metric) {
            self.best_metric = metric;
            self.bad_epochs = 0;
        } else {
            self.bad_epochs += 1;
        }

        if self.bad_epochs > self.config.patience {
            let new_lr = (self.current_lr * self.config.factor).max(self.config.min_lr);
            if self.current_lr - new_lr > MIN_LR_DELTA {
                tracing::info!(
                    "Reducing learning rate from {:.6e} to {:.6e}",
                    self.current_lr,
                    new_lr
                );
                self.current_lr = new_lr;
            }
            self.bad_epochs = 0;
        }

        self.current_lr
    }

    /// Get the current learning rate
    pub fn get_lr(&self) -> f64 {
        self.current_lr
    }

    pub fn bad_epochs(&self) -> usize {
        self.bad_epochs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reduces_after_patience_plus_one_bad_epochs() {
        let mut sched = ReduceOnPlateau::new(1e-3, PlateauConfig::default());

        assert_eq!(sched.step(1.0), 1e-3);
        // Four bad epochs are tolerated
        for _ in 0..4 {
            assert_eq!(sched.step(1.0), 1e-3);
        }
        // The fifth triggers the reduction
        let lr = sched.step(1.0);
        assert!((lr - 1e-4).abs() < 1e-12);
        assert_eq!(sched.bad_epochs(), 0);
    }

    #[test]
    fn test_improvement_resets_counter() {
        let mut sched = ReduceOnPlateau::new(1e-3, PlateauConfig::default());
        sched.step(1.0);
        for _ in 0..4 {
            sched.step(1.0);
        }
        sched.step(0.5);
        assert_eq!(sched.bad_epochs(), 0);
        for _ in 0..4 {
            sched.step(0.6);
        }
        assert_eq!(sched.get_lr(), 1e-3);
    }

    #[test]
    fn test_relative_threshold() {
        let mut sched = ReduceOnPlateau::new(1e-3, PlateauConfig::default());
        sched.step(1.0);
        // Below the 1e-4 relative threshold: not an improvement
        sched.step(0.99995);
        assert_eq!(sched.bad_epochs(), 1);
        sched.step(0.9);
        assert_eq!(sched.bad_epochs(), 0);
    }

    #[test]
    fn test_min_lr_floor() {
        let mut sched = ReduceOnPlateau::new(1e-3, PlateauConfig::default());
        sched.step(1.0);
        for _ in 0..100 {
            sched.step(2.0);
        }
        assert!((sched.get_lr() - 1e-6).abs() < 1e-15);
    }

    #[test]
    fn test_nan_is_bad_epoch() {
        let mut sched = ReduceOnPlateau::new(1e-3, PlateauConfig::default());
        sched.step(f64::NAN);
        assert_eq!(sched.bad_epochs(), 1);
    }

    #[test]
    fn test_max_mode() {
        let config = PlateauConfig {
            mode: PlateauMode::Max,
            patience: 0,
            ..Default::default()
        };
        let mut sched = ReduceOnPlateau::new(1.0, config);
        sched.step(0.5);
        assert_eq!(sched.get_lr(), 1.0);
        let lr = sched.step(0.4);
        assert!((lr - 0.1).abs() < 1e-12);
    }
}
