//! Run state: best-checkpoint slot, early-stopping counter, metric history

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metrics of one finished epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// 1-based epoch index
    pub epoch: usize,
    pub train_loss: f64,
    pub train_accuracy: f64,
    pub val_loss: f64,
    pub val_accuracy: f64,
    /// Learning rate after the scheduler has seen this epoch
    pub learning_rate: f64,
}

/// The single best-model slot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub epoch: usize,
    pub val_loss: f64,
    pub val_accuracy: f64,
    pub learning_rate: f64,
    /// Where the parameters were written
    pub path: PathBuf,
    pub saved_at: DateTime<Utc>,
}

/// What the loop must do after an epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpochOutcome {
    /// New best validation loss; persist the parameters
    Improved,
    /// No improvement, keep going
    NotImproved { streak: usize },
    /// No improvement for `patience` epochs in a row; stop
    EarlyStop { streak: usize },
}

/// Checkpoint and early-stopping state of a run
#[derive(Debug, Clone)]
pub struct RunState {
    /// Last finished epoch (0 before the first)
    pub epoch: usize,
    pub best_val_loss: f64,
    pub epochs_without_improvement: usize,
    pub current_lr: f64,
    pub history: Vec<EpochMetrics>,
    pub best: Option<Checkpoint>,
    patience: usize,
}

impl RunState {
    pub fn new(initial_lr: f64, patience: usize) -> Self {
        Self {
            epoch: 0,
            best_val_loss: f64::INFINITY,
            epochs_without_improvement: 0,
            current_lr: initial_lr,
            history: Vec::new(),
            best: None,
            patience,
        }
    }

    /// Record an epoch and apply the checkpoint / early-stopping policy.
    ///
    /// Improvement means strictly below the best validation loss so far.
    pub fn observe(&mut self, metrics: &EpochMetrics) -> EpochOutcome {
        self.epoch = metrics.epoch;
        self.current_lr = metrics.learning_rate;
        self.history.push(metrics.clone());

        if metrics.val_loss < self.best_val_loss {
            self.best_val_loss = metrics.val_loss;
            self.epochs_without_improvement = 0;
            EpochOutcome::Improved
        } else {
            self.epochs_without_improvement += 1;
            let streak = self.epochs_without_improvement;
            if streak >= self.patience {
                EpochOutcome::EarlyStop { streak }
            } else {
                EpochOutcome::NotImproved { streak }
            }
        }
    }

    /// Fill the best slot after the parameters for `metrics` were written.
    pub fn record_checkpoint(&mut self, metrics: &EpochMetrics, path: PathBuf) {
        self.best = Some(Checkpoint {
            epoch: metrics.epoch,
            val_loss: metrics.val_loss,
            val_accuracy: metrics.val_accuracy,
            learning_rate: metrics.learning_rate,
            path,
            saved_at: Utc::now(),
        });
    }
}
