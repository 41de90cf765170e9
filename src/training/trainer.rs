//! Epoch execution for the steering network
//!
//! - TRAIN phase: shuffled mini-batches, forward, cross-entropy, backward,
//!   optimizer step
//! - EVAL phase: fixed-order batches through the inner (non-autodiff) model
//! - scheduler step, epoch log line, checkpoint / early-stopping policy
//! - checkpoint write and reload

use std::path::{Path, PathBuf};

use burn::{
    data::dataloader::batcher::Batcher,
    data::dataset::Dataset,
    module::{AutodiffModule, Module},
    nn::loss::CrossEntropyLossConfig,
    optim::{GradientsParams, Optimizer},
    record::{DefaultFileRecorder, FullPrecisionSettings},
    tensor::{backend::AutodiffBackend, backend::Backend, ElementConversion, Int, Tensor},
};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

use super::scheduler::ReduceOnPlateau;
use super::state::{EpochMetrics, EpochOutcome, RunState};
use super::TrainingConfig;
use crate::dataset::{FrameBatch, FrameBatcher, FrameDataset};
use crate::model::{SteeringNet, SteeringNetConfig};
use crate::utils::error::{Result, ResultExt, SteeringError};
use crate::utils::logging::TrainingLogger;

/// Loss and accuracy of one pass over a partition
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseMetrics {
    /// Mean per-sample cross-entropy
    pub loss: f64,
    /// Fraction of correct argmax predictions
    pub accuracy: f64,
    pub samples: usize,
}

/// Running sums for a phase
#[derive(Debug, Default)]
struct PhaseAccumulator {
    loss_sum: f64,
    correct: usize,
    samples: usize,
}

impl PhaseAccumulator {
    fn add<B: Backend>(&mut self, batch_loss: f64, logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) {
        let [batch_size, _] = logits.dims();
        let predictions = logits.argmax(1).reshape([batch_size]);
        let correct: i64 = predictions.equal(targets).int().sum().into_scalar().elem();

        self.loss_sum += batch_loss * batch_size as f64;
        self.correct += correct as usize;
        self.samples += batch_size;
    }

    fn finish(self) -> PhaseMetrics {
        if self.samples == 0 {
            return PhaseMetrics {
                loss: 0.0,
                accuracy: 0.0,
                samples: 0,
            };
        }
        PhaseMetrics {
            loss: self.loss_sum / self.samples as f64,
            accuracy: self.correct as f64 / self.samples as f64,
            samples: self.samples,
        }
    }
}

/// Evaluate `model` over `dataset` in its stored order, no parameter updates.
///
/// Pass an inner-backend model (`model.valid()`) so batch-norm uses running
/// statistics and dropout is off.
pub fn evaluate<B: Backend>(
    model: &SteeringNet<B>,
    dataset: &FrameDataset,
    batcher: &FrameBatcher,
    batch_size: usize,
    device: &B::Device,
) -> PhaseMetrics {
    let loss_fn = CrossEntropyLossConfig::new().init(device);
    let mut acc = PhaseAccumulator::default();

    let indices: Vec<usize> = (0..dataset.len()).collect();
    for chunk in indices.chunks(batch_size.max(1)) {
        let batch: FrameBatch<B> = batcher.batch(dataset.gather(chunk), device);
        let logits = model.forward(batch.images);
        let loss = loss_fn.forward(logits.clone(), batch.targets.clone());
        let loss_value: f64 = loss.into_scalar().elem();
        acc.add(loss_value, logits, batch.targets);
    }

    acc.finish()
}

fn recorder() -> DefaultFileRecorder<FullPrecisionSettings> {
    DefaultFileRecorder::<FullPrecisionSettings>::new()
}

/// Load checkpoint parameters into a freshly built network.
pub fn load_checkpoint<B: Backend>(
    config: &SteeringNetConfig,
    path: &Path,
    device: &B::Device,
) -> Result<SteeringNet<B>> {
    if !path.exists() {
        return Err(SteeringError::Checkpoint(format!(
            "no checkpoint at {:?}",
            path
        )));
    }
    config
        .init::<B>(device)
        .load_file(path.to_path_buf(), &recorder(), device)
        .checkpoint_context("Failed to load model")
}

/// Trainer for the steering network
pub struct Trainer<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<SteeringNet<B>, B>,
{
    pub model: SteeringNet<B>,
    optimizer: O,
    scheduler: ReduceOnPlateau,
    pub state: RunState,
    config: TrainingConfig,
    train_batcher: FrameBatcher,
    eval_batcher: FrameBatcher,
    shuffle_rng: ChaCha8Rng,
    logger: TrainingLogger,
    device: B::Device,
}

impl<B, O> Trainer<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<SteeringNet<B>, B>,
{
    pub fn new(model: SteeringNet<B>, optimizer: O, config: TrainingConfig, device: B::Device) -> Self {
        let scheduler = ReduceOnPlateau::new(config.learning_rate, config.plateau.clone());
        let state = RunState::new(config.learning_rate, config.early_stopping_patience);
        let train_batcher = FrameBatcher::train(config.augmentation_config(), config.seed);
        let eval_batcher = FrameBatcher::eval(config.image_size);
        // Offset keeps the shuffle stream apart from the augmentation stream
        let shuffle_rng = ChaCha8Rng::seed_from_u64(config.seed.wrapping_add(1));
        let logger = TrainingLogger::new(config.max_epochs);

        Self {
            model,
            optimizer,
            scheduler,
            state,
            config,
            train_batcher,
            eval_batcher,
            shuffle_rng,
            logger,
            device,
        }
    }

    /// TRAIN phase over a freshly shuffled order
    pub fn train_epoch(&mut self, dataset: &FrameDataset) -> PhaseMetrics {
        let loss_fn = CrossEntropyLossConfig::new().init(&self.device);
        let lr = self.scheduler.get_lr();
        let mut acc = PhaseAccumulator::default();

        let mut indices: Vec<usize> = (0..dataset.len()).collect();
        indices.shuffle(&mut self.shuffle_rng);
        let num_batches = indices.len().div_ceil(self.config.batch_size);

        for (batch_idx, chunk) in indices.chunks(self.config.batch_size).enumerate() {
            let batch: FrameBatch<B> = self.train_batcher.batch(dataset.gather(chunk), &self.device);

            let logits = self.model.forward(batch.images);
            let loss = loss_fn.forward(logits.clone(), batch.targets.clone());
            let loss_value: f64 = loss.clone().into_scalar().elem();

            let grads = GradientsParams::from_grads(loss.backward(), &self.model);
            self.model = self.optimizer.step(lr, self.model.clone(), grads);

            acc.add(loss_value, logits.detach(), batch.targets);
            debug!("  Batch {}/{}: loss = {:.4}", batch_idx + 1, num_batches, loss_value);
        }

        acc.finish()
    }

    /// EVAL phase with the current parameters
    pub fn evaluate(&self, dataset: &FrameDataset) -> PhaseMetrics {
        let model = self.model.valid();
        evaluate::<B::InnerBackend>(&model, dataset, &self.eval_batcher, self.config.batch_size, &self.device)
    }

    /// One full epoch: train, evaluate, schedule, log, checkpoint policy.
    pub fn run_epoch(
        &mut self,
        epoch: usize,
        train: &FrameDataset,
        val: &FrameDataset,
    ) -> Result<(EpochMetrics, EpochOutcome)> {
        self.logger.start_epoch(epoch);

        let train_metrics = self.train_epoch(train);
        let val_metrics = self.evaluate(val);
        let learning_rate = self.scheduler.step(val_metrics.loss);

        let metrics = EpochMetrics {
            epoch,
            train_loss: train_metrics.loss,
            train_accuracy: train_metrics.accuracy,
            val_loss: val_metrics.loss,
            val_accuracy: val_metrics.accuracy,
            learning_rate,
        };
        self.logger.end_epoch(
            epoch,
            metrics.train_loss,
            metrics.train_accuracy,
            metrics.val_loss,
            metrics.val_accuracy,
            learning_rate,
        );

        let outcome = self.state.observe(&metrics);
        match outcome {
            EpochOutcome::Improved => {
                let path = self.save_checkpoint()?;
                self.state.record_checkpoint(&metrics, path);
                self.logger.log_new_best(epoch, metrics.val_loss);
            }
            EpochOutcome::NotImproved { streak } => {
                debug!("No improvement for {} epochs", streak);
            }
            EpochOutcome::EarlyStop { streak } => {
                self.logger.log_early_stop(epoch, streak);
            }
        }

        Ok((metrics, outcome))
    }

    /// Run until `max_epochs` or early stop. Returns whether it stopped early.
    pub fn fit(&mut self, train: &FrameDataset, val: &FrameDataset) -> Result<bool> {
        if train.is_empty() || val.is_empty() {
            return Err(SteeringError::Training(format!(
                "empty partition (train {}, val {})",
                train.len(),
                val.len()
            )));
        }

        let mut stopped_early = false;
        for epoch in 1..=self.config.max_epochs {
            let (_, outcome) = self.run_epoch(epoch, train, val)?;
            if let EpochOutcome::EarlyStop { .. } = outcome {
                stopped_early = true;
                break;
            }
        }

        self.logger.log_complete(self.state.epoch, self.state.best_val_loss);
        Ok(stopped_early)
    }

    /// Overwrite the checkpoint file with the current parameters
    pub fn save_checkpoint(&self) -> Result<PathBuf> {
        let path = self.config.checkpoint_file();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        self.model
            .clone()
            .save_file(path.clone(), &recorder())
            .checkpoint_context("Failed to save model")?;

        info!("Saved best model to {:?} (epoch {})", path, self.state.epoch);
        Ok(path)
    }
}
