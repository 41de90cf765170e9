//! # Steering Classifier
//!
//! Trains a three-way image classifier (go, left, right) for a small
//! camera-driven robot using the Burn framework.
//!
//! ## Pipeline
//!
//! 1. `dataset::loader` decodes every image in the three class directories and
//!    stores it as a `[-1, 1]` RGB array.
//! 2. `dataset::split` draws a seeded 80/20 train/validation partition.
//! 3. `dataset::burn_dataset` wraps the partitions so every access re-applies
//!    the augmentation (training) or plain normalization (validation).
//! 4. `model` adapts a pretrained ResNet-34 to 64x64 inputs and a small head.
//! 5. `training` runs the train/eval loop with plateau LR reduction,
//!    best-checkpointing and early stopping, then re-evaluates the best
//!    checkpoint.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use steering_classifier::backend::{default_device, TrainingBackend};
//! use steering_classifier::training::{supervised::run_training, TrainingConfig};
//!
//! let summary = run_training::<TrainingBackend>(&TrainingConfig::default(), default_device())?;
//! println!("best val loss: {:.4}", summary.final_val_loss);
//! ```

pub mod backend;
pub mod dataset;
pub mod model;
pub mod training;
pub mod utils;

// Re-export commonly used items for convenience
pub use dataset::loader::{ingest, ClassDir, FrameImage, IngestedFrames};
pub use dataset::split::{split_train_val, DatasetSplits, Sample, SplitConfig};
pub use dataset::{FrameBatch, FrameBatcher, FrameDataset};
pub use model::{SteeringNet, SteeringNetConfig};
pub use training::state::{Checkpoint, EpochMetrics, EpochOutcome, RunState};
pub use training::{RunSummary, TrainingConfig};
pub use utils::error::{Result, SteeringError};

/// Number of steering commands
pub const NUM_CLASSES: usize = 3;

/// Side length of the square frames fed to the network
pub const IMAGE_SIZE: usize = 64;

/// Class names, indexed by label
pub const CLASS_NAMES: [&str; NUM_CLASSES] = ["go", "left", "right"];

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
