//! Dataset module: ingestion, splitting, augmentation and Burn batching

pub mod augmentation;
pub mod burn_dataset;
pub mod loader;
pub mod split;

pub use augmentation::{AugmentationConfig, Augmenter};
pub use burn_dataset::{FrameBatch, FrameBatcher, FrameDataset};
pub use loader::{ingest, ClassDir, FrameImage, IngestedFrames};
pub use split::{split_train_val, DatasetSplits, Sample, SplitConfig};
