//! Train/validation split
//!
//! A plain (non-stratified) seeded shuffle split. The validation partition
//! takes `ceil(n * val_fraction)` samples from the front of a ChaCha8
//! permutation, the training partition takes the rest.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::dataset::loader::{FrameImage, IngestedFrames};
use crate::utils::error::{Result, SteeringError};

/// Configuration for dataset splitting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitConfig {
    /// Fraction of samples held out for validation
    pub val_fraction: f64,
    /// Random seed for reproducibility
    pub seed: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            val_fraction: 0.2,
            seed: 42,
        }
    }
}

/// A stored frame with its steering label
#[derive(Debug, Clone)]
pub struct Sample {
    pub image: FrameImage,
    pub label: usize,
}

/// Disjoint train/validation partitions
#[derive(Debug, Clone)]
pub struct DatasetSplits {
    pub train: Vec<Sample>,
    pub val: Vec<Sample>,
}

/// Sizes `(n_train, n_val)` for `n` samples.
pub fn split_sizes(n: usize, val_fraction: f64) -> (usize, usize) {
    let n_val = ((n as f64) * val_fraction).ceil() as usize;
    let n_val = n_val.min(n);
    (n - n_val, n_val)
}

/// Split parallel image/label sequences into train and validation sets.
pub fn split_train_val(
    images: Vec<FrameImage>,
    labels: Vec<usize>,
    config: &SplitConfig,
) -> Result<DatasetSplits> {
    if images.len() != labels.len() {
        return Err(SteeringError::Dataset(format!(
            "{} images but {} labels",
            images.len(),
            labels.len()
        )));
    }
    if !(config.val_fraction > 0.0 && config.val_fraction < 1.0) {
        return Err(SteeringError::Config(format!(
            "Validation fraction must be in (0, 1), got {}",
            config.val_fraction
        )));
    }

    let n = images.len();
    let (n_train, n_val) = split_sizes(n, config.val_fraction);
    if n_train == 0 || n_val == 0 {
        return Err(SteeringError::Dataset(format!(
            "Cannot split {} samples into non-empty train/validation sets",
            n
        )));
    }

    let mut order: Vec<usize> = (0..n).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    order.shuffle(&mut rng);

    let mut slots: Vec<Option<Sample>> = images
        .into_iter()
        .zip(labels)
        .map(|(image, label)| Some(Sample { image, label }))
        .collect();

    // Every index appears once in the permutation, so each slot is taken once
    let mut take = |idx: usize| slots[idx].take();
    let val: Vec<Sample> = order[..n_val].iter().filter_map(|&i| take(i)).collect();
    let train: Vec<Sample> = order[n_val..].iter().filter_map(|&i| take(i)).collect();

    Ok(DatasetSplits { train, val })
}

impl DatasetSplits {
    pub fn from_frames(frames: IngestedFrames, config: &SplitConfig) -> Result<Self> {
        split_train_val(frames.images, frames.labels, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Frames tagged by their first pixel so identity survives the split
    fn tagged(n: usize) -> (Vec<FrameImage>, Vec<usize>) {
        let images = (0..n)
            .map(|i| FrameImage {
                width: 1,
                height: 1,
                data: vec![i as f32, 0.0, 0.0],
            })
            .collect();
        let labels = (0..n).map(|i| i % 3).collect();
        (images, labels)
    }

    fn tags(samples: &[Sample]) -> Vec<usize> {
        samples.iter().map(|s| s.image.data[0] as usize).collect()
    }

    #[test]
    fn test_split_sizes_follow_ceil_rule() {
        assert_eq!(split_sizes(270, 0.2), (216, 54));
        assert_eq!(split_sizes(11, 0.2), (8, 3));
        assert_eq!(split_sizes(10, 0.2), (8, 2));
    }

    #[test]
    fn test_split_270() {
        let (images, labels) = tagged(270);
        let splits = split_train_val(images, labels, &SplitConfig::default()).unwrap();
        assert_eq!(splits.train.len(), 216);
        assert_eq!(splits.val.len(), 54);
    }

    #[test]
    fn test_split_is_disjoint_and_complete() {
        let (images, labels) = tagged(100);
        let splits = split_train_val(images, labels, &SplitConfig::default()).unwrap();

        let mut all: Vec<usize> = tags(&splits.train);
        all.extend(tags(&splits.val));
        all.sort_unstable();
        assert_eq!(all, (0..100).collect::<Vec<_>>());

        // Labels travel with their image
        for s in splits.train.iter().chain(splits.val.iter()) {
            assert_eq!(s.label, s.image.data[0] as usize % 3);
        }
    }

    #[test]
    fn test_reproducibility() {
        let (a_img, a_lab) = tagged(270);
        let (b_img, b_lab) = tagged(270);
        let a = split_train_val(a_img, a_lab, &SplitConfig::default()).unwrap();
        let b = split_train_val(b_img, b_lab, &SplitConfig::default()).unwrap();
        assert_eq!(tags(&a.val), tags(&b.val));
        assert_eq!(tags(&a.train), tags(&b.train));

        let (c_img, c_lab) = tagged(270);
        let c = split_train_val(c_img, c_lab, &SplitConfig { seed: 7, ..Default::default() }).unwrap();
        assert_ne!(tags(&a.val), tags(&c.val));
    }

    #[test]
    fn test_split_errors() {
        let (images, mut labels) = tagged(10);
        labels.pop();
        assert!(matches!(
            split_train_val(images, labels, &SplitConfig::default()),
            Err(SteeringError::Dataset(_))
        ));

        assert!(split_train_val(Vec::new(), Vec::new(), &SplitConfig::default()).is_err());

        let (images, labels) = tagged(1);
        assert!(split_train_val(images, labels, &SplitConfig::default()).is_err());
    }
}
