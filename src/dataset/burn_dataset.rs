//! Burn Dataset and Batcher for stored frames
//!
//! `FrameDataset` holds the `[-1, 1]` frames of one partition. `FrameBatcher`
//! turns a list of samples into tensors. Every call decodes the frames back
//! to 8-bit, applies the transform (random augmentation for training, none
//! for evaluation), scales to `[0, 1]` and applies ImageNet normalization.
//! Training randomness is drawn fresh on every access.

use std::sync::{Arc, Mutex};

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::prelude::*;
use image::imageops::{self, FilterType};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use crate::dataset::augmentation::{to_chw_unit, AugmentationConfig, Augmenter};
use crate::dataset::split::Sample;

/// ImageNet channel means
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// ImageNet channel standard deviations
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// In-memory partition of stored frames
#[derive(Debug, Clone, Default)]
pub struct FrameDataset {
    samples: Vec<Sample>,
}

impl FrameDataset {
    pub fn new(samples: Vec<Sample>) -> Self {
        Self { samples }
    }

    /// Samples at the given indices, in that order
    pub fn gather(&self, indices: &[usize]) -> Vec<Sample> {
        indices
            .iter()
            .filter_map(|&i| self.samples.get(i).cloned())
            .collect()
    }

    /// Frames per label
    pub fn class_distribution(&self, num_classes: usize) -> Vec<usize> {
        let mut counts = vec![0usize; num_classes];
        for s in &self.samples {
            if s.label < num_classes {
                counts[s.label] += 1;
            }
        }
        counts
    }
}

impl Dataset<Sample> for FrameDataset {
    fn get(&self, index: usize) -> Option<Sample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

/// A batch of frames ready for the network
#[derive(Clone, Debug)]
pub struct FrameBatch<B: Backend> {
    /// Normalized images, `[batch_size, 3, height, width]`
    pub images: Tensor<B, 4>,
    /// Class labels, `[batch_size]`
    pub targets: Tensor<B, 1, Int>,
}

#[derive(Clone, Debug)]
enum Transform {
    /// Per-item seeds come from `rng`, shared by clones of the batcher
    Train {
        augmenter: Augmenter,
        rng: Arc<Mutex<ChaCha8Rng>>,
    },
    Eval,
}

/// Batcher applying the train or eval transform
#[derive(Clone, Debug)]
pub struct FrameBatcher {
    transform: Transform,
    image_size: u32,
}

impl FrameBatcher {
    /// Random augmentation on every access
    pub fn train(config: AugmentationConfig, seed: u64) -> Self {
        let image_size = config.output_size;
        Self {
            transform: Transform::Train {
                augmenter: Augmenter::new(config),
                rng: Arc::new(Mutex::new(ChaCha8Rng::seed_from_u64(seed))),
            },
            image_size,
        }
    }

    /// Normalization only
    pub fn eval(image_size: u32) -> Self {
        Self {
            transform: Transform::Eval,
            image_size,
        }
    }

    pub fn is_train(&self) -> bool {
        matches!(self.transform, Transform::Train { .. })
    }

    /// One CHW `[0, 1]` image per sample.
    fn prepare(&self, items: &[Sample]) -> Vec<Vec<f32>> {
        let size = self.image_size;
        match &self.transform {
            Transform::Train { augmenter, rng } => {
                // One seed per item keeps the parallel map reproducible
                let seeds: Vec<u64> = {
                    let mut rng = rng.lock().unwrap_or_else(|e| e.into_inner());
                    items.iter().map(|_| rng.gen()).collect()
                };
                items
                    .par_iter()
                    .zip(seeds.par_iter())
                    .map(|(item, &seed)| {
                        let mut rng = ChaCha8Rng::seed_from_u64(seed);
                        let img = augmenter.augment(&item.image.to_rgb8(), &mut rng);
                        to_chw_unit(&img)
                    })
                    .collect()
            }
            Transform::Eval => items
                .par_iter()
                .map(|item| {
                    let img = item.image.to_rgb8();
                    if img.dimensions() == (size, size) {
                        to_chw_unit(&img)
                    } else {
                        to_chw_unit(&imageops::resize(&img, size, size, FilterType::Triangle))
                    }
                })
                .collect(),
        }
    }
}

impl<B: Backend> Batcher<B, Sample, FrameBatch<B>> for FrameBatcher {
    fn batch(&self, items: Vec<Sample>, device: &B::Device) -> FrameBatch<B> {
        let batch_size = items.len();
        let size = self.image_size as usize;

        let images_data: Vec<f32> = self.prepare(&items).into_iter().flatten().collect();
        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(images_data, [batch_size, 3, size, size]),
            device,
        );

        let mean = Tensor::<B, 4>::from_floats(TensorData::new(IMAGENET_MEAN.to_vec(), [1, 3, 1, 1]), device);
        let std = Tensor::<B, 4>::from_floats(TensorData::new(IMAGENET_STD.to_vec(), [1, 3, 1, 1]), device);
        let images = (images - mean) / std;

        let targets_data: Vec<i64> = items.iter().map(|item| item.label as i64).collect();
        let targets = Tensor::<B, 1, Int>::from_data(TensorData::new(targets_data, [batch_size]), device);

        FrameBatch { images, targets }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::loader::FrameImage;
    use burn_ndarray::NdArray;
    use image::{Rgb, RgbImage};

    type B = NdArray;

    fn sample(size: u32, label: usize) -> Sample {
        let img = RgbImage::from_fn(size, size, |x, y| Rgb([(x * 16) as u8, (y * 16) as u8, 200]));
        Sample {
            image: FrameImage::from_rgb8(&img),
            label,
        }
    }

    #[test]
    fn test_dataset_access() {
        let ds = FrameDataset::new(vec![sample(4, 0), sample(4, 2), sample(4, 2)]);
        assert_eq!(ds.len(), 3);
        assert_eq!(ds.get(1).map(|s| s.label), Some(2));
        assert!(ds.get(3).is_none());
        assert_eq!(ds.class_distribution(3), vec![1, 0, 2]);
        assert_eq!(ds.gather(&[2, 0]).len(), 2);
    }

    #[test]
    fn test_eval_batch_shape_and_normalization() {
        let device = Default::default();
        let batcher = FrameBatcher::eval(8);
        let items = vec![sample(8, 0), sample(8, 1), sample(8, 2)];

        let batch: FrameBatch<B> = batcher.batch(items, &device);
        assert_eq!(batch.images.dims(), [3, 3, 8, 8]);
        assert_eq!(batch.targets.dims(), [3]);

        let labels: Vec<i64> = batch.targets.into_data().to_vec().unwrap();
        assert_eq!(labels, vec![0, 1, 2]);

        // Blue channel is 200/255 everywhere
        let values: Vec<f32> = batch.images.into_data().to_vec().unwrap();
        let expected = (200.0 / 255.0 - IMAGENET_MEAN[2]) / IMAGENET_STD[2];
        let blue_first = values[2 * 64];
        assert!((blue_first - expected).abs() < 1e-2);
    }

    #[test]
    fn test_eval_is_deterministic() {
        let device = Default::default();
        let batcher = FrameBatcher::eval(8);
        let a: FrameBatch<B> = batcher.batch(vec![sample(8, 0)], &device);
        let b: FrameBatch<B> = batcher.batch(vec![sample(8, 0)], &device);
        let a: Vec<f32> = a.images.into_data().to_vec().unwrap();
        let b: Vec<f32> = b.images.into_data().to_vec().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_train_batch_changes_between_accesses() {
        let device = Default::default();
        let batcher = FrameBatcher::train(AugmentationConfig::default().with_output_size(16), 42);
        assert!(batcher.is_train());

        let a: FrameBatch<B> = batcher.batch(vec![sample(16, 1)], &device);
        let b: FrameBatch<B> = batcher.batch(vec![sample(16, 1)], &device);
        assert_eq!(a.images.dims(), [1, 3, 16, 16]);

        let a: Vec<f32> = a.images.into_data().to_vec().unwrap();
        let b: Vec<f32> = b.images.into_data().to_vec().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_train_stream_is_seeded_and_shared_by_clones() {
        let device = Default::default();
        let config = AugmentationConfig::default().with_output_size(16);
        let to_vec = |batch: FrameBatch<B>| -> Vec<f32> { batch.images.into_data().to_vec().unwrap() };

        let reference = FrameBatcher::train(config.clone(), 7);
        let first = to_vec(reference.batch(vec![sample(16, 0)], &device));
        let second = to_vec(reference.batch(vec![sample(16, 0)], &device));

        // Same seed, same first draw
        let batcher = FrameBatcher::train(config, 7);
        assert_eq!(to_vec(batcher.batch(vec![sample(16, 0)], &device)), first);

        // A clone continues the same stream
        let clone = batcher.clone();
        assert_eq!(to_vec(clone.batch(vec![sample(16, 0)], &device)), second);

        assert!(!FrameBatcher::eval(16).is_train());
    }
}
