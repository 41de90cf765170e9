//! ImageNet weights for the residual body
//!
//! Reads a torchvision `resnet34` state dict (`.pth`) into a module with the
//! torchvision layout, then moves the stem batch-norm and the four residual
//! stages into a fresh [`SteeringNet`]. The 3x3 stem convolution and the head
//! keep their random initialization.

use std::path::{Path, PathBuf};

use burn::tensor::backend::Backend;
use tracing::warn;

use super::config::SteeringNetConfig;
use super::resnet::SteeringNet;
use crate::utils::error::{Result, SteeringError};

#[cfg(feature = "pretrained")]
mod torchvision {
    use std::path::Path;

    use burn::{
        module::Module,
        nn::{
            conv::{Conv2d, Conv2dConfig},
            BatchNorm, BatchNormConfig, Linear, LinearConfig, PaddingConfig2d,
        },
        record::{FullPrecisionSettings, Recorder},
        tensor::backend::Backend,
    };
    use burn_import::pytorch::{LoadArgs, PyTorchFileRecorder};

    use crate::model::config::RESNET34_BLOCKS;
    use crate::model::resnet::{make_stage, BasicBlock};
    use crate::utils::error::{Result, ResultExt};

    /// The ImageNet ResNet-34, field names matching the torchvision keys
    #[derive(Module, Debug)]
    pub struct ResNet34<B: Backend> {
        pub conv1: Conv2d<B>,
        pub bn1: BatchNorm<B>,
        pub layer1: Vec<BasicBlock<B>>,
        pub layer2: Vec<BasicBlock<B>>,
        pub layer3: Vec<BasicBlock<B>>,
        pub layer4: Vec<BasicBlock<B>>,
        pub fc: Linear<B>,
    }

    impl<B: Backend> ResNet34<B> {
        fn new(device: &B::Device) -> Self {
            let [n1, n2, n3, n4] = RESNET34_BLOCKS;
            Self {
                conv1: Conv2dConfig::new([3, 64], [7, 7])
                    .with_stride([2, 2])
                    .with_padding(PaddingConfig2d::Explicit(3, 3))
                    .with_bias(false)
                    .init(device),
                bn1: BatchNormConfig::new(64).init(device),
                layer1: make_stage(64, 64, n1, 1, device),
                layer2: make_stage(64, 128, n2, 2, device),
                layer3: make_stage(128, 256, n3, 2, device),
                layer4: make_stage(256, 512, n4, 2, device),
                fc: LinearConfig::new(512, 1000).init(device),
            }
        }

        pub fn load(path: &Path, device: &B::Device) -> Result<Self> {
            // torchvision names the projection `downsample.{0,1}`
            let args = LoadArgs::new(path.to_path_buf())
                .with_key_remap("(.+)\\.downsample\\.0\\.(.+)", "$1.downsample.conv.$2")
                .with_key_remap("(.+)\\.downsample\\.1\\.(.+)", "$1.downsample.bn.$2");

            let record = PyTorchFileRecorder::<FullPrecisionSettings>::default()
                .load(args, device)
                .model_context(|| format!("Failed to read {:?}", path))?;

            Ok(Self::new(device).load_record(record))
        }
    }
}

/// Where the residual body comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WeightsSource {
    /// Existing state dict on disk
    File(PathBuf),
    /// No path configured
    NotConfigured,
    /// Configured path does not exist
    Missing(PathBuf),
}

impl WeightsSource {
    pub fn resolve(weights: Option<&Path>) -> Self {
        match weights {
            None => WeightsSource::NotConfigured,
            Some(path) if path.exists() => WeightsSource::File(path.to_path_buf()),
            Some(path) => WeightsSource::Missing(path.to_path_buf()),
        }
    }
}

/// Build the network, taking the body from `weights` when given.
///
/// No configured path, a missing file, or a build without the `pretrained`
/// feature falls back to random initialization with a warning. A file that
/// exists but cannot be read is an error.
pub fn init_model<B: Backend>(
    config: &SteeringNetConfig,
    weights: Option<&Path>,
    device: &B::Device,
) -> Result<SteeringNet<B>> {
    config.validate()?;
    let model = config.init::<B>(device);

    let path = match WeightsSource::resolve(weights) {
        WeightsSource::File(path) => path,
        WeightsSource::NotConfigured => {
            warn!("No pretrained weights configured, using random initialization");
            return Ok(model);
        }
        WeightsSource::Missing(path) => {
            warn!(
                "Pretrained weights {:?} not found, using random initialization",
                path
            );
            return Ok(model);
        }
    };
    if !config.is_resnet34() {
        return Err(SteeringError::Config(format!(
            "Pretrained ResNet-34 weights need blocks {:?} and base width 64, got {:?} / {}",
            super::config::RESNET34_BLOCKS,
            config.blocks,
            config.base_width
        )));
    }

    transplant(model, &path, device)
}

#[cfg(feature = "pretrained")]
fn transplant<B: Backend>(model: SteeringNet<B>, path: &Path, device: &B::Device) -> Result<SteeringNet<B>> {
    let backbone = torchvision::ResNet34::<B>::load(path, device)?;
    tracing::info!("Loaded ImageNet ResNet-34 body from {:?}", path);

    Ok(SteeringNet {
        bn1: backbone.bn1,
        layer1: backbone.layer1,
        layer2: backbone.layer2,
        layer3: backbone.layer3,
        layer4: backbone.layer4,
        ..model
    })
}

#[cfg(not(feature = "pretrained"))]
fn transplant<B: Backend>(model: SteeringNet<B>, path: &Path, _device: &B::Device) -> Result<SteeringNet<B>> {
    warn!(
        "Built without the `pretrained` feature, ignoring {:?} and using random initialization",
        path
    );
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use tempfile::TempDir;

    type TestBackend = NdArray;

    fn tiny_config() -> SteeringNetConfig {
        SteeringNetConfig::new()
            .with_blocks([1, 1, 1, 1])
            .with_base_width(4)
    }

    #[test]
    fn test_no_weights_gives_random_model() {
        let device = Default::default();
        let model = init_model::<TestBackend>(&tiny_config(), None, &device).unwrap();
        assert_eq!(model.layer1.len(), 1);
    }

    #[test]
    fn test_weights_source_resolution() {
        let dir = TempDir::new().unwrap();
        let present = dir.path().join("resnet34.pth");
        std::fs::write(&present, b"weights").unwrap();
        let absent = dir.path().join("other.pth");

        assert_eq!(WeightsSource::resolve(None), WeightsSource::NotConfigured);
        assert_eq!(WeightsSource::resolve(Some(&absent)), WeightsSource::Missing(absent.clone()));
        assert_eq!(WeightsSource::resolve(Some(&present)), WeightsSource::File(present.clone()));
    }

    #[test]
    fn test_missing_weights_file_falls_back() {
        let dir = TempDir::new().unwrap();
        let device = Default::default();
        let path = dir.path().join("resnet34.pth");
        assert!(init_model::<TestBackend>(&tiny_config(), Some(&path), &device).is_ok());
    }

    #[test]
    fn test_weights_with_wrong_layout_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("resnet34.pth");
        std::fs::write(&path, b"placeholder").unwrap();

        let device = Default::default();
        let err = init_model::<TestBackend>(&tiny_config(), Some(&path), &device).unwrap_err();
        assert!(matches!(err, SteeringError::Config(_)));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let device = Default::default();
        let config = tiny_config().with_dropout(1.5);
        assert!(init_model::<TestBackend>(&config, None, &device).is_err());
    }
}
