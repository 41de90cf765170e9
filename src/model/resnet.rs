//! ResNet body for low-resolution frames
//!
//! Compared with the ImageNet ResNet-34 the stem is a 3x3 stride-1
//! convolution and there is no max-pool, so a 64x64 frame reaches the last
//! stage at 8x8 instead of 2x2. The 1000-way classifier is replaced by a small
//! head: Linear → BatchNorm → ReLU → Dropout → Linear.

use burn::{
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
        BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d,
        Relu,
    },
    tensor::{backend::Backend, Tensor},
};

use super::config::SteeringNetConfig;

pub(crate) fn conv3x3<B: Backend>(
    in_channels: usize,
    out_channels: usize,
    stride: usize,
    device: &B::Device,
) -> Conv2d<B> {
    Conv2dConfig::new([in_channels, out_channels], [3, 3])
        .with_stride([stride, stride])
        .with_padding(PaddingConfig2d::Explicit(1, 1))
        .with_bias(false)
        .init(device)
}

/// 1x1 projection used when a block changes shape
#[derive(Module, Debug)]
pub struct Downsample<B: Backend> {
    pub conv: Conv2d<B>,
    pub bn: BatchNorm<B>,
}

impl<B: Backend> Downsample<B> {
    pub fn new(in_channels: usize, out_channels: usize, stride: usize, device: &B::Device) -> Self {
        let conv = Conv2dConfig::new([in_channels, out_channels], [1, 1])
            .with_stride([stride, stride])
            .with_bias(false)
            .init(device);
        Self {
            conv,
            bn: BatchNormConfig::new(out_channels).init(device),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.bn.forward(self.conv.forward(x))
    }
}

/// Two 3x3 convolutions with a residual connection
#[derive(Module, Debug)]
pub struct BasicBlock<B: Backend> {
    pub conv1: Conv2d<B>,
    pub bn1: BatchNorm<B>,
    pub conv2: Conv2d<B>,
    pub bn2: BatchNorm<B>,
    pub downsample: Option<Downsample<B>>,
    pub relu: Relu,
}

impl<B: Backend> BasicBlock<B> {
    pub fn new(in_channels: usize, out_channels: usize, stride: usize, device: &B::Device) -> Self {
        let downsample = if stride != 1 || in_channels != out_channels {
            Some(Downsample::new(in_channels, out_channels, stride, device))
        } else {
            None
        };

        Self {
            conv1: conv3x3(in_channels, out_channels, stride, device),
            bn1: BatchNormConfig::new(out_channels).init(device),
            conv2: conv3x3(out_channels, out_channels, 1, device),
            bn2: BatchNormConfig::new(out_channels).init(device),
            downsample,
            relu: Relu::new(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let identity = match &self.downsample {
            Some(down) => down.forward(x.clone()),
            None => x.clone(),
        };

        let out = self.conv1.forward(x);
        let out = self.bn1.forward(out);
        let out = self.relu.forward(out);
        let out = self.conv2.forward(out);
        let out = self.bn2.forward(out);

        self.relu.forward(out + identity)
    }
}

/// A residual stage: the first block may stride/project, the rest keep shape
pub fn make_stage<B: Backend>(
    in_channels: usize,
    out_channels: usize,
    num_blocks: usize,
    stride: usize,
    device: &B::Device,
) -> Vec<BasicBlock<B>> {
    let mut blocks = Vec::with_capacity(num_blocks);
    blocks.push(BasicBlock::new(in_channels, out_channels, stride, device));
    for _ in 1..num_blocks {
        blocks.push(BasicBlock::new(out_channels, out_channels, 1, device));
    }
    blocks
}

pub(crate) fn forward_stage<B: Backend>(stage: &[BasicBlock<B>], x: Tensor<B, 4>) -> Tensor<B, 4> {
    stage.iter().fold(x, |x, block| block.forward(x))
}

/// Small classification head
#[derive(Module, Debug)]
pub struct ClassifierHead<B: Backend> {
    pub fc1: Linear<B>,
    pub bn: BatchNorm<B>,
    pub relu: Relu,
    pub dropout: Dropout,
    pub fc2: Linear<B>,
}

impl<B: Backend> ClassifierHead<B> {
    pub fn new(config: &SteeringNetConfig, device: &B::Device) -> Self {
        Self {
            fc1: LinearConfig::new(config.feature_dim(), config.head_hidden).init(device),
            bn: BatchNormConfig::new(config.head_hidden).init(device),
            relu: Relu::new(),
            dropout: DropoutConfig::new(config.dropout).init(),
            fc2: LinearConfig::new(config.head_hidden, config.num_classes).init(device),
        }
    }

    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self.fc1.forward(x);
        let x = self.bn.forward(x);
        let x = self.relu.forward(x);
        let x = self.dropout.forward(x);
        self.fc2.forward(x)
    }
}

/// Steering classifier
#[derive(Module, Debug)]
pub struct SteeringNet<B: Backend> {
    pub conv1: Conv2d<B>,
    pub bn1: BatchNorm<B>,
    pub relu: Relu,
    pub layer1: Vec<BasicBlock<B>>,
    pub layer2: Vec<BasicBlock<B>>,
    pub layer3: Vec<BasicBlock<B>>,
    pub layer4: Vec<BasicBlock<B>>,
    pub avgpool: AdaptiveAvgPool2d,
    pub head: ClassifierHead<B>,
}

impl SteeringNetConfig {
    /// Build a randomly initialized network
    pub fn init<B: Backend>(&self, device: &B::Device) -> SteeringNet<B> {
        let [w1, w2, w3, w4] = self.stage_widths();
        let [n1, n2, n3, n4] = self.blocks;

        SteeringNet {
            conv1: conv3x3(3, self.base_width, 1, device),
            bn1: BatchNormConfig::new(self.base_width).init(device),
            relu: Relu::new(),
            layer1: make_stage(self.base_width, w1, n1, 1, device),
            layer2: make_stage(w1, w2, n2, 2, device),
            layer3: make_stage(w2, w3, n3, 2, device),
            layer4: make_stage(w3, w4, n4, 2, device),
            avgpool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            head: ClassifierHead::new(self, device),
        }
    }
}

impl<B: Backend> SteeringNet<B> {
    /// Forward pass
    ///
    /// # Arguments
    /// * `x` - Normalized images of shape [batch_size, 3, height, width]
    ///
    /// # Returns
    /// * Logits of shape [batch_size, num_classes]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.conv1.forward(x);
        let x = self.bn1.forward(x);
        let x = self.relu.forward(x);

        let x = forward_stage(&self.layer1, x);
        let x = forward_stage(&self.layer2, x);
        let x = forward_stage(&self.layer3, x);
        let x = forward_stage(&self.layer4, x);

        // [B, C, H, W] -> [B, C]
        let x = self.avgpool.forward(x);
        let [batch_size, channels, _, _] = x.dims();
        let x = x.reshape([batch_size, channels]);

        self.head.forward(x)
    }
}
