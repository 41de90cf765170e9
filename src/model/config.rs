//! Model Configuration Module
//!
//! Hyper-parameters of the steering network. Defaults describe a ResNet-34
//! body (`[3, 4, 6, 3]` basic blocks, 64 base channels) under a
//! 512 → 32 → 3 classification head.

use burn::config::Config;

use crate::utils::error::SteeringError;

/// Block counts of the torchvision ResNet-34
pub const RESNET34_BLOCKS: [usize; 4] = [3, 4, 6, 3];

/// Configuration for [`SteeringNet`](super::SteeringNet)
#[derive(Config, Debug)]
pub struct SteeringNetConfig {
    /// Number of output classes
    #[config(default = "3")]
    pub num_classes: usize,

    /// Basic blocks in each of the four residual stages
    #[config(default = "[3, 4, 6, 3]")]
    pub blocks: [usize; 4],

    /// Channels of the stem and first stage; doubled at every later stage
    #[config(default = "64")]
    pub base_width: usize,

    /// Width of the hidden layer of the head
    #[config(default = "32")]
    pub head_hidden: usize,

    /// Dropout before the final linear layer
    #[config(default = "0.6")]
    pub dropout: f64,
}

impl SteeringNetConfig {
    /// Channels out of the last stage (and into the head)
    pub fn feature_dim(&self) -> usize {
        self.base_width * 8
    }

    /// Stage widths, stem to last stage
    pub fn stage_widths(&self) -> [usize; 4] {
        let b = self.base_width;
        [b, b * 2, b * 4, b * 8]
    }

    /// Whether the body matches the ImageNet ResNet-34 layout
    pub fn is_resnet34(&self) -> bool {
        self.blocks == RESNET34_BLOCKS && self.base_width == 64
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::utils::error::Result<()> {
        if self.num_classes < 2 {
            return Err(SteeringError::Config(format!(
                "num_classes must be at least 2, got {}",
                self.num_classes
            )));
        }
        if self.blocks.iter().any(|&n| n == 0) {
            return Err(SteeringError::Config(
                "every residual stage needs at least one block".to_string(),
            ));
        }
        if self.base_width == 0 || self.head_hidden == 0 {
            return Err(SteeringError::Config(
                "layer widths must be positive".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(SteeringError::Config(format!(
                "dropout must be in [0, 1), got {}",
                self.dropout
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_resnet34() {
        let config = SteeringNetConfig::new();
        assert_eq!(config.num_classes, 3);
        assert_eq!(config.head_hidden, 32);
        assert_eq!(config.dropout, 0.6);
        assert_eq!(config.feature_dim(), 512);
        assert!(config.is_resnet34());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_small_config_is_not_resnet34() {
        let config = SteeringNetConfig::new()
            .with_blocks([1, 1, 1, 1])
            .with_base_width(4);
        assert!(!config.is_resnet34());
        assert_eq!(config.stage_widths(), [4, 8, 16, 32]);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(SteeringNetConfig::new().with_dropout(1.0).validate().is_err());
        assert!(SteeringNetConfig::new().with_blocks([3, 0, 6, 3]).validate().is_err());
        assert!(SteeringNetConfig::new().with_num_classes(1).validate().is_err());
    }

    #[test]
    fn test_json_round_trip() {
        let config = SteeringNetConfig::new().with_blocks([2, 2, 2, 2]).with_dropout(0.5);
        let json = serde_json::to_string(&config).unwrap();
        let back: SteeringNetConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.blocks, [2, 2, 2, 2]);
        assert_eq!(back.dropout, 0.5);
        assert_eq!(back.head_hidden, 32);
    }
}
