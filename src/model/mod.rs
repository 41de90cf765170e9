//! Model module: the adapted ResNet-34 steering network
//!
//! - `config`: `SteeringNetConfig` hyper-parameters
//! - `resnet`: residual body with a stride-1 stem and the small head
//! - `pretrained`: ImageNet weight loading and transplant

pub mod config;
pub mod pretrained;
pub mod resnet;

// Re-export main types for convenience
pub use config::SteeringNetConfig;
pub use pretrained::{init_model, WeightsSource};
pub use resnet::SteeringNet;
