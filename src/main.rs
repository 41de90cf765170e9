//! Steering Classifier CLI
//!
//! Trains the go/left/right steering classifier. Every flag defaults to the
//! value of the fixed training run, so invoking the binary without arguments
//! reproduces it.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use tracing::info;

use steering_classifier::backend::{backend_name, default_device, TrainingBackend};
use steering_classifier::training::{run_training, TrainingConfig};
use steering_classifier::utils::logging::{init_logging, LogConfig};
use steering_classifier::VERSION;

/// Steering command classifier trainer
///
/// Fine-tunes a ResNet-34 on camera frames sorted into go, left and right
/// directories, keeping the parameters with the lowest validation loss.
#[derive(Parser, Debug)]
#[command(name = "steering_classifier")]
#[command(version)]
#[command(about = "Train a go/left/right steering classifier with Burn", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Directory holding go/, left/ and right/ (default: /image)
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Maximum number of training epochs
    #[arg(short, long, default_value = "120")]
    epochs: usize,

    /// Batch size for training and validation
    #[arg(short, long, default_value = "64")]
    batch_size: usize,

    /// Initial learning rate
    #[arg(short, long, default_value = "0.001")]
    learning_rate: f64,

    /// Epochs without a new best validation loss before stopping
    #[arg(long, default_value = "30")]
    patience: usize,

    /// Random seed for the split, shuffling and augmentation
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Output directory for charts, history and config
    #[arg(short, long, default_value = "output")]
    output_dir: PathBuf,

    /// Best-model checkpoint path (".mpk" is appended)
    #[arg(short, long, default_value = "best_model")]
    checkpoint: PathBuf,

    /// torchvision ResNet-34 state dict used to initialize the backbone
    #[arg(long, default_value = "resnet34-imagenet.pth")]
    pretrained: PathBuf,

    /// Start from random initialization
    #[arg(long, default_value = "false")]
    no_pretrained: bool,
}

impl Cli {
    fn into_config(self) -> TrainingConfig {
        let mut config = TrainingConfig::default();
        if let Some(root) = self.data_dir {
            config = config.with_data_root(root);
        }
        config.max_epochs = self.epochs;
        config.batch_size = self.batch_size;
        config.learning_rate = self.learning_rate;
        config.early_stopping_patience = self.patience;
        config.seed = self.seed;
        config.output_dir = self.output_dir;
        config.checkpoint_path = self.checkpoint;
        config.pretrained_weights = if self.no_pretrained {
            None
        } else {
            Some(self.pretrained)
        };
        config
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::default()
    };

    let _ = init_logging(&log_config);

    print_banner();

    let config = cli.into_config();
    info!("Backend: {}", backend_name());
    for dir in &config.class_dirs {
        info!("Class {} <- {:?}", dir.label, dir.path);
    }

    let summary = run_training::<TrainingBackend>(&config, default_device())?;

    if summary.stopped_early {
        println!(
            "{}",
            format!("Stopped early after {} epochs", summary.history.len()).yellow()
        );
    }
    if let Some(best) = &summary.best {
        println!(
            "{} {:?} (epoch {}, val loss {:.4})",
            "Best model:".green().bold(),
            best.path,
            best.epoch,
            best.val_loss
        );
    }

    Ok(())
}

fn print_banner() {
    println!(
        "{}",
        r#"
 +-------------------------------------------------+
 |   Steering Classifier (go / left / right)       |
 |   ResNet-34 fine-tuning with Burn + Rust        |
 +-------------------------------------------------+
  "#
        .green()
    );
    println!("  v{}\n", VERSION);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_flags_reproduce_defaults() {
        let cli = Cli::parse_from(["steering_classifier"]);
        let config = cli.into_config();
        let defaults = TrainingConfig::default();

        assert_eq!(config.class_dirs, defaults.class_dirs);
        assert_eq!(config.max_epochs, defaults.max_epochs);
        assert_eq!(config.batch_size, defaults.batch_size);
        assert_eq!(config.learning_rate, defaults.learning_rate);
        assert_eq!(config.early_stopping_patience, defaults.early_stopping_patience);
        assert_eq!(config.seed, defaults.seed);
        assert_eq!(config.output_dir, defaults.output_dir);
        assert_eq!(config.checkpoint_path, defaults.checkpoint_path);
        assert_eq!(config.pretrained_weights, defaults.pretrained_weights);
    }

    #[test]
    fn test_overrides() {
        let cli = Cli::parse_from([
            "steering_classifier",
            "--data-dir",
            "/frames",
            "--epochs",
            "5",
            "--no-pretrained",
        ]);
        let config = cli.into_config();
        assert_eq!(config.max_epochs, 5);
        assert_eq!(config.class_dirs[2].path, PathBuf::from("/frames/right"));
        assert!(config.pretrained_weights.is_none());
    }
}
