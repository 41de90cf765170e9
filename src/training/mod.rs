//! Training module: configuration, plateau scheduler, run state, trainer and
//! the end-to-end supervised run.

pub mod scheduler;
pub mod state;
pub mod supervised;
pub mod trainer;

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::dataset::augmentation::AugmentationConfig;
use crate::dataset::loader::ClassDir;
use crate::dataset::split::SplitConfig;
use crate::model::SteeringNetConfig;
use crate::utils::error::{Result, SteeringError};
use scheduler::PlateauConfig;
use state::{Checkpoint, EpochMetrics};

pub use supervised::run_training;
pub use trainer::{evaluate, load_checkpoint, PhaseMetrics, Trainer};

/// Every constant of a training run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Source directories and their labels
    pub class_dirs: Vec<ClassDir>,
    /// Side of the square frames
    pub image_size: u32,
    pub batch_size: usize,
    pub max_epochs: usize,
    pub learning_rate: f64,
    /// L2 penalty folded into the Adam gradients
    pub weight_decay: f64,
    pub plateau: PlateauConfig,
    /// Epochs without a new best validation loss before stopping
    pub early_stopping_patience: usize,
    pub val_fraction: f64,
    pub seed: u64,
    /// Best-model file; the recorder adds the `.mpk` extension
    pub checkpoint_path: PathBuf,
    /// Charts, history and the config dump go here
    pub output_dir: PathBuf,
    /// torchvision ResNet-34 state dict
    pub pretrained_weights: Option<PathBuf>,
    pub model: SteeringNetConfig,
    pub augmentation: AugmentationConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            class_dirs: vec![
                ClassDir::new("/image/go", 0),
                ClassDir::new("/image/left", 1),
                ClassDir::new("/image/right", 2),
            ],
            image_size: crate::IMAGE_SIZE as u32,
            batch_size: 64,
            max_epochs: 120,
            learning_rate: 1e-3,
            weight_decay: 1e-3,
            plateau: PlateauConfig::default(),
            early_stopping_patience: 30,
            val_fraction: 0.2,
            seed: 42,
            checkpoint_path: PathBuf::from("best_model"),
            output_dir: PathBuf::from("output"),
            pretrained_weights: Some(PathBuf::from("resnet34-imagenet.pth")),
            model: SteeringNetConfig::new(),
            augmentation: AugmentationConfig::default(),
        }
    }
}

impl TrainingConfig {
    /// Class directories `go`, `left`, `right` under `root`
    pub fn with_data_root<P: AsRef<Path>>(mut self, root: P) -> Self {
        let root = root.as_ref();
        self.class_dirs = crate::CLASS_NAMES
            .iter()
            .enumerate()
            .map(|(label, name)| ClassDir::new(root.join(name), label))
            .collect();
        self
    }

    pub fn split_config(&self) -> SplitConfig {
        SplitConfig {
            val_fraction: self.val_fraction,
            seed: self.seed,
        }
    }

    /// Augmentation settings with the crop size tied to `image_size`
    pub fn augmentation_config(&self) -> AugmentationConfig {
        self.augmentation.clone().with_output_size(self.image_size)
    }

    /// Path of the file the checkpoint recorder writes
    pub fn checkpoint_file(&self) -> PathBuf {
        self.checkpoint_path.with_extension("mpk")
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.class_dirs.is_empty() {
            return Err(SteeringError::Config("no class directories".to_string()));
        }
        if let Some(dir) = self.class_dirs.iter().find(|d| d.label >= self.model.num_classes) {
            return Err(SteeringError::Config(format!(
                "label {} of {:?} is out of range for {} classes",
                dir.label, dir.path, self.model.num_classes
            )));
        }
        if self.image_size == 0 {
            return Err(SteeringError::Config("image size must be positive".to_string()));
        }
        if self.batch_size == 0 {
            return Err(SteeringError::Config("batch size must be positive".to_string()));
        }
        if self.max_epochs == 0 {
            return Err(SteeringError::Config("max epochs must be positive".to_string()));
        }
        if !(self.val_fraction > 0.0 && self.val_fraction < 1.0) {
            return Err(SteeringError::Config(format!(
                "validation fraction must be in (0, 1), got {}",
                self.val_fraction
            )));
        }
        if self.learning_rate <= 0.0 {
            return Err(SteeringError::Config("learning rate must be positive".to_string()));
        }
        self.model.validate()
    }

    /// Write as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// Result of a full run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub history: Vec<EpochMetrics>,
    pub best: Option<Checkpoint>,
    pub stopped_early: bool,
    /// Validation metrics of the reloaded best checkpoint
    pub final_val_loss: f64,
    pub final_val_accuracy: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = TrainingConfig::default();
        assert_eq!(config.class_dirs[0], ClassDir::new("/image/go", 0));
        assert_eq!(config.class_dirs[2], ClassDir::new("/image/right", 2));
        assert_eq!(config.batch_size, 64);
        assert_eq!(config.max_epochs, 120);
        assert_eq!(config.early_stopping_patience, 30);
        assert_eq!(config.plateau.patience, 4);
        assert_eq!(config.checkpoint_file(), PathBuf::from("best_model.mpk"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_data_root() {
        let config = TrainingConfig::default().with_data_root("/data");
        assert_eq!(config.class_dirs[1], ClassDir::new("/data/left", 1));
    }

    #[test]
    fn test_validate_rejects() {
        let mut config = TrainingConfig::default();
        config.batch_size = 0;
        assert!(matches!(config.validate(), Err(SteeringError::Config(_))));

        let mut config = TrainingConfig::default();
        config.val_fraction = 1.0;
        assert!(config.validate().is_err());

        let mut config = TrainingConfig::default();
        config.class_dirs.clear();
        assert!(config.validate().is_err());

        let mut config = TrainingConfig::default();
        config.class_dirs.push(ClassDir::new("/image/back", 3));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_load_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        let mut config = TrainingConfig::default();
        config.seed = 7;
        config.save(&path).unwrap();

        let loaded = TrainingConfig::load(&path).unwrap();
        assert_eq!(loaded.seed, 7);
        assert_eq!(loaded.model.blocks, [3, 4, 6, 3]);
    }
}
