//! Logging
//!
//! `tracing` subscriber setup and the per-epoch training logger.

use std::time::Instant;

use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Console logging setup
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Level used when `RUST_LOG` is not set
    pub level: Level,
    /// Show module paths
    pub include_target: bool,
    pub include_thread_ids: bool,
    pub ansi_colors: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            include_target: false,
            include_thread_ids: false,
            ansi_colors: true,
        }
    }
}

impl LogConfig {
    /// DEBUG with targets and thread ids (batch losses, skipped files)
    pub fn verbose() -> Self {
        Self {
            level: Level::DEBUG,
            include_target: true,
            include_thread_ids: true,
            ..Self::default()
        }
    }

    /// Filter directive derived from `level`
    pub fn directive(&self) -> String {
        self.level.as_str().to_lowercase()
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.directive()))
    }
}

/// Install the global subscriber. `RUST_LOG` overrides `config.level`.
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> Result<(), String> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(config.env_filter())
        .with_ansi(config.ansi_colors)
        .with_target(config.include_target)
        .with_thread_ids(config.include_thread_ids)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| format!("Failed to initialize logging: {}", e))
}

/// Format the per-epoch summary line.
///
/// `epoch` is 1-based.
pub fn format_epoch_line(
    epoch: usize,
    max_epochs: usize,
    train_loss: f64,
    train_accuracy: f64,
    val_loss: f64,
    val_accuracy: f64,
    learning_rate: f64,
) -> String {
    format!(
        "Epoch {}/{} - Train Loss: {:.4}, Train Acc: {:.4} | Val Loss: {:.4}, Val Acc: {:.4} | LR: {:.6}",
        epoch, max_epochs, train_loss, train_accuracy, val_loss, val_accuracy, learning_rate
    )
}

/// Training progress logger
pub struct TrainingLogger {
    total_epochs: usize,
    epoch_start: Instant,
    training_start: Instant,
}

impl TrainingLogger {
    /// Create a new training logger
    pub fn new(total_epochs: usize) -> Self {
        Self {
            total_epochs,
            epoch_start: Instant::now(),
            training_start: Instant::now(),
        }
    }

    /// Mark the start of an epoch
    pub fn start_epoch(&mut self, epoch: usize) {
        self.epoch_start = Instant::now();
        tracing::debug!("Epoch {}/{} started", epoch, self.total_epochs);
    }

    /// Log end of an epoch with metrics
    pub fn end_epoch(
        &self,
        epoch: usize,
        train_loss: f64,
        train_accuracy: f64,
        val_loss: f64,
        val_accuracy: f64,
        learning_rate: f64,
    ) {
        tracing::info!(
            "{}",
            format_epoch_line(
                epoch,
                self.total_epochs,
                train_loss,
                train_accuracy,
                val_loss,
                val_accuracy,
                learning_rate,
            )
        );
        tracing::debug!(
            "Epoch {} took {:.1}s",
            epoch,
            self.epoch_start.elapsed().as_secs_f64()
        );
    }

    /// Log a new best model
    pub fn log_new_best(&self, epoch: usize, val_loss: f64) {
        tracing::debug!("New best model at epoch {} (val loss {:.4})", epoch, val_loss);
    }

    /// Log early stopping
    pub fn log_early_stop(&self, epoch: usize, streak: usize) {
        tracing::info!("Early stopping triggered!");
        tracing::debug!(
            "Stopped at epoch {} after {} epochs without improvement",
            epoch,
            streak
        );
    }

    /// Log training completion
    pub fn log_complete(&self, epochs_run: usize, best_val_loss: f64) {
        tracing::info!(
            "Training complete: {} epochs in {} | Best val loss: {:.4}",
            epochs_run,
            super::format_duration(self.training_start.elapsed().as_secs_f64()),
            best_val_loss
        );
    }
}
