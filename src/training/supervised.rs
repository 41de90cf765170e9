//! Supervised Training Run
//!
//! Ingest → split → datasets → model → epoch loop → charts → final
//! evaluation of the reloaded best checkpoint.

use std::fs;

use anyhow::{Context, Result};
use burn::{
    optim::{decay::WeightDecayConfig, AdamConfig},
    tensor::backend::AutodiffBackend,
};
use colored::Colorize;
use tracing::info;

use super::state::Checkpoint;
use super::trainer::{evaluate, load_checkpoint, Trainer};
use super::{RunSummary, TrainingConfig};
use crate::dataset::{ingest, DatasetSplits, FrameBatcher, FrameDataset};
use crate::model::{init_model, SteeringNet};
use crate::utils::charts::write_training_curves;
use crate::utils::error::SteeringError;
use crate::CLASS_NAMES;

/// Run training with the given configuration
///
/// # Type Parameters
/// * `B` - The autodiff backend to use (e.g., `Autodiff<NdArray>` or `Autodiff<Cuda>`)
///
/// Any error is fatal for the run: missing class directory, no decodable
/// image, checkpoint I/O failure, or no checkpoint at final evaluation.
pub fn run_training<B>(config: &TrainingConfig, device: B::Device) -> Result<RunSummary>
where
    B: AutodiffBackend,
{
    config.validate()?;
    println!("{}", "Initializing Training...".green().bold());
    println!("  Device: {:?}", device);

    fs::create_dir_all(&config.output_dir)
        .with_context(|| format!("Failed to create {:?}", config.output_dir))?;
    config.save(&config.output_dir.join("config.json"))?;

    // Ingestion
    println!("{}", "Loading Images...".cyan());
    let frames = ingest(&config.class_dirs, config.image_size)?;
    if frames.is_empty() {
        return Err(SteeringError::Dataset("no decodable images found".to_string()).into());
    }
    for (label, count) in frames.class_counts(config.model.num_classes).iter().enumerate() {
        let name = CLASS_NAMES.get(label).copied().unwrap_or("?");
        println!("    {:<6} (label {}): {} images", name, label, count);
    }

    // Split
    let splits = DatasetSplits::from_frames(frames, &config.split_config())?;
    println!(
        "  Split: {} train / {} validation (seed {})",
        splits.train.len(),
        splits.val.len(),
        config.seed
    );
    let train = FrameDataset::new(splits.train);
    let val = FrameDataset::new(splits.val);
    info!(
        "Train classes: {:?} | Val classes: {:?}",
        train.class_distribution(config.model.num_classes),
        val.class_distribution(config.model.num_classes)
    );

    // Model and optimizer
    println!("{}", "Building Model...".cyan());
    let model = init_model::<B>(&config.model, config.pretrained_weights.as_deref(), &device)?;
    let optimizer = AdamConfig::new()
        .with_weight_decay(Some(WeightDecayConfig::new(config.weight_decay as f32)))
        .init::<B, SteeringNet<B>>();

    // Epoch loop
    println!("{}", "Training...".cyan());
    let mut trainer = Trainer::new(model, optimizer, config.clone(), device.clone());
    let stopped_early = trainer.fit(&train, &val)?;
    let history = trainer.state.history.clone();
    let best: Option<Checkpoint> = trainer.state.best.clone();
    drop(trainer);

    // Reporting
    write_training_curves(&history, &config.output_dir)
        .with_context(|| format!("Failed to write charts to {:?}", config.output_dir))?;
    fs::write(
        config.output_dir.join("history.json"),
        serde_json::to_string_pretty(&history)?,
    )?;
    info!("Wrote training curves and history to {:?}", config.output_dir);

    // Final evaluation from the persisted best parameters
    let checkpoint = best.clone().ok_or_else(|| {
        SteeringError::Checkpoint("no checkpoint was written during training".to_string())
    })?;
    let best_model =
        load_checkpoint::<B::InnerBackend>(&config.model, &checkpoint.path, &device)?;
    let final_metrics = evaluate::<B::InnerBackend>(
        &best_model,
        &val,
        &FrameBatcher::eval(config.image_size),
        config.batch_size,
        &device,
    );

    println!(
        "{}",
        format!(
            "Final Val Loss: {:.4} - Final Val Acc: {:.4}",
            final_metrics.loss, final_metrics.accuracy
        )
        .green()
        .bold()
    );
    println!(
        "  Best epoch: {} | Checkpoint: {:?}",
        checkpoint.epoch, checkpoint.path
    );

    Ok(RunSummary {
        history,
        best,
        stopped_early,
        final_val_loss: final_metrics.loss,
        final_val_accuracy: final_metrics.accuracy,
    })
}
