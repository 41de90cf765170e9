//! Frame ingestion
//!
//! Decodes every file of the go/left/right directories into an RGB frame whose
//! channels are rescaled from `[0, 255]` to `[-1, 1]`.

use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use image::{ImageReader, RgbImage};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::utils::error::{Result, SteeringError};

/// A labelled source directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassDir {
    pub path: PathBuf,
    pub label: usize,
}

impl ClassDir {
    pub fn new<P: Into<PathBuf>>(path: P, label: usize) -> Self {
        Self {
            path: path.into(),
            label,
        }
    }
}

/// Map an 8-bit intensity to `[-1, 1]`.
#[inline]
pub fn encode_pixel(value: u8) -> f32 {
    value as f32 / 127.5 - 1.0
}

/// Map a `[-1, 1]` intensity back to 8 bits (rounded, clamped).
#[inline]
pub fn decode_pixel(value: f32) -> u8 {
    ((value + 1.0) * 127.5).round().clamp(0.0, 255.0) as u8
}

/// An RGB frame stored in the symmetric `[-1, 1]` range, HWC layout.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameImage {
    pub width: u32,
    pub height: u32,
    pub data: Vec<f32>,
}

impl FrameImage {
    pub fn from_rgb8(img: &RgbImage) -> Self {
        let (width, height) = img.dimensions();
        let data = img.as_raw().iter().map(|&v| encode_pixel(v)).collect();
        Self {
            width,
            height,
            data,
        }
    }

    /// Restore the 8-bit image the augmentation stage works on.
    pub fn to_rgb8(&self) -> RgbImage {
        let raw: Vec<u8> = self.data.iter().map(|&v| decode_pixel(v)).collect();
        // Length is width * height * 3 by construction
        RgbImage::from_raw(self.width, self.height, raw)
            .unwrap_or_else(|| RgbImage::new(self.width, self.height))
    }
}

/// Output of ingestion: parallel image/label sequences
#[derive(Debug, Clone, Default)]
pub struct IngestedFrames {
    pub images: Vec<FrameImage>,
    pub labels: Vec<usize>,
    /// Files that could not be decoded
    pub skipped: usize,
}

impl IngestedFrames {
    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Number of frames per label, indexed by label
    pub fn class_counts(&self, num_classes: usize) -> Vec<usize> {
        let mut counts = vec![0usize; num_classes];
        for &label in &self.labels {
            if label < num_classes {
                counts[label] += 1;
            }
        }
        counts
    }
}

/// Entries directly inside `dir` that are not directories (symlinks
/// resolved), sorted by file name.
fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(SteeringError::PathNotFound(dir.to_path_buf()));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| SteeringError::Dataset(e.to_string()))?;
        // `Path::is_dir` follows links; a dangling link is kept and skipped at decode
        if !entry.path().is_dir() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn decode_frame(path: &Path, image_size: u32) -> Result<FrameImage> {
    let img = ImageReader::open(path)?
        .with_guessed_format()?
        .decode()
        .map_err(|e| SteeringError::ImageLoad(path.to_path_buf(), e.to_string()))?;

    let img = if img.width() != image_size || img.height() != image_size {
        img.resize_exact(image_size, image_size, FilterType::Triangle)
    } else {
        img
    };

    Ok(FrameImage::from_rgb8(&img.to_rgb8()))
}

/// Decode every file of every class directory.
///
/// Files are visited in file-name order, directories in the order given.
/// Undecodable files are skipped. A missing directory is an error.
pub fn ingest(dirs: &[ClassDir], image_size: u32) -> Result<IngestedFrames> {
    let mut jobs: Vec<(PathBuf, usize)> = Vec::new();
    for dir in dirs {
        let files = list_files(&dir.path)?;
        debug!("{:?} (label {}): {} files", dir.path, dir.label, files.len());
        jobs.extend(files.into_iter().map(|p| (p, dir.label)));
    }

    let pb = ProgressBar::new(jobs.len() as u64);
    if let Ok(style) = ProgressStyle::default_bar().template(
        "  {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})",
    ) {
        pb.set_style(style.progress_chars("#>-"));
    }

    // Order of `collect` matches `jobs`, so ingestion stays deterministic
    let decoded: Vec<Option<(FrameImage, usize)>> = jobs
        .par_iter()
        .map(|(path, label)| {
            let result = match decode_frame(path, image_size) {
                Ok(frame) => Some((frame, *label)),
                Err(e) => {
                    debug!("Skipping {:?}: {}", path, e);
                    None
                }
            };
            pb.inc(1);
            result
        })
        .collect();
    pb.finish_and_clear();

    let mut out = IngestedFrames::default();
    for item in decoded {
        match item {
            Some((frame, label)) => {
                out.images.push(frame);
                out.labels.push(label);
            }
            None => out.skipped += 1,
        }
    }

    if out.skipped > 0 {
        info!("Skipped {} undecodable files", out.skipped);
    }
    info!("Total number of images = {}", out.len());

    Ok(out)
}
