//! Training-time image augmentation
//!
//! Works on 8-bit RGB images, in this order:
//!
//! 1. random rotation in `±rotation_degrees` about the image centre
//! 2. random integer translation up to `translate_fraction` of each side
//! 3. random-resized-crop back to `output_size`
//!
//! Rotation and translation use nearest-neighbour sampling and fill
//! uncovered pixels with black. Validation never goes through here.

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Configuration for data augmentation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AugmentationConfig {
    /// Maximum rotation angle in degrees (applies ±rotation_degrees)
    pub rotation_degrees: f32,
    /// Maximum shift as a fraction of width/height
    pub translate_fraction: f32,
    /// Range of the crop area relative to the image area
    pub crop_scale: (f32, f32),
    /// Range of the crop aspect ratio (width / height)
    pub crop_ratio: (f32, f32),
    /// Square side of the produced image
    pub output_size: u32,
}

impl Default for AugmentationConfig {
    fn default() -> Self {
        Self {
            rotation_degrees: 20.0,
            translate_fraction: 0.05,
            crop_scale: (0.9, 1.0),
            crop_ratio: (3.0 / 4.0, 4.0 / 3.0),
            output_size: crate::IMAGE_SIZE as u32,
        }
    }
}

impl AugmentationConfig {
    pub fn with_output_size(mut self, output_size: u32) -> Self {
        self.output_size = output_size;
        self
    }

    /// A configuration that leaves a square `output_size` image untouched
    pub fn identity(output_size: u32) -> Self {
        Self {
            rotation_degrees: 0.0,
            translate_fraction: 0.0,
            crop_scale: (1.0, 1.0),
            crop_ratio: (1.0, 1.0),
            output_size,
        }
    }
}

/// Crop window picked by the random-resized-crop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropWindow {
    pub top: u32,
    pub left: u32,
    pub height: u32,
    pub width: u32,
}

/// Uniform sample in `[lo, hi)`, or `lo` when the range is empty.
fn uniform(rng: &mut ChaCha8Rng, lo: f32, hi: f32) -> f32 {
    if hi > lo {
        rng.gen_range(lo..hi)
    } else {
        lo
    }
}

/// Image augmenter that applies random transformations
#[derive(Clone, Debug)]
pub struct Augmenter {
    config: AugmentationConfig,
}

impl Augmenter {
    pub fn new(config: AugmentationConfig) -> Self {
        Self { config }
    }

    /// Apply the full random pipeline
    pub fn augment(&self, img: &RgbImage, rng: &mut ChaCha8Rng) -> RgbImage {
        let max_angle = self.config.rotation_degrees;
        let angle = uniform(rng, -max_angle, max_angle);
        let rotated = rotate_nearest(img, angle);

        let (w, h) = rotated.dimensions();
        let max_dx = self.config.translate_fraction * w as f32;
        let max_dy = self.config.translate_fraction * h as f32;
        let dx = uniform(rng, -max_dx, max_dx).round() as i64;
        let dy = uniform(rng, -max_dy, max_dy).round() as i64;
        let shifted = translate(&rotated, dx, dy);

        let window = self.crop_window(shifted.width(), shifted.height(), rng);
        resized_crop(&shifted, window, self.config.output_size)
    }

    /// Pick the crop window: ten tries at a random area/aspect, then a
    /// centre crop clamped to the allowed aspect range.
    pub fn crop_window(&self, width: u32, height: u32, rng: &mut ChaCha8Rng) -> CropWindow {
        let area = (width * height) as f32;
        let (scale_lo, scale_hi) = self.config.crop_scale;
        let (ratio_lo, ratio_hi) = self.config.crop_ratio;
        let (log_lo, log_hi) = (ratio_lo.ln(), ratio_hi.ln());

        for _ in 0..10 {
            let target_area = area * uniform(rng, scale_lo, scale_hi);
            let aspect = uniform(rng, log_lo, log_hi).exp();

            let w = (target_area * aspect).sqrt().round() as u32;
            let h = (target_area / aspect).sqrt().round() as u32;

            if 0 < w && w <= width && 0 < h && h <= height {
                let top = rng.gen_range(0..=height - h);
                let left = rng.gen_range(0..=width - w);
                return CropWindow {
                    top,
                    left,
                    height: h,
                    width: w,
                };
            }
        }

        let in_ratio = width as f32 / height as f32;
        let (w, h) = if in_ratio < ratio_lo {
            (width, (width as f32 / ratio_lo).round() as u32)
        } else if in_ratio > ratio_hi {
            ((height as f32 * ratio_hi).round() as u32, height)
        } else {
            (width, height)
        };
        CropWindow {
            top: (height - h) / 2,
            left: (width - w) / 2,
            height: h,
            width: w,
        }
    }
}

/// Rotate counter-clockwise by `angle_degrees` about the centre.
pub fn rotate_nearest(img: &RgbImage, angle_degrees: f32) -> RgbImage {
    if angle_degrees == 0.0 {
        return img.clone();
    }

    let (width, height) = img.dimensions();
    let cx = (width as f32 - 1.0) / 2.0;
    let cy = (height as f32 - 1.0) / 2.0;
    let (sin_a, cos_a) = angle_degrees.to_radians().sin_cos();

    let mut output = RgbImage::new(width, height);
    for (x, y, pixel) in output.enumerate_pixels_mut() {
        let dx = x as f32 - cx;
        let dy = y as f32 - cy;

        // Inverse mapping: output pixel -> source pixel
        let src_x = (cx + dx * cos_a - dy * sin_a).round();
        let src_y = (cy + dx * sin_a + dy * cos_a).round();

        if src_x >= 0.0 && src_y >= 0.0 && src_x < width as f32 && src_y < height as f32 {
            *pixel = *img.get_pixel(src_x as u32, src_y as u32);
        }
    }
    output
}

/// Shift by whole pixels; positive `dx` moves content right.
pub fn translate(img: &RgbImage, dx: i64, dy: i64) -> RgbImage {
    if dx == 0 && dy == 0 {
        return img.clone();
    }

    let (width, height) = img.dimensions();
    RgbImage::from_fn(width, height, |x, y| {
        let sx = x as i64 - dx;
        let sy = y as i64 - dy;
        if sx >= 0 && sy >= 0 && sx < width as i64 && sy < height as i64 {
            *img.get_pixel(sx as u32, sy as u32)
        } else {
            Rgb([0, 0, 0])
        }
    })
}

/// Crop `window` and resize it to `size`x`size` with bilinear filtering.
pub fn resized_crop(img: &RgbImage, window: CropWindow, size: u32) -> RgbImage {
    let full = window.top == 0
        && window.left == 0
        && window.width == img.width()
        && window.height == img.height();
    if full && window.width == size && window.height == size {
        return img.clone();
    }

    let crop = imageops::crop_imm(img, window.left, window.top, window.width, window.height).to_image();
    imageops::resize(&crop, size, size, FilterType::Triangle)
}

/// Scale to `[0, 1]` and lay out channel-first.
pub fn to_chw_unit(img: &RgbImage) -> Vec<f32> {
    let (width, height) = img.dimensions();
    let plane = (width * height) as usize;
    let mut data = vec![0.0f32; 3 * plane];

    for (x, y, pixel) in img.enumerate_pixels() {
        let idx = (y * width + x) as usize;
        for c in 0..3 {
            data[c * plane + idx] = pixel[c] as f32 / 255.0;
        }
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn create_test_image(size: u32) -> RgbImage {
        RgbImage::from_fn(size, size, |x, y| Rgb([(x * 4) as u8, (y * 4) as u8, 128]))
    }

    #[test]
    fn test_augment_output_shape() {
        let aug = Augmenter::new(AugmentationConfig::default());
        let img = create_test_image(64);
        let mut rng = ChaCha8Rng::seed_from_u64(42);

        for _ in 0..20 {
            let out = aug.augment(&img, &mut rng);
            assert_eq!(out.dimensions(), (64, 64));
        }
    }

    #[test]
    fn test_augment_varies_per_access() {
        let aug = Augmenter::new(AugmentationConfig::default());
        let img = create_test_image(64);
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let first = aug.augment(&img, &mut rng);
        let second = aug.augment(&img, &mut rng);
        assert_ne!(first, second);
    }

    #[test]
    fn test_identity_config_is_noop() {
        let aug = Augmenter::new(AugmentationConfig::identity(32));
        let img = create_test_image(32);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        assert_eq!(aug.augment(&img, &mut rng), img);
    }

    #[test]
    fn test_rotate_half_turn() {
        let img = create_test_image(8);
        let rotated = rotate_nearest(&img, 180.0);
        assert_eq!(rotated.get_pixel(0, 0), img.get_pixel(7, 7));
        assert_eq!(rotated.get_pixel(7, 0), img.get_pixel(0, 7));
    }

    #[test]
    fn test_rotate_fills_corners_black() {
        let img = RgbImage::from_pixel(16, 16, Rgb([255, 255, 255]));
        let rotated = rotate_nearest(&img, 45.0);
        assert_eq!(*rotated.get_pixel(0, 0), Rgb([0, 0, 0]));
        assert_eq!(*rotated.get_pixel(8, 8), Rgb([255, 255, 255]));
    }

    #[test]
    fn test_translate() {
        let img = create_test_image(8);
        let shifted = translate(&img, 2, -1);
        assert_eq!(shifted.get_pixel(2, 0), img.get_pixel(0, 1));
        assert_eq!(*shifted.get_pixel(0, 0), Rgb([0, 0, 0]));
        assert_eq!(*shifted.get_pixel(5, 7), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_crop_window_bounds() {
        let aug = Augmenter::new(AugmentationConfig::default());
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        for _ in 0..100 {
            let w = aug.crop_window(64, 64, &mut rng);
            assert!(w.width > 0 && w.height > 0);
            assert!(w.left + w.width <= 64);
            assert!(w.top + w.height <= 64);
            // Area between 0.9 and 1.0 of the frame, up to rounding
            let area = (w.width * w.height) as f32 / 4096.0;
            assert!(area > 0.85 && area <= 1.0, "area {}", area);
        }
    }

    #[test]
    fn test_crop_window_fallback_is_centered() {
        let config = AugmentationConfig {
            crop_scale: (2.0, 2.0),
            ..AugmentationConfig::default()
        };
        let aug = Augmenter::new(config);
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let w = aug.crop_window(64, 64, &mut rng);
        assert_eq!(
            w,
            CropWindow {
                top: 0,
                left: 0,
                height: 64,
                width: 64
            }
        );
    }

    #[test]
    fn test_to_chw_unit() {
        let img = RgbImage::from_fn(2, 1, |x, _| Rgb([if x == 0 { 255 } else { 0 }, 51, 0]));
        let data = to_chw_unit(&img);
        assert_eq!(data.len(), 6);
        assert_eq!(data[0], 1.0);
        assert_eq!(data[1], 0.0);
        assert!((data[2] - 0.2).abs() < 1e-6);
        assert!(data.iter().all(|v| (0.0..=1.0).contains(v)));
    }
}
