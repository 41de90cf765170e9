//! SVG line charts for training curves
//!
//! Renders the train/validation loss and accuracy histories as standalone
//! SVG files next to the other run artifacts.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use crate::training::state::EpochMetrics;

const CHART_WIDTH: f64 = 800.0;
const CHART_HEIGHT: f64 = 500.0;
const MARGIN_TOP: f64 = 60.0;
const MARGIN_RIGHT: f64 = 40.0;
const MARGIN_BOTTOM: f64 = 80.0;
const MARGIN_LEFT: f64 = 80.0;
const Y_TICKS: usize = 5;

/// Train curve colour
pub const COLOR_TRAIN: &str = "#2ecc71";
/// Validation curve colour
pub const COLOR_VAL: &str = "#e74c3c";
const COLOR_GRID: &str = "#ecf0f1";
const COLOR_AXIS: &str = "#2c3e50";
const COLOR_TEXT: &str = "#2c3e50";

/// A named polyline
#[derive(Debug, Clone)]
pub struct DataSeries {
    pub name: String,
    pub values: Vec<f64>,
    pub color: String,
}

impl DataSeries {
    pub fn new(name: &str, values: Vec<f64>, color: &str) -> Self {
        Self {
            name: name.to_string(),
            values,
            color: color.to_string(),
        }
    }
}

/// How the y-axis is bounded
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum YAxis {
    /// Fixed `[0, 1]`, for accuracies
    Unit,
    /// `[0, max]` with max taken from the data, for losses
    FromZero,
}

/// Render a line chart of per-epoch values (x = epoch, starting at 1).
///
/// Non-finite values are left out of the path.
pub fn render_line_chart(title: &str, y_label: &str, y_axis: YAxis, series: &[DataSeries]) -> String {
    let plot_width = CHART_WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
    let plot_height = CHART_HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;

    let n_epochs = series.iter().map(|s| s.values.len()).max().unwrap_or(0);
    let x_span = (n_epochs.max(2) - 1) as f64;
    let y_max = match y_axis {
        YAxis::Unit => 1.0,
        YAxis::FromZero => {
            let max = series
                .iter()
                .flat_map(|s| s.values.iter().copied())
                .filter(|v| v.is_finite())
                .fold(0.0f64, f64::max);
            if max > 0.0 {
                max * 1.05
            } else {
                1.0
            }
        }
    };

    let to_x = |epoch_idx: usize| MARGIN_LEFT + (epoch_idx as f64 / x_span) * plot_width;
    let to_y = |v: f64| MARGIN_TOP + plot_height - (v.clamp(0.0, y_max) / y_max) * plot_height;

    let mut svg = String::new();
    let _ = write!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 {w} {h}" width="{w}" height="{h}">"#,
        w = CHART_WIDTH,
        h = CHART_HEIGHT
    );
    let _ = write!(
        svg,
        r#"<rect width="{}" height="{}" fill="white"/>"#,
        CHART_WIDTH, CHART_HEIGHT
    );
    let _ = write!(
        svg,
        r#"<text x="{}" y="35" text-anchor="middle" font-family="Arial, sans-serif" font-size="18" font-weight="bold" fill="{}">{}</text>"#,
        CHART_WIDTH / 2.0,
        COLOR_TEXT,
        escape_xml(title)
    );

    for i in 0..=Y_TICKS {
        let frac = i as f64 / Y_TICKS as f64;
        let y = MARGIN_TOP + plot_height - frac * plot_height;
        let _ = write!(
            svg,
            r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="1"/>"#,
            MARGIN_LEFT,
            y,
            MARGIN_LEFT + plot_width,
            y,
            COLOR_GRID
        );
        let _ = write!(
            svg,
            r#"<text x="{}" y="{}" text-anchor="end" font-family="Arial, sans-serif" font-size="12" fill="{}">{:.2}</text>"#,
            MARGIN_LEFT - 10.0,
            y + 4.0,
            COLOR_TEXT,
            frac * y_max
        );
    }

    // Axes
    let _ = write!(
        svg,
        r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="2"/>"#,
        MARGIN_LEFT,
        MARGIN_TOP + plot_height,
        MARGIN_LEFT + plot_width,
        MARGIN_TOP + plot_height,
        COLOR_AXIS
    );
    let _ = write!(
        svg,
        r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="2"/>"#,
        MARGIN_LEFT,
        MARGIN_TOP,
        MARGIN_LEFT,
        MARGIN_TOP + plot_height,
        COLOR_AXIS
    );
    let _ = write!(
        svg,
        r#"<text x="{}" y="{}" text-anchor="middle" font-family="Arial, sans-serif" font-size="14" fill="{}">Epochs</text>"#,
        MARGIN_LEFT + plot_width / 2.0,
        CHART_HEIGHT - 20.0,
        COLOR_TEXT
    );
    let _ = write!(
        svg,
        r#"<text x="20" y="{c}" text-anchor="middle" font-family="Arial, sans-serif" font-size="14" fill="{}" transform="rotate(-90 20 {c})">{}</text>"#,
        COLOR_TEXT,
        escape_xml(y_label),
        c = CHART_HEIGHT / 2.0
    );

    // About ten epoch ticks regardless of run length
    let tick_step = (n_epochs / 10).max(1);
    for idx in (0..n_epochs).step_by(tick_step) {
        let _ = write!(
            svg,
            r#"<text x="{}" y="{}" text-anchor="middle" font-family="Arial, sans-serif" font-size="11" fill="{}">{}</text>"#,
            to_x(idx),
            MARGIN_TOP + plot_height + 20.0,
            COLOR_TEXT,
            idx + 1
        );
    }

    for s in series {
        let mut path = String::new();
        for (idx, &v) in s.values.iter().enumerate() {
            if !v.is_finite() {
                continue;
            }
            let cmd = if path.is_empty() { "M" } else { " L" };
            let _ = write!(path, "{} {:.2} {:.2}", cmd, to_x(idx), to_y(v));
        }
        if path.is_empty() {
            continue;
        }
        let _ = write!(
            svg,
            r#"<path d="{}" fill="none" stroke="{}" stroke-width="2"/>"#,
            path, s.color
        );
    }

    // Legend
    let mut legend_y = MARGIN_TOP + 10.0;
    for s in series {
        let _ = write!(
            svg,
            r#"<rect x="{}" y="{}" width="15" height="15" fill="{}"/>"#,
            CHART_WIDTH - MARGIN_RIGHT - 140.0,
            legend_y,
            s.color
        );
        let _ = write!(
            svg,
            r#"<text x="{}" y="{}" font-family="Arial, sans-serif" font-size="12" fill="{}">{}</text>"#,
            CHART_WIDTH - MARGIN_RIGHT - 120.0,
            legend_y + 12.0,
            COLOR_TEXT,
            escape_xml(&s.name)
        );
        legend_y += 25.0;
    }

    svg.push_str("</svg>");
    svg
}

/// Write `loss_curves.svg` and `accuracy_curves.svg` into `output_dir`.
pub fn write_training_curves(history: &[EpochMetrics], output_dir: &Path) -> std::io::Result<()> {
    fs::create_dir_all(output_dir)?;

    let loss = render_line_chart(
        "Training and Validation Loss",
        "Loss",
        YAxis::FromZero,
        &[
            DataSeries::new("Train Loss", history.iter().map(|m| m.train_loss).collect(), COLOR_TRAIN),
            DataSeries::new("Val Loss", history.iter().map(|m| m.val_loss).collect(), COLOR_VAL),
        ],
    );
    fs::write(output_dir.join("loss_curves.svg"), loss)?;

    let accuracy = render_line_chart(
        "Training and Validation Accuracy",
        "Accuracy",
        YAxis::Unit,
        &[
            DataSeries::new(
                "Train Accuracy",
                history.iter().map(|m| m.train_accuracy).collect(),
                COLOR_TRAIN,
            ),
            DataSeries::new(
                "Val Accuracy",
                history.iter().map(|m| m.val_accuracy).collect(),
                COLOR_VAL,
            ),
        ],
    );
    fs::write(output_dir.join("accuracy_curves.svg"), accuracy)?;

    Ok(())
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn metrics(epoch: usize, train_loss: f64, val_loss: f64) -> EpochMetrics {
        EpochMetrics {
            epoch,
            train_loss,
            train_accuracy: 0.5,
            val_loss,
            val_accuracy: 0.4,
            learning_rate: 1e-3,
        }
    }

    #[test]
    fn test_escape_xml() {
        assert_eq!(escape_xml("a < b & c"), "a &lt; b &amp; c");
    }

    #[test]
    fn test_render_contains_one_path_per_series() {
        let svg = render_line_chart(
            "Loss",
            "Loss",
            YAxis::FromZero,
            &[
                DataSeries::new("Train", vec![1.0, 0.8, 0.5], COLOR_TRAIN),
                DataSeries::new("Val", vec![1.1, 0.9, 0.7], COLOR_VAL),
            ],
        );
        assert!(svg.starts_with("<svg"));
        assert!(svg.ends_with("</svg>"));
        assert_eq!(svg.matches("<path").count(), 2);
        assert!(svg.contains(COLOR_TRAIN));
        assert!(svg.contains(COLOR_VAL));
    }

    #[test]
    fn test_render_skips_nan_points() {
        let svg = render_line_chart(
            "Loss",
            "Loss",
            YAxis::FromZero,
            &[DataSeries::new("Val", vec![f64::NAN, f64::NAN], COLOR_VAL)],
        );
        assert_eq!(svg.matches("<path").count(), 0);
        assert!(!svg.contains("NaN"));
    }

    #[test]
    fn test_write_training_curves() {
        let dir = TempDir::new().unwrap();
        let history = vec![metrics(1, 1.0, 1.2), metrics(2, 0.7, 0.9)];

        write_training_curves(&history, dir.path()).unwrap();

        let loss = fs::read_to_string(dir.path().join("loss_curves.svg")).unwrap();
        let acc = fs::read_to_string(dir.path().join("accuracy_curves.svg")).unwrap();
        assert!(loss.contains("Val Loss"));
        assert!(acc.contains("Train Accuracy"));
    }
}
