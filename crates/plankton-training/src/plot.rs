//! Loss curve rendering.
//!
//! Labels are drawn with an embedded DejaVu Sans font so rendering does not
//! depend on fonts installed on the host. Epochs run along x starting at 1,
//! loss along y.

use plankton_core::{Error, Result};
use plotters::prelude::*;
use plotters::style::{register_font, FontStyle};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;

/// File name of the loss curve inside the run directory
pub const LOSS_PLOT_FILE_NAME: &str = "loss_plot.png";

const PLOT_SIZE: (u32, u32) = (1000, 500);
const FONT_FAMILY: &str = "sans-serif";
const FONT_BYTES: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");

fn plot_err<E: std::fmt::Display>(e: E) -> Error {
    Error::Plot(e.to_string())
}

/// Register the embedded font once per process.
fn ensure_font() -> Result<()> {
    static REGISTERED: OnceLock<std::result::Result<(), String>> = OnceLock::new();
    REGISTERED
        .get_or_init(|| {
            register_font(FONT_FAMILY, FontStyle::Normal, FONT_BYTES)
                .map_err(|_| "failed to load embedded font".to_string())
        })
        .clone()
        .map_err(Error::Plot)
}

/// Render `loss_values` to `<run_dir>/loss_plot.png`, replacing any prior file.
///
/// Empty and single-point histories still produce a valid image.
pub fn plot_loss(loss_values: &[f64], num_epochs: usize, run_dir: &Path) -> Result<PathBuf> {
    let path = run_dir.join(LOSS_PLOT_FILE_NAME);
    ensure_font()?;
    render_loss_curve(loss_values, num_epochs, &path)?;
    debug!("Loss plot written to {}", path.display());
    Ok(path)
}

fn render_loss_curve(loss_values: &[f64], num_epochs: usize, path: &Path) -> Result<()> {
    let points: Vec<(f64, f64)> = loss_values
        .iter()
        .take(num_epochs)
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .map(|(i, &v)| ((i + 1) as f64, v))
        .collect();

    let x_range = 0.5..(num_epochs.max(1) as f64 + 0.5);
    let y_range = value_range(points.iter().map(|&(_, y)| y));

    let root = BitMapBackend::new(path, PLOT_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;

    let mut chart = ChartBuilder::on(&root)
        .margin(20)
        .caption("Training Loss", (FONT_FAMILY, 24))
        .x_label_area_size(50)
        .y_label_area_size(70)
        .build_cartesian_2d(x_range, y_range)
        .map_err(plot_err)?;

    chart
        .configure_mesh()
        .x_desc("Epoch")
        .y_desc("Loss")
        .x_labels(num_epochs.clamp(1, 10))
        .x_label_formatter(&|x| format!("{:.0}", x))
        .y_label_formatter(&|y| format!("{:.4}", y))
        .label_style((FONT_FAMILY, 14))
        .axis_desc_style((FONT_FAMILY, 16))
        .draw()
        .map_err(plot_err)?;

    chart
        .draw_series(LineSeries::new(points.iter().copied(), BLUE.stroke_width(2)))
        .map_err(plot_err)?
        .label("Training Loss")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], BLUE.stroke_width(2)));
    chart
        .draw_series(
            points
                .iter()
                .map(|&point| Circle::new(point, 4, BLUE.filled())),
        )
        .map_err(plot_err)?;

    chart
        .configure_series_labels()
        .label_font((FONT_FAMILY, 14))
        .background_style(WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()
        .map_err(plot_err)?;

    root.present().map_err(plot_err)?;
    Ok(())
}

/// Padded y range covering `values`, `0..1` when there are none.
fn value_range(values: impl Iterator<Item = f64>) -> Range<f64> {
    let (min, max) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });

    if !min.is_finite() || !max.is_finite() {
        return 0.0..1.0;
    }
    let pad = if max > min {
        (max - min) * 0.1
    } else {
        (min.abs() * 0.1).max(0.5)
    };
    (min - pad)..(max + pad)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn assert_png(path: &Path) {
        let img = image::open(path).unwrap();
        assert_eq!((img.width(), img.height()), PLOT_SIZE);
    }

    #[test]
    fn test_plot_multiple_epochs() {
        let dir = TempDir::new().unwrap();
        let path = plot_loss(&[0.9, 0.5, 0.3, 0.25], 4, dir.path()).unwrap();
        assert_eq!(path, dir.path().join(LOSS_PLOT_FILE_NAME));
        assert_png(&path);
    }

    #[test]
    fn test_plot_empty_history() {
        let dir = TempDir::new().unwrap();
        let path = plot_loss(&[], 0, dir.path()).unwrap();
        assert_png(&path);
    }

    #[test]
    fn test_plot_single_point() {
        let dir = TempDir::new().unwrap();
        let path = plot_loss(&[0.42], 1, dir.path()).unwrap();
        assert_png(&path);
    }

    #[test]
    fn test_plot_replaces_previous_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(LOSS_PLOT_FILE_NAME);
        std::fs::write(&path, b"stale").unwrap();

        plot_loss(&[1.0, 0.5], 2, dir.path()).unwrap();
        assert_png(&path);
    }

    #[test]
    fn test_non_finite_values_are_skipped() {
        let dir = TempDir::new().unwrap();
        let path = plot_loss(&[1.0, f64::NAN, 0.5], 3, dir.path()).unwrap();
        assert_png(&path);
    }

    #[test]
    fn test_axis_labels_are_drawn() {
        let dir = TempDir::new().unwrap();
        let path = plot_loss(&[0.9, 0.4], 2, dir.path()).unwrap();
        let img = image::open(&path).unwrap().to_rgb8();

        // Tick labels and the "Loss" description live left of the plot area
        let dark_left = (0..80)
            .flat_map(|x| (0..PLOT_SIZE.1).map(move |y| (x, y)))
            .filter(|&(x, y)| img.get_pixel(x, y).0.iter().all(|&c| c < 128))
            .count();
        assert!(dark_left > 0);
    }

    #[test]
    fn test_value_range() {
        assert_eq!(value_range(std::iter::empty()), 0.0..1.0);

        let flat = value_range([2.0, 2.0].into_iter());
        assert!(flat.start < 2.0 && flat.end > 2.0);

        let spread = value_range([1.0, 3.0].into_iter());
        assert!((spread.start - 0.8).abs() < 1e-12);
        assert!((spread.end - 3.2).abs() < 1e-12);
    }
}
