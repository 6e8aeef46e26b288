pub mod boxplot;
pub mod hexbin;
pub mod palette;

use std::path::Path;

use plotters::coord::Shift;
use plotters::prelude::*;
use tracing::info;

use crate::error::Result;

pub const FONT: &str = "sans-serif";

pub type Canvas<'a> = DrawingArea<BitMapBackend<'a>, Shift>;

/// White PNG canvas at `path`.
pub fn png_canvas(path: &Path, size: (u32, u32)) -> Result<Canvas<'_>> {
    let root = BitMapBackend::new(path, size).into_drawing_area();
    root.fill(&WHITE)?;
    Ok(root)
}

pub fn finish(root: &Canvas<'_>, path: &Path) -> Result<()> {
    root.present()?;
    info!(path = %path.display(), "figure written");
    Ok(())
}

/// Vertical colour bar spanning `lo..hi`.
pub fn colorbar<F>(area: &Canvas<'_>, label: &str, lo: f64, hi: f64, color: F) -> Result<()>
where
    F: Fn(f64) -> RGBColor,
{
    let hi = if hi > lo { hi } else { lo + 1.0 };
    let mut bar = ChartBuilder::on(area)
        .margin_top(60)
        .margin_bottom(60)
        .margin_left(10)
        .margin_right(20)
        .x_label_area_size(0)
        .y_label_area_size(70)
        .build_cartesian_2d(0.0f64..1.0f64, lo..hi)?;
    bar.configure_mesh()
        .x_labels(0)
        .disable_x_mesh()
        .disable_y_mesh()
        .y_desc(label)
        .draw()?;

    const STEPS: usize = 200;
    let step = (hi - lo) / STEPS as f64;
    bar.draw_series((0..STEPS).map(|i| {
        let y0 = lo + step * i as f64;
        let t = (i as f64 + 0.5) / STEPS as f64;
        Rectangle::new([(0.0, y0), (1.0, y0 + step)], color(t).filled())
    }))?;
    Ok(())
}
