use std::path::Path;

use duckdb::params;
use plotters::prelude::*;
use polars::prelude::*;
use tracing::{info, warn};

use super::{DiagnosticStage, StageContext, StageOutcome};
use crate::error::Result;
use crate::render::hexbin::{hexbin, HexBinning};
use crate::render::{self, palette, FONT};
use crate::schema::{quote_ident, COL, LABEL, ROW};
use crate::session::{AnalyticsSession, PANEL_VIEW};

pub const FIGURE_FILE: &str = "panel_transition_density.png";

/// Hexagons across the column extent.
pub const GRID_SIZE: usize = 80;

/// Grid cells of every designation event.
pub fn transition_cells(session: &AnalyticsSession) -> Result<DataFrame> {
    let sql = format!(
        "SELECT CAST({row} AS BIGINT), CAST({col} AS BIGINT) \
         FROM {PANEL_VIEW} WHERE {label} = 1",
        row = quote_ident(ROW),
        col = quote_ident(COL),
        label = quote_ident(LABEL),
    );

    let mut rows_out = Vec::new();
    let mut cols_out = Vec::new();
    let mut stmt = session.connection().prepare(&sql)?;
    let mut rows = stmt.query(params![])?;
    while let Some(row) = rows.next()? {
        rows_out.push(row.get::<_, i64>(0)?);
        cols_out.push(row.get::<_, i64>(1)?);
    }

    Ok(DataFrame::new(vec![
        Series::new(ROW.into(), rows_out).into(),
        Series::new(COL.into(), cols_out).into(),
    ])?)
}

/// `(col, -row)` so that raster row zero ends up at the top of the plot.
pub fn plot_points(cells: &DataFrame) -> Result<Vec<(f64, f64)>> {
    let rows = cells.column(ROW)?.i64()?;
    let cols = cells.column(COL)?.i64()?;
    Ok(cols
        .into_no_null_iter()
        .zip(rows.into_no_null_iter())
        .map(|(col, row)| (col as f64, -(row as f64)))
        .collect())
}

pub fn render(binning: &HexBinning, path: &Path) -> Result<()> {
    let max_count = binning.max_count().max(1) as f64;

    let root = render::png_canvas(path, (1300, 1000))?;
    let (plot_area, bar_area) = root.split_horizontally(1150);

    let mut chart = ChartBuilder::on(&plot_area)
        .caption("Designation events (transition_01 = 1)", (FONT, 26))
        .margin(15)
        .x_label_area_size(50)
        .y_label_area_size(80)
        .build_cartesian_2d(
            binning.x_range.0..binning.x_range.1,
            binning.y_range.0..binning.y_range.1,
        )?;

    let row_label = |v: &f64| -> String { format!("{:.0}", -v) };
    chart
        .configure_mesh()
        .disable_mesh()
        .x_desc("col")
        .y_desc("row")
        .y_label_formatter(&row_label)
        .draw()?;

    chart.draw_series(binning.bins.iter().map(|bin| {
        let color = palette::sequential(bin.count as f64 / max_count);
        Polygon::new(binning.hexagon(bin.center), color.filled())
    }))?;

    render::colorbar(&bar_area, "events per hexagon", 0.0, max_count, palette::sequential)?;

    render::finish(&root, path)
}

pub struct SpatialDensityStage;

impl DiagnosticStage for SpatialDensityStage {
    fn name(&self) -> &'static str {
        "spatial_density"
    }

    fn run(&self, ctx: &StageContext<'_>) -> Result<StageOutcome> {
        let cells = transition_cells(ctx.session)?;
        if cells.height() == 0 {
            warn!("no rows with transition_01 = 1; skipping spatial density plot");
            return Ok(StageOutcome::Skipped {
                reason: "no positive transitions".to_string(),
            });
        }

        let binning = hexbin(&plot_points(&cells)?, GRID_SIZE);
        info!(
            events = cells.height(),
            hexagons = binning.bins.len(),
            max_per_hexagon = binning.max_count(),
            "binned designation events"
        );

        let path = ctx.output_path(FIGURE_FILE);
        render(&binning, &path)?;
        Ok(StageOutcome::Written { files: vec![path] })
    }
}
