use std::fs::File;
use std::path::Path;

use duckdb::params;
use plotters::prelude::*;
use polars::prelude::*;
use tracing::{info, warn};

use super::{DiagnosticStage, StageContext, StageOutcome};
use crate::error::Result;
use crate::render::{self, FONT};
use crate::schema::{quote_ident, LABEL, YEAR};
use crate::session::{AnalyticsSession, PANEL_VIEW};

pub const FIGURE_FILE: &str = "panel_timeseries.png";
pub const TABLE_FILE: &str = "panel_timeseries.csv";

pub const ROW_COUNT: &str = "row_count";
pub const TRANSITIONS: &str = "transitions";

/// Per-year row counts and designation totals, ascending by year.
pub fn yearly_counts(session: &AnalyticsSession) -> Result<DataFrame> {
    let sql = format!(
        "SELECT CAST({year} AS BIGINT) AS year, \
                COUNT(*) AS row_count, \
                CAST(COALESCE(SUM({label}), 0) AS BIGINT) AS transitions \
         FROM {PANEL_VIEW} \
         GROUP BY {year} \
         ORDER BY {year}",
        year = quote_ident(YEAR),
        label = quote_ident(LABEL),
    );

    let mut years = Vec::new();
    let mut row_counts = Vec::new();
    let mut transitions = Vec::new();

    let mut stmt = session.connection().prepare(&sql)?;
    let mut rows = stmt.query(params![])?;
    while let Some(row) = rows.next()? {
        years.push(row.get::<_, i64>(0)?);
        row_counts.push(row.get::<_, i64>(1)?);
        transitions.push(row.get::<_, i64>(2)?);
    }

    Ok(DataFrame::new(vec![
        Series::new(YEAR.into(), years).into(),
        Series::new(ROW_COUNT.into(), row_counts).into(),
        Series::new(TRANSITIONS.into(), transitions).into(),
    ])?)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearCounts {
    pub year: i64,
    pub row_count: i64,
    pub transitions: i64,
}

pub fn year_counts(frame: &DataFrame) -> Result<Vec<YearCounts>> {
    let years = frame.column(YEAR)?.i64()?;
    let row_counts = frame.column(ROW_COUNT)?.i64()?;
    let transitions = frame.column(TRANSITIONS)?.i64()?;

    Ok(years
        .into_no_null_iter()
        .zip(row_counts.into_no_null_iter())
        .zip(transitions.into_no_null_iter())
        .map(|((year, row_count), transitions)| YearCounts {
            year,
            row_count,
            transitions,
        })
        .collect())
}

pub fn write_table(frame: &DataFrame, path: &Path) -> Result<()> {
    let mut file = File::create(path)?;
    let mut frame = frame.clone();
    CsvWriter::new(&mut file).finish(&mut frame)?;
    Ok(())
}

/// Row counts as a line on the left axis, transitions as bars on the right.
pub fn render(counts: &[YearCounts], path: &Path) -> Result<()> {
    let (Some(first), Some(last)) = (counts.first(), counts.last()) else {
        return Ok(());
    };
    let x_range = (first.year as f64 - 0.5)..(last.year as f64 + 0.5);
    let max_rows = counts.iter().map(|c| c.row_count).max().unwrap_or(0).max(1) as f64;
    let max_transitions = counts.iter().map(|c| c.transitions).max().unwrap_or(0).max(1) as f64;

    let root = render::png_canvas(path, (1400, 800))?;
    let mut chart = ChartBuilder::on(&root)
        .caption("Panel rows and transitions per year", (FONT, 26))
        .margin(15)
        .x_label_area_size(50)
        .y_label_area_size(90)
        .right_y_label_area_size(90)
        .build_cartesian_2d(x_range.clone(), 0.0..max_rows * 1.1)?
        .set_secondary_coord(x_range, 0.0..max_transitions * 1.1);

    let year_label = |v: &f64| -> String {
        if (v - v.round()).abs() < 1e-6 {
            format!("{:.0}", v)
        } else {
            String::new()
        }
    };
    chart
        .configure_mesh()
        .x_desc("year")
        .y_desc("rows")
        .x_labels(counts.len().min(25))
        .x_label_formatter(&year_label)
        .draw()?;
    chart
        .configure_secondary_axes()
        .y_desc("transitions (transition_01 = 1)")
        .draw()?;

    let bar_color = RGBColor(214, 39, 40);
    chart
        .draw_secondary_series(counts.iter().map(|c| {
            let x = c.year as f64;
            Rectangle::new(
                [(x - 0.35, 0.0), (x + 0.35, c.transitions as f64)],
                bar_color.mix(0.55).filled(),
            )
        }))?
        .label("transitions")
        .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 15, y + 5)], bar_color.filled()));

    let line_color = RGBColor(31, 119, 180);
    chart
        .draw_series(LineSeries::new(
            counts.iter().map(|c| (c.year as f64, c.row_count as f64)),
            line_color.stroke_width(2),
        ))?
        .label("rows")
        .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], line_color));
    chart.draw_series(
        counts
            .iter()
            .map(|c| Circle::new((c.year as f64, c.row_count as f64), 4, line_color.filled())),
    )?;

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperLeft)
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;

    render::finish(&root, path)
}

pub struct TimeSeriesStage;

impl DiagnosticStage for TimeSeriesStage {
    fn name(&self) -> &'static str {
        "timeseries"
    }

    fn run(&self, ctx: &StageContext<'_>) -> Result<StageOutcome> {
        let frame = yearly_counts(ctx.session)?;
        let counts = year_counts(&frame)?;
        if counts.is_empty() {
            warn!("panel has no rows; skipping time series");
            return Ok(StageOutcome::Skipped {
                reason: "panel has no rows".to_string(),
            });
        }

        for c in &counts {
            let rate = c.transitions as f64 / c.row_count.max(1) as f64;
            info!(
                year = c.year,
                rows = c.row_count,
                transitions = c.transitions,
                rate,
                "yearly counts"
            );
        }

        let table_path = ctx.output_path(TABLE_FILE);
        write_table(&frame, &table_path)?;
        let figure_path = ctx.output_path(FIGURE_FILE);
        render(&counts, &figure_path)?;

        Ok(StageOutcome::Written {
            files: vec![figure_path, table_path],
        })
    }
}
