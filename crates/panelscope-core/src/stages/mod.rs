pub mod correlation;
pub mod separation;
pub mod spatial;
pub mod timeseries;

use std::path::{Path, PathBuf};

use duckdb::params;
use polars::prelude::*;
use serde::Serialize;

use crate::error::Result;
use crate::session::AnalyticsSession;

pub use correlation::CorrelationStage;
pub use separation::ClassSeparationStage;
pub use spatial::SpatialDensityStage;
pub use timeseries::TimeSeriesStage;

/// Tunables shared by the diagnostic stages.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticsOptions {
    pub separation_features: Vec<String>,
    pub correlation_sample_percent: f64,
    pub seed: Option<u64>,
}

impl Default for DiagnosticsOptions {
    fn default() -> Self {
        Self {
            separation_features: separation::DEFAULT_SEPARATION_FEATURES
                .iter()
                .map(|name| name.to_string())
                .collect(),
            correlation_sample_percent: correlation::DEFAULT_SAMPLE_PERCENT,
            seed: None,
        }
    }
}

pub struct StageContext<'a> {
    pub session: &'a AnalyticsSession,
    pub output_dir: &'a Path,
    pub options: &'a DiagnosticsOptions,
}

impl StageContext<'_> {
    pub fn output_path(&self, file_name: &str) -> PathBuf {
        self.output_dir.join(file_name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageOutcome {
    Written { files: Vec<PathBuf> },
    Skipped { reason: String },
}

pub trait DiagnosticStage {
    fn name(&self) -> &'static str;
    fn run(&self, ctx: &StageContext<'_>) -> Result<StageOutcome>;
}

/// The four panel diagnostics in their fixed run order.
pub fn default_stages() -> Vec<Box<dyn DiagnosticStage>> {
    vec![
        Box::new(TimeSeriesStage),
        Box::new(SpatialDensityStage),
        Box::new(ClassSeparationStage),
        Box::new(CorrelationStage),
    ]
}

/// Runs `sql` and reads every one of its `width` columns as nullable `f64`.
pub(crate) fn fetch_f64_columns(
    session: &AnalyticsSession,
    sql: &str,
    width: usize,
) -> Result<Vec<Vec<Option<f64>>>> {
    let mut columns: Vec<Vec<Option<f64>>> = vec![Vec::new(); width];
    let mut stmt = session.connection().prepare(sql)?;
    let mut rows = stmt.query(params![])?;
    while let Some(row) = rows.next()? {
        for (idx, column) in columns.iter_mut().enumerate() {
            column.push(row.get::<_, Option<f64>>(idx)?);
        }
    }
    Ok(columns)
}

/// Assembles named nullable `f64` columns into a frame.
pub(crate) fn f64_frame(names: &[String], columns: Vec<Vec<Option<f64>>>) -> Result<DataFrame> {
    let series: Vec<Column> = names
        .iter()
        .zip(columns)
        .map(|(name, values)| Series::new(name.as_str().into(), values).into())
        .collect();
    Ok(DataFrame::new(series)?)
}
