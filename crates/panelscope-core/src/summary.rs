use std::path::PathBuf;

use serde::Serialize;
use tracing::info;

use crate::error::Result;
use crate::schema::{describe_columns, feature_columns, quote_ident, LABEL, YEAR};
use crate::session::{AnalyticsSession, PANEL_VIEW};

/// Headline numbers for one panel file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PanelSummary {
    pub path: PathBuf,
    pub total_rows: u64,
    pub first_year: Option<i64>,
    pub last_year: Option<i64>,
    pub distinct_years: u64,
    pub positives: u64,
    pub negatives: u64,
    pub positive_rate: f64,
    pub column_count: usize,
    pub feature_columns: Vec<String>,
}

impl PanelSummary {
    pub fn collect(session: &AnalyticsSession) -> Result<Self> {
        let columns = describe_columns(session)?;
        let year = quote_ident(YEAR);
        let label = quote_ident(LABEL);
        let sql = format!(
            "SELECT COUNT(*), \
                    CAST(MIN({year}) AS BIGINT), \
                    CAST(MAX({year}) AS BIGINT), \
                    COUNT(DISTINCT {year}), \
                    COUNT(*) FILTER (WHERE {label} = 1), \
                    COUNT(*) FILTER (WHERE {label} = 0) \
             FROM {PANEL_VIEW}"
        );

        let (total, first_year, last_year, distinct_years, positives, negatives) = session
            .connection()
            .query_row(&sql, duckdb::params![], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, Option<i64>>(1)?,
                    row.get::<_, Option<i64>>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, i64>(5)?,
                ))
            })?;

        let total_rows = total.max(0) as u64;
        let positives = positives.max(0) as u64;
        let summary = Self {
            path: session.panel_path().to_path_buf(),
            total_rows,
            first_year,
            last_year,
            distinct_years: distinct_years.max(0) as u64,
            positives,
            negatives: negatives.max(0) as u64,
            positive_rate: if total_rows == 0 {
                0.0
            } else {
                positives as f64 / total_rows as f64
            },
            column_count: columns.len(),
            feature_columns: feature_columns(&columns),
        };

        info!(
            rows = summary.total_rows,
            positives = summary.positives,
            features = summary.feature_columns.len(),
            "panel summary collected"
        );
        Ok(summary)
    }
}
