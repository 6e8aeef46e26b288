#![allow(dead_code)]

use std::fs::File;
use std::path::{Path, PathBuf};

use panelscope_core::{AnalyticsSession, SessionConfig};
use polars::prelude::*;

/// Columns for a synthetic panel; `x`/`y` are derived from `col`/`row`.
pub struct PanelSpec {
    pub years: Vec<i64>,
    pub rows: Vec<i64>,
    pub cols: Vec<i64>,
    pub labels: Vec<i32>,
    pub features: Vec<(&'static str, Vec<f64>)>,
}

impl PanelSpec {
    /// `count` cells for `year`, the first `positives` of them designated.
    pub fn for_year(year: i64, count: usize, positives: usize) -> Self {
        Self {
            years: vec![year; count],
            rows: (0..count as i64).map(|i| i / 10).collect(),
            cols: (0..count as i64).map(|i| i % 10).collect(),
            labels: (0..count).map(|i| i32::from(i < positives)).collect(),
            features: Vec::new(),
        }
    }

    pub fn extend(mut self, other: PanelSpec) -> Self {
        self.years.extend(other.years);
        self.rows.extend(other.rows);
        self.cols.extend(other.cols);
        self.labels.extend(other.labels);
        self
    }

    pub fn with_feature(mut self, name: &'static str, values: Vec<f64>) -> Self {
        self.features.push((name, values));
        self
    }

    pub fn len(&self) -> usize {
        self.years.len()
    }

    pub fn frame(&self) -> PolarsResult<DataFrame> {
        let mut columns: Vec<Column> = vec![
            Series::new("year".into(), self.years.clone()).into(),
            Series::new(
                "x".into(),
                self.cols.iter().map(|c| *c as f64 * 30.0).collect::<Vec<_>>(),
            )
            .into(),
            Series::new(
                "y".into(),
                self.rows.iter().map(|r| *r as f64 * -30.0).collect::<Vec<_>>(),
            )
            .into(),
            Series::new("row".into(), self.rows.clone()).into(),
            Series::new("col".into(), self.cols.clone()).into(),
            Series::new("transition_01".into(), self.labels.clone()).into(),
        ];
        for (name, values) in &self.features {
            columns.push(Series::new((*name).into(), values.clone()).into());
        }
        DataFrame::new(columns)
    }

    pub fn write(&self, dir: &Path) -> PathBuf {
        let path = dir.join("merged_panel.parquet");
        let mut frame = self.frame().expect("build fixture frame");
        let mut file = File::create(&path).expect("create fixture parquet");
        ParquetWriter::new(&mut file)
            .finish(&mut frame)
            .expect("write fixture parquet");
        path
    }
}

pub fn test_config(dir: &Path) -> SessionConfig {
    SessionConfig {
        is_cluster_mode: false,
        worker_count: 2,
        memory_limit_bytes: 1024 * 1024 * 1024,
        temp_dir: dir.join("temp"),
        max_temp_directory_bytes: None,
    }
}

pub fn open(dir: &Path, spec: &PanelSpec) -> AnalyticsSession {
    let path = spec.write(dir);
    AnalyticsSession::open(test_config(dir), &path).expect("open session")
}
