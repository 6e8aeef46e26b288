use std::path::Path;

use plotters::prelude::*;
use polars::prelude::*;
use tracing::{info, warn};

use super::{f64_frame, fetch_f64_columns, DiagnosticStage, StageContext, StageOutcome};
use crate::error::{PanelError, Result};
use crate::render::{self, palette, FONT};
use crate::schema::{describe_columns, feature_columns, quote_ident};
use crate::session::{AnalyticsSession, PANEL_VIEW};

pub const FIGURE_FILE: &str = "panel_feature_correlation.png";

pub const DEFAULT_SAMPLE_PERCENT: f64 = 1.0;

/// Bernoulli sample of the feature columns: every row is kept independently
/// with probability `percent / 100`, so the sample size varies between runs
/// unless a seed is given.
pub fn sample_features(
    session: &AnalyticsSession,
    features: &[String],
    percent: f64,
    seed: Option<u64>,
) -> Result<DataFrame> {
    if !(percent > 0.0 && percent <= 100.0) {
        return Err(PanelError::InvalidOption(format!(
            "correlation sample percent must be in (0, 100], got {percent}"
        )));
    }
    if features.is_empty() {
        return Ok(DataFrame::empty());
    }

    let projection = features
        .iter()
        .map(|name| format!("CAST({} AS DOUBLE)", quote_ident(name)))
        .collect::<Vec<_>>()
        .join(", ");
    let method = match seed {
        Some(seed) => format!("(bernoulli, {seed})"),
        None => "(bernoulli)".to_string(),
    };
    let sql = format!("SELECT {projection} FROM {PANEL_VIEW} USING SAMPLE {percent}% {method}");

    let columns = fetch_f64_columns(session, &sql, features.len())?;
    f64_frame(features, columns)
}

#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationMatrix {
    pub names: Vec<String>,
    /// Row-major, `names.len()` squared.
    pub values: Vec<f64>,
}

impl CorrelationMatrix {
    pub fn size(&self) -> usize {
        self.names.len()
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.values[i * self.size() + j]
    }
}

/// Pearson correlation over pairwise-complete observations. Pairs with fewer
/// than two shared observations or zero variance are `NaN`.
pub fn pearson(a: &[Option<f64>], b: &[Option<f64>]) -> f64 {
    let pairs: Vec<(f64, f64)> = a
        .iter()
        .zip(b)
        .filter_map(|(x, y)| match (x, y) {
            (Some(x), Some(y)) if x.is_finite() && y.is_finite() => Some((*x, *y)),
            _ => None,
        })
        .collect();
    if pairs.len() < 2 {
        return f64::NAN;
    }

    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|p| p.1).sum::<f64>() / n;

    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (x, y) in &pairs {
        let dx = x - mean_x;
        let dy = y - mean_y;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    if sxx <= 0.0 || syy <= 0.0 {
        return f64::NAN;
    }
    (sxy / (sxx.sqrt() * syy.sqrt())).clamp(-1.0, 1.0)
}

pub fn correlation_matrix(frame: &DataFrame) -> Result<CorrelationMatrix> {
    let names: Vec<String> = frame
        .get_column_names()
        .iter()
        .map(|name| name.to_string())
        .collect();
    let columns = names
        .iter()
        .map(|name| -> Result<Vec<Option<f64>>> {
            Ok(frame.column(name)?.f64()?.into_iter().collect())
        })
        .collect::<Result<Vec<_>>>()?;

    let n = names.len();
    let mut values = vec![f64::NAN; n * n];
    for i in 0..n {
        for j in i..n {
            let r = if i == j {
                match pearson(&columns[i], &columns[i]) {
                    r if r.is_nan() => f64::NAN,
                    _ => 1.0,
                }
            } else {
                pearson(&columns[i], &columns[j])
            };
            values[i * n + j] = r;
            values[j * n + i] = r;
        }
    }

    Ok(CorrelationMatrix { names, values })
}

pub fn render(matrix: &CorrelationMatrix, path: &Path) -> Result<()> {
    let n = matrix.size();
    let side = (260 + 34 * n as i32).clamp(700, 2400);

    let root = render::png_canvas(path, (side as u32 + 160, side as u32))?;
    let (heat_area, bar_area) = root.split_horizontally(side);

    let label = |v: &SegmentValue<i32>| -> String {
        match v {
            SegmentValue::CenterOf(i) => matrix
                .names
                .get(*i as usize)
                .cloned()
                .unwrap_or_default(),
            _ => String::new(),
        }
    };
    let label_area = (40 + 7 * longest_name(matrix)).min(320);

    let mut chart = ChartBuilder::on(&heat_area)
        .caption("Feature correlation (Pearson, sampled rows)", (FONT, 26))
        .margin(15)
        .x_label_area_size(label_area)
        .y_label_area_size(label_area)
        .build_cartesian_2d((0..n as i32).into_segmented(), (0..n as i32).into_segmented())?;

    chart
        .configure_mesh()
        .disable_mesh()
        .x_labels(n)
        .y_labels(n)
        .x_label_formatter(&label)
        .y_label_formatter(&label)
        .x_label_style(
            (FONT, 13)
                .into_font()
                .transform(FontTransform::Rotate90),
        )
        .y_label_style((FONT, 13))
        .draw()?;

    chart.draw_series((0..n).flat_map(|i| (0..n).map(move |j| (i, j))).map(|(i, j)| {
        // Row zero at the top, matching the usual matrix orientation.
        let y = (n - 1 - i) as i32;
        let x = j as i32;
        Rectangle::new(
            [
                (SegmentValue::Exact(x), SegmentValue::Exact(y)),
                (SegmentValue::Exact(x + 1), SegmentValue::Exact(y + 1)),
            ],
            palette::diverging(matrix.get(i, j)).filled(),
        )
    }))?;

    render::colorbar(&bar_area, "correlation", -1.0, 1.0, |t| {
        palette::diverging(t * 2.0 - 1.0)
    })?;

    render::finish(&root, path)
}

fn longest_name(matrix: &CorrelationMatrix) -> i32 {
    matrix
        .names
        .iter()
        .map(|name| name.chars().count() as i32)
        .max()
        .unwrap_or(0)
}

pub struct CorrelationStage;

impl DiagnosticStage for CorrelationStage {
    fn name(&self) -> &'static str {
        "correlation"
    }

    fn run(&self, ctx: &StageContext<'_>) -> Result<StageOutcome> {
        let features = feature_columns(&describe_columns(ctx.session)?);
        if features.len() < 2 {
            warn!(features = ?features, "fewer than two numeric features; skipping correlation matrix");
            return Ok(StageOutcome::Skipped {
                reason: "fewer than two numeric features".to_string(),
            });
        }

        let sample = sample_features(
            ctx.session,
            &features,
            ctx.options.correlation_sample_percent,
            ctx.options.seed,
        )?;
        if sample.height() < 2 {
            warn!(
                sampled_rows = sample.height(),
                percent = ctx.options.correlation_sample_percent,
                "correlation sample too small; skipping correlation matrix"
            );
            return Ok(StageOutcome::Skipped {
                reason: "correlation sample too small".to_string(),
            });
        }
        info!(
            sampled_rows = sample.height(),
            features = features.len(),
            "correlation sample drawn"
        );

        let matrix = correlation_matrix(&sample)?;
        let path = ctx.output_path(FIGURE_FILE);
        render(&matrix, &path)?;
        Ok(StageOutcome::Written { files: vec![path] })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(values: &[f64]) -> Vec<Option<f64>> {
        values.iter().copied().map(Some).collect()
    }

    #[test]
    fn perfect_linear_relationships() {
        let a = col(&[1.0, 2.0, 3.0, 4.0]);
        let b = col(&[3.0, 5.0, 7.0, 9.0]);
        let c = col(&[4.0, 3.0, 2.0, 1.0]);
        assert!((pearson(&a, &b) - 1.0).abs() < 1e-12);
        assert!((pearson(&a, &c) + 1.0).abs() < 1e-12);
    }

    #[test]
    fn missing_values_use_complete_pairs() {
        let a = vec![Some(1.0), None, Some(3.0), Some(5.0)];
        let b = vec![Some(2.0), Some(100.0), Some(6.0), Some(10.0)];
        assert!((pearson(&a, &b) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn constant_column_is_nan() {
        let a = col(&[1.0, 1.0, 1.0]);
        let b = col(&[1.0, 2.0, 3.0]);
        assert!(pearson(&a, &b).is_nan());
    }

    #[test]
    fn matrix_is_symmetric_with_unit_diagonal() {
        let frame = DataFrame::new(vec![
            Series::new("a".into(), vec![1.0, 2.0, 3.0, 4.0, 5.0]).into(),
            Series::new("b".into(), vec![2.0, 1.0, 4.0, 3.0, 6.0]).into(),
            Series::new("c".into(), vec![9.0, 7.0, 8.0, 2.0, 1.0]).into(),
        ])
        .unwrap();
        let matrix = correlation_matrix(&frame).unwrap();
        assert_eq!(matrix.size(), 3);
        for i in 0..3 {
            assert_eq!(matrix.get(i, i), 1.0);
            for j in 0..3 {
                assert_eq!(matrix.get(i, j), matrix.get(j, i));
                assert!(matrix.get(i, j).abs() <= 1.0);
            }
        }
    }
}
