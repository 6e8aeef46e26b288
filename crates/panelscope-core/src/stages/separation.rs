//! Feature distributions for designated vs. non-designated cells.
//!
//! Positives are rare, so the comparison runs on a balanced sample: every
//! positive row plus at most [`NEGATIVE_RATIO`] negatives per positive.

use std::path::Path;

use plotters::prelude::*;
use polars::prelude::*;
use tracing::{debug, info, warn};

use super::{f64_frame, fetch_f64_columns, DiagnosticStage, StageContext, StageOutcome};
use crate::error::Result;
use crate::render::boxplot::BoxStats;
use crate::render::{self, FONT};
use crate::schema::{available_columns, intersect, quote_ident, LABEL, NON_FEATURE_COLUMNS};
use crate::session::{AnalyticsSession, PANEL_VIEW};

pub const FIGURE_FILE: &str = "panel_class_separation.png";

pub const DEFAULT_SEPARATION_FEATURES: [&str; 4] =
    ["dist_to_existing_pa", "ndvi", "nightlights", "dist_to_road"];

pub const NEGATIVE_RATIO: u64 = 5;
pub const MAX_PANELS: usize = 4;

const COLUMN_PREVIEW: usize = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassCounts {
    pub positives: u64,
    pub negatives: u64,
}

impl ClassCounts {
    pub fn negative_sample_size(&self) -> u64 {
        negative_sample_size(self.positives, self.negatives)
    }
}

/// `min(NEGATIVE_RATIO × positives, negatives)`.
pub fn negative_sample_size(positives: u64, negatives: u64) -> u64 {
    positives.saturating_mul(NEGATIVE_RATIO).min(negatives)
}

pub fn class_counts(session: &AnalyticsSession) -> Result<ClassCounts> {
    let label = quote_ident(LABEL);
    let sql = format!(
        "SELECT COUNT(*) FILTER (WHERE {label} = 1), COUNT(*) FILTER (WHERE {label} = 0) \
         FROM {PANEL_VIEW}"
    );
    let (positives, negatives) = session
        .connection()
        .query_row(&sql, duckdb::params![], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
        })?;
    Ok(ClassCounts {
        positives: positives.max(0) as u64,
        negatives: negatives.max(0) as u64,
    })
}

#[derive(Debug, Clone)]
pub struct BalancedSample {
    /// `transition_01` plus one `f64` column per feature.
    pub frame: DataFrame,
    pub counts: ClassCounts,
    pub positive_sampled: usize,
    pub negative_sampled: usize,
}

/// All positives plus a reservoir sample of negatives capped at
/// [`negative_sample_size`].
pub fn balanced_sample(
    session: &AnalyticsSession,
    features: &[String],
    seed: Option<u64>,
) -> Result<BalancedSample> {
    let counts = class_counts(session)?;
    let label = quote_ident(LABEL);
    let projection = if features.is_empty() {
        "NULL::DOUBLE".to_string()
    } else {
        features
            .iter()
            .map(|name| format!("CAST({} AS DOUBLE)", quote_ident(name)))
            .collect::<Vec<_>>()
            .join(", ")
    };
    let width = features.len().max(1);

    let positives = fetch_f64_columns(
        session,
        &format!("SELECT {projection} FROM {PANEL_VIEW} WHERE {label} = 1"),
        width,
    )?;

    let take = counts.negative_sample_size();
    let negatives_sql = format!("SELECT {projection} FROM {PANEL_VIEW} WHERE {label} = 0");
    let negatives = if take == 0 {
        vec![Vec::new(); width]
    } else if take >= counts.negatives {
        fetch_f64_columns(session, &negatives_sql, width)?
    } else {
        let repeatable = seed.map(|s| format!(" REPEATABLE ({s})")).unwrap_or_default();
        fetch_f64_columns(
            session,
            &format!(
                "SELECT * FROM ({negatives_sql}) AS negatives \
                 USING SAMPLE reservoir({take} ROWS){repeatable}"
            ),
            width,
        )?
    };

    let positive_sampled = positives.first().map_or(0, Vec::len);
    let negative_sampled = negatives.first().map_or(0, Vec::len);
    debug!(positive_sampled, negative_sampled, "balanced sample drawn");

    let merged: Vec<Vec<Option<f64>>> = positives
        .into_iter()
        .zip(negatives)
        .map(|(mut pos, neg)| {
            pos.extend(neg);
            pos
        })
        .collect();

    let labels: Vec<i32> = std::iter::repeat_n(1, positive_sampled)
        .chain(std::iter::repeat_n(0, negative_sampled))
        .collect();

    let mut frame = if features.is_empty() {
        DataFrame::empty()
    } else {
        f64_frame(features, merged)?
    };
    frame.with_column(Series::new(LABEL.into(), labels))?;

    Ok(BalancedSample {
        frame,
        counts,
        positive_sampled,
        negative_sampled,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeaturePanel {
    pub feature: String,
    /// Sampled rows per class, nulls included; the boxes use finite values only.
    pub negative_n: usize,
    pub positive_n: usize,
    pub negative: Option<BoxStats>,
    pub positive: Option<BoxStats>,
}

/// Panels laid out on a grid no larger than needed; unused cells are dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct SeparationLayout {
    pub rows: usize,
    pub cols: usize,
    pub panels: Vec<FeaturePanel>,
}

pub fn build_layout(sample: &DataFrame, features: &[String]) -> Result<SeparationLayout> {
    let labels = sample.column(LABEL)?.i32()?;
    let positive_mask: Vec<bool> = labels.into_iter().map(|v| v == Some(1)).collect();
    let positive_n = positive_mask.iter().filter(|is_positive| **is_positive).count();
    let negative_n = positive_mask.len() - positive_n;

    let mut panels = Vec::with_capacity(features.len().min(MAX_PANELS));
    for feature in features.iter().take(MAX_PANELS) {
        let values = sample.column(feature)?.f64()?;
        let mut negative = Vec::new();
        let mut positive = Vec::new();
        for (value, is_positive) in values.into_iter().zip(positive_mask.iter()) {
            let Some(value) = value.filter(|v| v.is_finite()) else {
                continue;
            };
            if *is_positive {
                positive.push(value);
            } else {
                negative.push(value);
            }
        }
        panels.push(FeaturePanel {
            feature: feature.clone(),
            negative_n,
            positive_n,
            negative: BoxStats::from_values(&negative),
            positive: BoxStats::from_values(&positive),
        });
    }

    let cols = panels.len().min(2);
    let rows = panels.len().div_ceil(2);
    Ok(SeparationLayout { rows, cols, panels })
}

pub fn render(layout: &SeparationLayout, path: &Path) -> Result<()> {
    if layout.panels.is_empty() {
        return Ok(());
    }
    let width = 700 * layout.cols as u32;
    let height = 560 * layout.rows as u32 + 60;

    let root = render::png_canvas(path, (width, height))?;
    let root = root.titled("Feature distributions by transition class", (FONT, 26))?;
    let cells = root.split_evenly((layout.rows, layout.cols));

    for (panel, area) in layout.panels.iter().zip(cells.iter()) {
        draw_panel(panel, area)?;
    }

    render::finish(&root, path)
}

fn draw_panel(panel: &FeaturePanel, area: &render::Canvas<'_>) -> Result<()> {
    let boxes = [
        ("no transition (0)", panel.negative, panel.negative_n, RGBColor(31, 119, 180)),
        ("transition (1)", panel.positive, panel.positive_n, RGBColor(214, 39, 40)),
    ];

    let (mut lo, mut hi) = boxes
        .iter()
        .filter_map(|(_, stats, _, _)| stats.as_ref())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), s| {
            (lo.min(s.whisker_low), hi.max(s.whisker_high))
        });
    if !lo.is_finite() {
        lo = 0.0;
        hi = 1.0;
    }
    if hi - lo < f64::EPSILON {
        lo -= 0.5;
        hi += 0.5;
    }
    let pad = (hi - lo) * 0.12;

    let group_label = |v: &f64| -> String {
        if (v - v.round()).abs() > 1e-6 {
            return String::new();
        }
        match v.round() as i64 {
            0 => boxes[0].0.to_string(),
            1 => boxes[1].0.to_string(),
            _ => String::new(),
        }
    };

    let mut chart = ChartBuilder::on(area)
        .caption(&panel.feature, (FONT, 20))
        .margin(15)
        .x_label_area_size(40)
        .y_label_area_size(80)
        .build_cartesian_2d(-0.6f64..1.6f64, (lo - pad)..(hi + pad))?;
    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(3)
        .x_label_formatter(&group_label)
        .y_desc(panel.feature.as_str())
        .draw()?;

    for (idx, (_, stats, n, color)) in boxes.iter().enumerate() {
        let x = idx as f64;
        if let Some(s) = stats {
            chart.draw_series(std::iter::once(Rectangle::new(
                [(x - 0.3, s.q1), (x + 0.3, s.q3)],
                color.mix(0.35).filled(),
            )))?;
            chart.draw_series(std::iter::once(Rectangle::new(
                [(x - 0.3, s.q1), (x + 0.3, s.q3)],
                color.stroke_width(2),
            )))?;
            chart.draw_series([
                PathElement::new(vec![(x - 0.3, s.median), (x + 0.3, s.median)], BLACK.stroke_width(2)),
                PathElement::new(vec![(x, s.q3), (x, s.whisker_high)], BLACK),
                PathElement::new(vec![(x, s.q1), (x, s.whisker_low)], BLACK),
                PathElement::new(vec![(x - 0.15, s.whisker_high), (x + 0.15, s.whisker_high)], BLACK),
                PathElement::new(vec![(x - 0.15, s.whisker_low), (x + 0.15, s.whisker_low)], BLACK),
            ])?;
        }
        chart.draw_series(std::iter::once(Text::new(
            format!("n={n}"),
            (x - 0.12, hi + pad * 0.55),
            (FONT, 15).into_font().color(&BLACK),
        )))?;
    }
    Ok(())
}

pub struct ClassSeparationStage;

impl DiagnosticStage for ClassSeparationStage {
    fn name(&self) -> &'static str {
        "class_separation"
    }

    fn run(&self, ctx: &StageContext<'_>) -> Result<StageOutcome> {
        let available = available_columns(ctx.session)?;
        let mut features = intersect(&ctx.options.separation_features, &available);
        features.retain(|name| !NON_FEATURE_COLUMNS.contains(&name.as_str()));
        if features.is_empty() {
            let preview: Vec<&str> = available
                .iter()
                .take(COLUMN_PREVIEW)
                .map(String::as_str)
                .collect();
            warn!(
                requested = ?ctx.options.separation_features,
                available = ?preview,
                "none of the requested features are in the panel; skipping class separation"
            );
            return Ok(StageOutcome::Skipped {
                reason: "no requested feature present".to_string(),
            });
        }
        if features.len() > MAX_PANELS {
            warn!(
                dropped = ?&features[MAX_PANELS..],
                "only the first {MAX_PANELS} features are plotted"
            );
            features.truncate(MAX_PANELS);
        }

        let sample = balanced_sample(ctx.session, &features, ctx.options.seed)?;
        info!(
            positives = sample.counts.positives,
            negatives = sample.counts.negatives,
            negative_sampled = sample.negative_sampled,
            features = ?features,
            "balanced class sample"
        );

        let layout = build_layout(&sample.frame, &features)?;
        let path = ctx.output_path(FIGURE_FILE);
        render(&layout, &path)?;
        Ok(StageOutcome::Written { files: vec![path] })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(values: Vec<Option<f64>>, labels: Vec<i32>) -> DataFrame {
        DataFrame::new(vec![
            Series::new("ndvi".into(), values).into(),
            Series::new(LABEL.into(), labels).into(),
        ])
        .unwrap()
    }

    #[test]
    fn sample_sizes_count_rows_with_missing_values() {
        let frame = sample(
            vec![Some(1.0), None, Some(3.0), Some(4.0), None, Some(f64::NAN)],
            vec![1, 1, 0, 0, 0, 0],
        );
        let layout = build_layout(&frame, &["ndvi".to_string()]).unwrap();
        let panel = &layout.panels[0];

        assert_eq!(panel.positive_n, 2);
        assert_eq!(panel.negative_n, 4);
        assert_eq!(panel.positive.as_ref().map(|s| s.n), Some(1));
        assert_eq!(panel.negative.as_ref().map(|s| s.n), Some(2));
    }

    #[test]
    fn layout_grid_fits_panel_count() {
        let frame = DataFrame::new(vec![
            Series::new("a".into(), vec![1.0, 2.0]).into(),
            Series::new("b".into(), vec![1.0, 2.0]).into(),
            Series::new("c".into(), vec![1.0, 2.0]).into(),
            Series::new(LABEL.into(), vec![1i32, 0]).into(),
        ])
        .unwrap();
        let features: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        let layout = build_layout(&frame, &features).unwrap();

        assert_eq!((layout.rows, layout.cols), (2, 2));
        assert_eq!(layout.panels.len(), 3);
    }

    #[test]
    fn negative_cap_is_five_per_positive() {
        assert_eq!(negative_sample_size(10, 200), 50);
        assert_eq!(negative_sample_size(1000, 2000), 2000);
        assert_eq!(negative_sample_size(0, 50), 0);
    }
}
