mod common;

use std::cell::Cell;
use std::fs;
use std::rc::Rc;

use anyhow::Result;
use common::{open, PanelSpec};
use panelscope_core::pipeline::MANIFEST_FILE;
use panelscope_core::{
    run_diagnostics, run_stages, DiagnosticStage, DiagnosticsOptions, PanelError, StageContext,
    StageOutcome, StageStatus,
};

struct Failing;

impl DiagnosticStage for Failing {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn run(&self, _ctx: &StageContext<'_>) -> panelscope_core::Result<StageOutcome> {
        Err(PanelError::Schema("column vanished".to_string()))
    }
}

struct Counting {
    calls: Rc<Cell<usize>>,
}

impl DiagnosticStage for Counting {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn run(&self, _ctx: &StageContext<'_>) -> panelscope_core::Result<StageOutcome> {
        self.calls.set(self.calls.get() + 1);
        Ok(StageOutcome::Skipped {
            reason: "nothing to draw".to_string(),
        })
    }
}

#[test]
fn failing_stage_does_not_stop_later_stages() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let session = open(dir.path(), &PanelSpec::for_year(2012, 10, 1));
    let options = DiagnosticsOptions::default();
    let ctx = StageContext {
        session: &session,
        output_dir: dir.path(),
        options: &options,
    };

    let calls = Rc::new(Cell::new(0));
    let stages: Vec<Box<dyn DiagnosticStage>> = vec![
        Box::new(Failing),
        Box::new(Counting {
            calls: Rc::clone(&calls),
        }),
    ];
    let reports = run_stages(&stages, &ctx);

    assert_eq!(calls.get(), 1);
    assert_eq!(reports.len(), 2);
    match &reports[0].status {
        StageStatus::Failed { error } => assert!(error.contains("column vanished")),
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(matches!(reports[1].status, StageStatus::Skipped { .. }));
    Ok(())
}

#[test]
fn diagnostics_skip_what_the_panel_cannot_support() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let session = open(dir.path(), &PanelSpec::for_year(2012, 50, 0));
    let output_dir = dir.path().join("figures");

    let report = run_diagnostics(&session, &output_dir, &DiagnosticsOptions::default())?;

    let names: Vec<&str> = report.stages.iter().map(|stage| stage.stage).collect();
    assert_eq!(names, ["timeseries", "spatial_density", "class_separation", "correlation"]);

    // No positives, none of the default features, and no numeric features.
    for stage in &report.stages[1..] {
        assert!(
            matches!(stage.status, StageStatus::Skipped { .. }),
            "{} should skip, got {:?}",
            stage.stage,
            stage.status
        );
    }
    assert!(!output_dir.join("panel_transition_density.png").exists());
    assert!(!output_dir.join("panel_class_separation.png").exists());
    assert!(!output_dir.join("panel_feature_correlation.png").exists());

    assert!(matches!(report.stages[0].status, StageStatus::Written { .. }));
    let table = fs::read_to_string(output_dir.join("panel_timeseries.csv"))?;
    let mut lines = table.lines();
    assert_eq!(lines.next(), Some("year,row_count,transitions"));
    assert_eq!(lines.next(), Some("2012,50,0"));

    let manifest: serde_json::Value =
        serde_json::from_slice(&fs::read(output_dir.join(MANIFEST_FILE))?)?;
    let stages = manifest["stages"].as_array().map(Vec::len);
    assert_eq!(stages, Some(4));
    assert_eq!(manifest["stages"][1]["stage"], "spatial_density");
    assert_eq!(manifest["stages"][1]["status"], "skipped");
    assert_eq!(manifest["session"]["worker_count"], 2);
    Ok(())
}

#[test]
fn diagnostics_write_every_figure() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let spec = PanelSpec::for_year(2012, 300, 30).extend(PanelSpec::for_year(2013, 300, 30));
    let n = spec.len();
    let labels = spec.labels.clone();
    let distance: Vec<f64> = (0..n)
        .map(|i| if labels[i] == 1 { 100.0 + i as f64 } else { 5000.0 - i as f64 })
        .collect();
    let ndvi: Vec<f64> = (0..n).map(|i| ((i * 37) % 100) as f64 / 100.0).collect();
    let lights: Vec<f64> = (0..n).map(|i| ((i * 13) % 64) as f64).collect();
    let session = open(
        dir.path(),
        &spec
            .with_feature("dist_to_existing_pa", distance)
            .with_feature("ndvi", ndvi)
            .with_feature("nightlights", lights),
    );
    let output_dir = dir.path().join("figures");
    let options = DiagnosticsOptions {
        correlation_sample_percent: 100.0,
        seed: Some(11),
        ..DiagnosticsOptions::default()
    };

    let report = run_diagnostics(&session, &output_dir, &options)?;

    for stage in &report.stages {
        assert!(
            matches!(stage.status, StageStatus::Written { .. }),
            "{} should write, got {:?}",
            stage.stage,
            stage.status
        );
    }
    assert!(!report.has_failures());
    for file in [
        "panel_timeseries.png",
        "panel_timeseries.csv",
        "panel_transition_density.png",
        "panel_class_separation.png",
        "panel_feature_correlation.png",
        MANIFEST_FILE,
    ] {
        let path = output_dir.join(file);
        assert!(path.is_file(), "{} missing", path.display());
        assert!(fs::metadata(&path)?.len() > 0, "{} is empty", path.display());
    }
    Ok(())
}
