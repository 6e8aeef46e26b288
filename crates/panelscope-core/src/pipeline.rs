use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{error, info};

use crate::config::SessionConfig;
use crate::error::Result;
use crate::session::AnalyticsSession;
use crate::stages::{default_stages, DiagnosticStage, DiagnosticsOptions, StageContext, StageOutcome};

pub const MANIFEST_FILE: &str = "panel_diagnostics.json";

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageStatus {
    Written { files: Vec<PathBuf> },
    Skipped { reason: String },
    Failed { error: String },
}

impl From<StageOutcome> for StageStatus {
    fn from(outcome: StageOutcome) -> Self {
        match outcome {
            StageOutcome::Written { files } => StageStatus::Written { files },
            StageOutcome::Skipped { reason } => StageStatus::Skipped { reason },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub stage: &'static str,
    #[serde(flatten)]
    pub status: StageStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticsReport {
    pub panel_path: PathBuf,
    pub output_dir: PathBuf,
    pub session: SessionConfig,
    pub options: DiagnosticsOptions,
    pub stages: Vec<StageReport>,
}

impl DiagnosticsReport {
    pub fn failures(&self) -> impl Iterator<Item = &StageReport> {
        self.stages
            .iter()
            .filter(|report| matches!(report.status, StageStatus::Failed { .. }))
    }

    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }

    pub fn write_manifest(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

/// Runs `stages` in order. A failing stage is logged and recorded; the
/// remaining stages still run.
pub fn run_stages(stages: &[Box<dyn DiagnosticStage>], ctx: &StageContext<'_>) -> Vec<StageReport> {
    let mut reports = Vec::with_capacity(stages.len());
    for stage in stages {
        info!(stage = stage.name(), "stage started");
        let status = match stage.run(ctx) {
            Ok(outcome) => {
                info!(stage = stage.name(), outcome = ?outcome, "stage finished");
                StageStatus::from(outcome)
            }
            Err(err) => {
                error!(stage = stage.name(), error = %err, "stage failed");
                StageStatus::Failed {
                    error: err.to_string(),
                }
            }
        };
        reports.push(StageReport {
            stage: stage.name(),
            status,
        });
    }
    reports
}

/// Runs the default stages against `session`, writing figures and the run
/// manifest into `output_dir`.
pub fn run_diagnostics(
    session: &AnalyticsSession,
    output_dir: &Path,
    options: &DiagnosticsOptions,
) -> Result<DiagnosticsReport> {
    fs::create_dir_all(output_dir)?;

    let ctx = StageContext {
        session,
        output_dir,
        options,
    };
    let stages = run_stages(&default_stages(), &ctx);

    let report = DiagnosticsReport {
        panel_path: session.panel_path().to_path_buf(),
        output_dir: output_dir.to_path_buf(),
        session: session.config().clone(),
        options: options.clone(),
        stages,
    };
    report.write_manifest(&output_dir.join(MANIFEST_FILE))?;
    Ok(report)
}
