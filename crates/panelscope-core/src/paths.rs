use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{AttemptedPaths, PanelError, Result};

/// Location of the merged panel relative to either data root.
pub const DEFAULT_PANEL_SUFFIX: &str = "data/ml/merged_panel.parquet";

/// Candidate locations in preference order: the override root (when set)
/// first, the project root last.
pub fn candidate_paths(
    override_root: Option<&Path>,
    project_root: &Path,
    suffix: &Path,
) -> Vec<PathBuf> {
    let mut candidates = Vec::with_capacity(2);
    if let Some(root) = override_root {
        candidates.push(root.join(suffix));
    }
    candidates.push(project_root.join(suffix));
    candidates
}

/// Returns the first candidate that exists as a file.
pub fn resolve_first_existing(candidates: &[PathBuf]) -> Result<PathBuf> {
    for candidate in candidates {
        if candidate.is_file() {
            debug!(path = %candidate.display(), "resolved panel path");
            return Ok(candidate.clone());
        }
        debug!(path = %candidate.display(), "panel candidate missing");
    }

    Err(PanelError::NotFound {
        attempted: AttemptedPaths(candidates.to_vec()),
    })
}

pub fn resolve_panel_path(
    override_root: Option<&Path>,
    project_root: &Path,
    suffix: &Path,
) -> Result<PathBuf> {
    resolve_first_existing(&candidate_paths(override_root, project_root, suffix))
}
