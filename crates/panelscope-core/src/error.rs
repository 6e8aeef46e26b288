// crates/panelscope-core/src/error.rs

use std::fmt;
use std::path::PathBuf;

use plotters::drawing::DrawingAreaErrorKind;
use thiserror::Error;

/// Every location the resolver looked at before giving up.
#[derive(Debug, Clone)]
pub struct AttemptedPaths(pub Vec<PathBuf>);

impl fmt::Display for AttemptedPaths {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .0
            .iter()
            .map(|path| path.display().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "[{joined}]")
    }
}

#[derive(Error, Debug)]
pub enum PanelError {
    #[error("panel file not found; attempted {attempted}")]
    NotFound { attempted: AttemptedPaths },

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("DuckDB query failed: {0}")]
    DuckDb(#[from] duckdb::Error),

    #[error("Polars operation failed: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("failed to apply session setting `{setting}`: {source}")]
    SessionSetting {
        setting: &'static str,
        #[source]
        source: duckdb::Error,
    },

    #[error("Invalid option: {0}")]
    InvalidOption(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Rendering failed: {0}")]
    Render(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl<E> From<DrawingAreaErrorKind<E>> for PanelError
where
    E: std::error::Error + Send + Sync,
{
    fn from(err: DrawingAreaErrorKind<E>) -> Self {
        PanelError::Render(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PanelError>;
