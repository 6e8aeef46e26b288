pub mod config;
pub mod error;
pub mod paths;
pub mod pipeline;
pub mod render;
pub mod schema;
pub mod session;
pub mod stages;
pub mod summary;

pub use config::{EnvHints, SessionConfig};
pub use error::{PanelError, Result};
pub use paths::{candidate_paths, resolve_first_existing, resolve_panel_path, DEFAULT_PANEL_SUFFIX};
pub use pipeline::{run_diagnostics, run_stages, DiagnosticsReport, StageReport, StageStatus};
pub use session::AnalyticsSession;
pub use stages::{default_stages, DiagnosticStage, DiagnosticsOptions, StageContext, StageOutcome};
pub use summary::PanelSummary;
