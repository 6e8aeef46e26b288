use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Table};
use panelscope_core::{
    candidate_paths, resolve_first_existing, run_diagnostics, AnalyticsSession, DiagnosticsOptions,
    EnvHints, PanelSummary, SessionConfig, StageStatus, DEFAULT_PANEL_SUFFIX,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Diagnostics for the merged protected-area panel", long_about = None)]
struct Cli {
    #[command(flatten)]
    location: PanelLocation,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render the four diagnostic figures (default)
    Run(RunArgs),
    /// Print headline numbers for the panel without rendering
    Summary(SummaryArgs),
    /// Show the candidate panel paths and the resolved session configuration
    Config,
}

#[derive(Args, Debug)]
struct PanelLocation {
    /// Project root holding `data/` and receiving `temp/` and `outputs/`
    #[arg(long, global = true, env = "PANELSCOPE_PROJECT_ROOT", default_value = ".")]
    project_root: PathBuf,

    /// Panel location relative to the data root
    #[arg(long, global = true, default_value = DEFAULT_PANEL_SUFFIX)]
    panel_suffix: PathBuf,
}

#[derive(Args, Debug, Default)]
struct RunArgs {
    /// Directory for figures (defaults to <project-root>/outputs/figures/panel_diagnostics)
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Feature to compare across transition classes (repeatable)
    #[arg(long = "feature")]
    features: Vec<String>,

    /// Share of rows kept for the correlation matrix, in percent (0, 100]
    #[arg(long, value_parser = parse_sample_percent)]
    sample_percent: Option<f64>,

    /// Seed for repeatable sampling
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Args, Debug, Default)]
struct SummaryArgs {
    /// Print the summary as JSON
    #[arg(long)]
    json: bool,
}

fn parse_sample_percent(raw: &str) -> std::result::Result<f64, String> {
    let percent: f64 = raw
        .parse()
        .map_err(|_| format!("`{raw}` is not a number"))?;
    if percent > 0.0 && percent <= 100.0 {
        Ok(percent)
    } else {
        Err(format!("must be in (0, 100], got {percent}"))
    }
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let hints = EnvHints::from_env();
    let config = SessionConfig::resolve(&hints, &cli.location.project_root);

    match cli.command.unwrap_or(Command::Run(RunArgs::default())) {
        Command::Run(args) => handle_run(&cli.location, &hints, config, args),
        Command::Summary(args) => handle_summary(&cli.location, &hints, config, args),
        Command::Config => handle_config(&cli.location, &hints, &config),
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn candidates(location: &PanelLocation, hints: &EnvHints) -> Vec<PathBuf> {
    candidate_paths(
        hints.override_root.as_deref(),
        &location.project_root,
        &location.panel_suffix,
    )
}

fn open_session(
    location: &PanelLocation,
    hints: &EnvHints,
    config: SessionConfig,
) -> Result<AnalyticsSession> {
    let panel_path =
        resolve_first_existing(&candidates(location, hints)).context("could not locate panel file")?;
    info!(path = %panel_path.display(), "using panel");
    AnalyticsSession::open(config, &panel_path).context("failed to open analytics session")
}

fn handle_run(
    location: &PanelLocation,
    hints: &EnvHints,
    config: SessionConfig,
    args: RunArgs,
) -> Result<()> {
    let mut options = DiagnosticsOptions::default();
    if !args.features.is_empty() {
        options.separation_features = args.features;
    }
    if let Some(percent) = args.sample_percent {
        options.correlation_sample_percent = percent;
    }
    options.seed = args.seed;

    let output_dir = args
        .output_dir
        .unwrap_or_else(|| default_output_dir(&location.project_root));

    let session = open_session(location, hints, config)?;
    let report = run_diagnostics(&session, &output_dir, &options)?;
    drop(session);

    for stage in &report.stages {
        match &stage.status {
            StageStatus::Written { files } => {
                for file in files {
                    println!("{:<18} wrote {}", stage.stage, file.display());
                }
            }
            StageStatus::Skipped { reason } => println!("{:<18} skipped: {}", stage.stage, reason),
            StageStatus::Failed { error } => println!("{:<18} FAILED: {}", stage.stage, error),
        }
    }

    if report.has_failures() {
        let failed: Vec<&str> = report.failures().map(|stage| stage.stage).collect();
        bail!("{} stage(s) failed: {}", failed.len(), failed.join(", "));
    }
    Ok(())
}

fn handle_summary(
    location: &PanelLocation,
    hints: &EnvHints,
    config: SessionConfig,
    args: SummaryArgs,
) -> Result<()> {
    let session = open_session(location, hints, config)?;
    let summary = PanelSummary::collect(&session)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    let years = match (summary.first_year, summary.last_year) {
        (Some(first), Some(last)) => format!("{first}–{last} ({} distinct)", summary.distinct_years),
        _ => "n/a".to_string(),
    };

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Metric", "Value"]);
    table.add_row(vec!["Panel".to_string(), summary.path.display().to_string()]);
    table.add_row(vec!["Rows".to_string(), summary.total_rows.to_string()]);
    table.add_row(vec!["Years".to_string(), years]);
    table.add_row(vec!["Transitions (=1)".to_string(), summary.positives.to_string()]);
    table.add_row(vec!["Non-transitions (=0)".to_string(), summary.negatives.to_string()]);
    table.add_row(vec![
        "Positive rate".to_string(),
        format!("{:.6}", summary.positive_rate),
    ]);
    table.add_row(vec!["Columns".to_string(), summary.column_count.to_string()]);
    table.add_row(vec![
        "Numeric features".to_string(),
        summary.feature_columns.join(", "),
    ]);
    println!("{table}");

    if summary.positives == 0 {
        warn!("panel contains no transitions");
    }
    Ok(())
}

fn handle_config(location: &PanelLocation, hints: &EnvHints, config: &SessionConfig) -> Result<()> {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Setting", "Value"]);

    for (idx, candidate) in candidates(location, hints).iter().enumerate() {
        let state = if candidate.is_file() { "found" } else { "missing" };
        table.add_row(vec![
            format!("Candidate {}", idx + 1),
            format!("{} ({state})", candidate.display()),
        ]);
    }
    table.add_row(vec!["Cluster mode".to_string(), config.is_cluster_mode.to_string()]);
    table.add_row(vec!["Threads".to_string(), config.worker_count.to_string()]);
    table.add_row(vec!["Memory limit".to_string(), config.memory_limit_setting()]);
    table.add_row(vec![
        "Temp directory".to_string(),
        config.temp_dir.display().to_string(),
    ]);
    table.add_row(vec![
        "Max temp size".to_string(),
        config
            .max_temp_directory_setting()
            .unwrap_or_else(|| "engine default".to_string()),
    ]);
    println!("{table}");
    Ok(())
}

fn default_output_dir(project_root: &Path) -> PathBuf {
    project_root.join("outputs/figures/panel_diagnostics")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_args(args: &[&str]) -> std::result::Result<RunArgs, clap::Error> {
        let cli = Cli::try_parse_from(args)?;
        match cli.command {
            Some(Command::Run(args)) => Ok(args),
            other => panic!("expected run, got {other:?}"),
        }
    }

    #[test]
    fn sample_percent_accepts_full_range() {
        let args = run_args(&["panelscope", "run", "--sample-percent", "100"]).unwrap();
        assert_eq!(args.sample_percent, Some(100.0));

        let args = run_args(&["panelscope", "run", "--sample-percent", "0.5"]).unwrap();
        assert_eq!(args.sample_percent, Some(0.5));
    }

    #[test]
    fn sample_percent_out_of_range_is_rejected_at_parse_time() {
        for bad in ["0", "-1", "150", "NaN", "abc"] {
            assert!(
                run_args(&["panelscope", "run", "--sample-percent", bad]).is_err(),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn no_subcommand_means_default_run() {
        let cli = Cli::try_parse_from(["panelscope"]).unwrap();
        assert!(cli.command.is_none());
    }
}
