use std::fs;
use std::path::{Path, PathBuf};

use duckdb::Connection;
use tracing::{debug, info};

use crate::config::SessionConfig;
use crate::error::{PanelError, Result};
use crate::schema::sql_string;

/// Name of the read-only view bound over the panel file.
pub const PANEL_VIEW: &str = "panel";

/// An in-memory DuckDB session with a `panel` view over one parquet file.
///
/// Dropping the session closes the connection, which stops the engine's
/// worker threads and removes its spill files.
pub struct AnalyticsSession {
    conn: Connection,
    config: SessionConfig,
    panel_path: PathBuf,
}

impl AnalyticsSession {
    pub fn open(config: SessionConfig, panel_path: &Path) -> Result<Self> {
        fs::create_dir_all(&config.temp_dir)?;

        let conn = Connection::open_in_memory()?;
        apply_settings(&conn, &config)?;

        conn.execute_batch(&format!(
            "CREATE VIEW {PANEL_VIEW} AS SELECT * FROM read_parquet({})",
            sql_string(&panel_path.to_string_lossy())
        ))?;

        info!(
            path = %panel_path.display(),
            threads = config.worker_count,
            memory_limit = %config.memory_limit_setting(),
            temp_dir = %config.temp_dir.display(),
            cluster_mode = config.is_cluster_mode,
            "analytics session ready"
        );

        Ok(Self {
            conn,
            config,
            panel_path: panel_path.to_path_buf(),
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn panel_path(&self) -> &Path {
        &self.panel_path
    }
}

fn apply_settings(conn: &Connection, config: &SessionConfig) -> Result<()> {
    let mut settings: Vec<(&'static str, String)> = vec![
        ("threads", config.worker_count.to_string()),
        ("memory_limit", sql_string(&config.memory_limit_setting())),
        ("preserve_insertion_order", "false".to_string()),
        (
            "temp_directory",
            sql_string(&config.temp_dir.to_string_lossy()),
        ),
    ];
    if let Some(max_temp) = config.max_temp_directory_setting() {
        settings.push(("max_temp_directory_size", sql_string(&max_temp)));
    }

    for (setting, value) in settings {
        debug!(setting, value = %value, "applying session setting");
        conn.execute_batch(&format!("SET {setting} = {value}"))
            .map_err(|source| PanelError::SessionSetting { setting, source })?;
    }
    Ok(())
}
