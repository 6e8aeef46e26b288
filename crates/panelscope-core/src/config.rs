//! Resource configuration for the analytics session.
//!
//! All environment access lives in [`EnvHints::from_env`]; everything
//! downstream works on the resolved [`SessionConfig`] so that the cluster and
//! workstation regimes can be exercised with synthetic hints.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::warn;

pub const OVERRIDE_ROOT_VAR: &str = "SCRATCH";
pub const CPUS_VAR: &str = "SLURM_CPUS_PER_TASK";
pub const MEM_PER_CPU_VAR: &str = "SLURM_MEM_PER_CPU";
pub const MEM_PER_NODE_VAR: &str = "SLURM_MEM_PER_NODE";

const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * MIB;

const CLUSTER_WORKERS: usize = 32;
const LOCAL_WORKERS: usize = 4;
const CLUSTER_MEMORY_BYTES: u64 = 100 * GIB;
const LOCAL_MEMORY_BYTES: u64 = 8 * GIB;
const CLUSTER_MAX_TEMP_BYTES: u64 = 500 * GIB;

/// Scheduler and storage hints, read once at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvHints {
    pub override_root: Option<PathBuf>,
    pub cpus: Option<usize>,
    pub mem_per_cpu_mib: Option<u64>,
    pub mem_per_node_mib: Option<u64>,
}

impl EnvHints {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds hints from an arbitrary key lookup. Empty, unparseable and
    /// non-positive values count as absent.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let override_root = lookup(OVERRIDE_ROOT_VAR)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(PathBuf::from);

        Self {
            override_root,
            cpus: parse_positive(CPUS_VAR, lookup(CPUS_VAR)),
            mem_per_cpu_mib: parse_positive(MEM_PER_CPU_VAR, lookup(MEM_PER_CPU_VAR)),
            mem_per_node_mib: parse_positive(MEM_PER_NODE_VAR, lookup(MEM_PER_NODE_VAR)),
        }
    }

    pub fn is_cluster_mode(&self) -> bool {
        self.override_root.is_some()
    }
}

fn parse_positive<T>(key: &str, raw: Option<String>) -> Option<T>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    let raw = raw?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.parse::<T>() {
        Ok(value) if value > T::default() => Some(value),
        _ => {
            warn!(variable = key, value = trimmed, "ignoring invalid resource hint");
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionConfig {
    pub is_cluster_mode: bool,
    pub worker_count: usize,
    pub memory_limit_bytes: u64,
    pub temp_dir: PathBuf,
    pub max_temp_directory_bytes: Option<u64>,
}

impl SessionConfig {
    pub fn resolve(hints: &EnvHints, project_root: &Path) -> Self {
        let is_cluster_mode = hints.is_cluster_mode();

        let worker_count = hints.cpus.unwrap_or(if is_cluster_mode {
            CLUSTER_WORKERS
        } else {
            LOCAL_WORKERS
        });

        let memory_limit_bytes = match (hints.mem_per_cpu_mib, hints.cpus, hints.mem_per_node_mib) {
            (Some(per_cpu), Some(cpus), _) => per_cpu.saturating_mul(cpus as u64).saturating_mul(MIB),
            (_, _, Some(per_node)) => per_node.saturating_mul(MIB),
            _ if is_cluster_mode => CLUSTER_MEMORY_BYTES,
            _ => LOCAL_MEMORY_BYTES,
        };

        let temp_dir = match &hints.override_root {
            Some(root) => root.join("duckdb_tmp"),
            None => project_root.join("temp"),
        };

        Self {
            is_cluster_mode,
            worker_count,
            memory_limit_bytes,
            temp_dir,
            max_temp_directory_bytes: is_cluster_mode.then_some(CLUSTER_MAX_TEMP_BYTES),
        }
    }

    /// Memory ceiling in the unit DuckDB's `memory_limit` expects.
    pub fn memory_limit_setting(&self) -> String {
        format!("{}MiB", (self.memory_limit_bytes / MIB).max(1))
    }

    pub fn max_temp_directory_setting(&self) -> Option<String> {
        self.max_temp_directory_bytes
            .map(|bytes| format!("{}GiB", (bytes / GIB).max(1)))
    }
}
