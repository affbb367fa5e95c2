pub mod config;
pub mod core;
pub mod engine;
pub mod report;
pub mod sealer;
pub mod storage;
pub mod store;

pub mod prove_cmd;
pub mod recovery_cmd;
pub mod sealing_cmd;
pub mod stage_cmd;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::{SectorId, Stage};

#[derive(Debug, Error)]
pub enum BenchError {
    /// Invalid parameters, detected before any work starts.
    #[error("configuration error: {0}")]
    Config(String),
    #[error("parallelism factor must cleanly divide the sector count ({sectors} sectors, {workers} workers)")]
    Partition { sectors: u64, workers: usize },
    #[error("{stage} failed for sector {sector}: {source}")]
    Stage {
        stage: Stage,
        sector: SectorId,
        #[source]
        source: Box<BenchError>,
    },
    #[error("checkpoint {}: {source}", path.display())]
    Checkpoint {
        path: PathBuf,
        #[source]
        source: Box<BenchError>,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Message(String),
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl BenchError {
    /// Wrap an error with the stage and sector it happened in.
    pub fn at_stage(self, stage: Stage, sector: SectorId) -> Self {
        BenchError::Stage {
            stage,
            sector,
            source: Box::new(self),
        }
    }

    /// Stage name and sector of a stage failure, if this is one.
    pub fn stage(&self) -> Option<(Stage, SectorId)> {
        match self {
            BenchError::Stage { stage, sector, .. } => Some((*stage, *sector)),
            _ => None,
        }
    }
}

pub type BenchResult<T> = Result<T, BenchError>;

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct SystemInfo {
    pub cpu_model: Option<String>,
    pub cpu_cores_logical: Option<usize>,
    pub cpu_cores_physical: Option<usize>,
    pub total_ram_bytes: Option<u64>,
    pub os: Option<String>,
}

// Shared helpers
pub fn collect_system_info() -> SystemInfo {
    use sysinfo::System;
    let mut sys = System::new_all();
    sys.refresh_all();
    let cpu_model = sys.cpus().first().map(|c| c.brand().to_string());
    let cpu_cores_logical = Some(sys.cpus().len());
    let cpu_cores_physical = sys.physical_core_count();
    let total_ram_bytes = Some(sys.total_memory());
    let os = System::name();
    SystemInfo { cpu_model, cpu_cores_logical, cpu_cores_physical, total_ram_bytes, os }
}

pub fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default()
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_home(path: &std::path::Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(rest),
        None => path.to_path_buf(),
    }
}
