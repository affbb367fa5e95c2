//! Run configuration: an optional TOML file overridden by explicit CLI flags.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::core::{ActorId, SealSeed, SectorSize, SeedPolicy};
use crate::engine::{ParallelConfig, PipelineOptions, SaveCommit2Input, SealingPlan};
use crate::{BenchError, BenchResult};

pub const DEFAULT_STORAGE_DIR: &str = "~/.seal-bench";
pub const DEFAULT_SECTOR_SIZE: &str = "512MiB";
pub const DEFAULT_MINER_ADDR: &str = "t01000";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ParallelSection {
    pub workers: usize,
    pub precommit2: usize,
    pub commit1: usize,
    pub commit2: usize,
}

impl Default for ParallelSection {
    fn default() -> Self {
        ParallelSection { workers: 1, precommit2: 1, commit1: 1, commit2: 1 }
    }
}

/// Settings of a whole-pipeline sealing benchmark.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SealingConfig {
    pub storage_dir: PathBuf,
    pub sector_size: String,
    pub miner_addr: String,
    pub num_sectors: u64,
    pub first_sector: u64,
    pub ticket_preimage: String,
    pub per_sector_seed: bool,
    pub skip_commit2: bool,
    pub skip_verify: bool,
    pub skip_unseal: bool,
    pub save_commit2_input: Option<PathBuf>,
    pub parallel: ParallelSection,
}

impl Default for SealingConfig {
    fn default() -> Self {
        SealingConfig {
            storage_dir: PathBuf::from(DEFAULT_STORAGE_DIR),
            sector_size: DEFAULT_SECTOR_SIZE.to_string(),
            miner_addr: DEFAULT_MINER_ADDR.to_string(),
            num_sectors: 1,
            first_sector: 0,
            ticket_preimage: String::new(),
            per_sector_seed: false,
            skip_commit2: false,
            skip_verify: false,
            skip_unseal: false,
            save_commit2_input: None,
            parallel: ParallelSection::default(),
        }
    }
}

/// Values given explicitly on the command line; `None` keeps the file value.
#[derive(Debug, Clone, Default)]
pub struct SealingOverrides {
    pub storage_dir: Option<PathBuf>,
    pub sector_size: Option<String>,
    pub miner_addr: Option<String>,
    pub num_sectors: Option<u64>,
    pub first_sector: Option<u64>,
    pub ticket_preimage: Option<String>,
    pub per_sector_seed: bool,
    pub skip_commit2: bool,
    pub skip_verify: bool,
    pub skip_unseal: bool,
    pub save_commit2_input: Option<PathBuf>,
    pub workers: Option<usize>,
    pub precommit2: Option<usize>,
    pub commit1: Option<usize>,
    pub commit2: Option<usize>,
}

pub fn load_sealing_config(path: &Path) -> BenchResult<SealingConfig> {
    let s = std::fs::read_to_string(path)
        .map_err(|e| BenchError::Config(format!("reading {}: {e}", path.display())))?;
    toml::from_str(&s).map_err(|e| BenchError::Config(format!("parsing {}: {e}", path.display())))
}

impl SealingConfig {
    /// Load `path` if given, otherwise start from defaults, then apply overrides.
    pub fn resolve(path: Option<&Path>, overrides: SealingOverrides) -> BenchResult<Self> {
        let mut cfg = match path {
            Some(p) => load_sealing_config(p)?,
            None => SealingConfig::default(),
        };
        cfg.apply(overrides);
        Ok(cfg)
    }

    pub fn apply(&mut self, o: SealingOverrides) {
        if let Some(v) = o.storage_dir {
            self.storage_dir = v;
        }
        if let Some(v) = o.sector_size {
            self.sector_size = v;
        }
        if let Some(v) = o.miner_addr {
            self.miner_addr = v;
        }
        if let Some(v) = o.num_sectors {
            self.num_sectors = v;
        }
        if let Some(v) = o.first_sector {
            self.first_sector = v;
        }
        if let Some(v) = o.ticket_preimage {
            self.ticket_preimage = v;
        }
        if o.save_commit2_input.is_some() {
            self.save_commit2_input = o.save_commit2_input;
        }
        // Switches can only be turned on from the command line.
        self.per_sector_seed |= o.per_sector_seed;
        self.skip_commit2 |= o.skip_commit2;
        self.skip_verify |= o.skip_verify;
        self.skip_unseal |= o.skip_unseal;
        if let Some(v) = o.workers {
            self.parallel.workers = v;
        }
        if let Some(v) = o.precommit2 {
            self.parallel.precommit2 = v;
        }
        if let Some(v) = o.commit1 {
            self.parallel.commit1 = v;
        }
        if let Some(v) = o.commit2 {
            self.parallel.commit2 = v;
        }
    }

    pub fn miner(&self) -> BenchResult<ActorId> {
        ActorId::from_address(&self.miner_addr)
    }

    pub fn size(&self) -> BenchResult<SectorSize> {
        SectorSize::parse(&self.sector_size)
    }

    /// Build the sealing plan. Performs no validation of the partitioning.
    pub fn plan(&self) -> BenchResult<SealingPlan> {
        let options = PipelineOptions {
            skip_commit2: self.skip_commit2,
            skip_verify: self.skip_verify,
            skip_unseal: self.skip_unseal,
            ticket_preimage: self.ticket_preimage.as_bytes().to_vec(),
            seed: SealSeed::default(),
            seed_policy: if self.per_sector_seed { SeedPolicy::PerSector } else { SeedPolicy::Shared },
            save_commit2_input: self.save_commit2_input.as_ref().map(|path| SaveCommit2Input {
                path: path.clone(),
                per_sector: self.num_sectors > 1,
            }),
        };
        Ok(SealingPlan {
            miner: self.miner()?,
            sector_size: self.size()?,
            num_sectors: self.num_sectors,
            first_sector: self.first_sector,
            parallel: ParallelConfig {
                workers: self.parallel.workers,
                precommit2: self.parallel.precommit2,
                commit1: self.parallel.commit1,
                commit2: self.parallel.commit2,
            },
            options,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = SealingConfig::default();
        let plan = cfg.plan().unwrap();
        assert_eq!(plan.sector_size, SectorSize::MIB_512);
        assert_eq!(plan.miner, ActorId(1000));
        assert_eq!(plan.num_sectors, 1);
        assert_eq!(plan.parallel, ParallelConfig::default());
        assert!(plan.options.save_commit2_input.is_none());
    }

    #[test]
    fn test_load_toml_and_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.toml");
        std::fs::write(
            &path,
            r#"
sector_size = "2KiB"
num_sectors = 4
skip_unseal = true

[parallel]
workers = 2
precommit2 = 2
"#,
        )
        .unwrap();

        let overrides = SealingOverrides {
            num_sectors: Some(8),
            commit1: Some(3),
            ..Default::default()
        };
        let cfg = SealingConfig::resolve(Some(&path), overrides).unwrap();
        assert_eq!(cfg.sector_size, "2KiB");
        assert_eq!(cfg.num_sectors, 8);
        assert!(cfg.skip_unseal);
        assert_eq!(cfg.parallel, ParallelSection { workers: 2, precommit2: 2, commit1: 3, commit2: 1 });
    }

    #[test]
    fn test_unknown_key_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "sectors = 3\n").unwrap();
        assert!(matches!(load_sealing_config(&path), Err(BenchError::Config(_))));
    }

    #[test]
    fn test_per_sector_save_path_for_multiple_sectors() {
        let cfg = SealingConfig {
            num_sectors: 2,
            save_commit2_input: Some(PathBuf::from("c2.json")),
            per_sector_seed: true,
            ..Default::default()
        };
        let plan = cfg.plan().unwrap();
        assert!(plan.options.save_commit2_input.unwrap().per_sector);
        assert_eq!(plan.options.seed_policy, SeedPolicy::PerSector);
    }
}
