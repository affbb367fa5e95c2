use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{DEFAULT_MINER_ADDR, DEFAULT_STORAGE_DIR};
use crate::core::{ActorId, SealTicket, SectorCids, SectorNumber, SectorRef, SectorSize, Stage, StageTiming};
use crate::engine::{PipelineOptions, SectorPipeline, StageGates};
use crate::report::stage_line;
use crate::sealer::SealerSettings;
use crate::store::SectorStore;
use crate::{BenchResult, expand_home};

#[derive(Debug, Clone)]
pub struct RecoveryArgs {
    pub storage_dir: PathBuf,
    pub sector_size: String,
    pub miner_id: String,
    pub sector_id: u64,
    /// Hex ticket the sector was originally sealed with; required.
    pub ticket: String,
    /// Keep the unsealed copy and intermediate cache files.
    pub clear: bool,
}

impl Default for RecoveryArgs {
    fn default() -> Self {
        RecoveryArgs {
            storage_dir: PathBuf::from(DEFAULT_STORAGE_DIR),
            sector_size: "2KiB".to_string(),
            miner_id: DEFAULT_MINER_ADDR.to_string(),
            sector_id: 10,
            ticket: String::new(),
            clear: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecoveryOutcome {
    pub sector: SectorRef,
    pub ticket: SealTicket,
    pub cids: SectorCids,
    pub timing: StageTiming,
}

/// Regenerate a sealed replica from zero bytes and its original ticket.
///
/// Unless `clear` is set, the unsealed copy is removed and the sector is
/// finalized afterwards.
pub fn recover(settings: &SealerSettings, args: &RecoveryArgs) -> BenchResult<RecoveryOutcome> {
    let ticket = SealTicket::from_hex(&args.ticket)?;
    let size = SectorSize::parse(&args.sector_size)?;
    let sector = SectorRef::new(ActorId::from_address(&args.miner_id)?, SectorNumber(args.sector_id), size)?;

    let store = SectorStore::open(expand_home(&args.storage_dir))?;
    let env = settings.env();
    let sealer = settings.build(&store, &env)?;
    let options = PipelineOptions::default();
    let pipeline = SectorPipeline::new(sealer.as_ref(), &store, Arc::new(StageGates::serial()?), &options);

    let mut timing = StageTiming::default();
    let mut zeros = std::io::repeat(0).take(size.padded().unpadded().0);
    let (piece, took) = pipeline.add_piece(&sector, &mut zeros)?;
    timing.add_piece = took;
    let (pc1_out, took) = pipeline.pre_commit1(&sector, &ticket, &[piece])?;
    timing.pre_commit1 = took;
    let (cids, took) = pipeline.pre_commit2(&sector, &pc1_out)?;
    timing.pre_commit2 = took;

    if !args.clear {
        store.remove_unsealed(&sector.id)?;
        if let Err(e) = sealer.finalize_sector(&sector) {
            tracing::warn!(sector = %sector.id, "finalize failed: {e:#}");
        }
    }

    Ok(RecoveryOutcome { sector, ticket, cids, timing })
}

pub fn run(settings: &SealerSettings, args: RecoveryArgs) -> BenchResult<()> {
    let out = recover(settings, &args)?;
    let size = out.sector.sector_size();
    println!("----\nresults ({})", size.0);
    for stage in [Stage::AddPiece, Stage::PreCommit1, Stage::PreCommit2] {
        println!("{}", stage_line(stage, size, out.timing.get(stage)));
    }
    println!("----\n{}", out.sector.id);
    println!("recovery ticket={}", out.ticket.to_hex());
    println!("recovery commD={}", out.cids.unsealed);
    println!("recovery commR={}", out.cids.sealed);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sealer::SealerKind;
    use crate::BenchError;

    fn mock() -> SealerSettings {
        SealerSettings { kind: SealerKind::Mock, ..Default::default() }
    }

    #[test]
    fn test_ticket_is_required() {
        let dir = tempfile::tempdir().unwrap();
        let args = RecoveryArgs { storage_dir: dir.path().to_path_buf(), ..Default::default() };
        assert!(matches!(recover(&mock(), &args), Err(BenchError::Config(_))));
    }

    #[test]
    fn test_recovery_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let args = RecoveryArgs {
            storage_dir: dir.path().to_path_buf(),
            ticket: SealTicket::DEFAULT_HEX.to_string(),
            ..Default::default()
        };
        let a = recover(&mock(), &args).unwrap();
        let b = recover(&mock(), &args).unwrap();
        assert_eq!(a.cids, b.cids);
    }
}
