//! Single-stage commands.
//!
//! Each command runs one sealing stage for one sector and hands its output to
//! the next command through a checkpoint record, so the pipeline can be split
//! across invocations (and machines).

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{DEFAULT_MINER_ADDR, DEFAULT_SECTOR_SIZE, DEFAULT_STORAGE_DIR};
use crate::core::{
    ActorId, EnvCapture, SealSeed, SealTicket, SectorNumber, SectorRef, SectorSize, Stage,
};
use crate::engine::{PipelineOptions, SectorPipeline, StageGates};
use crate::prove_cmd;
use crate::report::stage_line;
use crate::sealer::{Sealer, SealerSettings};
use crate::storage::{CheckpointDir, Commit1In, Commit2In, PreCommit1In, PreCommit2In};
use crate::store::SectorStore;
use crate::{BenchResult, expand_home};

/// Sector and location flags shared by the stage commands.
#[derive(Debug, Clone)]
pub struct StageArgs {
    pub storage_dir: PathBuf,
    pub miner_id: String,
    pub sector_id: u64,
    pub sector_size: String,
    pub checkpoint_dir: PathBuf,
}

impl Default for StageArgs {
    fn default() -> Self {
        StageArgs {
            storage_dir: PathBuf::from(DEFAULT_STORAGE_DIR),
            miner_id: DEFAULT_MINER_ADDR.to_string(),
            sector_id: 10,
            sector_size: DEFAULT_SECTOR_SIZE.to_string(),
            checkpoint_dir: PathBuf::from("."),
        }
    }
}

impl StageArgs {
    pub fn sector(&self, size: SectorSize) -> BenchResult<SectorRef> {
        SectorRef::new(ActorId::from_address(&self.miner_id)?, SectorNumber(self.sector_id), size)
    }

    pub fn checkpoints(&self) -> CheckpointDir {
        CheckpointDir::new(&self.checkpoint_dir)
    }
}

struct StageContext {
    store: SectorStore,
    sealer: Box<dyn Sealer>,
    gates: Arc<StageGates>,
    options: PipelineOptions,
}

impl StageContext {
    fn open(settings: &SealerSettings, args: &StageArgs) -> BenchResult<Self> {
        let store = SectorStore::open(expand_home(&args.storage_dir))?;
        let env: EnvCapture = settings.env();
        let sealer = settings.build(&store, &env)?;
        Ok(StageContext {
            store,
            sealer,
            gates: Arc::new(StageGates::serial()?),
            options: PipelineOptions::default(),
        })
    }

    fn pipeline(&self) -> SectorPipeline<'_> {
        SectorPipeline::new(self.sealer.as_ref(), &self.store, Arc::clone(&self.gates), &self.options)
    }
}

fn print_result(stage: Stage, sector: &SectorRef, took: Duration) {
    let size = sector.sector_size();
    println!("----\nresults ({})", size.0);
    println!("{}", stage_line(stage, size, took));
    println!("----\n{}", sector.id);
}

/// AddPiece with a full sector of zero bytes; writes `p1in.json`.
pub fn add_piece(settings: &SealerSettings, args: &StageArgs) -> BenchResult<Duration> {
    let sector = args.sector(SectorSize::parse(&args.sector_size)?)?;
    let ctx = StageContext::open(settings, args)?;
    let mut zeros = std::io::repeat(0).take(sector.sector_size().padded().unpadded().0);
    let (piece, took) = ctx.pipeline().add_piece(&sector, &mut zeros)?;
    let path = args.checkpoints().save(&PreCommit1In::from_piece(&piece))?;
    print_result(Stage::AddPiece, &sector, took);
    println!("p1in={}", path.display());
    Ok(took)
}

/// PreCommit1 from `p1in.json`; writes `p2in.json`.
pub fn pre_commit1(settings: &SealerSettings, args: &StageArgs, ticket: &str) -> BenchResult<Duration> {
    let cps = args.checkpoints();
    let p1in: PreCommit1In = cps.load()?;
    let piece = p1in.piece()?;
    let sector = args.sector(SectorSize(p1in.size))?;
    let ticket = SealTicket::from_hex_or_default(ticket)?;

    let ctx = StageContext::open(settings, args)?;
    let (out, took) = ctx.pipeline().pre_commit1(&sector, &ticket, &[piece])?;
    cps.save(&PreCommit2In { size: p1in.size, data: out, ticket: ticket.0.to_vec() })?;
    print_result(Stage::PreCommit1, &sector, took);
    println!("ticket={}", ticket.to_hex());
    Ok(took)
}

/// PreCommit2 from `p2in.json`; writes `c1in.json`.
pub fn pre_commit2(settings: &SealerSettings, args: &StageArgs) -> BenchResult<Duration> {
    let cps = args.checkpoints();
    let p2in: PreCommit2In = cps.load()?;
    let sector = args.sector(SectorSize(p2in.size))?;

    let ctx = StageContext::open(settings, args)?;
    let (cids, took) = ctx.pipeline().pre_commit2(&sector, &p2in.data)?;
    cps.save(&Commit1In::from_cids(p2in.size, &cids))?;
    print_result(Stage::PreCommit2, &sector, took);
    println!("unsealed={} sealed={}", cids.unsealed, cids.sealed);
    Ok(took)
}

/// Commit1 from the three earlier records; writes `c2in.json`.
pub fn commit1(
    settings: &SealerSettings,
    args: &StageArgs,
    seed: &str,
    seed_height: i64,
) -> BenchResult<Duration> {
    let cps = args.checkpoints();
    let piece = cps.load::<PreCommit1In>()?.piece()?;
    let ticket = cps.load::<PreCommit2In>()?.ticket()?;
    let c1in: Commit1In = cps.load()?;
    let cids = c1in.cids()?;
    let sector = args.sector(SectorSize(c1in.size))?;
    let seed = SealSeed::from_hex_or_default(seed, seed_height)?;

    let ctx = StageContext::open(settings, args)?;
    let (out, took) = ctx.pipeline().commit1(&sector, &ticket, &seed, &[piece], &cids)?;
    cps.save(&Commit2In::new(sector.id.number, out, sector.sector_size())?)?;
    print_result(Stage::Commit1, &sector, took);
    println!("seed={} height={}", hex::encode(seed.value), seed.epoch);
    Ok(took)
}

/// Commit2 from `input`, or `c2in.json` in the checkpoint directory.
pub fn commit2(settings: &SealerSettings, args: &StageArgs, input: Option<PathBuf>) -> BenchResult<Duration> {
    let input = input.unwrap_or_else(|| args.checkpoints().path_of::<Commit2In>());
    println!("----\nstart proof computation");
    let outcome = prove_cmd::prove(settings, &input, &args.miner_id, &args.storage_dir)?;
    prove_cmd::print_outcome(&outcome);
    Ok(outcome.took)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sealer::SealerKind;
    use crate::BenchError;

    fn mock() -> SealerSettings {
        SealerSettings { kind: SealerKind::Mock, ..Default::default() }
    }

    fn args(dir: &std::path::Path) -> StageArgs {
        StageArgs {
            storage_dir: dir.join("store"),
            sector_size: "2KiB".into(),
            checkpoint_dir: dir.join("cp"),
            ..Default::default()
        }
    }

    #[test]
    fn test_stages_chain_through_checkpoints() {
        let dir = tempfile::tempdir().unwrap();
        let args = args(dir.path());
        let settings = mock();

        add_piece(&settings, &args).unwrap();
        pre_commit1(&settings, &args, "").unwrap();
        pre_commit2(&settings, &args).unwrap();
        commit1(&settings, &args, "", SealSeed::DEFAULT_EPOCH).unwrap();
        commit2(&settings, &args, None).unwrap();

        let cps = args.checkpoints();
        let p2in: PreCommit2In = cps.load().unwrap();
        assert_eq!(p2in.ticket().unwrap().to_hex(), SealTicket::DEFAULT_HEX);
        let c2in: Commit2In = cps.load().unwrap();
        assert_eq!(c2in.sector_number().unwrap(), SectorNumber(10));
        assert_eq!(c2in.sector_size, 2048);
    }

    #[test]
    fn test_stage_without_input_record_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = pre_commit2(&mock(), &args(dir.path())).unwrap_err();
        assert!(matches!(err, BenchError::Checkpoint { .. }));
    }
}
