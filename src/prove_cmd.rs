use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::core::{ActorId, SectorRef, SectorSize, Stage};
use crate::engine::{PipelineOptions, SectorPipeline, StageGates};
use crate::report::stage_line;
use crate::sealer::SealerSettings;
use crate::storage::Commit2In;
use crate::storage::checkpoint::read_record;
use crate::store::SectorStore;
use crate::{BenchResult, expand_home};

/// Result of a standalone proof computation.
#[derive(Debug, Clone)]
pub struct ProveOutcome {
    pub sector: SectorRef,
    pub proof: Vec<u8>,
    pub took: Duration,
}

/// Run Commit2 on the record stored at `input`.
pub fn prove(
    settings: &SealerSettings,
    input: &Path,
    miner_addr: &str,
    storage_dir: &Path,
) -> BenchResult<ProveOutcome> {
    let c2in: Commit2In = read_record(input)?;
    let miner = ActorId::from_address(miner_addr)?;
    let sector = SectorRef::new(miner, c2in.sector_number()?, SectorSize(c2in.sector_size))?;

    let store = SectorStore::open(expand_home(storage_dir))?;
    let env = settings.env();
    let sealer = settings.build(&store, &env)?;
    let options = PipelineOptions::default();
    let pipeline = SectorPipeline::new(sealer.as_ref(), &store, Arc::new(StageGates::serial()?), &options);

    tracing::info!(sector = %sector.id, input = %input.display(), "starting proof computation");
    let (proof, took) = pipeline.commit2(&sector, &c2in.phase1_out)?;
    Ok(ProveOutcome { sector, proof, took })
}

pub fn print_outcome(outcome: &ProveOutcome) {
    let size = outcome.sector.sector_size();
    println!("proof: {}", hex::encode(&outcome.proof));
    println!("----\nresults ({})", size.0);
    println!("{}", stage_line(Stage::Commit2, size, outcome.took));
}

pub fn run(
    settings: &SealerSettings,
    input: PathBuf,
    miner_addr: String,
    storage_dir: PathBuf,
) -> BenchResult<()> {
    println!("----\nstart proof computation");
    let outcome = prove(settings, &input, &miner_addr, &storage_dir)?;
    print_outcome(&outcome);
    Ok(())
}
