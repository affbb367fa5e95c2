//! Fan-out of sectors across parallel workers.

use std::io::Read;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::core::{ActorId, PieceInfo, RunResult, SectorNumber, SectorOutcome, SectorRef, SectorSize};
use crate::sealer::Sealer;
use crate::store::SectorStore;
use crate::{BenchError, BenchResult};

use super::pipeline::{PipelineOptions, SectorPipeline, StageGates};

/// Worker count and per-stage gate capacities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParallelConfig {
    /// Number of workers; must divide the sector count.
    pub workers: usize,
    pub precommit2: usize,
    pub commit1: usize,
    pub commit2: usize,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        ParallelConfig { workers: 1, precommit2: 1, commit1: 1, commit2: 1 }
    }
}

/// Everything needed to seal a batch of sectors.
#[derive(Debug, Clone)]
pub struct SealingPlan {
    pub miner: ActorId,
    pub sector_size: SectorSize,
    pub num_sectors: u64,
    /// Number of the first sector; the rest follow consecutively.
    pub first_sector: u64,
    pub parallel: ParallelConfig,
    pub options: PipelineOptions,
}

impl SealingPlan {
    pub fn new(miner: ActorId, sector_size: SectorSize, num_sectors: u64) -> Self {
        SealingPlan {
            miner,
            sector_size,
            num_sectors,
            first_sector: 0,
            parallel: ParallelConfig::default(),
            options: PipelineOptions::default(),
        }
    }

    /// Check every parameter and build the sector references.
    pub fn validate(&self) -> BenchResult<Vec<SectorRef>> {
        if self.num_sectors == 0 {
            return Err(BenchError::Config("number of sectors must be at least 1".into()));
        }
        if self.parallel.workers == 0 {
            return Err(BenchError::Config("parallel worker count must be at least 1".into()));
        }
        if self.num_sectors % self.parallel.workers as u64 != 0 {
            return Err(BenchError::Partition {
                sectors: self.num_sectors,
                workers: self.parallel.workers,
            });
        }
        let last = self
            .first_sector
            .checked_add(self.num_sectors - 1)
            .ok_or_else(|| BenchError::Config("sector numbers overflow".into()))?;
        (self.first_sector..=last)
            .map(|n| SectorRef::new(self.miner, SectorNumber(n), self.sector_size))
            .collect()
    }
}

/// Deterministic pseudo-random piece bytes for the sector at `index`.
pub struct PieceSource {
    rng: ChaCha8Rng,
}

impl PieceSource {
    pub fn for_index(index: u64) -> Self {
        PieceSource { rng: ChaCha8Rng::seed_from_u64(100 + index) }
    }
}

impl Read for PieceSource {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.rng.fill_bytes(buf);
        Ok(buf.len())
    }
}

type WorkerOutcome = (usize, BenchResult<Vec<SectorOutcome>>);

/// Seal every sector of `plan` and return the outcomes in sector order.
///
/// AddPiece runs for all sectors first, one after another. The remaining stages
/// run on `plan.parallel.workers` threads, each owning a contiguous block of
/// sectors. All workers run to completion; if any failed, one of their errors
/// is returned.
pub fn run_seals(sealer: &dyn Sealer, store: &SectorStore, plan: &SealingPlan) -> BenchResult<RunResult> {
    let sectors = plan.validate()?;
    let par = plan.parallel;
    let gates = Arc::new(StageGates::new(par.precommit2, par.commit1, par.commit2)?);

    tracing::info!(
        sectors = sectors.len(),
        workers = par.workers,
        sealer = sealer.name(),
        "starting sealing run"
    );

    let pipeline = SectorPipeline::new(sealer, store, gates.clone(), &plan.options);
    let mut added: Vec<(SectorRef, PieceInfo, Duration)> = Vec::with_capacity(sectors.len());
    for (index, sector) in sectors.iter().enumerate() {
        let mut source = PieceSource::for_index(index as u64);
        let (piece, took) = pipeline.add_piece(sector, &mut source)?;
        added.push((*sector, piece, took));
    }

    let per_worker = added.len() / par.workers;
    let (tx, rx) = flume::bounded::<WorkerOutcome>(par.workers);

    let blocks = thread::scope(|scope| -> BenchResult<Vec<Option<Vec<SectorOutcome>>>> {
        let mut spawned = 0;
        let mut first_err = None;
        for (wid, block) in added.chunks(per_worker).enumerate() {
            let tx = tx.clone();
            let gates = gates.clone();
            let options = &plan.options;
            let res = thread::Builder::new()
                .name(format!("seal-worker-{wid}"))
                .spawn_scoped(scope, move || {
                    let span = tracing::info_span!("worker", id = wid);
                    let _enter = span.enter();
                    let pipeline = SectorPipeline::new(sealer, store, gates, options);
                    let outcome = block
                        .iter()
                        .map(|(sector, piece, add_piece)| {
                            let span = tracing::info_span!("sector", id = %sector.id);
                            let _enter = span.enter();
                            let mut out = pipeline.run(sector, piece.clone())?;
                            out.timing.add_piece = *add_piece;
                            Ok(out)
                        })
                        .collect::<BenchResult<Vec<_>>>();
                    if let Err(e) = &outcome {
                        tracing::error!("worker failed: {e}");
                    }
                    let _ = tx.send((wid, outcome));
                });
            match res {
                Ok(_) => spawned += 1,
                Err(e) => {
                    first_err = Some(BenchError::Message(format!("failed to spawn worker {wid}: {e}")));
                    break;
                }
            }
        }
        drop(tx);

        let mut blocks: Vec<Option<Vec<SectorOutcome>>> = vec![None; par.workers];
        for _ in 0..spawned {
            match rx.recv() {
                Ok((wid, Ok(outcomes))) => blocks[wid] = Some(outcomes),
                Ok((_, Err(e))) => {
                    first_err.get_or_insert(e);
                }
                Err(_) => {
                    first_err.get_or_insert(BenchError::Message("worker exited without reporting".into()));
                    break;
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(blocks),
        }
    })?;

    let mut result = RunResult::default();
    for block in blocks {
        let block = block.ok_or_else(|| BenchError::Message("missing worker result".into()))?;
        result.sectors.extend(block);
    }
    tracing::info!(sectors = result.sectors.len(), "sealing run finished");
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sealer::{MockConfig, MockOp, MockSealer};

    fn plan(n: u64, workers: usize) -> SealingPlan {
        let mut plan = SealingPlan::new(ActorId(1000), SectorSize::KIB_2, n);
        plan.parallel.workers = workers;
        plan.options.skip_unseal = true;
        plan
    }

    #[test]
    fn test_piece_source_is_seeded_by_index() {
        let mut a = [0u8; 32];
        let mut b = [0u8; 32];
        let mut c = [0u8; 32];
        PieceSource::for_index(0).read_exact(&mut a).unwrap();
        PieceSource::for_index(0).read_exact(&mut b).unwrap();
        PieceSource::for_index(1).read_exact(&mut c).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_validate_rejects_bad_plans() {
        assert!(matches!(plan(0, 1).validate(), Err(BenchError::Config(_))));
        assert!(matches!(plan(4, 0).validate(), Err(BenchError::Config(_))));
        assert!(matches!(plan(5, 2).validate(), Err(BenchError::Partition { sectors: 5, workers: 2 })));
        let mut p = plan(2, 1);
        p.sector_size = SectorSize(1000);
        assert!(matches!(p.validate(), Err(BenchError::Config(_))));
    }

    #[test]
    fn test_first_sector_offsets_numbers() {
        let mut p = plan(2, 1);
        p.first_sector = 10;
        let refs = p.validate().unwrap();
        assert_eq!(refs[0].id.number, SectorNumber(10));
        assert_eq!(refs[1].id.number, SectorNumber(11));
    }

    #[test]
    fn test_zero_gate_capacity_fails_before_sealing() {
        let dir = tempfile::tempdir().unwrap();
        let store = SectorStore::open(dir.path()).unwrap();
        let sealer = MockSealer::default_mock();
        let mut p = plan(2, 1);
        p.parallel.commit1 = 0;
        assert!(matches!(run_seals(&sealer, &store, &p), Err(BenchError::Config(_))));
        assert!(sealer.calls().is_empty());
    }

    #[test]
    fn test_seeded_pieces_fill_each_sector() {
        let dir = tempfile::tempdir().unwrap();
        let store = SectorStore::open(dir.path()).unwrap();
        let sealer = MockSealer::new(MockConfig::new("mock").with_store(store.clone()));
        let result = run_seals(&sealer, &store, &plan(2, 1)).unwrap();
        assert_eq!(result.sectors.len(), 2);
        assert_ne!(result.sectors[0].cids.unsealed, result.sectors[1].cids.unsealed);
        for outcome in &result.sectors {
            let len = std::fs::metadata(store.unsealed_path(&outcome.sector)).unwrap().len();
            assert_eq!(len, SectorSize::KIB_2.padded().unpadded().0);
        }
    }

    #[test]
    fn test_results_follow_sector_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = SectorStore::open(dir.path()).unwrap();
        let sealer = MockSealer::new(MockConfig::new("mock").with_delay(Duration::from_millis(2)));
        let result = run_seals(&sealer, &store, &plan(6, 3)).unwrap();
        let numbers: Vec<u64> = result.sectors.iter().map(|s| s.sector.number.0).collect();
        assert_eq!(numbers, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(sealer.sectors_for(MockOp::AddPiece).len(), 6);
    }
}
