//! Per-sector stage chain.

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use cid::Cid;

use crate::core::{
    PieceInfo, SealSeed, SealTicket, SealVerifyInfo, SealedSectorInfo, SectorCids, SectorOutcome,
    SectorRef, SeedPolicy, Stage, StageTiming,
};
use crate::sealer::Sealer;
use crate::storage::checkpoint::{Commit2In, commit2_input_path, write_record};
use crate::store::SectorStore;
use crate::BenchResult;

use super::gate::StageGate;

/// One gate per bounded stage, shared by every worker of a run.
#[derive(Debug)]
pub struct StageGates {
    pub precommit2: StageGate,
    pub commit1: StageGate,
    pub commit2: StageGate,
}

impl StageGates {
    pub fn new(precommit2: usize, commit1: usize, commit2: usize) -> BenchResult<Self> {
        Ok(StageGates {
            precommit2: StageGate::new("precommit2", precommit2)?,
            commit1: StageGate::new("commit1", commit1)?,
            commit2: StageGate::new("commit2", commit2)?,
        })
    }

    /// Gates that admit a single sector at a time.
    pub fn serial() -> BenchResult<Self> {
        Self::new(1, 1, 1)
    }
}

/// Where to save Commit2 inputs produced during a run.
#[derive(Debug, Clone)]
pub struct SaveCommit2Input {
    pub path: PathBuf,
    /// Write one file per sector instead of `path` itself.
    pub per_sector: bool,
}

/// Behaviour switches for the stage chain.
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    pub skip_commit2: bool,
    pub skip_verify: bool,
    pub skip_unseal: bool,
    /// Each sector's ticket is derived from this preimage and its number.
    pub ticket_preimage: Vec<u8>,
    pub seed: SealSeed,
    pub seed_policy: SeedPolicy,
    pub save_commit2_input: Option<SaveCommit2Input>,
}

impl PipelineOptions {
    pub fn ticket_for(&self, sector: &SectorRef) -> SealTicket {
        SealTicket::derive(&self.ticket_preimage, sector.id.number)
    }

    pub fn seed_for(&self, sector: &SectorRef) -> SealSeed {
        self.seed_policy.seed_for(&self.seed, sector.id.number)
    }
}

/// Drives one sector at a time through the sealing stages.
///
/// Every stage is also exposed on its own so a stage can run in a separate
/// invocation from checkpointed inputs.
pub struct SectorPipeline<'a> {
    sealer: &'a dyn Sealer,
    store: &'a SectorStore,
    gates: Arc<StageGates>,
    options: &'a PipelineOptions,
}

/// Run `f`, timing it and tagging any failure with the stage and sector.
fn timed<T>(
    stage: Stage,
    sector: &SectorRef,
    f: impl FnOnce() -> BenchResult<T>,
) -> BenchResult<(T, Duration)> {
    let start = Instant::now();
    let out = f().map_err(|e| e.at_stage(stage, sector.id))?;
    Ok((out, start.elapsed()))
}

/// Take a slot of `gate`, then time the call. Waiting for the slot is not timed.
fn gated<T>(
    gate: &StageGate,
    stage: Stage,
    sector: &SectorRef,
    f: impl FnOnce() -> BenchResult<T>,
) -> BenchResult<(T, Duration)> {
    let _permit = gate.acquire().map_err(|e| e.at_stage(stage, sector.id))?;
    timed(stage, sector, f)
}

impl<'a> SectorPipeline<'a> {
    pub fn new(
        sealer: &'a dyn Sealer,
        store: &'a SectorStore,
        gates: Arc<StageGates>,
        options: &'a PipelineOptions,
    ) -> Self {
        SectorPipeline { sealer, store, gates, options }
    }

    pub fn add_piece(&self, sector: &SectorRef, data: &mut dyn Read) -> BenchResult<(PieceInfo, Duration)> {
        let size = sector.sector_size().padded().unpadded();
        tracing::info!(sector = %sector.id, "writing piece into sector");
        let mut data = data.take(size.0);
        timed(Stage::AddPiece, sector, || self.sealer.add_piece(sector, size, &mut data))
    }

    pub fn pre_commit1(
        &self,
        sector: &SectorRef,
        ticket: &SealTicket,
        pieces: &[PieceInfo],
    ) -> BenchResult<(Vec<u8>, Duration)> {
        tracing::info!(sector = %sector.id, "running replication (1)");
        timed(Stage::PreCommit1, sector, || self.sealer.pre_commit1(sector, ticket, pieces))
    }

    pub fn pre_commit2(&self, sector: &SectorRef, phase1_out: &[u8]) -> BenchResult<(SectorCids, Duration)> {
        tracing::info!(sector = %sector.id, "running replication (2)");
        gated(&self.gates.precommit2, Stage::PreCommit2, sector, || self.sealer.pre_commit2(sector, phase1_out))
    }

    pub fn commit1(
        &self,
        sector: &SectorRef,
        ticket: &SealTicket,
        seed: &SealSeed,
        pieces: &[PieceInfo],
        cids: &SectorCids,
    ) -> BenchResult<(Vec<u8>, Duration)> {
        tracing::info!(sector = %sector.id, "generating PoRep for sector (1)");
        gated(&self.gates.commit1, Stage::Commit1, sector, || self.sealer.commit1(sector, ticket, &seed.value, pieces, cids))
    }

    pub fn commit2(&self, sector: &SectorRef, phase1_out: &[u8]) -> BenchResult<(Vec<u8>, Duration)> {
        tracing::info!(sector = %sector.id, "generating PoRep for sector (2)");
        gated(&self.gates.commit2, Stage::Commit2, sector, || self.sealer.commit2(sector, phase1_out))
    }

    /// Check a seal proof. An invalid proof is `Ok(false)`.
    pub fn verify(
        &self,
        sector: &SectorRef,
        ticket: &SealTicket,
        seed: &SealSeed,
        cids: &SectorCids,
        proof: &[u8],
    ) -> BenchResult<(bool, Duration)> {
        let info = SealVerifyInfo {
            sector_id: sector.id,
            seal_proof: sector.proof_type,
            sealed_cid: cids.sealed,
            unsealed_cid: cids.unsealed,
            proof: proof.to_vec(),
            randomness: *ticket,
            interactive_randomness: seed.value,
        };
        let (ok, took) = timed(Stage::Verify, sector, || self.sealer.verify_seal(&info))?;
        if !ok {
            tracing::error!(sector = %sector.id, "porep proof was invalid");
        }
        Ok((ok, took))
    }

    /// Re-derive the whole sector's unsealed data.
    ///
    /// Any existing unsealed copy is removed first; the removal is not timed.
    pub fn unseal(&self, sector: &SectorRef, ticket: &SealTicket, unsealed: &Cid) -> BenchResult<Duration> {
        let removed = self
            .store
            .remove_unsealed(&sector.id)
            .map_err(|e| e.at_stage(Stage::Unseal, sector.id))?;
        tracing::info!(sector = %sector.id, removed, "unsealing sector");
        let size = sector.sector_size().padded().unpadded();
        let ((), took) = timed(Stage::Unseal, sector, || {
            self.sealer.unseal_piece(sector, 0, size, ticket, unsealed)
        })?;
        Ok(took)
    }

    fn save_commit2_input(&self, sector: &SectorRef, phase1_out: &[u8]) {
        let Some(target) = &self.options.save_commit2_input else {
            return;
        };
        let path = commit2_input_path(&target.path, sector.id.number, target.per_sector);
        let res = Commit2In::new(sector.id.number, phase1_out.to_vec(), sector.sector_size())
            .and_then(|rec| write_record(&path, &rec));
        if let Err(e) = res {
            tracing::warn!(sector = %sector.id, "failed to save commit2 input: {e:#}");
        }
    }

    /// Run every stage after AddPiece for one sector.
    ///
    /// The first failing stage ends the sector; later stages never run.
    pub fn run(&self, sector: &SectorRef, piece: PieceInfo) -> BenchResult<SectorOutcome> {
        let opts = self.options;
        let ticket = opts.ticket_for(sector);
        let seed = opts.seed_for(sector);
        let pieces = [piece];
        let mut timing = StageTiming::default();

        let (pc1_out, took) = self.pre_commit1(sector, &ticket, &pieces)?;
        timing.pre_commit1 = took;

        let (cids, took) = self.pre_commit2(sector, &pc1_out)?;
        timing.pre_commit2 = took;

        let (c1_out, took) = self.commit1(sector, &ticket, &seed, &pieces, &cids)?;
        timing.commit1 = took;
        self.save_commit2_input(sector, &c1_out);

        let mut proof = None;
        if !opts.skip_commit2 {
            let (p, took) = self.commit2(sector, &c1_out)?;
            timing.commit2 = took;
            proof = Some(p);
        }

        let mut verified = None;
        if let Some(p) = proof.as_deref() {
            if !opts.skip_verify {
                let (ok, took) = self.verify(sector, &ticket, &seed, &cids, p)?;
                timing.verify = took;
                verified = Some(ok);
            }
        }

        if !opts.skip_unseal {
            timing.unseal = self.unseal(sector, &ticket, &cids.unsealed)?;
        }

        Ok(SectorOutcome {
            sector: sector.id,
            timing,
            sealed: SealedSectorInfo {
                seal_proof: sector.proof_type,
                sector_number: sector.id.number,
                sealed_cid: cids.sealed,
            },
            cids,
            proof,
            verified,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ActorId, SectorNumber, SectorSize};
    use crate::sealer::{MockConfig, MockOp, MockSealer};

    fn sector(n: u64) -> SectorRef {
        SectorRef::new(ActorId(1000), SectorNumber(n), SectorSize::KIB_2).unwrap()
    }

    fn add(pipeline: &SectorPipeline<'_>, s: &SectorRef) -> PieceInfo {
        let mut data = std::io::repeat(1).take(s.sector_size().padded().unpadded().0);
        pipeline.add_piece(s, &mut data).unwrap().0
    }

    /// Endless reader that counts what it hands out.
    struct Counting(u64);

    impl Read for Counting {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            buf.fill(3);
            self.0 += buf.len() as u64;
            Ok(buf.len())
        }
    }

    #[test]
    fn test_add_piece_reads_exactly_the_piece_size() {
        let dir = tempfile::tempdir().unwrap();
        let store = SectorStore::open(dir.path()).unwrap();
        let sealer = MockSealer::default_mock();
        let opts = PipelineOptions::default();
        let pipeline = SectorPipeline::new(&sealer, &store, Arc::new(StageGates::serial().unwrap()), &opts);

        let s = sector(4);
        let mut source = Counting(0);
        let (info, _) = pipeline.add_piece(&s, &mut source).unwrap();
        assert_eq!(info.size, s.sector_size().padded());
        assert_eq!(source.0, s.sector_size().padded().unpadded().0);
    }

    #[test]
    fn test_gated_stages_release_their_slot() {
        let dir = tempfile::tempdir().unwrap();
        let store = SectorStore::open(dir.path()).unwrap();
        let sealer = MockSealer::default_mock();
        let opts = PipelineOptions::default();
        let gates = Arc::new(StageGates::serial().unwrap());
        let pipeline = SectorPipeline::new(&sealer, &store, gates.clone(), &opts);

        let s = sector(5);
        let piece = add(&pipeline, &s);
        let ticket = opts.ticket_for(&s);
        let (pc1, _) = pipeline.pre_commit1(&s, &ticket, &[piece.clone()]).unwrap();
        let (cids, _) = pipeline.pre_commit2(&s, &pc1).unwrap();
        assert_eq!(gates.precommit2.holders(), 0);
        let (c1, _) = pipeline.commit1(&s, &ticket, &opts.seed_for(&s), &[piece], &cids).unwrap();
        assert_eq!(gates.commit1.holders(), 0);
        pipeline.commit2(&s, &c1).unwrap();
        assert_eq!(gates.commit2.holders(), 0);
    }

    #[test]
    fn test_run_full_chain() {
        let dir = tempfile::tempdir().unwrap();
        let store = SectorStore::open(dir.path()).unwrap();
        let sealer = MockSealer::new(MockConfig::new("mock").with_store(store.clone()));
        let opts = PipelineOptions::default();
        let pipeline = SectorPipeline::new(&sealer, &store, Arc::new(StageGates::serial().unwrap()), &opts);

        let s = sector(0);
        let piece = add(&pipeline, &s);
        let out = pipeline.run(&s, piece).unwrap();
        assert_eq!(out.verified, Some(true));
        assert_eq!(out.proof.as_ref().map(Vec::len), Some(192));
        assert_eq!(out.sealed.sealed_cid, out.cids.sealed);
        assert_eq!(sealer.count(MockOp::Unseal), 1);
        assert!(store.unsealed_path(&s.id).exists());
    }

    #[test]
    fn test_skip_commit2_skips_verify() {
        let dir = tempfile::tempdir().unwrap();
        let store = SectorStore::open(dir.path()).unwrap();
        let sealer = MockSealer::default_mock();
        let opts = PipelineOptions { skip_commit2: true, skip_unseal: true, ..Default::default() };
        let pipeline = SectorPipeline::new(&sealer, &store, Arc::new(StageGates::serial().unwrap()), &opts);

        let s = sector(1);
        let piece = add(&pipeline, &s);
        let out = pipeline.run(&s, piece).unwrap();
        assert!(out.proof.is_none());
        assert!(out.verified.is_none());
        assert_eq!(sealer.count(MockOp::Commit2), 0);
        assert_eq!(sealer.count(MockOp::VerifySeal), 0);
        assert_eq!(out.timing.commit2, Duration::ZERO);
    }

    #[test]
    fn test_failure_is_tagged_and_stops_the_sector() {
        let dir = tempfile::tempdir().unwrap();
        let store = SectorStore::open(dir.path()).unwrap();
        let sealer = MockSealer::new(MockConfig::new("mock").fails(MockOp::PreCommit2));
        let opts = PipelineOptions::default();
        let pipeline = SectorPipeline::new(&sealer, &store, Arc::new(StageGates::serial().unwrap()), &opts);

        let s = sector(2);
        let piece = add(&pipeline, &s);
        let err = pipeline.run(&s, piece).unwrap_err();
        assert_eq!(err.stage(), Some((Stage::PreCommit2, s.id)));
        assert_eq!(sealer.count(MockOp::Commit1), 0);
    }

    #[test]
    fn test_invalid_proof_is_recorded_not_raised() {
        let dir = tempfile::tempdir().unwrap();
        let store = SectorStore::open(dir.path()).unwrap();
        let sealer = MockSealer::new(MockConfig::new("mock").invalid_seal_proof(SectorNumber(4)));
        let opts = PipelineOptions { skip_unseal: true, ..Default::default() };
        let pipeline = SectorPipeline::new(&sealer, &store, Arc::new(StageGates::serial().unwrap()), &opts);

        let s = sector(4);
        let piece = add(&pipeline, &s);
        let out = pipeline.run(&s, piece).unwrap();
        assert_eq!(out.verified, Some(false));
    }

    #[test]
    fn test_unseal_removes_existing_copy_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = SectorStore::open(dir.path()).unwrap();
        let sealer = MockSealer::default_mock();
        let opts = PipelineOptions::default();
        let pipeline = SectorPipeline::new(&sealer, &store, Arc::new(StageGates::serial().unwrap()), &opts);

        let s = sector(5);
        let path = store.unsealed_path(&s.id);
        std::fs::write(&path, b"stale").unwrap();
        let cid = crate::core::commitment::data_commitment_to_cid(&[0u8; 32]).unwrap();
        pipeline.unseal(&s, &opts.ticket_for(&s), &cid).unwrap();
        // The mock has no store, so nothing is written back.
        assert!(!path.exists());
    }

    #[test]
    fn test_commit2_input_saved_when_requested() {
        let dir = tempfile::tempdir().unwrap();
        let store = SectorStore::open(dir.path().join("store")).unwrap();
        let sealer = MockSealer::default_mock();
        let c2 = dir.path().join("c2in.json");
        let opts = PipelineOptions {
            skip_commit2: true,
            skip_unseal: true,
            save_commit2_input: Some(SaveCommit2Input { path: c2.clone(), per_sector: false }),
            ..Default::default()
        };
        let pipeline = SectorPipeline::new(&sealer, &store, Arc::new(StageGates::serial().unwrap()), &opts);

        let s = sector(6);
        let piece = add(&pipeline, &s);
        pipeline.run(&s, piece).unwrap();
        let rec: Commit2In = crate::storage::checkpoint::read_record(&c2).unwrap();
        assert_eq!(rec.sector_num, 6);
        assert_eq!(rec.sector_size, 2048);
    }
}
