//! Mock sealer for testing and dry runs.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{Read, Write};
use std::time::Duration;

use cid::Cid;
use parking_lot::Mutex;

use crate::core::commitment::{
    Commitment, blake2b_256, cid_to_commitment, data_commitment_to_cid, replica_commitment_to_cid,
};
use crate::core::{
    ActorId, PieceInfo, PoStProof, PoStVerifyInfo, RegisteredPoStProof, SealTicket,
    SealVerifyInfo, SealedSectorInfo, SectorCids, SectorId, SectorNumber, SectorRef,
    UnpaddedPieceSize,
};
use crate::store::SectorStore;
use crate::{BenchError, BenchResult};

use super::traits::Sealer;

/// Sealer operations, as recorded in the call log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    AddPiece,
    PreCommit1,
    PreCommit2,
    Commit1,
    Commit2,
    VerifySeal,
    Unseal,
    Finalize,
    WinningChallenge,
    WinningPost,
    VerifyWinningPost,
    WindowPost,
    VerifyWindowPost,
}

/// One recorded sealer call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockCall {
    pub op: MockOp,
    pub sector: Option<SectorNumber>,
}

/// Configuration for mock sealer responses.
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Name to report
    pub name: String,
    /// Version to report
    pub version: Option<String>,
    /// When set, piece data and unsealed copies are written to this store
    pub store: Option<SectorStore>,
    /// Simulated compute time of every sealing operation
    pub delay: Duration,
    /// Operations that fail; `None` as sector means every sector
    pub failures: Vec<(MockOp, Option<SectorNumber>)>,
    /// Sectors whose seal proof verifies as invalid
    pub invalid_seal_proofs: HashSet<SectorNumber>,
    /// Whether PoSt verification reports valid proofs
    pub post_valid: bool,
}

impl MockConfig {
    /// Create a new mock config with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        MockConfig {
            name: name.into(),
            version: Some("mock-1.0.0".to_string()),
            store: None,
            delay: Duration::ZERO,
            failures: Vec::new(),
            invalid_seal_proofs: HashSet::new(),
            post_valid: true,
        }
    }

    /// Materialize sector files in a store.
    pub fn with_store(mut self, store: SectorStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Sleep this long in every sealing operation.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Make `op` fail for every sector.
    pub fn fails(mut self, op: MockOp) -> Self {
        self.failures.push((op, None));
        self
    }

    /// Make `op` fail for one sector.
    pub fn fails_for(mut self, op: MockOp, sector: SectorNumber) -> Self {
        self.failures.push((op, Some(sector)));
        self
    }

    /// Report the seal proof of `sector` as invalid.
    pub fn invalid_seal_proof(mut self, sector: SectorNumber) -> Self {
        self.invalid_seal_proofs.insert(sector);
        self
    }

    /// Report every PoSt proof as invalid.
    pub fn invalid_post(mut self) -> Self {
        self.post_valid = false;
        self
    }
}

#[derive(Debug, Default)]
struct Activity {
    current: usize,
    peak: usize,
}

/// Mock sealer.
///
/// Produces deterministic artifacts derived from the sector identity and its
/// inputs, records every call and tracks how many calls of each operation were
/// in flight at once.
pub struct MockSealer {
    config: MockConfig,
    calls: Mutex<Vec<MockCall>>,
    activity: Mutex<HashMap<MockOp, Activity>>,
}

struct ActiveGuard<'a> {
    sealer: &'a MockSealer,
    op: MockOp,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        let mut activity = self.sealer.activity.lock();
        if let Some(a) = activity.get_mut(&self.op) {
            a.current -= 1;
        }
    }
}

impl MockSealer {
    /// Create a new mock sealer with the given configuration.
    pub fn new(config: MockConfig) -> Self {
        MockSealer {
            config,
            calls: Mutex::new(Vec::new()),
            activity: Mutex::new(HashMap::new()),
        }
    }

    /// Create a mock sealer with default configuration.
    pub fn default_mock() -> Self {
        Self::new(MockConfig::new("mock"))
    }

    /// Sealed commitment the mock produces for a sector.
    pub fn sealed_cid_for(sector: &SectorId) -> BenchResult<Cid> {
        let mut buf = b"sealed".to_vec();
        buf.extend_from_slice(&sector.miner.0.to_le_bytes());
        buf.extend_from_slice(&sector.number.0.to_le_bytes());
        replica_commitment_to_cid(&trunc254(blake2b_256(&buf)))
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().clone()
    }

    /// Sectors passed to `op`, in call order.
    pub fn sectors_for(&self, op: MockOp) -> Vec<SectorNumber> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.op == op)
            .filter_map(|c| c.sector)
            .collect()
    }

    pub fn count(&self, op: MockOp) -> usize {
        self.calls.lock().iter().filter(|c| c.op == op).count()
    }

    /// Highest number of concurrent in-flight calls of `op` observed.
    pub fn peak_concurrency(&self, op: MockOp) -> usize {
        self.activity.lock().get(&op).map(|a| a.peak).unwrap_or(0)
    }

    /// Record the call, fail if configured, then hold an in-flight slot for the delay.
    fn enter(&self, op: MockOp, sector: Option<SectorNumber>) -> BenchResult<ActiveGuard<'_>> {
        self.calls.lock().push(MockCall { op, sector });
        let fails = self
            .config
            .failures
            .iter()
            .any(|(o, s)| *o == op && (s.is_none() || *s == sector));
        if fails {
            return Err(BenchError::Message(format!("mock {op:?} failed")));
        }
        {
            let mut activity = self.activity.lock();
            let a = activity.entry(op).or_default();
            a.current += 1;
            a.peak = a.peak.max(a.current);
        }
        let guard = ActiveGuard { sealer: self, op };
        if !self.config.delay.is_zero() {
            std::thread::sleep(self.config.delay);
        }
        Ok(guard)
    }
}

/// Clear the top two bits so the digest is a valid field element.
fn trunc254(mut comm: Commitment) -> Commitment {
    comm[31] &= 0x3f;
    comm
}

fn digest_parts(parts: &[&[u8]]) -> Commitment {
    let mut state = blake2b_simd::Params::new().hash_length(32).to_state();
    for p in parts {
        state.update(p);
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(state.finalize().as_bytes());
    out
}

fn sector_bytes(sector: &SectorRef) -> [u8; 16] {
    let mut b = [0u8; 16];
    b[..8].copy_from_slice(&sector.id.miner.0.to_le_bytes());
    b[8..].copy_from_slice(&sector.id.number.0.to_le_bytes());
    b
}

impl Sealer for MockSealer {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn version(&self) -> Option<String> {
        self.config.version.clone()
    }

    fn add_piece(
        &self,
        sector: &SectorRef,
        size: UnpaddedPieceSize,
        data: &mut dyn Read,
    ) -> BenchResult<PieceInfo> {
        let _active = self.enter(MockOp::AddPiece, Some(sector.id.number))?;
        size.validate()?;
        let mut out = match &self.config.store {
            Some(store) => Some(File::create(store.unsealed_path(&sector.id))?),
            None => None,
        };
        let mut state = blake2b_simd::Params::new().hash_length(32).to_state();
        let mut buf = vec![0u8; 64 * 1024];
        let mut total = 0u64;
        let mut data = data.take(size.0);
        loop {
            let n = data.read(&mut buf)?;
            if n == 0 {
                break;
            }
            state.update(&buf[..n]);
            if let Some(f) = out.as_mut() {
                f.write_all(&buf[..n])?;
            }
            total += n as u64;
        }
        if total != size.0 {
            return Err(BenchError::Message(format!(
                "piece reader yielded {total} bytes, expected {}",
                size.0
            )));
        }
        let mut comm = [0u8; 32];
        comm.copy_from_slice(state.finalize().as_bytes());
        Ok(PieceInfo {
            size: size.padded(),
            piece_cid: data_commitment_to_cid(&trunc254(comm))?,
        })
    }

    fn pre_commit1(
        &self,
        sector: &SectorRef,
        ticket: &SealTicket,
        pieces: &[PieceInfo],
    ) -> BenchResult<Vec<u8>> {
        let _active = self.enter(MockOp::PreCommit1, Some(sector.id.number))?;
        let first = pieces
            .first()
            .ok_or_else(|| BenchError::Message("pre_commit1 requires at least one piece".into()))?;
        // Phase-1 output carries CommD followed by a replication digest.
        let comm_d = cid_to_commitment(&first.piece_cid)?;
        let labels = digest_parts(&[b"pc1", &sector_bytes(sector), &ticket.0, &comm_d]);
        let mut out = comm_d.to_vec();
        out.extend_from_slice(&labels);
        Ok(out)
    }

    fn pre_commit2(&self, sector: &SectorRef, phase1_out: &[u8]) -> BenchResult<SectorCids> {
        let _active = self.enter(MockOp::PreCommit2, Some(sector.id.number))?;
        if phase1_out.len() != 64 {
            return Err(BenchError::Message(format!(
                "malformed phase-1 output ({} bytes)",
                phase1_out.len()
            )));
        }
        let mut comm_d = [0u8; 32];
        comm_d.copy_from_slice(&phase1_out[..32]);
        Ok(SectorCids {
            unsealed: data_commitment_to_cid(&comm_d)?,
            sealed: Self::sealed_cid_for(&sector.id)?,
        })
    }

    fn commit1(
        &self,
        sector: &SectorRef,
        ticket: &SealTicket,
        seed: &[u8; 32],
        pieces: &[PieceInfo],
        cids: &SectorCids,
    ) -> BenchResult<Vec<u8>> {
        let _active = self.enter(MockOp::Commit1, Some(sector.id.number))?;
        if pieces.is_empty() {
            return Err(BenchError::Message("commit1 requires at least one piece".into()));
        }
        let out = digest_parts(&[
            b"c1",
            &sector_bytes(sector),
            &ticket.0,
            seed,
            &cids.unsealed.to_bytes(),
            &cids.sealed.to_bytes(),
        ]);
        Ok(out.to_vec())
    }

    fn commit2(&self, sector: &SectorRef, phase1_out: &[u8]) -> BenchResult<Vec<u8>> {
        let _active = self.enter(MockOp::Commit2, Some(sector.id.number))?;
        let mut proof = Vec::with_capacity(192);
        for i in 0u8..6 {
            proof.extend_from_slice(&digest_parts(&[b"c2", &[i], phase1_out]));
        }
        Ok(proof)
    }

    fn verify_seal(&self, info: &SealVerifyInfo) -> BenchResult<bool> {
        let _active = self.enter(MockOp::VerifySeal, Some(info.sector_id.number))?;
        Ok(!info.proof.is_empty()
            && !self.config.invalid_seal_proofs.contains(&info.sector_id.number))
    }

    fn unseal_piece(
        &self,
        sector: &SectorRef,
        offset: u64,
        size: UnpaddedPieceSize,
        _ticket: &SealTicket,
        unsealed_cid: &Cid,
    ) -> BenchResult<()> {
        let _active = self.enter(MockOp::Unseal, Some(sector.id.number))?;
        cid_to_commitment(unsealed_cid)?;
        if let Some(store) = &self.config.store {
            let mut f = File::create(store.unsealed_path(&sector.id))?;
            let mut zeros = std::io::repeat(0).take(offset + size.0);
            std::io::copy(&mut zeros, &mut f)?;
        }
        Ok(())
    }

    fn finalize_sector(&self, sector: &SectorRef) -> BenchResult<()> {
        let _active = self.enter(MockOp::Finalize, Some(sector.id.number))?;
        if let Some(store) = &self.config.store {
            let cache = store.cache_path(&sector.id);
            if cache.exists() {
                std::fs::remove_dir_all(cache)?;
            }
        }
        Ok(())
    }

    fn generate_winning_post_sector_challenge(
        &self,
        _proof: RegisteredPoStProof,
        miner: ActorId,
        randomness: &[u8; 32],
        eligible: u64,
    ) -> BenchResult<Vec<u64>> {
        let _active = self.enter(MockOp::WinningChallenge, None)?;
        if eligible == 0 {
            return Ok(Vec::new());
        }
        let d = digest_parts(&[randomness, &miner.0.to_le_bytes()]);
        let mut first = [0u8; 8];
        first.copy_from_slice(&d[..8]);
        Ok(vec![u64::from_le_bytes(first) % eligible])
    }

    fn generate_winning_post(
        &self,
        _miner: ActorId,
        sectors: &[SealedSectorInfo],
        randomness: &[u8; 32],
    ) -> BenchResult<Vec<PoStProof>> {
        let _active = self.enter(MockOp::WinningPost, None)?;
        let proof_type = sectors
            .first()
            .map(|s| s.seal_proof.winning_post_proof())
            .ok_or_else(|| BenchError::Message("no sectors to prove".into()))?;
        Ok(vec![post_proof(proof_type, sectors, randomness)])
    }

    fn verify_winning_post(&self, info: &PoStVerifyInfo) -> BenchResult<bool> {
        let _active = self.enter(MockOp::VerifyWinningPost, None)?;
        Ok(self.config.post_valid && !info.proofs.is_empty())
    }

    fn generate_window_post(
        &self,
        _miner: ActorId,
        sectors: &[SealedSectorInfo],
        randomness: &[u8; 32],
    ) -> BenchResult<(Vec<PoStProof>, Vec<SectorId>)> {
        let _active = self.enter(MockOp::WindowPost, None)?;
        let proof_type = sectors
            .first()
            .map(|s| s.seal_proof.window_post_proof())
            .ok_or_else(|| BenchError::Message("no sectors to prove".into()))?;
        Ok((vec![post_proof(proof_type, sectors, randomness)], Vec::new()))
    }

    fn verify_window_post(&self, info: &PoStVerifyInfo) -> BenchResult<bool> {
        let _active = self.enter(MockOp::VerifyWindowPost, None)?;
        Ok(self.config.post_valid && !info.proofs.is_empty())
    }
}

fn post_proof(
    post_proof: RegisteredPoStProof,
    sectors: &[SealedSectorInfo],
    randomness: &[u8; 32],
) -> PoStProof {
    let mut state = blake2b_simd::Params::new().hash_length(32).to_state();
    state.update(randomness);
    for s in sectors {
        state.update(&s.sealed_cid.to_bytes());
    }
    PoStProof { post_proof, proof_bytes: state.finalize().as_bytes().to_vec() }
}
