//! Sealer trait: the opaque proof-library collaborator.

use std::io::Read;

use cid::Cid;

use crate::BenchResult;
use crate::core::{
    ActorId, PieceInfo, PoStProof, PoStVerifyInfo, RegisteredPoStProof, SealTicket,
    SealVerifyInfo, SealedSectorInfo, SectorCids, SectorId, SectorRef, UnpaddedPieceSize,
};

/// Operations of the sealing and proof-of-storage library.
///
/// Every call is blocking. Verification calls return `Ok(false)` when a proof is
/// invalid and `Err` only when the library itself fails.
pub trait Sealer: Send + Sync {
    /// Returns the sealer name (e.g., "mock", "external").
    fn name(&self) -> &str;

    /// Returns the sealer version, if available.
    fn version(&self) -> Option<String>;

    /// Write `size` bytes from `data` into the sector as a single piece.
    fn add_piece(
        &self,
        sector: &SectorRef,
        size: UnpaddedPieceSize,
        data: &mut dyn Read,
    ) -> BenchResult<PieceInfo>;

    /// Replication phase 1; returns opaque bytes consumed by PreCommit2.
    fn pre_commit1(
        &self,
        sector: &SectorRef,
        ticket: &SealTicket,
        pieces: &[PieceInfo],
    ) -> BenchResult<Vec<u8>>;

    /// Replication phase 2; produces the sealed and unsealed commitments.
    fn pre_commit2(&self, sector: &SectorRef, phase1_out: &[u8]) -> BenchResult<SectorCids>;

    /// Commit phase 1; returns opaque bytes consumed by Commit2.
    fn commit1(
        &self,
        sector: &SectorRef,
        ticket: &SealTicket,
        seed: &[u8; 32],
        pieces: &[PieceInfo],
        cids: &SectorCids,
    ) -> BenchResult<Vec<u8>>;

    /// Commit phase 2; computes the seal proof.
    fn commit2(&self, sector: &SectorRef, phase1_out: &[u8]) -> BenchResult<Vec<u8>>;

    fn verify_seal(&self, info: &SealVerifyInfo) -> BenchResult<bool>;

    /// Re-derive `size` unsealed bytes at `offset` into the sector's unsealed file.
    fn unseal_piece(
        &self,
        sector: &SectorRef,
        offset: u64,
        size: UnpaddedPieceSize,
        ticket: &SealTicket,
        unsealed_cid: &Cid,
    ) -> BenchResult<()>;

    /// Drop intermediate cache files of a sealed sector.
    fn finalize_sector(&self, sector: &SectorRef) -> BenchResult<()>;

    /// Indices (into `eligible` sectors) challenged for a winning proof.
    fn generate_winning_post_sector_challenge(
        &self,
        proof: RegisteredPoStProof,
        miner: ActorId,
        randomness: &[u8; 32],
        eligible: u64,
    ) -> BenchResult<Vec<u64>>;

    fn generate_winning_post(
        &self,
        miner: ActorId,
        sectors: &[SealedSectorInfo],
        randomness: &[u8; 32],
    ) -> BenchResult<Vec<PoStProof>>;

    fn verify_winning_post(&self, info: &PoStVerifyInfo) -> BenchResult<bool>;

    /// Returns the proofs and the sectors that had to be skipped.
    fn generate_window_post(
        &self,
        miner: ActorId,
        sectors: &[SealedSectorInfo],
        randomness: &[u8; 32],
    ) -> BenchResult<(Vec<PoStProof>, Vec<SectorId>)>;

    fn verify_window_post(&self, info: &PoStVerifyInfo) -> BenchResult<bool>;
}
