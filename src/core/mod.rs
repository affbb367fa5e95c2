//! Core types and schemas for seal-bench.
//!
//! Sector identity, commitments and randomness, plus the `BenchResults` schema (v1)
//! used for all benchmark outputs.

pub mod commitment;
pub mod env;
pub mod schema;
pub mod sector;

// Re-export key types for convenience
pub use commitment::{
    PieceInfo, PoStProof, PoStVerifyInfo, SealSeed, SealTicket, SealVerifyInfo, SealedSectorInfo,
    SectorCids, SeedPolicy,
};
pub use env::{EnvCapture, PROOF_ENV_KEYS};
pub use schema::{
    Anomaly, BenchResults, HeatLabel, PostTimings, RunResult, SCHEMA_VERSION, SectorOutcome, Stage,
    StageTiming,
};
pub use sector::{
    ActorId, PaddedPieceSize, RegisteredPoStProof, RegisteredSealProof, SectorId, SectorNumber,
    SectorRef, SectorSize, UnpaddedPieceSize,
};
