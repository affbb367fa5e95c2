//! Engine module: drives sectors through the sealing stages.
//!
//! # Architecture
//!
//! - **StageGate** (`gate`): bounds how many sectors run an expensive stage at
//!   once. One gate per bounded stage, shared by all workers.
//! - **SectorPipeline** (`pipeline`): the stage chain for one sector, with each
//!   stage also callable on its own.
//! - **Orchestrator** (`orchestrator`): AddPiece for every sector, then a fixed
//!   pool of workers each sealing a contiguous block of sectors.
//! - **PoSt phase** (`post`): winning and window proofs over the sealed sectors,
//!   run after sealing completes.
//!
//! # Boundaries
//!
//! - The engine never touches proof cryptography; that is the `Sealer`'s job.
//! - Aggregation and rendering of timings live in `crate::report`.

pub mod gate;
pub mod orchestrator;
pub mod pipeline;
pub mod post;

// Re-export key types for convenience
pub use gate::{GatePermit, StageGate};
pub use orchestrator::{ParallelConfig, PieceSource, SealingPlan, run_seals};
pub use pipeline::{PipelineOptions, SaveCommit2Input, SectorPipeline, StageGates};
pub use post::{PostOutcome, random_challenge, run_post};
