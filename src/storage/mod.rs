//! Storage layer: stage checkpoints and report persistence.

pub mod checkpoint;
pub mod csv;
pub mod jsonl;
pub mod preseal;

// Re-export key types
pub use checkpoint::{
    Checkpoint, CheckpointDir, Commit1In, Commit2In, PreCommit1In, PreCommit2In,
    commit2_input_path,
};
pub use csv::{CSV_HEADERS, CsvExporter};
pub use jsonl::JsonlWriter;
pub use preseal::load_preseal_sectors;
