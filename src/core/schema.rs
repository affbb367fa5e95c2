//! Run results and the report schema.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::SystemInfo;

use super::commitment::{SealedSectorInfo, SectorCids, base64_bytes};
use super::sector::{SectorId, SectorSize};

/// Schema version for forward compatibility
pub const SCHEMA_VERSION: u32 = 1;

/// One step of the sealing pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    AddPiece,
    PreCommit1,
    PreCommit2,
    Commit1,
    Commit2,
    Verify,
    Unseal,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::AddPiece,
        Stage::PreCommit1,
        Stage::PreCommit2,
        Stage::Commit1,
        Stage::Commit2,
        Stage::Verify,
        Stage::Unseal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::AddPiece => "AddPiece",
            Stage::PreCommit1 => "PreCommit1",
            Stage::PreCommit2 => "PreCommit2",
            Stage::Commit1 => "Commit1",
            Stage::Commit2 => "Commit2",
            Stage::Verify => "Verify",
            Stage::Unseal => "Unseal",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durations encoded as integer nanoseconds.
pub mod duration_nanos {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_nanos)
    }
}

/// Wall-clock duration of every stage for one sector. Skipped stages stay zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StageTiming {
    #[serde(with = "duration_nanos")]
    pub add_piece: Duration,
    #[serde(with = "duration_nanos")]
    pub pre_commit1: Duration,
    #[serde(with = "duration_nanos")]
    pub pre_commit2: Duration,
    #[serde(with = "duration_nanos")]
    pub commit1: Duration,
    #[serde(with = "duration_nanos")]
    pub commit2: Duration,
    #[serde(with = "duration_nanos")]
    pub verify: Duration,
    #[serde(with = "duration_nanos")]
    pub unseal: Duration,
}

impl StageTiming {
    pub fn get(&self, stage: Stage) -> Duration {
        match stage {
            Stage::AddPiece => self.add_piece,
            Stage::PreCommit1 => self.pre_commit1,
            Stage::PreCommit2 => self.pre_commit2,
            Stage::Commit1 => self.commit1,
            Stage::Commit2 => self.commit2,
            Stage::Verify => self.verify,
            Stage::Unseal => self.unseal,
        }
    }

    pub fn set(&mut self, stage: Stage, d: Duration) {
        let slot = match stage {
            Stage::AddPiece => &mut self.add_piece,
            Stage::PreCommit1 => &mut self.pre_commit1,
            Stage::PreCommit2 => &mut self.pre_commit2,
            Stage::Commit1 => &mut self.commit1,
            Stage::Commit2 => &mut self.commit2,
            Stage::Verify => &mut self.verify,
            Stage::Unseal => &mut self.unseal,
        };
        *slot = d;
    }

    /// Add every stage of `other` into `self`.
    pub fn accumulate(&mut self, other: &StageTiming) {
        for stage in Stage::ALL {
            self.set(stage, self.get(stage) + other.get(stage));
        }
    }
}

/// Everything one sector produced, retained for verification and reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectorOutcome {
    pub sector: SectorId,
    pub timing: StageTiming,
    pub sealed: SealedSectorInfo,
    pub cids: SectorCids,
    /// Commit2 proof; absent when Commit2 was skipped.
    #[serde(default, skip_serializing_if = "Option::is_none", with = "opt_base64")]
    pub proof: Option<Vec<u8>>,
    /// Seal verification result; absent when Verify did not run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified: Option<bool>,
}

mod opt_base64 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match v {
            Some(bytes) => super::base64_bytes::serialize(bytes, s),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        #[derive(Deserialize)]
        struct Wrapped(#[serde(with = "super::base64_bytes")] Vec<u8>);
        Option::<Wrapped>::deserialize(d).map(|w| w.map(|Wrapped(b)| b))
    }
}

/// Ordered (by sector index) result of a sealing run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    pub sectors: Vec<SectorOutcome>,
}

impl RunResult {
    pub fn timings(&self) -> Vec<StageTiming> {
        self.sectors.iter().map(|s| s.timing).collect()
    }

    pub fn sealed_sectors(&self) -> Vec<SealedSectorInfo> {
        self.sectors.iter().map(|s| s.sealed).collect()
    }

    /// Sectors whose seal proof was computed but judged invalid.
    pub fn invalid_proofs(&self) -> Vec<SectorId> {
        self.sectors
            .iter()
            .filter(|s| s.verified == Some(false))
            .map(|s| s.sector)
            .collect()
    }
}

/// A proof that was computed but failed verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Anomaly {
    InvalidSealProof { sector: SectorId },
    InvalidWinningPost { run: HeatLabel },
    InvalidWindowPost { run: HeatLabel },
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Anomaly::InvalidSealProof { sector } => write!(f, "porep proof for sector {sector} was invalid"),
            Anomaly::InvalidWinningPost { run } => write!(f, "winning post verification failed ({run})"),
            Anomaly::InvalidWindowPost { run } => write!(f, "window post verification failed ({run})"),
        }
    }
}

/// First (cold) or repeated (hot) invocation of an expensive operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeatLabel {
    Cold,
    Hot,
}

impl fmt::Display for HeatLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeatLabel::Cold => f.write_str("cold"),
            HeatLabel::Hot => f.write_str("hot"),
        }
    }
}

/// Proof-of-storage phase timings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PostTimings {
    #[serde(with = "duration_nanos")]
    pub generate_candidates: Duration,
    #[serde(with = "duration_nanos")]
    pub winning_proof_cold: Duration,
    #[serde(with = "duration_nanos")]
    pub winning_proof_hot: Duration,
    #[serde(with = "duration_nanos")]
    pub verify_winning_cold: Duration,
    #[serde(with = "duration_nanos")]
    pub verify_winning_hot: Duration,
    #[serde(with = "duration_nanos")]
    pub window_proof_cold: Duration,
    #[serde(with = "duration_nanos")]
    pub window_proof_hot: Duration,
    #[serde(with = "duration_nanos")]
    pub verify_window_cold: Duration,
    #[serde(with = "duration_nanos")]
    pub verify_window_hot: Duration,
}

/// Canonical benchmark report for a sealing run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchResults {
    pub schema_version: u32,
    pub timestamp: String,
    pub env_vars: BTreeMap<String, String>,
    pub sector_size: SectorSize,
    pub sector_number: usize,
    pub sealing_sum: StageTiming,
    pub sealing_results: Vec<StageTiming>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post: Option<PostTimings>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub anomalies: Vec<Anomaly>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<SystemInfo>,
}

impl BenchResults {
    pub fn new(sector_size: SectorSize, sector_number: usize, sealing_results: Vec<StageTiming>) -> Self {
        BenchResults {
            schema_version: SCHEMA_VERSION,
            timestamp: crate::now_rfc3339(),
            env_vars: BTreeMap::new(),
            sector_size,
            sector_number,
            sealing_sum: StageTiming::default(),
            sealing_results,
            post: None,
            anomalies: Vec::new(),
            system: None,
        }
    }
}
