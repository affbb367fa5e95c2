//! Stage-boundary checkpoints.
//!
//! When the pipeline is split across separate invocations, each stage command
//! reads the record written by the previous one and writes the record the next
//! one needs. Field names keep the historical capitalised format so existing
//! files stay readable.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::core::commitment::{base64_bytes, parse_cid};
use crate::core::{PaddedPieceSize, PieceInfo, SectorCids, SectorNumber, SectorSize, SealTicket};
use crate::{BenchError, BenchResult};

/// A record written at a stage boundary.
pub trait Checkpoint: Serialize + DeserializeOwned {
    /// File name inside the checkpoint directory.
    const FILE_NAME: &'static str;
}

/// AddPiece output, consumed by PreCommit1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreCommit1In {
    #[serde(rename = "Size")]
    pub size: u64,
    #[serde(rename = "PieceCID")]
    pub piece_cid: String,
}

/// PreCommit1 output, consumed by PreCommit2.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreCommit2In {
    #[serde(rename = "Size")]
    pub size: u64,
    #[serde(rename = "Data", with = "base64_bytes")]
    pub data: Vec<u8>,
    #[serde(rename = "Ticket", with = "base64_bytes")]
    pub ticket: Vec<u8>,
}

/// PreCommit2 output, consumed by Commit1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit1In {
    #[serde(rename = "Size")]
    pub size: u64,
    #[serde(rename = "Unsealed")]
    pub unsealed: String,
    #[serde(rename = "Sealed")]
    pub sealed: String,
}

/// Commit1 output, consumed by Commit2.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit2In {
    #[serde(rename = "SectorNum")]
    pub sector_num: i64,
    #[serde(rename = "Phase1Out", with = "base64_bytes")]
    pub phase1_out: Vec<u8>,
    #[serde(rename = "SectorSize")]
    pub sector_size: u64,
}

impl Checkpoint for PreCommit1In {
    const FILE_NAME: &'static str = "p1in.json";
}

impl Checkpoint for PreCommit2In {
    const FILE_NAME: &'static str = "p2in.json";
}

impl Checkpoint for Commit1In {
    const FILE_NAME: &'static str = "c1in.json";
}

impl Checkpoint for Commit2In {
    const FILE_NAME: &'static str = "c2in.json";
}

impl PreCommit1In {
    pub fn from_piece(piece: &PieceInfo) -> Self {
        PreCommit1In { size: piece.size.0, piece_cid: piece.piece_cid.to_string() }
    }

    pub fn piece(&self) -> BenchResult<PieceInfo> {
        Ok(PieceInfo { size: PaddedPieceSize(self.size), piece_cid: parse_cid(&self.piece_cid)? })
    }
}

impl PreCommit2In {
    pub fn ticket(&self) -> BenchResult<SealTicket> {
        SealTicket::from_bytes(&self.ticket)
    }
}

impl Commit1In {
    pub fn from_cids(size: u64, cids: &SectorCids) -> Self {
        Commit1In {
            size,
            unsealed: cids.unsealed.to_string(),
            sealed: cids.sealed.to_string(),
        }
    }

    pub fn cids(&self) -> BenchResult<SectorCids> {
        Ok(SectorCids { unsealed: parse_cid(&self.unsealed)?, sealed: parse_cid(&self.sealed)? })
    }
}

impl Commit2In {
    pub fn new(sector: SectorNumber, phase1_out: Vec<u8>, sector_size: SectorSize) -> BenchResult<Self> {
        let sector_num = i64::try_from(sector.0)
            .map_err(|_| BenchError::Config(format!("sector number {sector} out of range")))?;
        Ok(Commit2In { sector_num, phase1_out, sector_size: sector_size.0 })
    }

    pub fn sector_number(&self) -> BenchResult<SectorNumber> {
        u64::try_from(self.sector_num)
            .map(SectorNumber)
            .map_err(|_| BenchError::Config(format!("negative sector number {}", self.sector_num)))
    }
}

/// Write a record as compact JSON.
pub fn write_record<T: Serialize>(path: &Path, record: &T) -> BenchResult<()> {
    let wrap = |e: BenchError| BenchError::Checkpoint { path: path.to_path_buf(), source: Box::new(e) };
    let bytes = serde_json::to_vec(record).map_err(|e| wrap(e.into()))?;
    std::fs::write(path, bytes).map_err(|e| wrap(e.into()))
}

pub fn read_record<T: DeserializeOwned>(path: &Path) -> BenchResult<T> {
    let wrap = |e: BenchError| BenchError::Checkpoint { path: path.to_path_buf(), source: Box::new(e) };
    let bytes = std::fs::read(path).map_err(|e| wrap(e.into()))?;
    serde_json::from_slice(&bytes).map_err(|e| wrap(e.into()))
}

/// Directory holding the stage-boundary records.
#[derive(Debug, Clone)]
pub struct CheckpointDir {
    dir: PathBuf,
}

impl CheckpointDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        CheckpointDir { dir: dir.into() }
    }

    pub fn path_of<C: Checkpoint>(&self) -> PathBuf {
        self.dir.join(C::FILE_NAME)
    }

    pub fn save<C: Checkpoint>(&self, record: &C) -> BenchResult<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_of::<C>();
        write_record(&path, record)?;
        tracing::debug!(path = %path.display(), "checkpoint written");
        Ok(path)
    }

    pub fn load<C: Checkpoint>(&self) -> BenchResult<C> {
        read_record(&self.path_of::<C>())
    }
}

/// Where the Commit2 input of `sector` is saved.
///
/// A run of one sector writes `base` itself; larger runs write one file per
/// sector next to it, named `<stem>-<sector>.<ext>`.
pub fn commit2_input_path(base: &Path, sector: SectorNumber, per_sector: bool) -> PathBuf {
    if !per_sector {
        return base.to_path_buf();
    }
    let stem = base.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let name = match base.extension() {
        Some(ext) => format!("{stem}-{sector}.{}", ext.to_string_lossy()),
        None => format!("{stem}-{sector}"),
    };
    base.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_historical_field_names() {
        let rec = Commit2In { sector_num: 10, phase1_out: vec![1, 2, 3], sector_size: 2048 };
        let json = serde_json::to_string(&rec).unwrap();
        assert_eq!(json, r#"{"SectorNum":10,"Phase1Out":"AQID","SectorSize":2048}"#);

        let p1: PreCommit1In =
            serde_json::from_str(r#"{"PieceCID":"baga6ea4seaqabc","Size":2048}"#).unwrap();
        assert_eq!(p1.size, 2048);
        assert_eq!(p1.piece_cid, "baga6ea4seaqabc");
    }

    #[test]
    fn test_decode_then_encode_is_stable() {
        let raw = r#"{"Size":2048,"Data":"3q2+7w==","Ticket":"AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8="}"#;
        let rec: PreCommit2In = serde_json::from_str(raw).unwrap();
        assert_eq!(serde_json::to_string(&rec).unwrap(), raw);
        assert_eq!(rec.data, vec![0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(rec.ticket().unwrap().0[31], 31);
    }

    #[test]
    fn test_checkpoint_dir_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let cps = CheckpointDir::new(dir.path());
        let rec = Commit1In { size: 2048, unsealed: "a".into(), sealed: "b".into() };
        let path = cps.save(&rec).unwrap();
        assert_eq!(path, dir.path().join("c1in.json"));
        assert_eq!(cps.load::<Commit1In>().unwrap(), rec);
    }

    #[test]
    fn test_missing_checkpoint_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = CheckpointDir::new(dir.path()).load::<PreCommit1In>().unwrap_err();
        assert!(matches!(err, BenchError::Checkpoint { .. }));
        assert!(err.to_string().contains("p1in.json"));
    }

    #[test]
    fn test_commit2_input_path() {
        let base = Path::new("/tmp/c2.json");
        assert_eq!(commit2_input_path(base, SectorNumber(3), false), PathBuf::from("/tmp/c2.json"));
        assert_eq!(commit2_input_path(base, SectorNumber(3), true), PathBuf::from("/tmp/c2-3.json"));
    }
}
