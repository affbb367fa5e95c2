//! Pre-seal manifests of existing sector directories.
//!
//! A directory sealed ahead of time holds `pre-seal-<miner address>.json`, a map
//! from miner address to its sectors. Only the fields needed to prove the
//! sectors are read.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use cid::Cid;
use serde::Deserialize;

use crate::core::commitment::cid_string;
use crate::core::{RegisteredSealProof, SealedSectorInfo, SectorNumber};
use crate::{BenchError, BenchResult};

use super::checkpoint::read_record;

#[derive(Debug, Deserialize)]
struct CidLink {
    #[serde(rename = "/", with = "cid_string")]
    link: Cid,
}

#[derive(Debug, Deserialize)]
struct PresealSector {
    #[serde(rename = "CommR")]
    comm_r: CidLink,
    #[serde(rename = "SectorID")]
    sector_id: u64,
    #[serde(rename = "ProofType")]
    proof_type: i64,
}

#[derive(Debug, Deserialize)]
struct PresealMiner {
    #[serde(rename = "Sectors", default)]
    sectors: Vec<PresealSector>,
}

pub fn preseal_manifest_path(dir: &Path, miner_addr: &str) -> PathBuf {
    dir.join(format!("pre-seal-{miner_addr}.json"))
}

/// Sealed-sector summaries of `miner_addr` from the manifest in `dir`.
pub fn load_preseal_sectors(dir: &Path, miner_addr: &str) -> BenchResult<Vec<SealedSectorInfo>> {
    let path = preseal_manifest_path(dir, miner_addr);
    let mut miners: HashMap<String, PresealMiner> = read_record(&path)?;
    let miner = miners.remove(miner_addr).ok_or_else(|| {
        BenchError::Config(format!("pre-seal manifest has no entry for miner {miner_addr}"))
    })?;
    miner
        .sectors
        .into_iter()
        .map(|s| {
            Ok(SealedSectorInfo {
                seal_proof: RegisteredSealProof::from_registered_id(s.proof_type)?,
                sector_number: SectorNumber(s.sector_id),
                sealed_cid: s.comm_r.link,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::commitment::replica_commitment_to_cid;

    #[test]
    fn test_load_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let cid = replica_commitment_to_cid(&[3u8; 32]).unwrap();
        let manifest = serde_json::json!({
            "t01000": {
                "Owner": "t01000",
                "Sectors": [
                    { "CommR": { "/": cid.to_string() }, "SectorID": 0, "ProofType": 5, "Deal": {} },
                    { "CommR": { "/": cid.to_string() }, "SectorID": 1, "ProofType": 5 }
                ]
            }
        });
        std::fs::write(
            preseal_manifest_path(dir.path(), "t01000"),
            serde_json::to_vec(&manifest).unwrap(),
        )
        .unwrap();

        let sectors = load_preseal_sectors(dir.path(), "t01000").unwrap();
        assert_eq!(sectors.len(), 2);
        assert_eq!(sectors[1].sector_number, SectorNumber(1));
        assert_eq!(sectors[0].sealed_cid, cid);
        assert_eq!(sectors[0].seal_proof, RegisteredSealProof::StackedDrg2KiBV1_1);
    }

    #[test]
    fn test_missing_miner_entry() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(preseal_manifest_path(dir.path(), "t01000"), br#"{"t02000":{"Sectors":[]}}"#)
            .unwrap();
        assert!(matches!(
            load_preseal_sectors(dir.path(), "t01000"),
            Err(BenchError::Config(_))
        ));
    }
}
