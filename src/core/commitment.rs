//! Commitments, randomness and the artifacts exchanged with the sealer.

use cid::Cid;
use cid::multihash::Multihash;
use serde::{Deserialize, Serialize};

use crate::{BenchError, BenchResult};

use super::sector::{
    ActorId, PaddedPieceSize, RegisteredPoStProof, RegisteredSealProof, SectorId, SectorNumber,
};

/// Codec for unsealed (data) commitments.
pub const FIL_COMMITMENT_UNSEALED: u64 = 0xf101;
/// Codec for sealed (replica) commitments.
pub const FIL_COMMITMENT_SEALED: u64 = 0xf102;
/// Multihash code for Sha2 256 trunc254 padded used in data commitments.
pub const SHA2_256_TRUNC254_PADDED: u64 = 0x1012;
/// Multihash code for Poseidon BLS replica commitments.
pub const POSEIDON_BLS12_381_A1_FC1: u64 = 0xb401;

pub type Commitment = [u8; 32];

pub fn blake2b_256(data: &[u8]) -> [u8; 32] {
    let hash = blake2b_simd::Params::new().hash_length(32).hash(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(hash.as_bytes());
    out
}

fn commitment_to_cid(codec: u64, mh_code: u64, comm: &Commitment) -> BenchResult<Cid> {
    let mh = Multihash::<64>::wrap(mh_code, comm)
        .map_err(|e| BenchError::Message(format!("invalid commitment multihash: {e}")))?;
    Ok(Cid::new_v1(codec, mh))
}

/// Convert a raw data commitment (CommD) to a CID.
pub fn data_commitment_to_cid(comm_d: &Commitment) -> BenchResult<Cid> {
    commitment_to_cid(FIL_COMMITMENT_UNSEALED, SHA2_256_TRUNC254_PADDED, comm_d)
}

/// Convert a raw replica commitment (CommR) to a CID.
pub fn replica_commitment_to_cid(comm_r: &Commitment) -> BenchResult<Cid> {
    commitment_to_cid(FIL_COMMITMENT_SEALED, POSEIDON_BLS12_381_A1_FC1, comm_r)
}

/// Extract the raw commitment from a CID, checking codec and hash type agree.
pub fn cid_to_commitment(c: &Cid) -> BenchResult<Commitment> {
    let expected = match c.codec() {
        FIL_COMMITMENT_UNSEALED => SHA2_256_TRUNC254_PADDED,
        FIL_COMMITMENT_SEALED => POSEIDON_BLS12_381_A1_FC1,
        other => {
            return Err(BenchError::Message(format!("unexpected commitment codec {other:#x}")));
        }
    };
    if c.hash().code() != expected {
        return Err(BenchError::Message(format!(
            "commitment hash {:#x} does not match codec {:#x}",
            c.hash().code(),
            c.codec()
        )));
    }
    let digest = c.hash().digest();
    if digest.len() != 32 {
        return Err(BenchError::Message(format!("commitment digest has {} bytes", digest.len())));
    }
    let mut comm = [0u8; 32];
    comm.copy_from_slice(digest);
    Ok(comm)
}

pub fn parse_cid(s: &str) -> BenchResult<Cid> {
    Cid::try_from(s).map_err(|e| BenchError::Message(format!("invalid CID '{s}': {e}")))
}

/// Serde adapter storing a CID in its string form.
pub mod cid_string {
    use cid::Cid;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(c: &Cid, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&c.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Cid, D::Error> {
        let s = String::deserialize(d)?;
        Cid::try_from(s.as_str()).map_err(serde::de::Error::custom)
    }
}

/// Serde adapter storing bytes as standard base64.
pub mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        STANDARD.decode(s.as_bytes()).map_err(serde::de::Error::custom)
    }
}

/// Output of AddPiece.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PieceInfo {
    pub size: PaddedPieceSize,
    #[serde(with = "cid_string")]
    pub piece_cid: Cid,
}

/// Output of PreCommit2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectorCids {
    #[serde(with = "cid_string")]
    pub unsealed: Cid,
    #[serde(with = "cid_string")]
    pub sealed: Cid,
}

fn decode_hex32(s: &str, what: &str) -> BenchResult<[u8; 32]> {
    let bytes = hex::decode(s).map_err(|e| BenchError::Config(format!("invalid {what} hex: {e}")))?;
    <[u8; 32]>::try_from(bytes.as_slice())
        .map_err(|_| BenchError::Config(format!("{what} must be 32 bytes, got {}", bytes.len())))
}

/// Replication randomness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealTicket(pub [u8; 32]);

impl SealTicket {
    /// Ticket used by the stage commands when none is supplied.
    pub const DEFAULT_HEX: &'static str =
        "e8aa3646eade2bafbc58b9210cb8eef1b4dedf17359bc9c391f2aaf0fad0a7a5";

    /// Per-sector ticket derived from a preimage and the sector number.
    pub fn derive(preimage: &[u8], number: SectorNumber) -> Self {
        let mut buf = Vec::with_capacity(preimage.len() + 8);
        buf.extend_from_slice(preimage);
        buf.extend_from_slice(&number.0.to_le_bytes());
        SealTicket(blake2b_256(&buf))
    }

    pub fn from_hex(s: &str) -> BenchResult<Self> {
        decode_hex32(s, "ticket").map(SealTicket)
    }

    /// Parse a ticket, falling back to the default when the input is not 64 hex chars.
    pub fn from_hex_or_default(s: &str) -> BenchResult<Self> {
        if s.len() != 64 {
            return Self::from_hex(Self::DEFAULT_HEX);
        }
        Self::from_hex(s)
    }

    pub fn from_bytes(bytes: &[u8]) -> BenchResult<Self> {
        <[u8; 32]>::try_from(bytes)
            .map(SealTicket)
            .map_err(|_| BenchError::Message(format!("ticket must be 32 bytes, got {}", bytes.len())))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

/// Interactive randomness for Commit1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealSeed {
    pub epoch: i64,
    pub value: [u8; 32],
}

impl SealSeed {
    pub const DEFAULT_EPOCH: i64 = 101;
    pub const DEFAULT_VALUE: [u8; 32] = [
        1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25,
        26, 27, 28, 29, 30, 31, 255,
    ];
    /// Seed used by the commit1 command when none is supplied.
    pub const DEFAULT_HEX: &'static str =
        "a1fd6da64c25d4b53afa948ef0ef81aa48dbafbb561c63dfdbf12c954817fa05";

    pub fn from_hex_or_default(s: &str, epoch: i64) -> BenchResult<Self> {
        let s = if s.len() != 64 { Self::DEFAULT_HEX } else { s };
        Ok(SealSeed { epoch, value: decode_hex32(s, "seed")? })
    }

    /// Seed derived for a single sector.
    pub fn for_sector(&self, number: SectorNumber) -> Self {
        let mut buf = self.value.to_vec();
        buf.extend_from_slice(&number.0.to_le_bytes());
        SealSeed { epoch: self.epoch, value: blake2b_256(&buf) }
    }
}

impl Default for SealSeed {
    fn default() -> Self {
        SealSeed { epoch: Self::DEFAULT_EPOCH, value: Self::DEFAULT_VALUE }
    }
}

/// How the interactive seed is chosen for each sector of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeedPolicy {
    /// One seed for every sector.
    #[default]
    Shared,
    /// A seed derived from the base seed and the sector number.
    PerSector,
}

impl SeedPolicy {
    pub fn seed_for(&self, base: &SealSeed, number: SectorNumber) -> SealSeed {
        match self {
            SeedPolicy::Shared => *base,
            SeedPolicy::PerSector => base.for_sector(number),
        }
    }
}

/// Sealed-sector summary consumed by the proof-of-storage phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedSectorInfo {
    pub seal_proof: RegisteredSealProof,
    pub sector_number: SectorNumber,
    #[serde(with = "cid_string")]
    pub sealed_cid: Cid,
}

/// Everything needed to verify one seal proof.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealVerifyInfo {
    pub sector_id: SectorId,
    pub seal_proof: RegisteredSealProof,
    pub sealed_cid: Cid,
    pub unsealed_cid: Cid,
    pub proof: Vec<u8>,
    pub randomness: SealTicket,
    pub interactive_randomness: [u8; 32],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoStProof {
    pub post_proof: RegisteredPoStProof,
    #[serde(with = "base64_bytes")]
    pub proof_bytes: Vec<u8>,
}

/// Public inputs of a winning or window proof-of-storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoStVerifyInfo {
    pub randomness: [u8; 32],
    pub proofs: Vec<PoStProof>,
    pub challenged_sectors: Vec<SealedSectorInfo>,
    pub prover: ActorId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commitment_cid_round_trip() {
        let comm = [7u8; 32];
        let c = data_commitment_to_cid(&comm).unwrap();
        assert_eq!(c.codec(), FIL_COMMITMENT_UNSEALED);
        assert_eq!(cid_to_commitment(&c).unwrap(), comm);

        let parsed = parse_cid(&c.to_string()).unwrap();
        assert_eq!(parsed, c);

        let r = replica_commitment_to_cid(&comm).unwrap();
        assert_eq!(r.codec(), FIL_COMMITMENT_SEALED);
        assert_ne!(r, c);
    }

    #[test]
    fn test_ticket_derivation_is_per_sector() {
        let a = SealTicket::derive(b"preimage", SectorNumber(0));
        let b = SealTicket::derive(b"preimage", SectorNumber(1));
        assert_ne!(a, b);
        assert_eq!(a, SealTicket::derive(b"preimage", SectorNumber(0)));
    }

    #[test]
    fn test_ticket_hex() {
        let t = SealTicket::from_hex_or_default("short").unwrap();
        assert_eq!(t.to_hex(), SealTicket::DEFAULT_HEX);
        assert!(SealTicket::from_hex(&"zz".repeat(32)).is_err());
        assert!(SealTicket::from_hex("abcd").is_err());
    }

    #[test]
    fn test_seed_policy() {
        let base = SealSeed::default();
        assert_eq!(SeedPolicy::Shared.seed_for(&base, SectorNumber(4)), base);
        let per = SeedPolicy::PerSector.seed_for(&base, SectorNumber(4));
        assert_eq!(per.epoch, SealSeed::DEFAULT_EPOCH);
        assert_ne!(per.value, base.value);
    }
}
