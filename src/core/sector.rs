//! Sector identity, sizes and proof variants.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{BenchError, BenchResult};

/// Identifier of the party owning a sector (the numeric part of an ID address).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorId(pub u64);

impl ActorId {
    /// Parse an ID address such as `t01000` or `f01000`.
    pub fn from_address(addr: &str) -> BenchResult<Self> {
        let mut chars = addr.chars();
        match chars.next() {
            Some('t') | Some('f') => {}
            _ => {
                return Err(BenchError::Config(format!(
                    "unknown network prefix in address '{addr}'"
                )));
            }
        }
        if chars.next() != Some('0') {
            return Err(BenchError::Config(format!(
                "address '{addr}' is not an ID address"
            )));
        }
        let digits = chars.as_str();
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(BenchError::Config(format!("invalid ID address '{addr}'")));
        }
        digits
            .parse::<u64>()
            .map(ActorId)
            .map_err(|e| BenchError::Config(format!("invalid ID address '{addr}': {e}")))
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t0{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SectorNumber(pub u64);

impl fmt::Display for SectorNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Globally unique sector identity: owner plus sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SectorId {
    pub miner: ActorId,
    pub number: SectorNumber,
}

impl fmt::Display for SectorId {
    // Matches the on-disk sector file name.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s-{}-{}", self.miner, self.number)
    }
}

/// Size of a sector in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SectorSize(pub u64);

impl SectorSize {
    pub const KIB_2: SectorSize = SectorSize(2 << 10);
    pub const MIB_8: SectorSize = SectorSize(8 << 20);
    pub const MIB_512: SectorSize = SectorSize(512 << 20);
    pub const GIB_32: SectorSize = SectorSize(32 << 30);
    pub const GIB_64: SectorSize = SectorSize(64 << 30);

    /// Parse a human size string (`2KiB`, `512MiB`, `32GiB` or plain bytes).
    pub fn parse(s: &str) -> BenchResult<Self> {
        let bytes = byte_unit::Byte::from_str(s.trim())
            .map_err(|e| BenchError::Config(format!("invalid sector size '{s}': {e}")))?
            .get_bytes();
        u64::try_from(bytes)
            .map(SectorSize)
            .map_err(|_| BenchError::Config(format!("sector size '{s}' is too large")))
    }

    pub fn padded(self) -> PaddedPieceSize {
        PaddedPieceSize(self.0)
    }

    pub fn bytes(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SectorSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let adjusted = byte_unit::Byte::from_bytes(u128::from(self.0)).get_appropriate_unit(true);
        write!(f, "{adjusted}")
    }
}

impl FromStr for SectorSize {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SectorSize::parse(s)
    }
}

/// Piece size including fr32 padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PaddedPieceSize(pub u64);

/// Piece size as seen by the client, before fr32 padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnpaddedPieceSize(pub u64);

impl PaddedPieceSize {
    pub fn unpadded(self) -> UnpaddedPieceSize {
        UnpaddedPieceSize(self.0 - self.0 / 128)
    }

    pub fn validate(self) -> BenchResult<()> {
        if self.0 < 128 {
            return Err(BenchError::Config(format!("padded piece size {} is below 128 bytes", self.0)));
        }
        if !self.0.is_power_of_two() {
            return Err(BenchError::Config(format!("padded piece size {} is not a power of two", self.0)));
        }
        Ok(())
    }
}

impl UnpaddedPieceSize {
    pub fn padded(self) -> PaddedPieceSize {
        PaddedPieceSize(self.0 + self.0 / 127)
    }

    pub fn validate(self) -> BenchResult<()> {
        if self.0 < 127 {
            return Err(BenchError::Config(format!("unpadded piece size {} is below 127 bytes", self.0)));
        }
        if !(self.0 + self.0 / 127).is_power_of_two() {
            return Err(BenchError::Config(format!("unpadded piece size {} is not a valid fr32 size", self.0)));
        }
        Ok(())
    }
}

/// Seal proof variant, selected by sector size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegisteredSealProof {
    StackedDrg2KiBV1_1,
    StackedDrg8MiBV1_1,
    StackedDrg512MiBV1_1,
    StackedDrg32GiBV1_1,
    StackedDrg64GiBV1_1,
}

/// Proof-of-storage variant, derived from a seal proof.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegisteredPoStProof {
    StackedDrgWinning2KiBV1,
    StackedDrgWinning8MiBV1,
    StackedDrgWinning512MiBV1,
    StackedDrgWinning32GiBV1,
    StackedDrgWinning64GiBV1,
    StackedDrgWindow2KiBV1,
    StackedDrgWindow8MiBV1,
    StackedDrgWindow512MiBV1,
    StackedDrgWindow32GiBV1,
    StackedDrgWindow64GiBV1,
}

impl RegisteredSealProof {
    /// Newest seal proof for a sector size.
    pub fn from_sector_size(size: SectorSize) -> BenchResult<Self> {
        use RegisteredSealProof::*;
        match size {
            SectorSize::KIB_2 => Ok(StackedDrg2KiBV1_1),
            SectorSize::MIB_8 => Ok(StackedDrg8MiBV1_1),
            SectorSize::MIB_512 => Ok(StackedDrg512MiBV1_1),
            SectorSize::GIB_32 => Ok(StackedDrg32GiBV1_1),
            SectorSize::GIB_64 => Ok(StackedDrg64GiBV1_1),
            other => Err(BenchError::Config(format!(
                "unsupported sector size {} ({} bytes)",
                other, other.0
            ))),
        }
    }

    /// Map a numeric registered-proof id to the variant for the same sector size.
    ///
    /// Ids 0-4 are the V1 proofs and 5-9 their V1_1 successors.
    pub fn from_registered_id(id: i64) -> BenchResult<Self> {
        use RegisteredSealProof::*;
        match id {
            0 | 5 => Ok(StackedDrg2KiBV1_1),
            1 | 6 => Ok(StackedDrg8MiBV1_1),
            2 | 7 => Ok(StackedDrg512MiBV1_1),
            3 | 8 => Ok(StackedDrg32GiBV1_1),
            4 | 9 => Ok(StackedDrg64GiBV1_1),
            other => Err(BenchError::Config(format!("unknown seal proof type {other}"))),
        }
    }

    pub fn sector_size(self) -> SectorSize {
        use RegisteredSealProof::*;
        match self {
            StackedDrg2KiBV1_1 => SectorSize::KIB_2,
            StackedDrg8MiBV1_1 => SectorSize::MIB_8,
            StackedDrg512MiBV1_1 => SectorSize::MIB_512,
            StackedDrg32GiBV1_1 => SectorSize::GIB_32,
            StackedDrg64GiBV1_1 => SectorSize::GIB_64,
        }
    }

    pub fn winning_post_proof(self) -> RegisteredPoStProof {
        use RegisteredPoStProof::*;
        use RegisteredSealProof::*;
        match self {
            StackedDrg2KiBV1_1 => StackedDrgWinning2KiBV1,
            StackedDrg8MiBV1_1 => StackedDrgWinning8MiBV1,
            StackedDrg512MiBV1_1 => StackedDrgWinning512MiBV1,
            StackedDrg32GiBV1_1 => StackedDrgWinning32GiBV1,
            StackedDrg64GiBV1_1 => StackedDrgWinning64GiBV1,
        }
    }

    pub fn window_post_proof(self) -> RegisteredPoStProof {
        use RegisteredPoStProof::*;
        use RegisteredSealProof::*;
        match self {
            StackedDrg2KiBV1_1 => StackedDrgWindow2KiBV1,
            StackedDrg8MiBV1_1 => StackedDrgWindow8MiBV1,
            StackedDrg512MiBV1_1 => StackedDrgWindow512MiBV1,
            StackedDrg32GiBV1_1 => StackedDrgWindow32GiBV1,
            StackedDrg64GiBV1_1 => StackedDrgWindow64GiBV1,
        }
    }
}

/// A sector together with the proof variant it is sealed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SectorRef {
    pub id: SectorId,
    pub proof_type: RegisteredSealProof,
}

impl SectorRef {
    pub fn new(miner: ActorId, number: SectorNumber, size: SectorSize) -> BenchResult<Self> {
        Ok(SectorRef {
            id: SectorId { miner, number },
            proof_type: RegisteredSealProof::from_sector_size(size)?,
        })
    }

    pub fn sector_size(&self) -> SectorSize {
        self.proof_type.sector_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_actor_id_from_address() {
        assert_eq!(ActorId::from_address("t01000").unwrap(), ActorId(1000));
        assert_eq!(ActorId::from_address("f0123").unwrap(), ActorId(123));
        assert!(ActorId::from_address("t3abc").is_err());
        assert!(ActorId::from_address("x01000").is_err());
        assert!(ActorId::from_address("t0").is_err());
        assert!(ActorId::from_address("").is_err());
    }

    #[test]
    fn test_sector_id_display() {
        let id = SectorId { miner: ActorId(1000), number: SectorNumber(10) };
        assert_eq!(id.to_string(), "s-t01000-10");
    }

    #[test]
    fn test_sector_size_parse() {
        assert_eq!(SectorSize::parse("2KiB").unwrap(), SectorSize::KIB_2);
        assert_eq!(SectorSize::parse("512MiB").unwrap(), SectorSize::MIB_512);
        assert_eq!(SectorSize::parse("32GiB").unwrap(), SectorSize::GIB_32);
        assert_eq!(SectorSize::parse("2048").unwrap(), SectorSize::KIB_2);
        assert!(SectorSize::parse("lots").is_err());
    }

    #[test]
    fn test_proof_from_sector_size() {
        let p = RegisteredSealProof::from_sector_size(SectorSize::MIB_512).unwrap();
        assert_eq!(p, RegisteredSealProof::StackedDrg512MiBV1_1);
        assert_eq!(p.sector_size(), SectorSize::MIB_512);
        assert_eq!(p.winning_post_proof(), RegisteredPoStProof::StackedDrgWinning512MiBV1);
        assert_eq!(p.window_post_proof(), RegisteredPoStProof::StackedDrgWindow512MiBV1);
    }

    #[test]
    fn test_registered_id_mapping() {
        assert_eq!(
            RegisteredSealProof::from_registered_id(8).unwrap(),
            RegisteredSealProof::StackedDrg32GiBV1_1
        );
        assert_eq!(
            RegisteredSealProof::from_registered_id(0).unwrap(),
            RegisteredSealProof::StackedDrg2KiBV1_1
        );
        assert!(RegisteredSealProof::from_registered_id(42).is_err());
    }

    #[test]
    fn test_unsupported_sector_size_is_config_error() {
        let err = RegisteredSealProof::from_sector_size(SectorSize(1000)).unwrap_err();
        assert!(matches!(err, BenchError::Config(_)));
    }

    #[test]
    fn test_piece_padding() {
        let padded = SectorSize::KIB_2.padded();
        let unpadded = padded.unpadded();
        assert_eq!(unpadded, UnpaddedPieceSize(2032));
        assert_eq!(unpadded.padded(), padded);
        assert!(unpadded.validate().is_ok());
        assert!(padded.validate().is_ok());
        assert!(UnpaddedPieceSize(2000).validate().is_err());
        assert!(PaddedPieceSize(100).validate().is_err());
    }
}
