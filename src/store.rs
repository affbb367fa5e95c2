//! On-disk layout of sector files.
//!
//! Sectors live under a storage root in three directories, `unsealed/`, `sealed/`
//! and `cache/`, each entry named after the sector (`s-t01000-10`).

use std::path::{Path, PathBuf};

use crate::BenchResult;
use crate::core::SectorId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectorFileType {
    Unsealed,
    Sealed,
    Cache,
}

impl SectorFileType {
    pub const ALL: [SectorFileType; 3] =
        [SectorFileType::Unsealed, SectorFileType::Sealed, SectorFileType::Cache];

    pub fn dir_name(self) -> &'static str {
        match self {
            SectorFileType::Unsealed => "unsealed",
            SectorFileType::Sealed => "sealed",
            SectorFileType::Cache => "cache",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SectorStore {
    root: PathBuf,
}

impl SectorStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        SectorStore { root: root.into() }
    }

    /// Create the store root and its sector directories.
    pub fn open(root: impl Into<PathBuf>) -> BenchResult<Self> {
        let store = Self::new(root);
        for ft in SectorFileType::ALL {
            std::fs::create_dir_all(store.root.join(ft.dir_name()))?;
        }
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, sector: &SectorId, ft: SectorFileType) -> PathBuf {
        self.root.join(ft.dir_name()).join(sector.to_string())
    }

    pub fn unsealed_path(&self, sector: &SectorId) -> PathBuf {
        self.path(sector, SectorFileType::Unsealed)
    }

    pub fn sealed_path(&self, sector: &SectorId) -> PathBuf {
        self.path(sector, SectorFileType::Sealed)
    }

    pub fn cache_path(&self, sector: &SectorId) -> PathBuf {
        self.path(sector, SectorFileType::Cache)
    }

    /// Remove the unsealed copy of a sector. Returns whether anything was removed.
    pub fn remove_unsealed(&self, sector: &SectorId) -> BenchResult<bool> {
        let path = self.unsealed_path(sector);
        let res = if path.is_dir() {
            std::fs::remove_dir_all(&path)
        } else {
            std::fs::remove_file(&path)
        };
        match res {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Temporary file inside the store, used to stage piece bytes.
    pub fn staging_file(&self) -> BenchResult<tempfile::NamedTempFile> {
        Ok(tempfile::Builder::new().prefix("piece-").tempfile_in(&self.root)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ActorId, SectorNumber};

    fn sector() -> SectorId {
        SectorId { miner: ActorId(1000), number: SectorNumber(10) }
    }

    #[test]
    fn test_layout() {
        let dir = tempfile::tempdir().unwrap();
        let store = SectorStore::open(dir.path()).unwrap();
        assert_eq!(store.unsealed_path(&sector()), dir.path().join("unsealed/s-t01000-10"));
        assert!(dir.path().join("sealed").is_dir());
        assert!(dir.path().join("cache").is_dir());
    }

    #[test]
    fn test_remove_unsealed() {
        let dir = tempfile::tempdir().unwrap();
        let store = SectorStore::open(dir.path()).unwrap();
        assert!(!store.remove_unsealed(&sector()).unwrap());
        std::fs::write(store.unsealed_path(&sector()), b"data").unwrap();
        assert!(store.remove_unsealed(&sector()).unwrap());
        assert!(!store.unsealed_path(&sector()).exists());
    }
}
