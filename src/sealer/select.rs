//! Sealer selection from command-line settings.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::core::{EnvCapture, PROOF_ENV_KEYS};
use crate::store::SectorStore;
use crate::{BenchError, BenchResult};

use super::{ExternalSealer, ExternalSealerConfig, MockConfig, MockSealer, Sealer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SealerKind {
    Mock,
    #[default]
    External,
}

impl FromStr for SealerKind {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mock" => Ok(SealerKind::Mock),
            "external" => Ok(SealerKind::External),
            other => Err(BenchError::Config(format!(
                "unknown sealer '{other}' (expected mock or external)"
            ))),
        }
    }
}

/// How to reach the sealer, as chosen on the command line.
#[derive(Debug, Clone, Default)]
pub struct SealerSettings {
    pub kind: SealerKind,
    pub path: Option<PathBuf>,
    /// Shell-quoted extra arguments for the external sealer.
    pub args: Option<String>,
    /// Per-operation timeout; zero disables it.
    pub timeout: Duration,
    pub no_gpu: bool,
}

impl SealerSettings {
    /// Proof-library environment of this run, captured once.
    pub fn env(&self) -> EnvCapture {
        let mut env = EnvCapture::from_process(PROOF_ENV_KEYS);
        if self.no_gpu {
            env.set("BELLMAN_NO_GPU", "1");
        }
        env
    }

    /// Build the sealer working on `store`.
    pub fn build(&self, store: &SectorStore, env: &EnvCapture) -> BenchResult<Box<dyn Sealer>> {
        match self.kind {
            SealerKind::Mock => Ok(Box::new(MockSealer::new(
                MockConfig::new("mock").with_store(store.clone()),
            ))),
            SealerKind::External => {
                let path = self.path.clone().ok_or_else(|| {
                    BenchError::Config("external sealer requires --sealer-path".into())
                })?;
                let mut config = ExternalSealerConfig::new(path)
                    .with_timeout(self.timeout)
                    .with_env(env.vars().clone());
                if let Some(args) = &self.args {
                    config = config.with_arg_string(args)?;
                }
                Ok(Box::new(ExternalSealer::new(config, store.clone())))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_kind() {
        assert_eq!("mock".parse::<SealerKind>().unwrap(), SealerKind::Mock);
        assert_eq!("external".parse::<SealerKind>().unwrap(), SealerKind::External);
        assert!("ffi".parse::<SealerKind>().is_err());
    }

    #[test]
    fn test_no_gpu_sets_env() {
        let settings = SealerSettings { no_gpu: true, ..Default::default() };
        assert_eq!(settings.env().get("BELLMAN_NO_GPU"), Some("1"));
    }

    #[test]
    fn test_external_requires_path() {
        let dir = tempfile::tempdir().unwrap();
        let store = SectorStore::new(dir.path());
        let settings = SealerSettings::default();
        let err = settings.build(&store, &EnvCapture::default()).err().unwrap();
        assert!(matches!(err, BenchError::Config(_)));

        let mock = SealerSettings { kind: SealerKind::Mock, ..Default::default() };
        assert_eq!(mock.build(&store, &EnvCapture::default()).unwrap().name(), "mock");
    }
}
