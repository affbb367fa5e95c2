//! Explicit capture of the proof-library environment for reports.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Environment keys that change proof-library behaviour.
pub const PROOF_ENV_KEYS: &[&str] = &[
    "BELLMAN_NO_GPU",
    "FIL_PROOFS_MAXIMIZE_CACHING",
    "FIL_PROOFS_USE_GPU_COLUMN_BUILDER",
    "FIL_PROOFS_USE_GPU_TREE_BUILDER",
    "FIL_PROOFS_USE_MULTICORE_SDR",
    "BELLMAN_CUSTOM_GPU",
];

/// Snapshot of environment settings, taken once at the CLI boundary and
/// passed down explicitly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvCapture {
    vars: BTreeMap<String, String>,
}

impl EnvCapture {
    /// Read `keys` from the process environment; unset keys are omitted.
    pub fn from_process(keys: &[&str]) -> Self {
        let vars = keys
            .iter()
            .filter_map(|k| std::env::var(k).ok().map(|v| (k.to_string(), v)))
            .collect();
        EnvCapture { vars }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        EnvCapture {
            vars: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    /// Set a value that will also be handed to the sealer process.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn vars(&self) -> &BTreeMap<String, String> {
        &self.vars
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_from_pairs() {
        let mut env = EnvCapture::from_pairs([("FIL_PROOFS_MAXIMIZE_CACHING", "1")]);
        env.set("BELLMAN_NO_GPU", "1");
        assert_eq!(env.get("BELLMAN_NO_GPU"), Some("1"));
        assert_eq!(env.vars().len(), 2);
        assert!(env.get("BELLMAN_CUSTOM_GPU").is_none());
    }

    #[test]
    fn test_capture_skips_unset_keys() {
        let env = EnvCapture::from_process(&["SEAL_BENCH_SURELY_UNSET_KEY_42"]);
        assert!(env.is_empty());
    }
}
