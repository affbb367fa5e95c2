//! Sealer backed by an external proof-library executable.
//!
//! Each operation runs `<binary> [extra args] --storage-dir <root> <operation>`
//! with a JSON request on stdin and reads a JSON response from stdout.

use std::collections::BTreeMap;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use cid::Cid;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::core::commitment::{base64_bytes, cid_string};
use crate::core::{
    ActorId, PieceInfo, PoStProof, PoStVerifyInfo, RegisteredPoStProof, SealTicket,
    SealVerifyInfo, SealedSectorInfo, SectorCids, SectorId, SectorRef, UnpaddedPieceSize,
};
use crate::store::SectorStore;
use crate::{BenchError, BenchResult};

use super::traits::Sealer;

/// Configuration for the external sealer.
#[derive(Debug, Clone)]
pub struct ExternalSealerConfig {
    /// Path to the sealer binary
    pub binary: PathBuf,
    /// Extra arguments placed before the operation name
    pub extra_args: Vec<String>,
    /// Timeout per operation; zero disables it
    pub timeout: Duration,
    /// Environment handed to every sealer process
    pub env: BTreeMap<String, String>,
}

impl Default for ExternalSealerConfig {
    fn default() -> Self {
        ExternalSealerConfig {
            binary: PathBuf::from("fil-sealer"),
            extra_args: Vec::new(),
            timeout: Duration::from_secs(48 * 60 * 60),
            env: BTreeMap::new(),
        }
    }
}

impl ExternalSealerConfig {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        ExternalSealerConfig {
            binary: binary.into(),
            ..Default::default()
        }
    }

    /// Add extra arguments.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    /// Split a shell-quoted argument string into extra arguments.
    pub fn with_arg_string(self, args: &str) -> BenchResult<Self> {
        let split = shlex::split(args)
            .ok_or_else(|| BenchError::Config(format!("unbalanced quotes in sealer args: {args}")))?;
        Ok(self.with_args(split))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }
}

/// Proof-library sealer running as a child process per operation.
pub struct ExternalSealer {
    config: ExternalSealerConfig,
    store: SectorStore,
}

#[derive(Serialize)]
struct AddPieceRequest<'a> {
    sector: &'a SectorRef,
    size: UnpaddedPieceSize,
    piece_path: PathBuf,
}

#[derive(Serialize)]
struct PreCommit1Request<'a> {
    sector: &'a SectorRef,
    ticket: String,
    pieces: &'a [PieceInfo],
}

#[derive(Serialize)]
struct PhaseRequest<'a> {
    sector: &'a SectorRef,
    #[serde(with = "base64_bytes")]
    phase1_out: &'a [u8],
}

#[derive(Serialize)]
struct Commit1Request<'a> {
    sector: &'a SectorRef,
    ticket: String,
    seed: String,
    pieces: &'a [PieceInfo],
    cids: &'a SectorCids,
}

#[derive(Serialize)]
struct VerifySealRequest<'a> {
    sector_id: SectorId,
    seal_proof: crate::core::RegisteredSealProof,
    #[serde(with = "cid_string")]
    sealed_cid: Cid,
    #[serde(with = "cid_string")]
    unsealed_cid: Cid,
    #[serde(with = "base64_bytes")]
    proof: &'a [u8],
    ticket: String,
    seed: String,
}

#[derive(Serialize)]
struct UnsealRequest<'a> {
    sector: &'a SectorRef,
    offset: u64,
    size: UnpaddedPieceSize,
    ticket: String,
    #[serde(with = "cid_string")]
    unsealed_cid: Cid,
}

#[derive(Serialize)]
struct SectorRequest<'a> {
    sector: &'a SectorRef,
}

#[derive(Serialize)]
struct ChallengeRequest {
    proof_type: RegisteredPoStProof,
    miner: ActorId,
    randomness: String,
    eligible: u64,
}

#[derive(Serialize)]
struct PoStRequest<'a> {
    miner: ActorId,
    sectors: &'a [SealedSectorInfo],
    randomness: String,
}

#[derive(Deserialize)]
struct PhaseResponse {
    #[serde(with = "base64_bytes")]
    phase1_out: Vec<u8>,
}

#[derive(Deserialize)]
struct ProofResponse {
    #[serde(with = "base64_bytes")]
    proof: Vec<u8>,
}

#[derive(Deserialize)]
struct ValidResponse {
    valid: bool,
}

#[derive(Deserialize)]
struct EmptyResponse {}

#[derive(Deserialize)]
struct ChallengeResponse {
    challenges: Vec<u64>,
}

#[derive(Deserialize)]
struct PoStResponse {
    proofs: Vec<PoStProof>,
    #[serde(default)]
    faulty: Vec<SectorId>,
}

impl ExternalSealer {
    pub fn new(config: ExternalSealerConfig, store: SectorStore) -> Self {
        ExternalSealer { config, store }
    }

    /// Command line for one operation, without stdio wiring.
    pub fn command(&self, op: &str) -> Command {
        let mut cmd = Command::new(&self.config.binary);
        cmd.args(&self.config.extra_args)
            .arg("--storage-dir")
            .arg(self.store.root())
            .arg(op)
            .envs(&self.config.env);
        cmd
    }

    /// Run one operation and decode its response.
    fn call<Req: Serialize, Resp: DeserializeOwned>(&self, op: &str, req: &Req) -> BenchResult<Resp> {
        let mut stdin = tempfile::tempfile()?;
        serde_json::to_writer(&mut stdin, req)?;
        stdin.seek(SeekFrom::Start(0))?;
        let mut stdout = tempfile::tempfile()?;
        let mut stderr = tempfile::tempfile()?;

        let mut cmd = self.command(op);
        cmd.stdin(Stdio::from(stdin))
            .stdout(Stdio::from(stdout.try_clone()?))
            .stderr(Stdio::from(stderr.try_clone()?));

        let (status, peak_rss, elapsed) = self.run_with_timeout(cmd, self.config.timeout)?;
        tracing::debug!(op, ?elapsed, ?peak_rss, "sealer process finished");

        if !status.success() {
            let mut err = String::new();
            stderr.seek(SeekFrom::Start(0))?;
            stderr.read_to_string(&mut err)?;
            return Err(BenchError::Message(format!(
                "sealer {op} failed: status={status} stderr={}",
                err.trim()
            )));
        }

        stdout.seek(SeekFrom::Start(0))?;
        serde_json::from_reader(stdout)
            .map_err(|e| BenchError::Message(format!("failed to parse sealer {op} output: {e}")))
    }

    /// Wait for the child, enforcing the timeout and sampling its memory.
    fn run_with_timeout(
        &self,
        mut cmd: Command,
        timeout: Duration,
    ) -> BenchResult<(ExitStatus, Option<u64>, Duration)> {
        #[cfg(feature = "mem")]
        use sysinfo::{ProcessRefreshKind, RefreshKind, System};

        let start = Instant::now();
        let mut child = cmd.spawn().map_err(|e| {
            BenchError::Message(format!(
                "failed to spawn sealer {}: {e}",
                self.config.binary.display()
            ))
        })?;

        #[cfg(feature = "mem")]
        let mut sys = System::new_with_specifics(
            RefreshKind::new().with_processes(ProcessRefreshKind::everything()),
        );
        #[cfg(feature = "mem")]
        let mut peak_rss: u64 = 0;
        #[cfg(feature = "mem")]
        let pid = sysinfo::Pid::from_u32(child.id());

        loop {
            #[cfg(feature = "mem")]
            {
                sys.refresh_process(pid);
                if let Some(p) = sys.process(pid) {
                    peak_rss = peak_rss.max(p.memory());
                }
            }

            if let Some(status) = child
                .try_wait()
                .map_err(|e| BenchError::Message(e.to_string()))?
            {
                #[cfg(feature = "mem")]
                let peak = Some(peak_rss);
                #[cfg(not(feature = "mem"))]
                let peak = None;
                return Ok((status, peak, start.elapsed()));
            }

            if !timeout.is_zero() && start.elapsed() >= timeout {
                let _ = child.kill();
                let _ = child.wait();
                return Err(BenchError::Message(format!(
                    "sealer operation timed out after {timeout:?}"
                )));
            }

            std::thread::sleep(Duration::from_millis(50));
        }
    }

    fn detect_version(&self) -> Option<String> {
        Command::new(&self.config.binary)
            .arg("--version")
            .envs(&self.config.env)
            .output()
            .ok()
            .filter(|o| o.status.success())
            .and_then(|o| String::from_utf8(o.stdout).ok())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }
}

impl Sealer for ExternalSealer {
    fn name(&self) -> &str {
        "external"
    }

    fn version(&self) -> Option<String> {
        self.detect_version()
    }

    fn add_piece(
        &self,
        sector: &SectorRef,
        size: UnpaddedPieceSize,
        data: &mut dyn Read,
    ) -> BenchResult<PieceInfo> {
        // Stage the bytes so the sealer process can read them from disk.
        let mut staged = self.store.staging_file()?;
        let copied = std::io::copy(&mut data.take(size.0), staged.as_file_mut())?;
        staged.as_file_mut().flush()?;
        if copied != size.0 {
            return Err(BenchError::Message(format!(
                "piece reader yielded {copied} bytes, expected {}",
                size.0
            )));
        }
        self.call(
            "add-piece",
            &AddPieceRequest {
                sector,
                size,
                piece_path: staged.path().to_path_buf(),
            },
        )
    }

    fn pre_commit1(
        &self,
        sector: &SectorRef,
        ticket: &SealTicket,
        pieces: &[PieceInfo],
    ) -> BenchResult<Vec<u8>> {
        let resp: PhaseResponse = self.call(
            "precommit1",
            &PreCommit1Request { sector, ticket: ticket.to_hex(), pieces },
        )?;
        Ok(resp.phase1_out)
    }

    fn pre_commit2(&self, sector: &SectorRef, phase1_out: &[u8]) -> BenchResult<SectorCids> {
        self.call("precommit2", &PhaseRequest { sector, phase1_out })
    }

    fn commit1(
        &self,
        sector: &SectorRef,
        ticket: &SealTicket,
        seed: &[u8; 32],
        pieces: &[PieceInfo],
        cids: &SectorCids,
    ) -> BenchResult<Vec<u8>> {
        let resp: PhaseResponse = self.call(
            "commit1",
            &Commit1Request {
                sector,
                ticket: ticket.to_hex(),
                seed: hex::encode(seed),
                pieces,
                cids,
            },
        )?;
        Ok(resp.phase1_out)
    }

    fn commit2(&self, sector: &SectorRef, phase1_out: &[u8]) -> BenchResult<Vec<u8>> {
        let resp: ProofResponse = self.call("commit2", &PhaseRequest { sector, phase1_out })?;
        Ok(resp.proof)
    }

    fn verify_seal(&self, info: &SealVerifyInfo) -> BenchResult<bool> {
        let resp: ValidResponse = self.call(
            "verify-seal",
            &VerifySealRequest {
                sector_id: info.sector_id,
                seal_proof: info.seal_proof,
                sealed_cid: info.sealed_cid,
                unsealed_cid: info.unsealed_cid,
                proof: &info.proof,
                ticket: info.randomness.to_hex(),
                seed: hex::encode(info.interactive_randomness),
            },
        )?;
        Ok(resp.valid)
    }

    fn unseal_piece(
        &self,
        sector: &SectorRef,
        offset: u64,
        size: UnpaddedPieceSize,
        ticket: &SealTicket,
        unsealed_cid: &Cid,
    ) -> BenchResult<()> {
        let _: EmptyResponse = self.call(
            "unseal",
            &UnsealRequest {
                sector,
                offset,
                size,
                ticket: ticket.to_hex(),
                unsealed_cid: *unsealed_cid,
            },
        )?;
        Ok(())
    }

    fn finalize_sector(&self, sector: &SectorRef) -> BenchResult<()> {
        let _: EmptyResponse = self.call("finalize", &SectorRequest { sector })?;
        Ok(())
    }

    fn generate_winning_post_sector_challenge(
        &self,
        proof: RegisteredPoStProof,
        miner: ActorId,
        randomness: &[u8; 32],
        eligible: u64,
    ) -> BenchResult<Vec<u64>> {
        let resp: ChallengeResponse = self.call(
            "winning-challenge",
            &ChallengeRequest {
                proof_type: proof,
                miner,
                randomness: hex::encode(randomness),
                eligible,
            },
        )?;
        Ok(resp.challenges)
    }

    fn generate_winning_post(
        &self,
        miner: ActorId,
        sectors: &[SealedSectorInfo],
        randomness: &[u8; 32],
    ) -> BenchResult<Vec<PoStProof>> {
        let resp: PoStResponse = self.call(
            "winning-post",
            &PoStRequest { miner, sectors, randomness: hex::encode(randomness) },
        )?;
        Ok(resp.proofs)
    }

    fn verify_winning_post(&self, info: &PoStVerifyInfo) -> BenchResult<bool> {
        let resp: ValidResponse = self.call("verify-winning-post", info)?;
        Ok(resp.valid)
    }

    fn generate_window_post(
        &self,
        miner: ActorId,
        sectors: &[SealedSectorInfo],
        randomness: &[u8; 32],
    ) -> BenchResult<(Vec<PoStProof>, Vec<SectorId>)> {
        let resp: PoStResponse = self.call(
            "window-post",
            &PoStRequest { miner, sectors, randomness: hex::encode(randomness) },
        )?;
        Ok((resp.proofs, resp.faulty))
    }

    fn verify_window_post(&self, info: &PoStVerifyInfo) -> BenchResult<bool> {
        let resp: ValidResponse = self.call("verify-window-post", info)?;
        Ok(resp.valid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = ExternalSealerConfig::default();
        assert_eq!(config.binary, PathBuf::from("fil-sealer"));
        assert!(config.extra_args.is_empty());
    }

    #[test]
    fn test_config_builder() {
        let config = ExternalSealerConfig::new("/usr/local/bin/sealer")
            .with_arg_string("--threads 8 --label 'bench run'")
            .unwrap()
            .with_timeout(Duration::from_secs(60));

        assert_eq!(config.binary, PathBuf::from("/usr/local/bin/sealer"));
        assert_eq!(config.extra_args, vec!["--threads", "8", "--label", "bench run"]);
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert!(ExternalSealerConfig::default().with_arg_string("'open").is_err());
    }

    #[test]
    fn test_command_line() {
        let store = SectorStore::new("/tmp/bench");
        let mut env = BTreeMap::new();
        env.insert("BELLMAN_NO_GPU".to_string(), "1".to_string());
        let sealer = ExternalSealer::new(
            ExternalSealerConfig::new("sealer").with_args(vec!["-v".into()]).with_env(env),
            store,
        );
        let cmd = sealer.command("precommit1");
        let args: Vec<_> = cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(args, vec!["-v", "--storage-dir", "/tmp/bench", "precommit1"]);
        let envs: Vec<_> = cmd.get_envs().collect();
        assert_eq!(envs.len(), 1);
        assert_eq!(sealer.name(), "external");
    }

    #[test]
    fn test_missing_binary_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = SectorStore::open(dir.path()).unwrap();
        let sealer = ExternalSealer::new(
            ExternalSealerConfig::new(dir.path().join("no-such-sealer")),
            store,
        );
        let sector = SectorRef::new(
            ActorId(1000),
            crate::core::SectorNumber(0),
            crate::core::SectorSize::KIB_2,
        )
        .unwrap();
        assert!(sealer.finalize_sector(&sector).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_json_round_trip_through_script() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("sealer.sh");
        std::fs::write(&script, "#!/bin/sh\ncat > /dev/null\necho '{\"valid\": true}'\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let store = SectorStore::open(dir.path().join("store")).unwrap();
        let sealer = ExternalSealer::new(ExternalSealerConfig::new(&script), store);
        let info = PoStVerifyInfo {
            randomness: [0u8; 32],
            proofs: Vec::new(),
            challenged_sectors: Vec::new(),
            prover: ActorId(1000),
        };
        assert!(sealer.verify_window_post(&info).unwrap());
    }
}
