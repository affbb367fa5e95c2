//! Proof-of-storage phase: winning and window proofs, cold then hot.

use std::time::Instant;

use rand::RngCore;

use crate::core::{
    ActorId, Anomaly, HeatLabel, PoStProof, PoStVerifyInfo, PostTimings, SealedSectorInfo,
};
use crate::sealer::Sealer;
use crate::{BenchError, BenchResult};

/// Timings of the phase plus any proof judged invalid.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostOutcome {
    pub timings: PostTimings,
    pub anomalies: Vec<Anomaly>,
}

/// Random 32-byte challenge.
pub fn random_challenge() -> [u8; 32] {
    let mut challenge = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut challenge);
    challenge
}

/// Benchmark the proof-of-storage operations over already sealed sectors.
///
/// Runs sequentially: candidate selection, winning proof and verification
/// (cold then hot), window proof and verification (cold then hot).
pub fn run_post(
    sealer: &dyn Sealer,
    miner: ActorId,
    sectors: &[SealedSectorInfo],
    challenge: &[u8; 32],
) -> BenchResult<PostOutcome> {
    let first = sectors
        .first()
        .ok_or_else(|| BenchError::Config("proof-of-storage needs at least one sealed sector".into()))?;
    let mut out = PostOutcome::default();
    let t = &mut out.timings;

    tracing::info!("generating winning post candidates");
    let start = Instant::now();
    let indices = sealer.generate_winning_post_sector_challenge(
        first.seal_proof.winning_post_proof(),
        miner,
        challenge,
        sectors.len() as u64,
    )?;
    let candidates = indices
        .iter()
        .map(|&i| {
            usize::try_from(i)
                .ok()
                .and_then(|i| sectors.get(i))
                .copied()
                .ok_or_else(|| BenchError::Message(format!("challenged sector index {i} out of range")))
        })
        .collect::<BenchResult<Vec<_>>>()?;
    t.generate_candidates = start.elapsed();

    tracing::info!("computing winning post snark (cold)");
    let start = Instant::now();
    let cold = sealer.generate_winning_post(miner, &candidates, challenge)?;
    t.winning_proof_cold = start.elapsed();

    tracing::info!("computing winning post snark (hot)");
    let start = Instant::now();
    let hot = sealer.generate_winning_post(miner, &candidates, challenge)?;
    t.winning_proof_hot = start.elapsed();

    for (heat, proofs) in [(HeatLabel::Cold, cold), (HeatLabel::Hot, hot)] {
        let info = verify_info(miner, challenge, proofs, &candidates);
        let start = Instant::now();
        let ok = sealer.verify_winning_post(&info)?;
        let took = start.elapsed();
        match heat {
            HeatLabel::Cold => t.verify_winning_cold = took,
            HeatLabel::Hot => t.verify_winning_hot = took,
        }
        if !ok {
            tracing::error!(%heat, "winning post verification failed");
            out.anomalies.push(Anomaly::InvalidWinningPost { run: heat });
        }
    }

    tracing::info!("computing window post snark (cold)");
    let start = Instant::now();
    let (cold, skipped) = sealer.generate_window_post(miner, sectors, challenge)?;
    t.window_proof_cold = start.elapsed();
    if !skipped.is_empty() {
        tracing::warn!(?skipped, "window post skipped sectors");
    }

    tracing::info!("computing window post snark (hot)");
    let start = Instant::now();
    let (hot, _) = sealer.generate_window_post(miner, sectors, challenge)?;
    t.window_proof_hot = start.elapsed();

    for (heat, proofs) in [(HeatLabel::Cold, cold), (HeatLabel::Hot, hot)] {
        let info = verify_info(miner, challenge, proofs, sectors);
        let start = Instant::now();
        let ok = sealer.verify_window_post(&info)?;
        let took = start.elapsed();
        match heat {
            HeatLabel::Cold => t.verify_window_cold = took,
            HeatLabel::Hot => t.verify_window_hot = took,
        }
        if !ok {
            tracing::error!(%heat, "window post verification failed");
            out.anomalies.push(Anomaly::InvalidWindowPost { run: heat });
        }
    }

    Ok(out)
}

fn verify_info(
    miner: ActorId,
    challenge: &[u8; 32],
    proofs: Vec<PoStProof>,
    sectors: &[SealedSectorInfo],
) -> PoStVerifyInfo {
    PoStVerifyInfo {
        randomness: *challenge,
        proofs,
        challenged_sectors: sectors.to_vec(),
        prover: miner,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{RegisteredSealProof, SectorId, SectorNumber};
    use crate::sealer::{MockConfig, MockOp, MockSealer};

    fn sealed(n: u64) -> SealedSectorInfo {
        let id = SectorId { miner: ActorId(1000), number: SectorNumber(n) };
        SealedSectorInfo {
            seal_proof: RegisteredSealProof::StackedDrg2KiBV1_1,
            sector_number: id.number,
            sealed_cid: MockSealer::sealed_cid_for(&id).unwrap(),
        }
    }

    #[test]
    fn test_post_runs_every_operation_twice() {
        let sealer = MockSealer::default_mock();
        let sectors = vec![sealed(0), sealed(1)];
        let out = run_post(&sealer, ActorId(1000), &sectors, &random_challenge()).unwrap();
        assert!(out.anomalies.is_empty());
        assert_eq!(sealer.count(MockOp::WinningChallenge), 1);
        assert_eq!(sealer.count(MockOp::WinningPost), 2);
        assert_eq!(sealer.count(MockOp::VerifyWinningPost), 2);
        assert_eq!(sealer.count(MockOp::WindowPost), 2);
        assert_eq!(sealer.count(MockOp::VerifyWindowPost), 2);
    }

    #[test]
    fn test_failed_verification_becomes_anomaly() {
        let sealer = MockSealer::new(MockConfig::new("mock").invalid_post());
        let out = run_post(&sealer, ActorId(1000), &[sealed(0)], &[9u8; 32]).unwrap();
        assert_eq!(out.anomalies.len(), 4);
        assert!(out.anomalies.contains(&Anomaly::InvalidWinningPost { run: HeatLabel::Hot }));
        assert!(out.anomalies.contains(&Anomaly::InvalidWindowPost { run: HeatLabel::Cold }));
    }

    #[test]
    fn test_verification_error_is_fatal() {
        let sealer = MockSealer::new(MockConfig::new("mock").fails(MockOp::VerifyWindowPost));
        assert!(run_post(&sealer, ActorId(1000), &[sealed(0)], &[1u8; 32]).is_err());
    }

    #[test]
    fn test_no_sectors_is_config_error() {
        let sealer = MockSealer::default_mock();
        let err = run_post(&sealer, ActorId(1000), &[], &[0u8; 32]).unwrap_err();
        assert!(matches!(err, BenchError::Config(_)));
        assert!(sealer.calls().is_empty());
    }
}
