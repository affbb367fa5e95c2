//! Aggregation and rendering of benchmark results.
//!
//! This module provides:
//! - Summation of per-sector timings into `BenchResults::sealing_sum`
//! - Throughput formatting (`bps`)
//! - The human-readable text report and the JSON report

use std::time::Duration;

use crate::core::{BenchResults, EnvCapture, RunResult, SectorSize, Stage, StageTiming};
use crate::engine::PostOutcome;
use crate::{BenchError, BenchResult};

impl BenchResults {
    /// Build the report of a completed sealing run.
    pub fn from_run(sector_size: SectorSize, run: &RunResult) -> Self {
        let mut results = BenchResults::new(sector_size, run.sectors.len(), run.timings());
        for sector in run.invalid_proofs() {
            results.anomalies.push(crate::core::Anomaly::InvalidSealProof { sector });
        }
        results
    }

    /// Sum per-sector timings into `sealing_sum`.
    ///
    /// Fails when there are no per-sector results or fewer than the sector count.
    pub fn sum_sealing_time(&mut self) -> BenchResult<()> {
        if self.sealing_results.is_empty() {
            return Err(BenchError::Message("no sealing results to aggregate".into()));
        }
        if self.sealing_results.len() != self.sector_number {
            return Err(BenchError::Message(format!(
                "sealing results count ({}) does not match sector count ({})",
                self.sealing_results.len(),
                self.sector_number
            )));
        }
        let mut sum = StageTiming::default();
        for timing in &self.sealing_results {
            sum.accumulate(timing);
        }
        self.sealing_sum = sum;
        Ok(())
    }

    pub fn set_env(&mut self, env: &EnvCapture) {
        self.env_vars = env.vars().clone();
    }

    pub fn set_post(&mut self, post: PostOutcome) {
        self.post = Some(post.timings);
        self.anomalies.extend(post.anomalies);
    }

    pub fn has_anomalies(&self) -> bool {
        !self.anomalies.is_empty()
    }
}

/// Throughput of processing `sectors` sectors of `sector_size` in `d`.
pub fn bps(sector_size: SectorSize, sectors: usize, d: Duration) -> String {
    let nanos = d.as_nanos();
    if nanos == 0 {
        return "n/a".to_string();
    }
    let bytes = u128::from(sector_size.0) * sectors as u128 * 1_000_000_000 / nanos;
    let adjusted = byte_unit::Byte::from_bytes(bytes).get_appropriate_unit(true);
    format!("{adjusted}/s")
}

/// Which parts of the text report to render.
#[derive(Debug, Clone, Copy)]
pub struct TextSections {
    pub sealing: bool,
    pub unseal: bool,
}

fn stage_label(stage: Stage) -> &'static str {
    match stage {
        Stage::AddPiece => "seal: addPiece",
        Stage::PreCommit1 => "seal: preCommit phase 1",
        Stage::PreCommit2 => "seal: preCommit phase 2",
        Stage::Commit1 => "seal: commit phase 1",
        Stage::Commit2 => "seal: commit phase 2",
        Stage::Verify => "seal: verify",
        Stage::Unseal => "unseal",
    }
}

/// Render the human-readable report.
pub fn render_text(results: &BenchResults, sections: TextSections) -> String {
    let mut out = String::new();
    let size = results.sector_size;
    let n = results.sector_number;

    out.push_str("environment variable list:\n");
    for (k, v) in &results.env_vars {
        out.push_str(&format!("{k}={v}\n"));
    }
    out.push_str(&format!(
        "----\nresults SectorSize:({}), SectorNumber:({})\n",
        size.0, n
    ));

    if sections.sealing {
        let sum = &results.sealing_sum;
        for stage in Stage::ALL {
            let d = sum.get(stage);
            match stage {
                Stage::Verify => out.push_str(&format!("{}: {:?}\n", stage_label(stage), d)),
                Stage::Unseal if !sections.unseal => {}
                _ => out.push_str(&format!("{}: {:?} ({})\n", stage_label(stage), d, bps(size, n, d))),
            }
        }
        out.push('\n');
    }

    if let Some(post) = &results.post {
        out.push_str(&format!(
            "generate candidates: {:?} ({})\n",
            post.generate_candidates,
            bps(size, n, post.generate_candidates)
        ));
        out.push_str(&format!("compute winning post proof (cold): {:?}\n", post.winning_proof_cold));
        out.push_str(&format!("compute winning post proof (hot): {:?}\n", post.winning_proof_hot));
        out.push_str(&format!("verify winning post proof (cold): {:?}\n", post.verify_winning_cold));
        out.push_str(&format!("verify winning post proof (hot): {:?}\n\n", post.verify_winning_hot));
        out.push_str(&format!("compute window post proof (cold): {:?}\n", post.window_proof_cold));
        out.push_str(&format!("compute window post proof (hot): {:?}\n", post.window_proof_hot));
        out.push_str(&format!("verify window post proof (cold): {:?}\n", post.verify_window_cold));
        out.push_str(&format!("verify window post proof (hot): {:?}\n", post.verify_window_hot));
    }

    if !results.anomalies.is_empty() {
        out.push_str("----\nanomalies:\n");
        for a in &results.anomalies {
            out.push_str(&format!("- {a}\n"));
        }
    }
    out
}

/// Render the report as pretty JSON.
pub fn render_json(results: &BenchResults) -> BenchResult<String> {
    Ok(serde_json::to_string_pretty(results)?)
}

/// One line summarising a single stage run, as printed by the stage commands.
pub fn stage_line(stage: Stage, sector_size: SectorSize, d: Duration) -> String {
    format!("{}: {:?} ({})", stage_label(stage), d, bps(sector_size, 1, d))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Anomaly, ActorId, SectorId, SectorNumber};

    fn timing(ms: u64) -> StageTiming {
        let mut t = StageTiming::default();
        for stage in Stage::ALL {
            t.set(stage, Duration::from_millis(ms));
        }
        t
    }

    #[test]
    fn test_sum_matches_manual_sum() {
        let mut r = BenchResults::new(SectorSize::KIB_2, 3, vec![timing(1), timing(2), timing(4)]);
        r.sum_sealing_time().unwrap();
        for stage in Stage::ALL {
            assert_eq!(r.sealing_sum.get(stage), Duration::from_millis(7));
        }
    }

    #[test]
    fn test_sum_rejects_empty_and_short_results() {
        let mut empty = BenchResults::new(SectorSize::KIB_2, 0, vec![]);
        assert!(empty.sum_sealing_time().is_err());
        let mut short = BenchResults::new(SectorSize::KIB_2, 2, vec![timing(1)]);
        assert!(short.sum_sealing_time().is_err());
    }

    #[test]
    fn test_bps() {
        assert_eq!(bps(SectorSize::KIB_2, 1, Duration::ZERO), "n/a");
        let s = bps(SectorSize::MIB_8, 2, Duration::from_secs(1));
        assert!(s.ends_with("/s"));
        assert!(s.contains("16"));
        assert!(s.contains("MiB"));
    }

    #[test]
    fn test_render_text_lists_stages_and_anomalies() {
        let mut r = BenchResults::new(SectorSize::KIB_2, 1, vec![timing(5)]);
        r.env_vars.insert("BELLMAN_NO_GPU".into(), "1".into());
        r.sum_sealing_time().unwrap();
        r.anomalies.push(Anomaly::InvalidSealProof {
            sector: SectorId { miner: ActorId(1000), number: SectorNumber(0) },
        });
        let text = render_text(&r, TextSections { sealing: true, unseal: false });
        assert!(text.starts_with("environment variable list:\nBELLMAN_NO_GPU=1\n"));
        assert!(text.contains("seal: preCommit phase 2: 5ms"));
        assert!(text.contains("seal: verify: 5ms\n"));
        assert!(!text.contains("unseal:"));
        assert!(text.contains("porep proof for sector s-t01000-0 was invalid"));
    }

    #[test]
    fn test_render_json_round_trips() {
        let mut r = BenchResults::new(SectorSize::KIB_2, 1, vec![timing(3)]);
        r.sum_sealing_time().unwrap();
        let json = render_json(&r).unwrap();
        let back: BenchResults = serde_json::from_str(&json).unwrap();
        assert_eq!(back.sealing_sum, r.sealing_sum);
        assert_eq!(back.sector_number, 1);
    }
}
