//! Integration tests for the sealing benchmark report and its persistence.

use seal_bench::config::SealingOverrides;
use seal_bench::report::{TextSections, render_text};
use seal_bench::sealer::{SealerKind, SealerSettings};
use seal_bench::sealing_cmd::{SealingArgs, bench};
use seal_bench::storage::{CSV_HEADERS, CsvExporter, JsonlWriter};

fn run_mock(dir: &std::path::Path, skip_commit2: bool) -> seal_bench::core::BenchResults {
    let settings = SealerSettings { kind: SealerKind::Mock, no_gpu: true, ..Default::default() };
    let args = SealingArgs {
        overrides: SealingOverrides {
            storage_dir: Some(dir.join("store")),
            sector_size: Some("2KiB".into()),
            num_sectors: Some(2),
            workers: Some(1),
            skip_commit2,
            ..Default::default()
        },
        ..Default::default()
    };
    bench(&settings, &args).unwrap()
}

#[test]
fn test_report_sections() {
    let dir = tempfile::tempdir().unwrap();
    let results = run_mock(dir.path(), false);
    assert_eq!(results.env_vars.get("BELLMAN_NO_GPU").map(String::as_str), Some("1"));
    assert!(results.system.is_some());

    let text = render_text(&results, TextSections { sealing: true, unseal: true });
    assert!(text.contains("results SectorSize:(2048), SectorNumber:(2)"));
    assert!(text.contains("seal: addPiece: "));
    assert!(text.contains("unseal: "));
    assert!(text.contains("compute winning post proof (cold): "));
    assert!(text.contains("verify window post proof (hot): "));
    assert!(!text.contains("anomalies"));
}

#[test]
fn test_skip_commit2_omits_post() {
    let dir = tempfile::tempdir().unwrap();
    let results = run_mock(dir.path(), true);
    assert!(results.post.is_none());
    assert!(results.sealing_sum.commit2.is_zero());
    assert!(results.sealing_sum.verify.is_zero());

    let text = render_text(&results, TextSections { sealing: true, unseal: true });
    assert!(!text.contains("winning post"));
}

#[test]
fn test_jsonl_and_csv_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let results = run_mock(dir.path(), true);

    let writer = JsonlWriter::new(dir.path().join("out/history.jsonl"));
    writer.append(&results).unwrap();
    writer.append(&results).unwrap();
    let back = writer.read_all().unwrap();
    assert_eq!(back.len(), 2);
    assert_eq!(back[0].sealing_sum, results.sealing_sum);

    let csv_path = dir.path().join("out/sectors.csv");
    CsvExporter::new().export(&results, &csv_path).unwrap();
    let content = std::fs::read_to_string(&csv_path).unwrap();
    let mut lines = content.lines();
    assert_eq!(lines.next().unwrap(), CSV_HEADERS.join(","));
    assert_eq!(lines.count(), 2);
}
