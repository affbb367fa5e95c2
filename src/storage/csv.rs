//! CSV export of per-sector stage timings.

use std::io::Write;
use std::path::Path;

use crate::BenchError;
use crate::core::schema::{BenchResults, Stage};

/// CSV column headers in deterministic order.
pub const CSV_HEADERS: &[&str] = &[
    "timestamp",
    "sector_size",
    "sector_index",
    "add_piece_ns",
    "pre_commit1_ns",
    "pre_commit2_ns",
    "commit1_ns",
    "commit2_ns",
    "verify_ns",
    "unseal_ns",
];

/// Exports one row per sector with the duration of every stage in nanoseconds.
#[derive(Debug, Clone, Default)]
pub struct CsvExporter;

impl CsvExporter {
    pub fn new() -> Self {
        CsvExporter
    }

    /// Export a run to a CSV file.
    ///
    /// # Errors
    /// Returns an error if file operations or CSV writing fails.
    pub fn export(&self, results: &BenchResults, output: &Path) -> Result<(), BenchError> {
        if let Some(parent) = output.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| BenchError::Message(format!("failed to create directory: {e}")))?;
            }
        }

        let file = std::fs::File::create(output)
            .map_err(|e| BenchError::Message(format!("failed to create file: {e}")))?;

        self.export_to_writer(results, file)
    }

    pub fn export_to_writer<W: Write>(&self, results: &BenchResults, writer: W) -> Result<(), BenchError> {
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer
            .write_record(CSV_HEADERS)
            .map_err(|e| BenchError::Message(format!("failed to write CSV headers: {e}")))?;

        for (index, timing) in results.sealing_results.iter().enumerate() {
            let mut row = vec![
                results.timestamp.clone(),
                results.sector_size.0.to_string(),
                index.to_string(),
            ];
            row.extend(Stage::ALL.iter().map(|s| timing.get(*s).as_nanos().to_string()));
            csv_writer
                .write_record(&row)
                .map_err(|e| BenchError::Message(format!("failed to write CSV row: {e}")))?;
        }

        csv_writer
            .flush()
            .map_err(|e| BenchError::Message(format!("failed to flush CSV writer: {e}")))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{SectorSize, StageTiming};
    use std::time::Duration;

    #[test]
    fn test_export_rows() {
        let mut t = StageTiming::default();
        t.pre_commit2 = Duration::from_nanos(42);
        let results = BenchResults::new(SectorSize::KIB_2, 2, vec![StageTiming::default(), t]);

        let mut buf = Vec::new();
        CsvExporter::new().export_to_writer(&results, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], CSV_HEADERS.join(","));
        let cols: Vec<&str> = lines[2].split(',').collect();
        assert_eq!(cols[1], "2048");
        assert_eq!(cols[2], "1");
        assert_eq!(cols[5], "42");
    }

    #[test]
    fn test_export_creates_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("reports/run.csv");
        let results = BenchResults::new(SectorSize::KIB_2, 1, vec![StageTiming::default()]);
        CsvExporter::new().export(&results, &out).unwrap();
        assert!(out.exists());
    }
}
