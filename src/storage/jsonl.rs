//! JSONL (JSON Lines) history of benchmark results.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::BenchError;
use crate::core::schema::{BenchResults, SCHEMA_VERSION};

/// JSONL writer/reader for benchmark results.
///
/// Each run is stored as a single JSON line, so runs can be appended and
/// streamed without loading the entire file.
#[derive(Debug, Clone)]
pub struct JsonlWriter {
    path: PathBuf,
}

impl JsonlWriter {
    /// Create a new JsonlWriter for the given path.
    ///
    /// The file will be created if it doesn't exist when writing.
    pub fn new(path: impl AsRef<Path>) -> Self {
        JsonlWriter {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a single run to the JSONL file.
    ///
    /// # Errors
    /// Returns an error if:
    /// - The run's schema_version doesn't match SCHEMA_VERSION
    /// - File operations fail
    /// - JSON serialization fails
    pub fn append(&self, results: &BenchResults) -> Result<(), BenchError> {
        if results.schema_version != SCHEMA_VERSION {
            return Err(BenchError::Message(format!(
                "schema version mismatch: results have v{}, expected v{}",
                results.schema_version, SCHEMA_VERSION
            )));
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| BenchError::Message(format!("failed to create directory: {e}")))?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| BenchError::Message(format!("failed to open file: {e}")))?;

        let json = serde_json::to_string(results)
            .map_err(|e| BenchError::Message(format!("failed to serialize results: {e}")))?;

        writeln!(file, "{}", json)
            .map_err(|e| BenchError::Message(format!("failed to write results: {e}")))?;

        Ok(())
    }

    /// Read every run from the JSONL file.
    ///
    /// # Errors
    /// Returns an error if the file is missing or any line fails to parse.
    pub fn read_all(&self) -> Result<Vec<BenchResults>, BenchError> {
        let file = File::open(&self.path).map_err(|e| {
            BenchError::Message(format!("failed to open {}: {e}", self.path.display()))
        })?;

        let reader = BufReader::new(file);
        let mut runs = Vec::new();

        for (line_num, line_result) in reader.lines().enumerate() {
            let line = line_result.map_err(|e| {
                BenchError::Message(format!("failed to read line {}: {e}", line_num + 1))
            })?;

            if line.trim().is_empty() {
                continue;
            }

            let run: BenchResults = serde_json::from_str(&line).map_err(|e| {
                BenchError::Message(format!("failed to parse line {}: {e}", line_num + 1))
            })?;
            runs.push(run);
        }

        Ok(runs)
    }

    /// Number of runs stored; zero when the file does not exist yet.
    pub fn count(&self) -> Result<usize, BenchError> {
        if !self.path.exists() {
            return Ok(0);
        }

        let file = File::open(&self.path)
            .map_err(|e| BenchError::Message(format!("failed to open file: {e}")))?;

        Ok(BufReader::new(file)
            .lines()
            .map_while(Result::ok)
            .filter(|l| !l.trim().is_empty())
            .count())
    }
}
