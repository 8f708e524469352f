//! Combine result files from several runs into one, dropping duplicate rows

use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::ResultRow;

/// Outcome of a merge
#[derive(Debug, Clone, Default, Serialize)]
pub struct MergeReport {
    /// Files whose rows were merged
    pub files_merged: usize,
    /// Files skipped because their header does not match
    pub files_skipped: Vec<PathBuf>,
    /// Rows read across merged files
    pub rows_read: usize,
    /// Rows written to the output
    pub rows_written: usize,
}

impl MergeReport {
    pub fn duplicates_dropped(&self) -> usize {
        self.rows_read - self.rows_written
    }
}

/// CSV files directly inside `dir`, sorted by name
pub fn collect_csv_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| Error::Config(format!("Cannot read {}: {}", dir.display(), e)))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let is_csv = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
        if is_csv && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Merge `inputs` into `output`, keeping the first occurrence of each row
///
/// The output is rewritten from scratch; an input equal to the output path is
/// ignored.
pub fn merge_results(inputs: &[PathBuf], output: &Path) -> Result<MergeReport> {
    let mut report = MergeReport::default();
    let mut seen: HashSet<ResultRow> = HashSet::new();
    let mut merged: Vec<ResultRow> = Vec::new();

    for input in inputs {
        if same_file(input, output) {
            continue;
        }

        let mut reader = csv::Reader::from_path(input)?;
        let header_matches = reader
            .headers()?
            .iter()
            .eq(ResultRow::HEADER.iter().copied());
        if !header_matches {
            tracing::warn!("Skipping {}: not a results file", input.display());
            report.files_skipped.push(input.clone());
            continue;
        }

        for row in reader.deserialize::<ResultRow>() {
            let row = row?;
            report.rows_read += 1;
            if seen.insert(row.clone()) {
                merged.push(row);
            }
        }
        report.files_merged += 1;
    }

    let mut writer =
        csv::Writer::from_path(output).map_err(|e| Error::sink_write(output.display().to_string(), e))?;
    writer
        .write_record(ResultRow::HEADER)
        .map_err(|e| Error::sink_write(output.display().to_string(), e))?;
    for row in &merged {
        writer
            .write_record(row.as_record())
            .map_err(|e| Error::sink_write(output.display().to_string(), e))?;
    }
    writer
        .flush()
        .map_err(|e| Error::sink_write(output.display().to_string(), e))?;

    report.rows_written = merged.len();
    tracing::info!(
        "Merged {} file(s) into {}: {} rows, {} duplicates dropped",
        report.files_merged,
        output.display(),
        report.rows_written,
        report.duplicates_dropped()
    );
    Ok(report)
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}
