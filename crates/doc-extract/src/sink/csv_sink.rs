//! CSV file sink
//!
//! Rows are appended to one file. The header goes into the file when it is
//! prepared empty, so rerunning against the same path keeps appending.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use super::ResultSink;
use crate::error::{Error, Result};
use crate::types::ResultRow;

/// A durable, truncatable append target
trait AppendTarget: Write {
    fn current_len(&self) -> io::Result<u64>;
    fn truncate_to(&mut self, len: u64) -> io::Result<()>;
    fn sync(&mut self) -> io::Result<()>;
}

impl AppendTarget for File {
    fn current_len(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }

    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }
}

/// Write `bytes` completely and sync, or cut the target back to its prior length
fn append_all_or_nothing<T: AppendTarget>(target: &mut T, bytes: &[u8]) -> io::Result<()> {
    let before = target.current_len()?;
    let written = target
        .write_all(bytes)
        .and_then(|_| target.flush())
        .and_then(|_| target.sync());

    if let Err(err) = written {
        if let Err(rollback) = target.truncate_to(before).and_then(|_| target.sync()) {
            tracing::error!("Could not remove partial row ({}); output may be corrupt", rollback);
        }
        return Err(err);
    }
    Ok(())
}

fn encode_record(record: [&str; 2]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(record)?;
    writer
        .into_inner()
        .map_err(|e| Error::internal(format!("CSV buffer: {}", e)))
}

/// Appends result rows to a CSV file, flushing each one to disk
pub struct CsvFileSink {
    path: PathBuf,
    file: Option<File>,
    rows_written: usize,
}

impl CsvFileSink {
    /// Create a sink for `path`; the file itself is opened by [`ResultSink::prepare`]
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        if !parent.is_dir() {
            return Err(Error::Config(format!(
                "Output directory {} does not exist",
                parent.display()
            )));
        }

        Ok(Self {
            path,
            file: None,
            rows_written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ResultSink for CsvFileSink {
    fn prepare(&mut self) -> Result<()> {
        if self.file.is_some() {
            return Ok(());
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| Error::sink_write(self.destination(), e))?;
        let existing = file
            .metadata()
            .map_err(|e| Error::sink_write(self.destination(), e))?
            .len();

        if existing == 0 {
            let header = encode_record(ResultRow::HEADER)?;
            append_all_or_nothing(&mut file, &header)
                .map_err(|e| Error::sink_write(self.destination(), e))?;
        }
        self.file = Some(file);

        tracing::info!(
            "Writing results to {}{}",
            self.path.display(),
            if existing > 0 { " (appending)" } else { "" }
        );
        Ok(())
    }

    fn append(&mut self, row: &ResultRow) -> Result<()> {
        self.prepare()?;
        let bytes = encode_record(row.as_record())?;
        let destination = self.destination();

        let file = self
            .file
            .as_mut()
            .ok_or_else(|| Error::sink_write(&destination, "sink not open"))?;
        append_all_or_nothing(file, &bytes).map_err(|e| Error::sink_write(&destination, e))?;

        self.rows_written += 1;
        Ok(())
    }

    fn destination(&self) -> String {
        self.path.display().to_string()
    }

    fn rows_written(&self) -> usize {
        self.rows_written
    }
}
