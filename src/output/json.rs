//! JSON output writer
//!
//! Records are written to a temporary sibling file and renamed into place on
//! [`finish`](RecordsWriter::finish), so the destination either holds the complete
//! result or is left untouched.

use crate::Record;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::{OutputError, OutputResult, RecordFormat, RecordsWriter};

const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Writes records as a JSON array or JSON Lines
pub struct JsonRecordsWriter {
    writer: Option<BufWriter<File>>,
    temp_path: PathBuf,
    final_path: PathBuf,
    format: RecordFormat,
    records_written: u64,
}

impl JsonRecordsWriter {
    /// Create a writer targeting `path`
    ///
    /// Parent directories are created as needed. The destination is not touched
    /// until [`finish`](RecordsWriter::finish).
    pub fn new<P: AsRef<Path>>(path: P, format: RecordFormat) -> OutputResult<Self> {
        let final_path = path.as_ref().to_path_buf();
        info!("Creating {} writer: path={}", format, final_path.display());

        if let Some(parent) = final_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    OutputError::IoError(format!("Failed to create directory: {e}"))
                })?;
            }
        }

        let temp_path = Self::temp_path(&final_path);
        let file = File::create(&temp_path)
            .map_err(|e| OutputError::IoError(format!("Failed to create file: {e}")))?;

        Ok(Self {
            writer: Some(BufWriter::with_capacity(DEFAULT_BUFFER_SIZE, file)),
            temp_path,
            final_path,
            format,
            records_written: 0,
        })
    }

    /// Number of records written so far
    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    /// Destination path
    pub fn path(&self) -> &Path {
        &self.final_path
    }

    fn temp_path(final_path: &Path) -> PathBuf {
        let mut name = final_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "records".into());
        name.push(".partial");
        final_path.with_file_name(name)
    }

    fn writer(&mut self) -> OutputResult<&mut BufWriter<File>> {
        self.writer
            .as_mut()
            .ok_or_else(|| OutputError::IoError("writer already finished".to_string()))
    }
}

impl RecordsWriter for JsonRecordsWriter {
    fn write_records(&mut self, records: &[Record]) -> OutputResult<()> {
        let format = self.format;
        let writer = self.writer()?;

        match format {
            RecordFormat::Json => {
                serde_json::to_writer_pretty(&mut *writer, records).map_err(|e| {
                    OutputError::SerializationError(format!("Failed to write records: {e}"))
                })?;
                writeln!(writer).map_err(|e| OutputError::IoError(e.to_string()))?;
            }
            RecordFormat::JsonLines => {
                for record in records {
                    serde_json::to_writer(&mut *writer, record).map_err(|e| {
                        OutputError::SerializationError(format!("Failed to write record: {e}"))
                    })?;
                    writeln!(writer).map_err(|e| OutputError::IoError(e.to_string()))?;
                }
            }
        }

        self.records_written += records.len() as u64;
        debug!("{} records written", self.records_written);
        Ok(())
    }

    fn finish(mut self) -> OutputResult<()> {
        let writer = self
            .writer
            .take()
            .ok_or_else(|| OutputError::IoError("writer already finished".to_string()))?;

        let file = writer
            .into_inner()
            .map_err(|e| OutputError::IoError(format!("Failed to flush: {e}")))?;
        file.sync_all()
            .map_err(|e| OutputError::IoError(format!("Failed to sync file: {e}")))?;
        drop(file);

        if let Err(e) = fs::rename(&self.temp_path, &self.final_path) {
            let _ = fs::remove_file(&self.temp_path);
            return Err(OutputError::IoError(format!(
                "Failed to move output into place: {e}"
            )));
        }

        info!(
            "Wrote {} records to {}",
            self.records_written,
            self.final_path.display()
        );
        Ok(())
    }
}

impl Drop for JsonRecordsWriter {
    fn drop(&mut self) {
        // Unfinished writers leave no partial file behind.
        if self.writer.take().is_some() {
            let _ = fs::remove_file(&self.temp_path);
        }
    }
}
