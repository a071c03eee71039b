use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use parquet::arrow::ArrowWriter;
use tempfile::NamedTempFile;

use super::config::WriterConfig;
use super::error::WriterError;
use super::schema::RecordShape;
use super::stats::WriterStats;

/// Streaming writer for one output file.
///
/// Rows go to a hidden temporary file next to the destination, which is
/// renamed into place by [`finish`](Self::finish). Dropping the writer
/// without finishing deletes the temporary file, so the destination is
/// either absent or complete.
pub struct RecordWriter<S: RecordShape> {
    shape: S,
    writer: ArrowWriter<NamedTempFile>,
    destination: PathBuf,
    buffer: Vec<S::Record>,
    flush_rows: usize,
    rows_written: u64,
}

impl<S: RecordShape> RecordWriter<S> {
    /// Create a writer for `destination`
    pub fn create<P: AsRef<Path>>(
        destination: P,
        shape: S,
        config: &WriterConfig,
        metadata: &HashMap<String, String>,
    ) -> Result<Self, WriterError> {
        let destination = destination.as_ref().to_path_buf();
        if destination.exists() {
            return Err(WriterError::AlreadyExists(destination));
        }
        let dir = match destination.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let tmp = tempfile::Builder::new()
            .prefix(".qpx-")
            .suffix(".tmp")
            .tempfile_in(&dir)?;
        let props = config.to_writer_properties(metadata, shape.float_columns());
        let writer = ArrowWriter::try_new(tmp, shape.schema(), Some(props))?;

        Ok(Self {
            shape,
            writer,
            destination,
            buffer: Vec::new(),
            flush_rows: config.flush_rows.max(1),
            rows_written: 0,
        })
    }

    /// Final path of the file
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Rows accepted so far, including buffered ones
    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// Buffer one record
    pub fn write(&mut self, record: S::Record) -> Result<(), WriterError> {
        self.buffer.push(record);
        self.rows_written += 1;
        if self.buffer.len() >= self.flush_rows {
            self.flush()?;
        }
        Ok(())
    }

    /// Buffer a batch of records
    pub fn write_all(
        &mut self,
        records: impl IntoIterator<Item = S::Record>,
    ) -> Result<(), WriterError> {
        for record in records {
            self.write(record)?;
        }
        Ok(())
    }

    /// Encode buffered records and hand them to the Parquet writer
    pub fn flush(&mut self) -> Result<(), WriterError> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let batch = self.shape.to_batch(&self.buffer)?;
        debug!(
            "Flushing {} {} rows to {}",
            batch.num_rows(),
            self.shape.kind(),
            self.destination.display()
        );
        self.writer.write(&batch)?;
        self.buffer.clear();
        Ok(())
    }

    /// Write the footer and move the file into place
    pub fn finish(mut self) -> Result<WriterStats, WriterError> {
        self.flush()?;
        self.writer.flush()?;
        let row_groups_written = self.writer.flushed_row_groups().len();

        let tmp = self.writer.into_inner()?;
        tmp.as_file().sync_all()?;
        let file_size_bytes = tmp.as_file().metadata()?.len();
        tmp.persist_noclobber(&self.destination)
            .map_err(|e| WriterError::IoError(e.error))?;

        Ok(WriterStats {
            rows_written: self.rows_written,
            row_groups_written,
            file_size_bytes,
            files: vec![self.destination],
        })
    }
}
