use std::collections::HashMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use arrow::record_batch::RecordBatch;
use log::{debug, info};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use tempfile::TempDir;

use super::config::WriterConfig;
use super::error::WriterError;
use super::record_writer::RecordWriter;
use super::schema::RecordShape;
use super::stats::WriterStats;

/// Directory value used for null partition values
pub const NULL_PARTITION: &str = "__null__";

/// Directory value used for empty-string partition values
pub const EMPTY_PARTITION: &str = "__empty__";

/// File name of each partition's first data file
pub const PARTITION_FILE: &str = "part-0.parquet";

/// File name of a partition's `part`-th data file; a partition gets another
/// file each time it is reopened after being closed
pub fn partition_file(part: usize) -> String {
    format!("part-{}.parquet", part)
}

/// Hive-style `field=value` directory name.
///
/// Bytes outside `[A-Za-z0-9._-]` are percent-encoded so any value maps to
/// one safe path segment. Values spelled like a sentinel get their leading
/// `_` encoded, so they never share a directory with null or empty values.
pub fn partition_segment(field: &str, value: Option<&str>) -> String {
    let value = match value {
        None => NULL_PARTITION.to_string(),
        Some(value) => {
            let mut encoded = String::with_capacity(value.len());
            for byte in value.bytes() {
                match byte {
                    b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'.' | b'_' | b'-' => {
                        encoded.push(byte as char)
                    }
                    _ => encoded.push_str(&format!("%{:02X}", byte)),
                }
            }
            if encoded.is_empty() {
                EMPTY_PARTITION.to_string()
            } else if encoded == "." || encoded == ".." {
                encoded.replace('.', "%2E")
            } else if encoded == NULL_PARTITION || encoded == EMPTY_PARTITION {
                format!("%5F{}", &encoded[1..])
            } else {
                encoded
            }
        }
    };
    format!("{}={}", field, value)
}

/// An open partition file and the write tick it was last used at
struct OpenPartition<S: RecordShape> {
    writer: RecordWriter<S>,
    last_used: u64,
}

/// Writes each distinct tuple of partition values to its own directory.
///
/// Files are built in a hidden staging directory next to the destination,
/// which is renamed into place by [`finish`](Self::finish); an unfinished
/// writer leaves nothing at the destination.
///
/// At most [`WriterConfig::max_open_partitions`] files are open at once. When
/// another partition needs a file, the least recently written one is
/// finished, and a later row for it starts that partition's next
/// `part-{n}.parquet`.
pub struct PartitionedWriter<S: RecordShape + Clone> {
    // Dropped before `staging`, so open files are gone before the directory
    open: HashMap<Vec<Option<String>>, OpenPartition<S>>,
    next_part: HashMap<Vec<Option<String>>, usize>,
    closed: WriterStats,
    tick: u64,
    max_open: usize,
    shape: S,
    fields: Vec<String>,
    config: WriterConfig,
    metadata: HashMap<String, String>,
    staging: TempDir,
    destination: PathBuf,
}

impl<S: RecordShape + Clone> PartitionedWriter<S> {
    /// Create a writer rooted at the `destination` directory
    pub fn create<P: AsRef<Path>>(
        destination: P,
        shape: S,
        fields: Vec<String>,
        config: &WriterConfig,
        metadata: &HashMap<String, String>,
    ) -> Result<Self, WriterError> {
        shape.check_partition_fields(&fields)?;
        if fields.is_empty() {
            return Err(WriterError::InvalidData(
                "partitioned output needs at least one field".to_string(),
            ));
        }
        let destination = destination.as_ref().to_path_buf();
        if destination.exists() {
            return Err(WriterError::AlreadyExists(destination));
        }
        let parent = match destination.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)?;
        let staging = tempfile::Builder::new().prefix(".qpx-").tempdir_in(&parent)?;

        Ok(Self {
            open: HashMap::new(),
            next_part: HashMap::new(),
            closed: WriterStats::default(),
            tick: 0,
            max_open: config.max_open_partitions.max(1),
            shape,
            fields,
            config: config.clone(),
            metadata: metadata.clone(),
            staging,
            destination,
        })
    }

    /// Route one record to its partition
    pub fn write(&mut self, record: S::Record) -> Result<(), WriterError> {
        let key: Vec<Option<String>> = self
            .fields
            .iter()
            .map(|field| self.shape.partition_value(&record, field))
            .collect();
        self.tick += 1;

        if !self.open.contains_key(&key) {
            if self.open.len() >= self.max_open {
                self.close_least_recent()?;
            }
            let part = {
                let next = self.next_part.entry(key.clone()).or_insert(0);
                *next += 1;
                *next - 1
            };
            let mut path = self.staging.path().to_path_buf();
            for (field, value) in self.fields.iter().zip(&key) {
                path.push(partition_segment(field, value.as_deref()));
            }
            path.push(partition_file(part));
            debug!("Opening partition {}", path.display());
            let writer =
                RecordWriter::create(&path, self.shape.clone(), &self.config, &self.metadata)?;
            self.open.insert(
                key.clone(),
                OpenPartition {
                    writer,
                    last_used: self.tick,
                },
            );
        }
        match self.open.get_mut(&key) {
            Some(partition) => {
                partition.last_used = self.tick;
                partition.writer.write(record)
            }
            None => Err(WriterError::InvalidData("partition writer vanished".to_string())),
        }
    }

    /// Finish the open partition file written longest ago
    fn close_least_recent(&mut self) -> Result<(), WriterError> {
        let oldest = self
            .open
            .iter()
            .min_by_key(|(_, partition)| partition.last_used)
            .map(|(key, _)| key.clone());
        if let Some(partition) = oldest.and_then(|key| self.open.remove(&key)) {
            debug!("Closing least recently written partition file (limit {})", self.max_open);
            self.closed.merge(partition.writer.finish()?);
        }
        Ok(())
    }

    /// Route a batch of records
    pub fn write_all(
        &mut self,
        records: impl IntoIterator<Item = S::Record>,
    ) -> Result<(), WriterError> {
        for record in records {
            self.write(record)?;
        }
        Ok(())
    }

    /// Number of distinct partitions seen so far
    pub fn partition_count(&self) -> usize {
        self.next_part.len()
    }

    /// Number of partition files currently open
    pub fn open_files(&self) -> usize {
        self.open.len()
    }

    /// Finish every partition file and move the directory into place
    pub fn finish(self) -> Result<WriterStats, WriterError> {
        let mut stats = self.closed;
        for (_, partition) in self.open {
            stats.merge(partition.writer.finish()?);
        }

        let staging = self.staging.path().to_path_buf();
        fs::rename(&staging, &self.destination)?;
        // Staging is gone; report paths at their final location
        let mut files: Vec<PathBuf> = stats
            .files
            .into_iter()
            .map(|file| match file.strip_prefix(&staging) {
                Ok(relative) => self.destination.join(relative),
                Err(_) => file,
            })
            .collect();
        files.sort();
        stats.files = files;
        info!(
            "Wrote {} partitions in {} files under {}",
            self.next_part.len(),
            stats.files.len(),
            self.destination.display()
        );
        Ok(stats)
    }
}

/// Single-file or partitioned output behind one interface
pub enum RecordSink<S: RecordShape + Clone> {
    /// One file
    File(RecordWriter<S>),
    /// One file per partition
    Partitioned(PartitionedWriter<S>),
}

impl<S: RecordShape + Clone> RecordSink<S> {
    /// A partitioned sink when `partition_fields` is non-empty, a file otherwise
    pub fn create<P: AsRef<Path>>(
        destination: P,
        shape: S,
        partition_fields: &[String],
        config: &WriterConfig,
        metadata: &HashMap<String, String>,
    ) -> Result<Self, WriterError> {
        if partition_fields.is_empty() {
            Ok(Self::File(RecordWriter::create(destination, shape, config, metadata)?))
        } else {
            Ok(Self::Partitioned(PartitionedWriter::create(
                destination,
                shape,
                partition_fields.to_vec(),
                config,
                metadata,
            )?))
        }
    }

    /// Write one record
    pub fn write(&mut self, record: S::Record) -> Result<(), WriterError> {
        match self {
            Self::File(writer) => writer.write(record),
            Self::Partitioned(writer) => writer.write(record),
        }
    }

    /// Write a batch of records
    pub fn write_all(
        &mut self,
        records: impl IntoIterator<Item = S::Record>,
    ) -> Result<(), WriterError> {
        match self {
            Self::File(writer) => writer.write_all(records),
            Self::Partitioned(writer) => writer.write_all(records),
        }
    }

    /// Complete the output
    pub fn finish(self) -> Result<WriterStats, WriterError> {
        match self {
            Self::File(writer) => writer.finish(),
            Self::Partitioned(writer) => writer.finish(),
        }
    }
}

/// Write `records` to `destination`, partitioned by `partition_fields` if any
pub fn write<S: RecordShape + Clone>(
    records: impl IntoIterator<Item = S::Record>,
    destination: &Path,
    partition_fields: &[String],
    shape: S,
    config: &WriterConfig,
    metadata: &HashMap<String, String>,
) -> Result<WriterStats, WriterError> {
    let mut sink = RecordSink::create(destination, shape, partition_fields, config, metadata)?;
    sink.write_all(records)?;
    sink.finish()
}

/// Parquet files of an output: the file itself, or every data file below a
/// partition directory, sorted by path
pub fn output_files(path: &Path) -> Result<Vec<PathBuf>, WriterError> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    let mut files = Vec::new();
    let mut pending = vec![path.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let entry_path = entry.path();
            if entry.file_type()?.is_dir() {
                pending.push(entry_path);
            } else if entry_path.extension().is_some_and(|ext| ext == "parquet") {
                files.push(entry_path);
            }
        }
    }
    files.sort();
    Ok(files)
}

/// Read every batch of an output file or partition directory
pub fn read_output(path: &Path) -> Result<Vec<RecordBatch>, WriterError> {
    let mut batches = Vec::new();
    for file in output_files(path)? {
        let reader = ParquetRecordBatchReaderBuilder::try_new(File::open(&file)?)?.build()?;
        for batch in reader {
            batches.push(batch?);
        }
    }
    Ok(batches)
}
