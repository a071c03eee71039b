use std::fs::File;
use std::path::Path;

use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::{ParquetRecordBatchReader, ParquetRecordBatchReaderBuilder};

use super::IndexError;

/// Decodes one Arrow batch into typed rows
pub(super) type BatchDecoder<T> = fn(&RecordBatch) -> Result<Vec<T>, IndexError>;

/// Streaming scan over one index table in insertion order.
///
/// Only one batch of `batch_size` rows is decoded at a time, so memory use is
/// bounded regardless of the table size.
pub struct TableScan<T> {
    reader: ParquetRecordBatchReader,
    decode: BatchDecoder<T>,
}

impl<T> TableScan<T> {
    pub(super) fn open(
        path: &Path,
        batch_size: usize,
        decode: BatchDecoder<T>,
    ) -> Result<Self, IndexError> {
        let file = File::open(path)?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)?
            .with_batch_size(batch_size.max(1))
            .build()?;
        Ok(Self { reader, decode })
    }
}

impl<T> Iterator for TableScan<T> {
    type Item = Result<Vec<T>, IndexError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.reader.next().map(|batch| {
            let batch = batch?;
            (self.decode)(&batch)
        })
    }
}
