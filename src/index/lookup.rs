//! Filtered lookups over the PSM table
//!
//! Each row group is read independently with a Parquet row filter on the
//! lookup column. Row groups run on the index's thread pool; results are
//! collected in row-group order so callers observe insertion order.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{Array, BooleanArray, StringArray};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::{ArrowPredicateFn, ParquetRecordBatchReaderBuilder, RowFilter};
use parquet::arrow::ProjectionMask;
use rayon::prelude::*;
use rayon::ThreadPool;

use crate::mztab::IdentificationRecord;

use super::schema::batch_to_psms;
use super::IndexError;

/// How a lookup value is compared with the filtered column
#[derive(Debug, Clone)]
pub(super) enum Match {
    /// Column equals the value
    Exact(String),
    /// `;`-joined column contains the value as one element
    Member(String),
}

impl Match {
    fn matches(&self, cell: &str) -> bool {
        match self {
            Match::Exact(value) => cell == value,
            Match::Member(value) => cell.split(';').any(|a| a == value),
        }
    }
}

/// Filter the PSM table on one Utf8 column
pub(super) fn filter_psms(
    path: &Path,
    column: &str,
    matcher: Match,
    batch_size: usize,
    pool: &ThreadPool,
) -> Result<Vec<IdentificationRecord>, IndexError> {
    let file = File::open(path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    let num_row_groups = builder.metadata().num_row_groups();
    let column_index = builder
        .schema()
        .index_of(column)
        .map_err(|_| IndexError::ColumnNotFound(column.to_string()))?;
    drop(builder);

    let matcher = Arc::new(matcher);
    let per_group: Vec<Vec<IdentificationRecord>> = pool.install(|| {
        (0..num_row_groups)
            .into_par_iter()
            .map(|row_group| {
                read_row_group(path, row_group, column_index, Arc::clone(&matcher), batch_size)
            })
            .collect::<Result<Vec<_>, IndexError>>()
    })?;

    Ok(per_group.into_iter().flatten().collect())
}

fn read_row_group(
    path: &Path,
    row_group: usize,
    column_index: usize,
    matcher: Arc<Match>,
    batch_size: usize,
) -> Result<Vec<IdentificationRecord>, IndexError> {
    let file = File::open(path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    let mask = ProjectionMask::leaves(builder.parquet_schema(), [column_index]);

    let predicate = ArrowPredicateFn::new(mask, move |batch: RecordBatch| {
        let cells = batch
            .column(0)
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| ArrowError::CastError("lookup column is not Utf8".to_string()))?;
        Ok(cells
            .iter()
            .map(|cell| Some(cell.is_some_and(|c| matcher.matches(c))))
            .collect::<BooleanArray>())
    });

    let reader = builder
        .with_row_groups(vec![row_group])
        .with_row_filter(RowFilter::new(vec![Box::new(predicate)]))
        .with_batch_size(batch_size.max(1))
        .build()?;

    let mut records = Vec::new();
    for batch in reader {
        let batch = batch?;
        if batch.num_rows() > 0 {
            records.extend(batch_to_psms(&batch)?);
        }
    }
    Ok(records)
}
