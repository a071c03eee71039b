//! # Columnar Writer
//!
//! Buffers output records and flushes them to Parquet files.
//!
//! ## Design Principles
//!
//! 1. **Atomic files**: every file is written under a hidden temporary name
//!    and renamed on success; a failed or abandoned write leaves no file a
//!    reader could mistake for complete.
//!
//! 2. **Shapes**: PSM, feature and protein group outputs are each a
//!    [`RecordShape`] with its own schema and partition fields.
//!
//! 3. **Partitioning**: with partition fields, each distinct value tuple goes
//!    to its own `field=value/...` directory of `part-{n}.parquet` files.
//!    Partitions are disjoint and together hold every row exactly once; the
//!    number of files open at once is capped.
//!
//! 4. **Self-describing files**: the footer's key/value metadata records the
//!    layout version, record kind, source file and creation time.

mod arrays;
mod config;
mod error;
mod naming;
mod partition;
mod record_writer;
pub mod schema;
mod stats;

#[cfg(test)]
mod tests;

pub use config::{CompressionType, WriterConfig};
pub use error::WriterError;
pub use naming::{footer_metadata, metadata_keys, OutputNamer, OUTPUT_FORMAT_VERSION};
pub use partition::{
    output_files, partition_file, partition_segment, read_output, write, PartitionedWriter,
    RecordSink, EMPTY_PARTITION, NULL_PARTITION, PARTITION_FILE,
};
pub use record_writer::RecordWriter;
pub use schema::{FeatureShape, ProteinGroupShape, PsmShape, RecordKind, RecordShape};
pub use stats::WriterStats;
