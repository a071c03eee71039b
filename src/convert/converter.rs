use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::info;

use crate::aggregate::{Aggregator, FastaDigestCounter, TheoreticalPeptideCounter};
use crate::index::{BuildOptions, Index};
use crate::loaders::{QuantMap, SampleMap};
use crate::transform::{
    transform, ConfidencePolicy, JoinTransform, TransformStats, UnifiedFeatureRecord,
};
use crate::writer::{
    footer_metadata, FeatureShape, OutputNamer, ProteinGroupShape, PsmShape, RecordKind,
    RecordShape, RecordSink, WriterStats,
};

use super::{ConversionConfig, ConversionError};

/// Whether to build a fresh index or attach to an existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexMode {
    /// Parse the source and build a new store
    Build {
        /// Replace an existing non-empty store
        overwrite: bool,
    },
    /// Open a previously built store without re-parsing
    Reuse,
}

/// Statistics from one output conversion
#[derive(Debug, Clone)]
pub struct ConversionStats {
    /// Kind of output written
    pub kind: RecordKind,
    /// Output file or partition directory
    pub output: PathBuf,
    /// Join-transform counters
    pub transform: TransformStats,
    /// Protein groups emitted (protein group output only)
    pub protein_groups: Option<usize>,
    /// Writer counters
    pub writer: WriterStats,
    /// Wall time of the conversion
    pub elapsed: Duration,
}

impl fmt::Display for ConversionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} output {}: {}; {}",
            self.kind,
            self.output.display(),
            self.transform,
            self.writer
        )
    }
}

/// Drives one input through index, join and aggregation into output files.
///
/// One converter produces every output kind for an input; all of them share
/// the namer's uniqueness token.
pub struct Converter {
    config: ConversionConfig,
    namer: OutputNamer,
    cancel: Option<Arc<AtomicBool>>,
}

impl Converter {
    /// Create a converter with a fresh output token
    pub fn new(config: ConversionConfig) -> Self {
        let namer = OutputNamer::new(config.output_prefix.clone());
        Self {
            config,
            namer,
            cancel: None,
        }
    }

    /// Use a specific output namer
    pub fn with_namer(mut self, namer: OutputNamer) -> Self {
        self.namer = namer;
        self
    }

    /// Stop at the next batch boundary once `flag` is set
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Conversion settings
    pub fn config(&self) -> &ConversionConfig {
        &self.config
    }

    /// Output namer
    pub fn namer(&self) -> &OutputNamer {
        &self.namer
    }

    /// Build or open the index for an input.
    ///
    /// `source` is required for [`IndexMode::Build`] and ignored for
    /// [`IndexMode::Reuse`].
    pub fn prepare_index(
        &self,
        source: Option<&Path>,
        index_dir: &Path,
        mode: IndexMode,
    ) -> Result<Index, ConversionError> {
        match mode {
            IndexMode::Build { overwrite } => {
                let source = source.ok_or_else(|| {
                    ConversionError::Config("building an index needs an mzTab file".to_string())
                })?;
                info!("Indexing {} into {}", source.display(), index_dir.display());
                let options = BuildOptions {
                    overwrite,
                    parse_policy: self.config.parse_policy,
                    source_file: None,
                };
                Ok(Index::build_from_file(
                    source,
                    index_dir,
                    &options,
                    self.config.index.clone(),
                )?)
            }
            IndexMode::Reuse => Ok(Index::open(index_dir, self.config.index.clone())?),
        }
    }

    /// Load an MSstats-style quantification table
    pub fn load_quant(&self, path: &Path) -> Result<QuantMap, ConversionError> {
        QuantMap::load(path).map_err(ConversionError::LoadQuant)
    }

    /// Load an SDRF sample sheet
    pub fn load_samples(&self, path: &Path) -> Result<SampleMap, ConversionError> {
        SampleMap::load(path).map_err(ConversionError::LoadSamples)
    }

    /// Digest a FASTA database for iBAQ
    pub fn load_fasta(&self, path: &Path) -> Result<FastaDigestCounter, ConversionError> {
        Ok(FastaDigestCounter::from_fasta(path, &self.config.digest)?)
    }

    /// Write the PSM output of `index` into `output_dir`
    pub fn convert_psms(
        &self,
        index: &Index,
        output_dir: &Path,
    ) -> Result<ConversionStats, ConversionError> {
        let started = Instant::now();
        let quant = QuantMap::empty();
        let policy = self.config.policy();
        let mut batches = transform(index, &quant, None, self.config.batch_size, &policy)?;
        let mut sink = self.sink(PsmShape, index, output_dir, HashMap::new())?;

        while let Some(batch) = self.next_batch(&mut batches)? {
            sink.write_all(batch.into_iter().map(|r| r.identification))?;
        }

        let transform = batches.stats().clone();
        self.finish(sink, PsmShape.kind(), output_dir, transform, None, started)
    }

    /// Write the feature output: identifications joined with quantification
    /// and samples
    pub fn convert_features(
        &self,
        index: &Index,
        quant: &QuantMap,
        samples: Option<&SampleMap>,
        output_dir: &Path,
    ) -> Result<ConversionStats, ConversionError> {
        let started = Instant::now();
        let policy = self.config.policy();
        let mut batches = transform(index, quant, samples, self.config.batch_size, &policy)?;
        let mut sink = self.sink(FeatureShape, index, output_dir, HashMap::new())?;

        while let Some(batch) = self.next_batch(&mut batches)? {
            sink.write_all(batch)?;
        }

        let transform = batches.stats().clone();
        self.finish(sink, FeatureShape.kind(), output_dir, transform, None, started)
    }

    /// Aggregate features per (protein group, sample) and write the protein
    /// group output. iBAQ needs `counter` when enabled.
    pub fn convert_protein_groups(
        &self,
        index: &Index,
        quant: &QuantMap,
        samples: &SampleMap,
        counter: Option<&dyn TheoreticalPeptideCounter>,
        output_dir: &Path,
    ) -> Result<ConversionStats, ConversionError> {
        let started = Instant::now();
        let aggregation = &self.config.aggregation;
        let mut aggregator =
            Aggregator::new(aggregation.clone(), self.config.quant_mode, counter)?
                .with_descriptions(index.protein_descriptions()?);

        let policy = self.config.policy();
        let mut batches = transform(index, quant, Some(samples), self.config.batch_size, &policy)?;
        while let Some(batch) = self.next_batch(&mut batches)? {
            aggregator.push_batch(&batch)?;
        }
        let transform = batches.stats().clone();

        let groups = aggregator.finish();
        info!("Aggregated {} protein group/sample pairs", groups.len());
        let group_count = groups.len();

        let mut extra = HashMap::new();
        extra.insert(
            "qpx:quant_mode".to_string(),
            self.config.quant_mode.as_str().to_string(),
        );
        extra.insert("qpx:topn".to_string(), aggregation.topn.to_string());
        extra.insert(
            "qpx:topn_enabled".to_string(),
            aggregation.topn_enabled.to_string(),
        );
        extra.insert(
            "qpx:ibaq_enabled".to_string(),
            aggregation.ibaq_enabled.to_string(),
        );

        let mut sink = self.sink(ProteinGroupShape, index, output_dir, extra)?;
        sink.write_all(groups)?;
        self.finish(
            sink,
            ProteinGroupShape.kind(),
            output_dir,
            transform,
            Some(group_count),
            started,
        )
    }

    fn sink<S: RecordShape + Clone>(
        &self,
        shape: S,
        index: &Index,
        output_dir: &Path,
        extra: HashMap<String, String>,
    ) -> Result<RecordSink<S>, ConversionError> {
        let kind = shape.kind();
        let fields = &self.config.partition_fields;
        shape.check_partition_fields(fields)?;

        let source = index.manifest().source_file.as_deref().map(Path::new);
        let mut metadata = footer_metadata(kind, source);
        metadata.insert(
            "qpx:confidence".to_string(),
            self.config.policy().describe(),
        );
        metadata.extend(extra);

        let destination = self.namer.destination(output_dir, kind, !fields.is_empty());
        info!("Writing {} output to {}", kind, destination.display());
        Ok(RecordSink::create(
            destination,
            shape,
            fields,
            &self.config.writer,
            &metadata,
        )?)
    }

    fn next_batch(
        &self,
        batches: &mut JoinTransform<'_>,
    ) -> Result<Option<Vec<UnifiedFeatureRecord>>, ConversionError> {
        if self
            .cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
        {
            return Err(ConversionError::Cancelled { stage: "transform" });
        }
        Ok(batches.next().transpose()?)
    }

    fn finish<S: RecordShape + Clone>(
        &self,
        sink: RecordSink<S>,
        kind: RecordKind,
        output_dir: &Path,
        transform: TransformStats,
        protein_groups: Option<usize>,
        started: Instant,
    ) -> Result<ConversionStats, ConversionError> {
        let writer = sink.finish()?;
        let stats = ConversionStats {
            kind,
            output: self
                .namer
                .destination(output_dir, kind, !self.config.partition_fields.is_empty()),
            transform,
            protein_groups,
            writer,
            elapsed: started.elapsed(),
        };
        info!("{}", stats);
        Ok(stats)
    }
}
