use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use qpx::aggregate::QuantMode;
use qpx::convert::{ConfidenceThreshold, ConversionConfig};
use qpx::mztab::ParsePolicy;
use qpx::writer::CompressionType;

mod config;
mod convert;
mod index;
mod info;
mod profile;

pub use config::Config;
pub use profile::Profile;

/// qpx - mzTab and MSstats results to QPX Parquet tables
#[derive(Parser)]
#[command(name = "qpx-convert")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Verbosity level (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Conversion profile for optimizing speed vs compression.
#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum ProfileArg {
    /// Prioritize speed over compression
    Fast,
    /// Balance between speed and compression
    #[default]
    Balanced,
    /// Maximum compression, slower conversion
    MaxCompression,
    /// Small batches and a single index thread
    LowMemory,
}

impl From<ProfileArg> for Profile {
    fn from(arg: ProfileArg) -> Self {
        match arg {
            ProfileArg::Fast => Profile::Fast,
            ProfileArg::Balanced => Profile::Balanced,
            ProfileArg::MaxCompression => Profile::MaxCompression,
            ProfileArg::LowMemory => Profile::LowMemory,
        }
    }
}

/// Quantification strategy flag.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum QuantModeArg {
    /// One sample per run
    LabelFree,
    /// Several labeled channels per run (TMT, iTRAQ, SILAC)
    Labeled,
}

impl From<QuantModeArg> for QuantMode {
    fn from(arg: QuantModeArg) -> Self {
        match arg {
            QuantModeArg::LabelFree => QuantMode::LabelFree,
            QuantModeArg::Labeled => QuantMode::Labeled,
        }
    }
}

/// Settings shared by every subcommand that converts or indexes.
#[derive(Args, Debug, Default)]
pub struct SettingsArgs {
    /// Conversion profile
    #[arg(short = 'p', long, value_enum)]
    profile: Option<ProfileArg>,

    /// Load settings from a TOML config file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Skip malformed mzTab rows instead of aborting
    #[arg(long)]
    skip_malformed: bool,

    /// Index lookup threads (0 = one per core)
    #[arg(long, hide = true)]
    threads: Option<usize>,

    /// Index build memory ceiling in MiB
    #[arg(long, hide = true)]
    memory_limit_mb: Option<usize>,

    /// Records per transform batch
    #[arg(short = 'b', long, hide = true)]
    batch_size: Option<usize>,

    /// ZSTD compression level (1-22)
    #[arg(short = 'c', long, hide = true)]
    compression_level: Option<i32>,

    /// Rows per Parquet row group
    #[arg(short = 'r', long, hide = true)]
    row_group_size: Option<usize>,
}

impl SettingsArgs {
    /// Profile, then config file, then flags
    pub fn resolve(&self) -> Result<ConversionConfig> {
        let mut config = Profile::from(self.profile.unwrap_or_default()).config();
        if let Some(path) = &self.config {
            Config::from_file(path)?.apply(&mut config);
        }
        if self.skip_malformed {
            config.parse_policy = ParsePolicy::Skip;
        }
        if let Some(threads) = self.threads {
            config.index.threads = threads;
        }
        if let Some(mb) = self.memory_limit_mb {
            config.index.memory_limit_bytes = mb * 1024 * 1024;
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(level) = self.compression_level {
            config.writer.compression = CompressionType::Zstd(level);
        }
        if let Some(rows) = self.row_group_size {
            config.writer.row_group_size = rows;
        }
        if config.batch_size == 0 {
            anyhow::bail!("batch size must be positive");
        }
        Ok(config)
    }
}

/// Where identifications come from: an mzTab file, an existing index, or both.
#[derive(Args, Debug)]
pub struct InputArgs {
    /// mzTab file (optionally gzip-compressed); indexed before converting
    #[arg(short = 'm', long, value_name = "MZTAB")]
    mztab: Option<PathBuf>,

    /// Index directory. Reused when no mzTab is given; temporary when omitted.
    #[arg(short = 'i', long, value_name = "DIR")]
    index: Option<PathBuf>,

    /// Rebuild the index if it already exists
    #[arg(long)]
    overwrite: bool,
}

/// Output and filtering flags of the conversion subcommands.
#[derive(Args, Debug)]
pub struct OutputArgs {
    /// Output directory
    #[arg(short = 'o', long, value_name = "DIR", default_value = ".")]
    output_dir: PathBuf,

    /// Output file name prefix
    #[arg(long)]
    prefix: Option<String>,

    /// Partition output by these fields (repeatable)
    #[arg(long = "partition-by", value_name = "FIELD")]
    partition_by: Vec<String>,

    /// Keep matches with q-value at or below this
    #[arg(long, conflicts_with = "pep")]
    q_value: Option<f64>,

    /// Keep matches with posterior error probability at or below this
    #[arg(long)]
    pep: Option<f64>,

    /// Keep decoy matches
    #[arg(long)]
    include_decoys: bool,
}

impl OutputArgs {
    fn apply(&self, config: &mut ConversionConfig) {
        if let Some(prefix) = &self.prefix {
            config.output_prefix = prefix.clone();
        }
        if !self.partition_by.is_empty() {
            config.partition_fields = self.partition_by.clone();
        }
        if let Some(q) = self.q_value {
            config.confidence = ConfidenceThreshold::QValue(q);
        }
        if let Some(pep) = self.pep {
            config.confidence = ConfidenceThreshold::Pep(pep);
        }
        if self.include_decoys {
            config.include_decoys = true;
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Parse an mzTab file into a persistent index
    Index {
        /// Input mzTab file
        #[arg(value_name = "MZTAB")]
        input: PathBuf,

        /// Index directory (defaults to <input>.qpx-index)
        #[arg(value_name = "DIR")]
        index: Option<PathBuf>,

        /// Replace an existing index
        #[arg(long)]
        overwrite: bool,

        #[command(flatten)]
        settings: SettingsArgs,
    },

    /// Write the PSM table
    Psm {
        #[command(flatten)]
        input: InputArgs,

        #[command(flatten)]
        output: OutputArgs,

        #[command(flatten)]
        settings: SettingsArgs,
    },

    /// Write the feature table: PSMs joined with quantification and samples
    Feature {
        #[command(flatten)]
        input: InputArgs,

        /// MSstats-style quantification table
        #[arg(short = 'q', long, value_name = "FILE")]
        quant: PathBuf,

        /// SDRF sample sheet; sample columns stay null without it
        #[arg(short = 's', long, value_name = "FILE")]
        sdrf: Option<PathBuf>,

        #[command(flatten)]
        output: OutputArgs,

        #[command(flatten)]
        settings: SettingsArgs,
    },

    /// Write the protein group table with TopN and iBAQ intensities
    ProteinGroups {
        #[command(flatten)]
        input: InputArgs,

        /// MSstats-style quantification table
        #[arg(short = 'q', long, value_name = "FILE")]
        quant: PathBuf,

        /// SDRF sample sheet
        #[arg(short = 's', long, value_name = "FILE")]
        sdrf: PathBuf,

        /// Protein database for iBAQ theoretical peptide counts
        #[arg(short = 'f', long, value_name = "FILE")]
        fasta: Option<PathBuf>,

        /// Quantification strategy
        #[arg(long, value_enum)]
        quant_mode: Option<QuantModeArg>,

        /// Peptides averaged for TopN
        #[arg(long)]
        topn: Option<usize>,

        /// Do not compute TopN
        #[arg(long)]
        no_topn: bool,

        /// Do not compute iBAQ
        #[arg(long)]
        no_ibaq: bool,

        #[command(flatten)]
        output: OutputArgs,

        #[command(flatten)]
        settings: SettingsArgs,
    },

    /// Display information about a QPX output or an index
    Info {
        /// Output file, partition directory or index directory
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },
}

impl Cli {
    pub fn verbosity(&self) -> u8 {
        self.verbose
    }
}

pub fn init_logging(verbosity: u8) {
    let log_level = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();
}

pub fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Index {
            input,
            index,
            overwrite,
            settings,
        } => index::run(input, index, overwrite, settings.resolve()?),
        Commands::Psm {
            input,
            output,
            settings,
        } => {
            let mut config = settings.resolve()?;
            output.apply(&mut config);
            convert::psm(input, output.output_dir, config)
        }
        Commands::Feature {
            input,
            quant,
            sdrf,
            output,
            settings,
        } => {
            let mut config = settings.resolve()?;
            output.apply(&mut config);
            convert::feature(input, quant, sdrf, output.output_dir, config)
        }
        Commands::ProteinGroups {
            input,
            quant,
            sdrf,
            fasta,
            quant_mode,
            topn,
            no_topn,
            no_ibaq,
            output,
            settings,
        } => {
            let mut config = settings.resolve()?;
            if let Some(mode) = quant_mode {
                let mode = QuantMode::from(mode);
                config.quant_mode = mode;
                config.aggregation = qpx::aggregate::AggregationConfig::for_mode(mode);
            }
            if let Some(topn) = topn {
                config.aggregation.topn = topn;
            }
            if no_topn {
                config.aggregation.topn_enabled = false;
            }
            if no_ibaq {
                config.aggregation.ibaq_enabled = false;
            }
            output.apply(&mut config);
            convert::protein_groups(input, quant, sdrf, fasta, output.output_dir, config)
        }
        Commands::Info { path } => info::run(path),
    }
}
