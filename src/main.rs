//! # qpx-convert
//!
//! Command-line front end for converting mzTab identifications and MSstats
//! quantification tables into QPX Parquet tables.
//!
//! ## Usage
//!
//! ```bash
//! # Index once, then produce each output from the same index
//! qpx-convert index PXD000001.mzTab.gz PXD000001.index
//! qpx-convert psm --index PXD000001.index -o out/
//! qpx-convert feature --index PXD000001.index -q msstats_in.csv -s PXD000001.sdrf.tsv -o out/
//! qpx-convert protein-groups --index PXD000001.index -q msstats_in.csv \
//!     -s PXD000001.sdrf.tsv -f uniprot_human.fasta -o out/
//!
//! # Inspect a result
//! qpx-convert info out/qpx-<token>.pg.parquet
//! ```

use anyhow::Result;
use clap::Parser;

mod cli;

use cli::Cli;

fn main() -> Result<()> {
    let cli = Cli::parse();
    cli::init_logging(cli.verbosity());
    cli::dispatch(cli)
}
