//! # mzTab Reader Module
//!
//! Streaming parser for mzTab 1.0 identification files, the tab-separated
//! HUPO-PSI exchange format written by most proteomics search pipelines.
//!
//! ## mzTab Structure
//!
//! ```text
//! MTD  key  value            (metadata, incl. ms_run[n]-location)
//! PRH  column headers        (protein section)
//! PRT  ...
//! PEH  column headers        (peptide section)
//! PEP  ...
//! PSH  column headers        (PSM section)
//! PSM  ...
//! ```
//!
//! Header lines are consumed by the streamer; callers receive typed
//! [`MzTabLine`] values. Malformed rows surface as [`MzTabError::Parse`] with
//! the line number and raw content, and the caller applies its
//! [`ParsePolicy`].

mod error;
mod models;
mod modifications;
mod parser;
mod streamer;


pub use error::MzTabError;
pub use models::*;
pub use modifications::{parse_modifications, unimod_mass};
pub use parser::{ms_run_location_index, psm_columns, resolve_spectra_ref, SectionHeader};
pub use streamer::{open_maybe_gzip, MzTabSource, MzTabStreamer};
