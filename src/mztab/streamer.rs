//! Pull-based streaming reader for mzTab files
//!
//! Lines are read one at a time; only the current line and the section
//! headers are held in memory, so arbitrarily large files stream in constant
//! memory. Gzip input is detected by its magic bytes and decompressed as a
//! stream wrapper.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use flate2::read::MultiGzDecoder;

use super::error::MzTabError;
use super::models::*;
use super::parser::{
    ms_run_location_index, parse_peptide, parse_protein, parse_psm, RowContext, SectionHeader,
};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const READ_BUFFER: usize = 64 * 1024;

/// Boxed line source used by [`MzTabStreamer::open`]
pub type MzTabSource = Box<dyn BufRead + Send>;

/// Streaming parser for mzTab files
///
/// Implements `Iterator<Item = Result<MzTabLine, MzTabError>>`. The sequence is
/// forward-only: once consumed, reading again requires reopening the source.
/// Errors do not end iteration, so the caller decides whether to abort or skip.
pub struct MzTabStreamer<R: BufRead> {
    reader: R,
    buf: String,
    line_number: u64,
    psm_header: Option<SectionHeader>,
    protein_header: Option<SectionHeader>,
    peptide_header: Option<SectionHeader>,
    ms_runs: BTreeMap<u32, String>,
    metadata: BTreeMap<String, String>,
    finished: bool,
}

impl MzTabStreamer<MzTabSource> {
    /// Open an mzTab file, transparently decompressing gzip input
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, MzTabError> {
        let file = File::open(path.as_ref())?;
        Ok(Self::new(open_maybe_gzip(file)?))
    }
}

/// Wrap a reader in a gzip decoder if it starts with the gzip magic bytes
pub fn open_maybe_gzip<R: std::io::Read + Send + 'static>(
    inner: R,
) -> Result<MzTabSource, std::io::Error> {
    let mut reader = BufReader::with_capacity(READ_BUFFER, inner);
    let is_gzip = reader.fill_buf()?.starts_with(&GZIP_MAGIC);
    if is_gzip {
        Ok(Box::new(BufReader::with_capacity(
            READ_BUFFER,
            MultiGzDecoder::new(reader),
        )))
    } else {
        Ok(Box::new(reader))
    }
}

impl<R: BufRead> MzTabStreamer<R> {
    /// Create a streamer over any buffered reader
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: String::with_capacity(4096),
            line_number: 0,
            psm_header: None,
            protein_header: None,
            peptide_header: None,
            ms_runs: BTreeMap::new(),
            metadata: BTreeMap::new(),
            finished: false,
        }
    }

    /// Run identifiers declared so far, keyed by `ms_run` index
    pub fn ms_runs(&self) -> &BTreeMap<u32, String> {
        &self.ms_runs
    }

    /// Metadata key/values seen so far
    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// Number of lines read so far
    pub fn line_number(&self) -> u64 {
        self.line_number
    }

    /// Read the next classified line, or `None` at end of input
    pub fn next_line(&mut self) -> Result<Option<MzTabLine>, MzTabError> {
        loop {
            self.buf.clear();
            if self.reader.read_line(&mut self.buf)? == 0 {
                return Ok(None);
            }
            self.line_number += 1;

            let line = self.buf.trim_end_matches(['\r', '\n']);
            if line.trim().is_empty() {
                continue;
            }

            let (prefix, rest) = line.split_once('\t').unwrap_or((line, ""));
            let ctx = RowContext {
                line: self.line_number,
                raw: line,
            };

            match prefix {
                "MTD" => {
                    let (key, value) = rest.split_once('\t').unwrap_or((rest, ""));
                    let key = key.trim().to_string();
                    let value = value.trim().to_string();
                    if let Some(index) = ms_run_location_index(&key) {
                        self.ms_runs
                            .insert(index, run_identifier_from_location(&value));
                    }
                    self.metadata.insert(key.clone(), value.clone());
                    return Ok(Some(MzTabLine::Metadata { key, value }));
                }
                "PRH" => self.protein_header = Some(SectionHeader::from_fields(rest.split('\t'))),
                "PEH" => self.peptide_header = Some(SectionHeader::from_fields(rest.split('\t'))),
                "PSH" => self.psm_header = Some(SectionHeader::from_fields(rest.split('\t'))),
                "PRT" => {
                    let header = self.protein_header.as_ref().ok_or(MzTabError::MissingHeader {
                        line: self.line_number,
                        section: "PRT",
                    })?;
                    let fields: Vec<&str> = rest.split('\t').collect();
                    return parse_protein(&ctx, header, &fields).map(|r| Some(MzTabLine::Protein(r)));
                }
                "PEP" => {
                    let header = self.peptide_header.as_ref().ok_or(MzTabError::MissingHeader {
                        line: self.line_number,
                        section: "PEP",
                    })?;
                    let fields: Vec<&str> = rest.split('\t').collect();
                    return parse_peptide(&ctx, header, &fields).map(|r| Some(MzTabLine::Peptide(r)));
                }
                "PSM" => {
                    let header = self.psm_header.as_ref().ok_or(MzTabError::MissingHeader {
                        line: self.line_number,
                        section: "PSM",
                    })?;
                    let fields: Vec<&str> = rest.split('\t').collect();
                    return parse_psm(&ctx, header, &fields, &self.ms_runs)
                        .map(|r| Some(MzTabLine::Psm(r)));
                }
                // Comments and the small-molecule sections carry nothing we index
                "COM" | "SMH" | "SML" | "SEH" | "SMF" | "SFH" | "SME" => {}
                _ => return Err(ctx_error(&ctx, format!("unknown line prefix '{}'", prefix))),
            }
        }
    }
}

fn ctx_error(ctx: &RowContext<'_>, reason: String) -> MzTabError {
    MzTabError::parse(ctx.line, ctx.raw, reason)
}

impl<R: BufRead> Iterator for MzTabStreamer<R> {
    type Item = Result<MzTabLine, MzTabError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.next_line() {
            Ok(Some(line)) => Some(Ok(line)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                // I/O failures are not row-level; stop after reporting
                if matches!(e, MzTabError::IoError(_)) {
                    self.finished = true;
                }
                Some(Err(e))
            }
        }
    }
}
