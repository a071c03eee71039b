//! Parsing of the mzTab `modifications` column
//!
//! The column is a comma separated list of `positions-accession` entries:
//!
//! - `3-UNIMOD:35` (single site)
//! - `3|7-UNIMOD:21` (ambiguous site)
//! - `null-UNIMOD:1` or bare `UNIMOD:1` (unknown site)
//! - `0-CHEMMOD:+42.0106` (mass-only modification)
//! - `3[MS,MS:1001524,fragment neutral loss,63.998]-UNIMOD:35` (position with parameters)
//!
//! Commas inside square brackets are not separators.

use super::models::Modification;

/// Monoisotopic mass deltas for the UNIMOD accessions common in search engine output
const UNIMOD_MASSES: &[(u32, f64)] = &[
    (1, 42.010565),    // Acetyl
    (4, 57.021464),    // Carbamidomethyl
    (5, 43.005814),    // Carbamyl
    (7, 0.984016),     // Deamidated
    (21, 79.966331),   // Phospho
    (27, -18.010565),  // Glu->pyro-Glu
    (28, -17.026549),  // Gln->pyro-Glu
    (34, 14.01565),    // Methyl
    (35, 15.994915),   // Oxidation
    (36, 28.0313),     // Dimethyl
    (121, 114.042927), // GG
    (214, 144.102063), // iTRAQ4plex
    (259, 8.014199),   // Label:13C(6)15N(2)
    (267, 10.008269),  // Label:13C(6)15N(4)
    (737, 229.162932), // TMT6plex
    (2016, 304.207146), // TMTpro
];

/// Mass delta for a UNIMOD accession number, if it is in the built-in table
pub fn unimod_mass(accession: u32) -> Option<f64> {
    UNIMOD_MASSES
        .iter()
        .find(|(id, _)| *id == accession)
        .map(|(_, mass)| *mass)
}

/// Parse the modifications column into an ordered list.
///
/// `null` or an empty string yields an empty list.
pub fn parse_modifications(field: &str) -> Result<Vec<Modification>, String> {
    let field = field.trim();
    if field.is_empty() || field.eq_ignore_ascii_case("null") || field == "0" {
        return Ok(Vec::new());
    }

    split_top_level(field)
        .into_iter()
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(parse_entry)
        .collect()
}

/// Split on commas that are not inside `[...]`
fn split_top_level(field: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in field.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&field[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&field[start..]);
    parts
}

fn parse_entry(entry: &str) -> Result<Modification, String> {
    // The accession begins after the first '-' outside brackets. CHEMMOD:-18.01
    // contains its own '-', so only the first separator counts.
    let mut depth = 0usize;
    let mut separator = None;
    for (i, c) in entry.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            '-' if depth == 0 => {
                separator = Some(i);
                break;
            }
            _ => {}
        }
    }

    let (positions_part, accession) = match separator {
        Some(i) if !entry[..i].split('[').next().unwrap_or("").contains(':') => {
            (&entry[..i], &entry[i + 1..])
        }
        _ => ("", entry),
    };

    let accession = accession.trim();
    if accession.is_empty() {
        return Err(format!("modification '{}' has no accession", entry));
    }

    let positions = parse_positions(positions_part)
        .map_err(|reason| format!("modification '{}': {}", entry, reason))?;
    let mass_delta = mass_for_accession(accession);

    Ok(Modification {
        positions,
        accession: accession.to_string(),
        mass_delta,
    })
}

fn parse_positions(part: &str) -> Result<Vec<u32>, String> {
    let part = part.trim();
    if part.is_empty() || part.eq_ignore_ascii_case("null") {
        return Ok(Vec::new());
    }

    part.split('|')
        .map(|position| {
            // Drop trailing `[CV param]` annotations
            let position = position.split('[').next().unwrap_or(position).trim();
            position
                .parse::<u32>()
                .map_err(|_| format!("invalid position '{}'", position))
        })
        .collect()
}

fn mass_for_accession(accession: &str) -> Option<f64> {
    let (namespace, value) = accession.split_once(':')?;
    if namespace.eq_ignore_ascii_case("UNIMOD") {
        value.trim().parse().ok().and_then(unimod_mass)
    } else if namespace.eq_ignore_ascii_case("CHEMMOD") {
        value.trim().trim_start_matches('+').parse().ok()
    } else {
        None
    }
}
