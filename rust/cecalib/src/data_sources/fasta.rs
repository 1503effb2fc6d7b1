use crate::config::{
    DigestionConfig,
    TagVariant,
};
use crate::errors::{
    CeCalError,
    DataReadingError,
};
use crate::models::digest::deduplicate_digests;
use crate::models::{
    DigestionParameters,
    Fragmentation,
    SpectrumRecord,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{
    debug,
    info,
    warn,
};

/// Residues the prediction models accept.
const PREDICTABLE_RESIDUES: &[u8] = b"ACDEFGHIKLMNPQRSTVWY";

#[derive(Debug, Clone, PartialEq)]
pub struct ProteinSequence {
    pub id: String,
    pub sequence: Arc<str>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProteinSequenceCollection {
    pub sequences: Vec<ProteinSequence>,
}

impl ProteinSequenceCollection {
    pub fn from_fasta_file(path: impl AsRef<Path>) -> Result<Self, DataReadingError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| DataReadingError::IoError {
            source: e,
            path: path.to_path_buf(),
        })?;
        let out = Self::parse(&content);
        info!(
            "Read {} protein sequences from {}",
            out.sequences.len(),
            path.display()
        );
        Ok(out)
    }

    /// The id is the first word of the header. Residues are upper-cased,
    /// anything that is not a letter (stop codons, digits) is dropped.
    pub fn parse(content: &str) -> Self {
        let mut sequences = Vec::new();
        let mut current: Option<(String, String)> = None;
        let mut flush = |entry: Option<(String, String)>| {
            if let Some((id, seq)) = entry {
                if seq.is_empty() {
                    debug!("Skipping empty protein entry {}", id);
                } else {
                    sequences.push(ProteinSequence {
                        id,
                        sequence: seq.into(),
                    });
                }
            }
        };

        for line in content.lines().map(str::trim) {
            if let Some(header) = line.strip_prefix('>') {
                let id = header.split_whitespace().next().unwrap_or_default();
                flush(current.replace((id.to_string(), String::new())));
            } else if let Some((_, seq)) = current.as_mut() {
                seq.extend(
                    line.chars()
                        .filter(char::is_ascii_alphabetic)
                        .map(|c| c.to_ascii_uppercase()),
                );
            } else if !line.is_empty() {
                debug!("Ignoring sequence line before the first header");
            }
        }
        flush(current);
        Self { sequences }
    }
}

fn is_predictable(peptide: &str) -> bool {
    peptide.bytes().all(|x| PREDICTABLE_RESIDUES.contains(&x))
}

/// Writes a bare peptide in the notation used throughout the library:
/// carbamidomethylated cysteines and, for labelled samples, the tag on
/// the N-terminus and on every lysine.
pub fn modified_sequence(peptide: &str, tag: TagVariant) -> String {
    let accession = tag.accession();
    let mut out = String::with_capacity(peptide.len() + 16);
    if let Some(acc) = accession {
        out.push_str(acc);
        out.push('-');
    }
    for c in peptide.chars() {
        out.push(c);
        match (c, accession) {
            ('C', _) => out.push_str("[UNIMOD:4]"),
            ('K', Some(acc)) => out.push_str(acc),
            _ => {}
        }
    }
    out
}

/// Digests every protein and lists each unique peptide once per
/// configured precursor charge, ready for prediction.
///
/// Peptides with residues the models cannot handle (`X`, `U`, `B`, ...)
/// are left out.
pub fn peptides_from_proteins(
    proteins: &ProteinSequenceCollection,
    digestion: &DigestionConfig,
    tag: TagVariant,
) -> Result<Vec<SpectrumRecord>, CeCalError> {
    let params = DigestionParameters::try_from(digestion)?;
    let fragmentation = match digestion.fragmentation.parse::<Fragmentation>() {
        Ok(x) => x,
        Err(never) => match never {},
    };
    let sequences: Vec<Arc<str>> = proteins
        .sequences
        .iter()
        .map(|x| x.sequence.clone())
        .collect();
    let digests = deduplicate_digests(params.digest_multiple(&sequences));

    let num_digests = digests.len();
    let peptides: Vec<&str> = digests
        .iter()
        .map(|x| x.as_str())
        .filter(|x| is_predictable(x))
        .collect();
    if peptides.len() < num_digests {
        warn!(
            "Skipped {} of {} peptides with non-standard residues",
            num_digests - peptides.len(),
            num_digests
        );
    }

    let mut out = Vec::with_capacity(peptides.len() * digestion.precursor_charges.len());
    for peptide in peptides {
        let sequence = modified_sequence(peptide, tag);
        for charge in digestion.precursor_charges.iter() {
            out.push(SpectrumRecord {
                raw_file: String::new(),
                scan_number: out.len() as u32 + 1,
                modified_sequence: sequence.clone(),
                precursor_charge: *charge,
                fragmentation: fragmentation.clone(),
                collision_energy: digestion.collision_energy,
                reverse: false,
                score: 0.0,
                calculated_mass: 0.0,
            });
        }
    }
    info!(
        "Digested {} proteins into {} unique peptides, {} precursors",
        proteins.sequences.len(),
        num_digests,
        out.len()
    );
    Ok(out)
}
