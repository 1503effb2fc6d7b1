use crate::config::SearchFormat;
use crate::errors::DataReadingError;
use crate::models::{
    Fragmentation,
    SpectrumRecord,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::collections::BTreeMap;
use std::path::{
    Path,
    PathBuf,
};
use tracing::{
    debug,
    info,
    warn,
};

pub const INTERNAL_FILE_NAME: &str = "msms.prosit.csv";

/// A row of the internal identification table.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct InternalRow {
    #[serde(rename = "RAW_FILE")]
    raw_file: String,
    #[serde(rename = "SCAN_NUMBER")]
    scan_number: u32,
    #[serde(rename = "MODIFIED_SEQUENCE")]
    modified_sequence: String,
    #[serde(rename = "PRECURSOR_CHARGE")]
    precursor_charge: u8,
    #[serde(rename = "FRAGMENTATION")]
    fragmentation: String,
    #[serde(rename = "REVERSE")]
    reverse: String,
    #[serde(rename = "SCORE")]
    score: f64,
    #[serde(rename = "CALCULATED_MASS")]
    calculated_mass: f64,
    #[serde(rename = "COLLISION_ENERGY", default)]
    collision_energy: Option<f32>,
}

/// A row of a MaxQuant `msms.txt`, every other column is ignored.
#[derive(Debug, Clone, Deserialize)]
struct MaxQuantRow {
    #[serde(rename = "Raw file")]
    raw_file: String,
    #[serde(rename = "Scan number")]
    scan_number: u32,
    #[serde(rename = "Modified sequence")]
    modified_sequence: String,
    #[serde(rename = "Charge")]
    charge: u8,
    #[serde(rename = "Fragmentation")]
    fragmentation: String,
    #[serde(rename = "Reverse", default)]
    reverse: String,
    #[serde(rename = "Score")]
    score: f64,
    #[serde(rename = "Mass")]
    mass: f64,
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "+" => Some(true),
        "false" | "0" | "" => Some(false),
        _ => None,
    }
}

fn csv_error(path: &Path) -> impl Fn(csv::Error) -> DataReadingError + '_ {
    move |e| DataReadingError::CsvError {
        source: e,
        path: path.to_path_buf(),
    }
}

impl InternalRow {
    fn into_record(self, path: &Path) -> Result<SpectrumRecord, DataReadingError> {
        let reverse = parse_flag(&self.reverse).ok_or_else(|| DataReadingError::InvalidField {
            field: "REVERSE",
            value: self.reverse.clone(),
            path: path.to_path_buf(),
        })?;
        let fragmentation = match self.fragmentation.parse::<Fragmentation>() {
            Ok(x) => x,
            Err(never) => match never {},
        };
        Ok(SpectrumRecord {
            raw_file: self.raw_file,
            scan_number: self.scan_number,
            modified_sequence: self.modified_sequence,
            precursor_charge: self.precursor_charge,
            fragmentation,
            collision_energy: self.collision_energy.unwrap_or(0.0),
            reverse,
            score: self.score,
            calculated_mass: self.calculated_mass,
        })
    }

    fn from_record(record: &SpectrumRecord) -> Self {
        Self {
            raw_file: record.raw_file.clone(),
            scan_number: record.scan_number,
            modified_sequence: record.modified_sequence.clone(),
            precursor_charge: record.precursor_charge,
            fragmentation: record.fragmentation.as_str().to_string(),
            reverse: record.reverse.to_string(),
            score: record.score,
            calculated_mass: record.calculated_mass,
            collision_energy: Some(record.collision_energy),
        }
    }
}

pub fn read_internal(path: impl AsRef<Path>) -> Result<Vec<SpectrumRecord>, DataReadingError> {
    let path = path.as_ref();
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b',')
        .from_path(path)
        .map_err(csv_error(path))?;
    let mut out = Vec::new();
    for row in rdr.deserialize() {
        let row: InternalRow = row.map_err(csv_error(path))?;
        out.push(row.into_record(path)?);
    }
    info!("Read {} identifications from {}", out.len(), path.display());
    Ok(out)
}

pub fn write_internal(
    records: &[SpectrumRecord],
    path: impl AsRef<Path>,
) -> Result<(), DataReadingError> {
    let path = path.as_ref();
    let mut wtr = csv::Writer::from_path(path).map_err(csv_error(path))?;
    for rec in records {
        wtr.serialize(InternalRow::from_record(rec))
            .map_err(csv_error(path))?;
    }
    wtr.flush().map_err(|e| DataReadingError::IoError {
        source: e,
        path: path.to_path_buf(),
    })?;
    Ok(())
}

/// MaxQuant modification labels and their UNIMOD accession, long form
/// first.
const MAXQUANT_MODIFICATIONS: [(&str, &str); 10] = [
    ("(Oxidation (M))", "[UNIMOD:35]"),
    ("(Phospho (STY))", "[UNIMOD:21]"),
    ("(Deamidation (NQ))", "[UNIMOD:7]"),
    ("(Gln->pyro-Glu)", "[UNIMOD:28]"),
    ("(Carbamidomethyl (C))", ""),
    ("(ox)", "[UNIMOD:35]"),
    ("(ph)", "[UNIMOD:21]"),
    ("(de)", "[UNIMOD:7]"),
    ("(gl)", "[UNIMOD:28]"),
    ("(cam)", ""),
];

/// Rewrites a MaxQuant modified sequence (`_(ac)PEPM(ox)C_`) in UNIMOD
/// notation (`[UNIMOD:1]-PEPM[UNIMOD:35]C[UNIMOD:4]`).
/// Cysteines are taken as carbamidomethylated.
///
/// Returns `None` when the sequence carries a modification without a
/// known UNIMOD accession.
pub fn maxquant_to_unimod(sequence: &str) -> Option<String> {
    let mut seq = sequence.trim_matches('_');
    let mut out = String::with_capacity(seq.len() + 16);
    for prefix in ["(ac)", "(Acetyl (Protein N-term))"] {
        if let Some(rest) = seq.strip_prefix(prefix) {
            out.push_str("[UNIMOD:1]-");
            seq = rest;
            break;
        }
    }
    let mut replaced = seq.to_string();
    for (label, unimod) in MAXQUANT_MODIFICATIONS {
        replaced = replaced.replace(label, unimod);
    }
    if replaced.contains(['(', ')']) {
        return None;
    }

    let mut in_bracket = false;
    for c in replaced.chars() {
        match c {
            '[' => in_bracket = true,
            ']' => in_bracket = false,
            _ => {}
        }
        out.push(c);
        if c == 'C' && !in_bracket {
            out.push_str("[UNIMOD:4]");
        }
    }
    Some(out)
}

fn read_maxquant(path: &Path) -> Result<Vec<SpectrumRecord>, DataReadingError> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .from_path(path)
        .map_err(csv_error(path))?;
    let mut out = Vec::new();
    for row in rdr.deserialize() {
        let row: MaxQuantRow = row.map_err(csv_error(path))?;
        let Some(modified_sequence) = maxquant_to_unimod(&row.modified_sequence) else {
            let err = DataReadingError::InvalidField {
                field: "Modified sequence",
                value: row.modified_sequence.clone(),
                path: path.to_path_buf(),
            };
            warn!("Skipping scan {} of {}: {}", row.scan_number, row.raw_file, err);
            continue;
        };
        let fragmentation = match row.fragmentation.parse::<Fragmentation>() {
            Ok(x) => x,
            Err(never) => match never {},
        };
        out.push(SpectrumRecord {
            raw_file: row.raw_file,
            scan_number: row.scan_number,
            modified_sequence,
            precursor_charge: row.charge,
            fragmentation,
            collision_energy: 0.0,
            reverse: row.reverse.trim() == "+",
            score: row.score,
            calculated_mass: row.mass,
        });
    }
    debug!("Parsed {} MaxQuant rows from {}", out.len(), path.display());
    Ok(out)
}

/// Converts a MaxQuant `msms.txt` to the internal table next to it and
/// returns the path of the written file.
pub fn convert_maxquant(path: impl AsRef<Path>) -> Result<PathBuf, DataReadingError> {
    let path = path.as_ref();
    let records = read_maxquant(path)?;
    let out_path = path
        .parent()
        .map(|x| x.join(INTERNAL_FILE_NAME))
        .unwrap_or_else(|| PathBuf::from(INTERNAL_FILE_NAME));
    write_internal(&records, &out_path)?;
    info!(
        "Converted {} MaxQuant identifications to {}",
        records.len(),
        out_path.display()
    );
    Ok(out_path)
}

pub fn read_search(
    path: impl AsRef<Path>,
    format: SearchFormat,
) -> Result<Vec<SpectrumRecord>, DataReadingError> {
    let path = path.as_ref();
    info!("Reading search results {} as {:?}", path.display(), format);
    match format {
        SearchFormat::Internal => read_internal(path),
        SearchFormat::MaxQuant => {
            let internal = convert_maxquant(path)?;
            read_internal(internal)
        }
    }
}

/// Splits identifications per raw file, keeping their order.
pub fn group_by_raw_file(records: Vec<SpectrumRecord>) -> BTreeMap<String, Vec<SpectrumRecord>> {
    let mut out: BTreeMap<String, Vec<SpectrumRecord>> = BTreeMap::new();
    for rec in records {
        out.entry(rec.raw_file.clone()).or_default().push(rec);
    }
    out
}
