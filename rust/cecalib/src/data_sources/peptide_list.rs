use crate::errors::DataReadingError;
use crate::models::{
    Fragmentation,
    SpectrumRecord,
};
use csv::StringRecord;
use serde::{
    Deserialize,
    Serialize,
};
use std::path::{
    Path,
    PathBuf,
};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PeptideRow {
    #[serde(rename = "MODIFIED_SEQUENCE")]
    modified_sequence: String,
    #[serde(rename = "COLLISION_ENERGY")]
    collision_energy: f32,
    #[serde(rename = "PRECURSOR_CHARGE")]
    precursor_charge: u8,
    #[serde(rename = "FRAGMENTATION", default)]
    fragmentation: Option<String>,
}

/// First `.csv` file (by name) in a directory.
pub fn find_peptide_list(dir: impl AsRef<Path>) -> Result<Option<PathBuf>, DataReadingError> {
    let dir = dir.as_ref();
    let entries = std::fs::read_dir(dir).map_err(|e| DataReadingError::IoError {
        source: e,
        path: dir.to_path_buf(),
    })?;
    let mut csvs: Vec<PathBuf> = entries
        .filter_map(|x| x.ok())
        .map(|x| x.path())
        .filter(|x| x.extension().is_some_and(|ext| ext == "csv"))
        .collect();
    csvs.sort();
    Ok(csvs.into_iter().next())
}

/// Reads a list of peptides to predict. Header names are case-insensitive.
///
/// Rows get their position in the file as scan number so they stay
/// addressable, and default to HCD when no fragmentation is given.
pub fn read_peptide_list(path: impl AsRef<Path>) -> Result<Vec<SpectrumRecord>, DataReadingError> {
    let path = path.as_ref();
    let csv_err = |e| DataReadingError::CsvError {
        source: e,
        path: path.to_path_buf(),
    };
    let mut rdr = csv::Reader::from_path(path).map_err(csv_err)?;
    let headers: StringRecord = rdr
        .headers()
        .map_err(csv_err)?
        .iter()
        .map(|x| x.trim().to_ascii_uppercase())
        .collect();
    rdr.set_headers(headers);

    let mut out = Vec::new();
    for (i, row) in rdr.deserialize().enumerate() {
        let row: PeptideRow = row.map_err(csv_err)?;
        let fragmentation = match row.fragmentation.as_deref() {
            Some(x) if !x.trim().is_empty() => match x.parse::<Fragmentation>() {
                Ok(f) => f,
                Err(never) => match never {},
            },
            _ => Fragmentation::Hcd,
        };
        out.push(SpectrumRecord {
            raw_file: String::new(),
            scan_number: i as u32 + 1,
            modified_sequence: row.modified_sequence,
            precursor_charge: row.precursor_charge,
            fragmentation,
            collision_energy: row.collision_energy,
            reverse: false,
            score: 0.0,
            calculated_mass: 0.0,
        });
    }
    info!("Read {} peptides from {}", out.len(), path.display());
    Ok(out)
}

/// Name of the peptide list written for a digested FASTA.
pub const DIGEST_FILE_NAME: &str = "prosit_input.csv";

/// Writes peptides in the layout [`read_peptide_list`] reads.
pub fn write_peptide_list(
    peptides: &[SpectrumRecord],
    path: impl AsRef<Path>,
) -> Result<(), DataReadingError> {
    let path = path.as_ref();
    let csv_err = |e| DataReadingError::CsvError {
        source: e,
        path: path.to_path_buf(),
    };
    let mut wtr = csv::Writer::from_path(path).map_err(csv_err)?;
    for rec in peptides {
        wtr.serialize(PeptideRow {
            modified_sequence: rec.modified_sequence.clone(),
            collision_energy: rec.collision_energy,
            precursor_charge: rec.precursor_charge,
            fragmentation: Some(rec.fragmentation.as_str().to_string()),
        })
        .map_err(csv_err)?;
    }
    wtr.flush().map_err(|e| DataReadingError::IoError {
        source: e,
        path: path.to_path_buf(),
    })?;
    info!("Wrote {} peptides to {}", peptides.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_peptide_list() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignore me").unwrap();
        std::fs::write(
            dir.path().join("peptides.csv"),
            "modified_sequence,collision_energy,precursor_charge,fragmentation\n\
PEPTIDEK,30,2,HCD\n\
M[UNIMOD:35]PEPTIDEK,27.5,3,CID\n",
        )
        .unwrap();

        let path = find_peptide_list(dir.path()).unwrap().unwrap();
        let peptides = read_peptide_list(path).unwrap();
        assert_eq!(peptides.len(), 2);
        assert_eq!(peptides[0].modified_sequence, "PEPTIDEK");
        assert_eq!(peptides[1].collision_energy, 27.5);
        assert_eq!(peptides[1].precursor_charge, 3);
        assert_eq!(peptides[1].fragmentation, Fragmentation::Cid);
        assert_eq!(peptides[1].scan_number, 2);
    }

    #[test]
    fn test_fragmentation_defaults_to_hcd() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("list.csv");
        std::fs::write(
            &path,
            "MODIFIED_SEQUENCE,COLLISION_ENERGY,PRECURSOR_CHARGE\nPEPTIDEK,30,2\n",
        )
        .unwrap();
        let peptides = read_peptide_list(&path).unwrap();
        assert!(peptides[0].fragmentation.is_hcd());
    }

    #[test]
    fn test_no_csv_in_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(find_peptide_list(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_written_list_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DIGEST_FILE_NAME);
        let peptides = vec![
            SpectrumRecord {
                raw_file: String::new(),
                scan_number: 1,
                modified_sequence: "AQLTQC[UNIMOD:4]LK".into(),
                precursor_charge: 2,
                fragmentation: Fragmentation::Hcd,
                collision_energy: 30.0,
                reverse: false,
                score: 0.0,
                calculated_mass: 0.0,
            },
            SpectrumRecord {
                scan_number: 2,
                precursor_charge: 3,
                fragmentation: Fragmentation::Cid,
                ..SpectrumRecord::sample()
            },
        ];
        write_peptide_list(&peptides, &path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("MODIFIED_SEQUENCE,COLLISION_ENERGY,PRECURSOR_CHARGE,FRAGMENTATION"));
        let back = read_peptide_list(&path).unwrap();
        assert_eq!(back.len(), 2);
        assert_eq!(back[0].modified_sequence, "AQLTQC[UNIMOD:4]LK");
        assert_eq!(back[1].precursor_charge, 3);
        assert_eq!(back[1].fragmentation, Fragmentation::Cid);
    }
}
