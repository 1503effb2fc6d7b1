use crate::Spectra;
use crate::errors::{
    Result,
    SpectraError,
};
use parquet::file::writer::SerializedFileWriter;
use parquet::record::RecordWriter;
use std::fs::File;
use std::path::Path;
use tracing::{
    debug,
    error,
};

/// Name of the per-row similarity column on the expanded library.
pub const SPECTRAL_ANGLE_COLUMN: &str = "SPECTRAL_ANGLE";

/// One scored row of the collision energy grid.
#[derive(Debug, Clone, PartialEq, ParquetRecordWriter)]
pub struct AlignmentScore {
    pub raw_file: String,
    pub scan_number: u32,
    pub modified_sequence: String,
    pub precursor_charge: u8,
    pub collision_energy: f32,
    pub spectral_angle: f32,
}

impl AlignmentScore {
    /// Pairs every row of a scored library with its spectral angle.
    pub fn from_scored_library(library: &Spectra) -> std::result::Result<Vec<Self>, SpectraError> {
        let angles = library.column(SPECTRAL_ANGLE_COLUMN)?;
        Ok(library
            .records()
            .iter()
            .zip(angles.iter())
            .map(|(rec, &angle)| AlignmentScore {
                raw_file: rec.raw_file.clone(),
                scan_number: rec.scan_number,
                modified_sequence: rec.modified_sequence.clone(),
                precursor_charge: rec.precursor_charge,
                collision_energy: rec.collision_energy,
                spectral_angle: angle as f32,
            })
            .collect())
    }
}

pub fn write_alignment_scores(scores: &[AlignmentScore], out_path: impl AsRef<Path>) -> Result<()> {
    let out_path = out_path.as_ref();
    let file = match File::create(out_path) {
        Ok(file) => file,
        Err(err) => {
            error!("Failed to open file {:?} with error: {}", out_path, err);
            return Err(crate::errors::CeCalError::Io {
                source: err,
                path: Some(out_path.to_path_buf()),
            });
        }
    };
    debug!("Writing {} alignment scores to {:?}", scores.len(), out_path);
    let schema = scores.schema()?;
    let mut writer = SerializedFileWriter::new(file, schema, Default::default())?;
    let mut row_group = writer.next_row_group()?;
    scores.write_to_row_group(&mut row_group)?;
    row_group.close()?;
    writer.close()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_alignment_scores() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scores.parquet");
        let scores = vec![
            AlignmentScore {
                raw_file: "run01".into(),
                scan_number: 4,
                modified_sequence: "PEPTIDEK".into(),
                precursor_charge: 2,
                collision_energy: 18.0,
                spectral_angle: 0.7,
            },
            AlignmentScore {
                raw_file: "run01".into(),
                scan_number: 4,
                modified_sequence: "PEPTIDEK".into(),
                precursor_charge: 2,
                collision_energy: 19.0,
                spectral_angle: 0.8,
            },
        ];
        write_alignment_scores(&scores, &path).unwrap();
        let meta = std::fs::metadata(&path).unwrap();
        assert!(meta.len() > 0);
    }
}
