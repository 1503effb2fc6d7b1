use crate::config::RawFormat;
use crate::errors::DataReadingError;
use mzdata::io::MzMLReader;
use mzdata::prelude::*;
use std::path::{
    Path,
    PathBuf,
};
use std::process::Command;
use tracing::{
    debug,
    info,
    warn,
};

/// One measured MS2 spectrum.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservedSpectrum {
    pub raw_file: String,
    pub scan_number: u32,
    pub mz: Vec<f64>,
    pub intensities: Vec<f32>,
    pub collision_energy: Option<f32>,
}

/// Raw file identifier as used in search results, the file name
/// without its extension.
pub fn raw_file_name(path: &Path) -> String {
    path.file_stem()
        .map(|x| x.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Pulls `N` out of a native id like
/// `controllerType=0 controllerNumber=1 scan=N`.
pub fn scan_number_from_native_id(id: &str) -> Option<u32> {
    id.split_whitespace()
        .find_map(|part| part.strip_prefix("scan="))
        .and_then(|x| x.parse().ok())
}

fn decode_error(scan: &str, err: impl std::fmt::Debug) -> DataReadingError {
    DataReadingError::SpectrumDecodingError {
        scan: scan.to_string(),
        msg: format!("{:?}", err),
    }
}

pub fn read_mzml(path: impl AsRef<Path>) -> Result<Vec<ObservedSpectrum>, DataReadingError> {
    let path = path.as_ref();
    let raw_file = raw_file_name(path);
    let reader = MzMLReader::open_path(path).map_err(|e| DataReadingError::IoError {
        source: e,
        path: path.to_path_buf(),
    })?;

    let mut out = Vec::new();
    let mut skipped = 0;
    for spectrum in reader {
        if spectrum.ms_level() != 2 {
            continue;
        }
        let scan_number = match scan_number_from_native_id(spectrum.id()) {
            Some(x) => x,
            None => spectrum.index() as u32 + 1,
        };
        let arrays = match spectrum.raw_arrays() {
            Some(x) => x,
            None => {
                skipped += 1;
                continue;
            }
        };
        let mz = arrays
            .mzs()
            .map_err(|e| decode_error(spectrum.id(), e))?
            .into_owned();
        let intensities = arrays
            .intensities()
            .map_err(|e| decode_error(spectrum.id(), e))?
            .into_owned();
        let collision_energy = spectrum
            .precursor()
            .map(|p| p.activation.energy)
            .filter(|x| *x > 0.0);

        out.push(ObservedSpectrum {
            raw_file: raw_file.clone(),
            scan_number,
            mz,
            intensities,
            collision_energy,
        });
    }
    if skipped > 0 {
        warn!("Skipped {} MS2 spectra without peak data in {}", skipped, path.display());
    }
    info!("Read {} MS2 spectra from {}", out.len(), path.display());
    Ok(out)
}

/// Converts a vendor raw file to mzML with an external converter.
///
/// Reuses an mzML already present in `out_dir`.
pub fn convert_thermo_raw(
    converter: &str,
    raw_path: &Path,
    out_dir: &Path,
) -> Result<PathBuf, DataReadingError> {
    let mzml_path = out_dir.join(format!("{}.mzML", raw_file_name(raw_path)));
    if mzml_path.exists() {
        debug!("Found converted file {}", mzml_path.display());
        return Ok(mzml_path);
    }

    let mut cmd = Command::new(converter);
    cmd.arg("-i").arg(raw_path).arg("-o").arg(out_dir).arg("-f").arg("2");
    let cmd_str = format!("{:?}", cmd);
    info!("Converting raw file: {}", cmd_str);
    let output = cmd.output().map_err(|e| DataReadingError::ConverterFailed {
        command: cmd_str.clone(),
        msg: e.to_string(),
    })?;
    if !output.status.success() {
        return Err(DataReadingError::ConverterFailed {
            command: cmd_str,
            msg: String::from_utf8_lossy(&output.stderr).to_string(),
        });
    }
    if !mzml_path.exists() {
        return Err(DataReadingError::ConverterFailed {
            command: cmd_str,
            msg: format!("expected output {} was not produced", mzml_path.display()),
        });
    }
    Ok(mzml_path)
}

/// Reads the observed spectra of one raw file in the given format.
pub fn load_observed(
    raw_path: &Path,
    format: RawFormat,
    converter: &str,
    out_dir: &Path,
) -> Result<Vec<ObservedSpectrum>, DataReadingError> {
    info!("Reading raw file {} as {:?}", raw_path.display(), format);
    match format {
        RawFormat::MzML => read_mzml(raw_path),
        RawFormat::Thermo => {
            let mzml = convert_thermo_raw(converter, raw_path, out_dir)?;
            read_mzml(mzml)
        }
    }
}

/// Writes a small mzML with one MS1 scan and two HCD MS2 scans (27 and
/// 30 eV). The second MS2 id carries no `scan=` term.
#[cfg(test)]
pub(crate) fn write_test_mzml(path: &Path) -> std::io::Result<()> {
    const TEST_MZML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<mzML xmlns="http://psi.hupo.org/ms/mzml" version="1.1.0">
  <cvList count="2">
    <cv id="MS" fullName="Proteomics Standards Initiative Mass Spectrometry Ontology" URI="https://raw.githubusercontent.com/HUPO-PSI/psi-ms-CV/master/psi-ms.obo"/>
    <cv id="UO" fullName="Unit Ontology" URI="http://ontologies.berkeleybop.org/uo.obo"/>
  </cvList>
  <fileDescription>
    <fileContent>
      <cvParam cvRef="MS" accession="MS:1000580" name="MSn spectrum" value=""/>
    </fileContent>
  </fileDescription>
  <run id="run01">
    <spectrumList count="3">
      <spectrum index="0" id="controllerType=0 controllerNumber=1 scan=1" defaultArrayLength="2">
        <cvParam cvRef="MS" accession="MS:1000511" name="ms level" value="1"/>
        <cvParam cvRef="MS" accession="MS:1000579" name="MS1 spectrum" value=""/>
        <binaryDataArrayList count="2">
          <binaryDataArray encodedLength="24">
            <cvParam cvRef="MS" accession="MS:1000523" name="64-bit float" value=""/>
            <cvParam cvRef="MS" accession="MS:1000576" name="no compression" value=""/>
            <cvParam cvRef="MS" accession="MS:1000514" name="m/z array" value="" unitCvRef="MS" unitAccession="MS:1000040" unitName="m/z"/>
            <binary>AAAAAAAAeUAAAAAAAEB/QA==</binary>
          </binaryDataArray>
          <binaryDataArray encodedLength="12">
            <cvParam cvRef="MS" accession="MS:1000521" name="32-bit float" value=""/>
            <cvParam cvRef="MS" accession="MS:1000576" name="no compression" value=""/>
            <cvParam cvRef="MS" accession="MS:1000515" name="intensity array" value="" unitCvRef="MS" unitAccession="MS:1000131" unitName="number of detector counts"/>
            <binary>AAB6RAAA+kQ=</binary>
          </binaryDataArray>
        </binaryDataArrayList>
      </spectrum>
      <spectrum index="1" id="controllerType=0 controllerNumber=1 scan=2" defaultArrayLength="2">
        <cvParam cvRef="MS" accession="MS:1000511" name="ms level" value="2"/>
        <cvParam cvRef="MS" accession="MS:1000580" name="MSn spectrum" value=""/>
        <precursorList count="1">
          <precursor spectrumRef="controllerType=0 controllerNumber=1 scan=1">
            <selectedIonList count="1">
              <selectedIon>
                <cvParam cvRef="MS" accession="MS:1000744" name="selected ion m/z" value="464.7347" unitCvRef="MS" unitAccession="MS:1000040" unitName="m/z"/>
                <cvParam cvRef="MS" accession="MS:1000041" name="charge state" value="2"/>
              </selectedIon>
            </selectedIonList>
            <activation>
              <cvParam cvRef="MS" accession="MS:1000422" name="beam-type collision-induced dissociation" value=""/>
              <cvParam cvRef="MS" accession="MS:1000045" name="collision energy" value="27.0" unitCvRef="UO" unitAccession="UO:0000266" unitName="electronvolt"/>
            </activation>
          </precursor>
        </precursorList>
        <binaryDataArrayList count="2">
          <binaryDataArray encodedLength="24">
            <cvParam cvRef="MS" accession="MS:1000523" name="64-bit float" value=""/>
            <cvParam cvRef="MS" accession="MS:1000576" name="no compression" value=""/>
            <cvParam cvRef="MS" accession="MS:1000514" name="m/z array" value="" unitCvRef="MS" unitAccession="MS:1000040" unitName="m/z"/>
            <binary>dVsiF5xjYkCxTwDFSGNsQA==</binary>
          </binaryDataArray>
          <binaryDataArray encodedLength="12">
            <cvParam cvRef="MS" accession="MS:1000521" name="32-bit float" value=""/>
            <cvParam cvRef="MS" accession="MS:1000576" name="no compression" value=""/>
            <cvParam cvRef="MS" accession="MS:1000515" name="intensity array" value="" unitCvRef="MS" unitAccession="MS:1000131" unitName="number of detector counts"/>
            <binary>AAAgQQAAoEE=</binary>
          </binaryDataArray>
        </binaryDataArrayList>
      </spectrum>
      <spectrum index="2" id="index=2" defaultArrayLength="2">
        <cvParam cvRef="MS" accession="MS:1000511" name="ms level" value="2"/>
        <cvParam cvRef="MS" accession="MS:1000580" name="MSn spectrum" value=""/>
        <precursorList count="1">
          <precursor>
            <selectedIonList count="1">
              <selectedIon>
                <cvParam cvRef="MS" accession="MS:1000744" name="selected ion m/z" value="464.7347" unitCvRef="MS" unitAccession="MS:1000040" unitName="m/z"/>
              </selectedIon>
            </selectedIonList>
            <activation>
              <cvParam cvRef="MS" accession="MS:1000422" name="beam-type collision-induced dissociation" value=""/>
              <cvParam cvRef="MS" accession="MS:1000045" name="collision energy" value="30.0" unitCvRef="UO" unitAccession="UO:0000266" unitName="electronvolt"/>
            </activation>
          </precursor>
        </precursorList>
        <binaryDataArrayList count="2">
          <binaryDataArray encodedLength="24">
            <cvParam cvRef="MS" accession="MS:1000523" name="64-bit float" value=""/>
            <cvParam cvRef="MS" accession="MS:1000576" name="no compression" value=""/>
            <cvParam cvRef="MS" accession="MS:1000514" name="m/z array" value="" unitCvRef="MS" unitAccession="MS:1000040" unitName="m/z"/>
            <binary>AAAAAAAAeUAAAAAAAEB/QA==</binary>
          </binaryDataArray>
          <binaryDataArray encodedLength="12">
            <cvParam cvRef="MS" accession="MS:1000521" name="32-bit float" value=""/>
            <cvParam cvRef="MS" accession="MS:1000576" name="no compression" value=""/>
            <cvParam cvRef="MS" accession="MS:1000515" name="intensity array" value="" unitCvRef="MS" unitAccession="MS:1000131" unitName="number of detector counts"/>
            <binary>AAB6RAAA+kQ=</binary>
          </binaryDataArray>
        </binaryDataArrayList>
      </spectrum>
    </spectrumList>
  </run>
</mzML>
"#;
    std::fs::write(path, TEST_MZML)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_number_from_native_id() {
        assert_eq!(
            scan_number_from_native_id("controllerType=0 controllerNumber=1 scan=10014"),
            Some(10014)
        );
        assert_eq!(scan_number_from_native_id("index=3"), None);
        assert_eq!(scan_number_from_native_id("scan=abc"), None);
    }

    #[test]
    fn test_raw_file_name() {
        assert_eq!(raw_file_name(Path::new("/data/run01.mzML")), "run01");
        assert_eq!(raw_file_name(Path::new("run.02.raw")), "run.02");
    }

    #[test]
    fn test_missing_converter() {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("run01.raw");
        let res = convert_thermo_raw("definitely-not-a-converter-binary", &raw, dir.path());
        assert!(matches!(res, Err(DataReadingError::ConverterFailed { .. })));
    }

    #[test]
    fn test_existing_conversion_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("run01.raw");
        std::fs::write(dir.path().join("run01.mzML"), "").unwrap();
        let res = convert_thermo_raw("definitely-not-a-converter-binary", &raw, dir.path());
        assert_eq!(res.unwrap(), dir.path().join("run01.mzML"));
    }

    #[test]
    fn test_missing_mzml() {
        let dir = tempfile::tempdir().unwrap();
        let res = read_mzml(dir.path().join("nope.mzML"));
        assert!(matches!(res, Err(DataReadingError::IoError { .. })));
    }

    #[test]
    fn test_read_mzml_ms2_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run01.mzML");
        write_test_mzml(&path).unwrap();

        let spectra = read_mzml(&path).unwrap();
        assert_eq!(spectra.len(), 2);
        assert!(spectra.iter().all(|x| x.raw_file == "run01"));

        let first = &spectra[0];
        assert_eq!(first.scan_number, 2);
        assert_eq!(first.collision_energy, Some(27.0));
        assert_eq!(first.mz.len(), 2);
        assert!((first.mz[0] - 147.112804).abs() < 1e-6);
        assert!((first.mz[1] - 227.102633).abs() < 1e-6);
        assert_eq!(first.intensities, vec![10.0, 20.0]);

        // no scan= in the native id, falls back to index + 1
        let second = &spectra[1];
        assert_eq!(second.scan_number, 3);
        assert_eq!(second.collision_energy, Some(30.0));
        assert_eq!(second.intensities, vec![1000.0, 2000.0]);
    }
}
