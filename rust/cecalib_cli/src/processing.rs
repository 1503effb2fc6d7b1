use crate::errors::CliError;
use cecalib::config::{
    RawFormat,
    SearchFormat,
};
use cecalib::data_sources::search_results::{
    INTERNAL_FILE_NAME,
    group_by_raw_file,
    read_search,
};
use cecalib::{
    CeCalibration,
    Config,
    PredictOutcome,
    SpectralLibrary,
};
use indicatif::{
    ProgressIterator,
    ProgressStyle,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{
    Path,
    PathBuf,
};
use std::time::Instant;
use tracing::{
    error,
    info,
    warn,
};

pub const BEST_CE_FILE_NAME: &str = "best_ce.json";
pub const PREDICTIONS_FILE_NAME: &str = "predictions.json";
pub const LIBRARY_FILE_NAME: &str = "library.msgpack.zst";

#[derive(Debug, Default, Serialize)]
pub struct CalibrationSummary {
    pub best_ce: BTreeMap<String, f32>,
    pub failed: Vec<String>,
}

/// Search results file expected in the search directory.
pub fn search_file(search_dir: &Path, format: SearchFormat) -> PathBuf {
    match format {
        SearchFormat::MaxQuant => search_dir.join("msms.txt"),
        SearchFormat::Internal => search_dir.join(INTERNAL_FILE_NAME),
    }
}

pub fn raw_file_path(search_dir: &Path, raw_file: &str, format: RawFormat) -> PathBuf {
    search_dir.join(format!("{}.{}", raw_file, format.extension()))
}

fn write_json<T: Serialize>(value: &T, path: &Path) -> Result<(), CliError> {
    let file = std::fs::File::create(path).map_err(|e| CliError::io(e, path))?;
    serde_json::to_writer_pretty(file, value).map_err(|e| CliError::Io {
        source: e.to_string(),
        path: Some(path.to_string_lossy().to_string()),
    })?;
    info!("Wrote {}", path.display());
    Ok(())
}

/// Calibrates every raw file referenced by the search results.
///
/// A raw file that fails is logged and left out of the summary.
pub fn run_calibration(
    config: &Config,
    search_dir: &Path,
    out_dir: &Path,
) -> Result<CalibrationSummary, CliError> {
    let search_format = config.search_format()?;
    let raw_format = config.raw_format()?;
    let search_path = search_file(search_dir, search_format);
    let identifications = read_search(&search_path, search_format)
        .map_err(|e| CliError::Processing {
            source: e.to_string(),
        })?;
    let groups = group_by_raw_file(identifications);
    info!("Calibrating {} raw files", groups.len());

    let style = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta})",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar());

    let mut summary = CalibrationSummary::default();
    for (raw_file, ids) in groups.into_iter().progress_with_style(style) {
        let start = Instant::now();
        let raw_path = raw_file_path(search_dir, &raw_file, raw_format);
        let out_path = out_dir.join(&raw_file);
        let res = CeCalibration::new(&raw_path, &out_path, config.clone()).and_then(|mut cal| {
            let best = cal.perform_alignment(ids)?;
            match cal.write_alignment_scores() {
                Ok(Some(path)) => info!("Wrote alignment scores to {}", path.display()),
                Ok(None) => {}
                Err(e) => warn!("Unable to write alignment scores for {}: {}", raw_file, e),
            }
            Ok(best)
        });
        match res {
            Ok(best) => {
                info!(
                    "Calibrated {} in {:?}, best collision energy {}",
                    raw_file,
                    start.elapsed(),
                    best
                );
                summary.best_ce.insert(raw_file, best);
            }
            Err(e) => {
                error!("Calibration of {} failed: {}", raw_file, e);
                summary.failed.push(raw_file);
            }
        }
    }

    write_json(&summary, &out_dir.join(BEST_CE_FILE_NAME))?;
    Ok(summary)
}

/// Predicts the peptide list found in the search directory.
pub fn run_library_generation(
    config: &Config,
    search_dir: &Path,
    out_dir: &Path,
) -> Result<(), CliError> {
    let mut library = SpectralLibrary::new(config.clone())?;
    library.gen_lib_from_inputs(search_dir, out_dir)?;
    match library.predict_library()? {
        PredictOutcome::Raw(predictions) => {
            write_json(&predictions, &out_dir.join(PREDICTIONS_FILE_NAME))?;
        }
        PredictOutcome::Registered => {
            let path = out_dir.join(LIBRARY_FILE_NAME);
            library
                .library()
                .write_to_file(&path)
                .map_err(|e| CliError::Processing {
                    source: e.to_string(),
                })?;
        }
    }
    Ok(())
}
