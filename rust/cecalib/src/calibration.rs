use crate::config::Config;
use crate::data_sources::{
    ObservedSpectrum,
    Spectra,
};
use crate::errors::{
    CeCalError,
    Result,
};
use crate::library::SpectralLibrary;
use crate::models::{
    FragmentType,
    SpectrumRecord,
};
use crate::scoring::{
    AlignmentScore,
    SPECTRAL_ANGLE_COLUMN,
    spectral_angle,
    write_alignment_scores,
};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::ops::Range;
use std::path::{
    Path,
    PathBuf,
};
use tracing::{
    debug,
    info,
    warn,
};

/// Candidate collision energies.
pub const CE_RANGE: Range<u32> = 18..50;
/// Used when a run has no HCD spectra or nothing could be scored.
pub const DEFAULT_CE: f32 = 35.0;
/// Highest scoring spectra kept for the alignment.
pub const MAX_ALIGNMENT_SPECTRA: usize = 1000;

const ARTIFACT_SUFFIX: &str = ".msgpack.zst";
const ALIGNMENT_SCORES_SUFFIX: &str = ".alignment.parquet";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationState {
    Uninitialized,
    LibraryBuilt,
    AlignmentPrepared,
    Predicted,
    Scored,
    Calibrated,
}

/// Mean spectral angle per candidate collision energy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CeAlignment {
    pub mean_scores: BTreeMap<u32, f64>,
}

impl CeAlignment {
    /// Averages `scores` over the collision energy of each record.
    pub fn from_scores(records: &[SpectrumRecord], scores: &[f32]) -> Self {
        let mut sums: BTreeMap<u32, (f64, usize)> = BTreeMap::new();
        for (rec, score) in records.iter().zip(scores.iter()) {
            let entry = sums
                .entry(rec.collision_energy.round() as u32)
                .or_insert((0.0, 0));
            entry.0 += *score as f64;
            entry.1 += 1;
        }
        let mean_scores = sums
            .into_iter()
            .map(|(ce, (sum, n))| (ce, sum / n as f64))
            .collect();
        Self { mean_scores }
    }

    /// Collision energy with the highest mean score.
    /// Ties go to the lowest collision energy, NaN means never win.
    pub fn best(&self) -> Option<(u32, f64)> {
        let mut best: Option<(u32, f64)> = None;
        for (&ce, &score) in self.mean_scores.iter() {
            if score.is_nan() {
                continue;
            }
            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ => best = Some((ce, score)),
            }
        }
        best
    }

    pub fn is_empty(&self) -> bool {
        self.mean_scores.is_empty()
    }
}

/// Replicates `rows` of `library` once per collision energy in `energies`,
/// overwriting the collision energy of every replica.
///
/// The output is laid out in blocks, one block of `rows.len()` rows per
/// energy, in ascending energy order.
pub fn expand_ce_grid(library: &Spectra, rows: &[usize], energies: Range<u32>) -> Spectra {
    let energies: Vec<u32> = energies.collect();
    let replicated: Vec<usize> = energies
        .iter()
        .flat_map(|_| rows.iter().copied())
        .collect();
    let mut out = library.select_rows(&replicated);
    if !rows.is_empty() {
        for (block, ce) in out
            .records_mut()
            .chunks_mut(rows.len())
            .zip(energies.iter())
        {
            block.iter_mut().for_each(|x| x.collision_energy = *ce as f32);
        }
    }
    out
}

/// Indices of the HCD target rows, highest score first, at most `limit`.
/// Equal scores keep their table order, NaN scores go last.
pub fn select_alignment_rows(records: &[SpectrumRecord], limit: usize) -> Vec<usize> {
    let mut rows: Vec<usize> = records
        .iter()
        .enumerate()
        .filter(|(_, x)| x.fragmentation.is_hcd() && !x.reverse)
        .map(|(i, _)| i)
        .collect();
    rows.sort_by(|&a, &b| {
        let (x, y) = (records[a].score, records[b].score);
        match (x.is_nan(), y.is_nan()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => y.total_cmp(&x),
        }
    });
    rows.truncate(limit);
    rows
}

/// Finds the collision energy at which predicted spectra agree best with
/// the measured ones for a single raw file.
///
/// Build one per raw file; instances share nothing. Two instances must not
/// target the same `out_path` at the same time since the annotated library
/// is cached there.
pub struct CeCalibration {
    base: SpectralLibrary,
    raw_path: PathBuf,
    out_path: PathBuf,
    state: CalibrationState,
    alignment_library: Option<Spectra>,
    ce_alignment: Option<CeAlignment>,
    best_ce: Option<f32>,
}

impl CeCalibration {
    pub fn new(raw_path: impl AsRef<Path>, out_path: impl AsRef<Path>, config: Config) -> Result<Self> {
        Ok(Self::from_library(
            raw_path,
            out_path,
            SpectralLibrary::new(config)?,
        ))
    }

    pub fn from_library(
        raw_path: impl AsRef<Path>,
        out_path: impl AsRef<Path>,
        base: SpectralLibrary,
    ) -> Self {
        Self {
            base,
            raw_path: raw_path.as_ref().to_path_buf(),
            out_path: out_path.as_ref().to_path_buf(),
            state: CalibrationState::Uninitialized,
            alignment_library: None,
            ce_alignment: None,
            best_ce: None,
        }
    }

    fn with_suffix(&self, suffix: &str) -> PathBuf {
        let mut out = self.out_path.clone().into_os_string();
        out.push(suffix);
        PathBuf::from(out)
    }

    /// Where the annotated library is cached.
    pub fn artifact_path(&self) -> PathBuf {
        self.with_suffix(ARTIFACT_SUFFIX)
    }

    pub fn alignment_scores_path(&self) -> PathBuf {
        self.with_suffix(ALIGNMENT_SCORES_SUFFIX)
    }

    pub fn state(&self) -> CalibrationState {
        self.state
    }

    pub fn best_ce(&self) -> Option<f32> {
        self.best_ce
    }

    pub fn ce_alignment(&self) -> Option<&CeAlignment> {
        self.ce_alignment.as_ref()
    }

    pub fn library(&self) -> &Spectra {
        self.base.library()
    }

    pub fn alignment_library(&self) -> Option<&Spectra> {
        self.alignment_library.as_ref()
    }

    fn require(&self, operation: &'static str, state: CalibrationState) -> Result<()> {
        if self.state != state {
            return Err(CeCalError::InvalidState {
                operation,
                state: format!("{:?}", self.state),
            });
        }
        Ok(())
    }

    pub fn load_rawfile(&self) -> Result<Vec<ObservedSpectrum>> {
        let out_dir = match self.out_path.parent() {
            Some(x) if !x.as_os_str().is_empty() => x.to_path_buf(),
            _ => PathBuf::from("."),
        };
        self.base.read_observed(&self.raw_path, &out_dir)
    }

    pub fn gen_lib(&mut self, identifications: Vec<SpectrumRecord>) -> Result<()> {
        let observed = self.load_rawfile()?;
        self.base.gen_lib(identifications, &observed)
    }

    pub fn write_metadata_annotation(&self) -> Result<()> {
        self.base.library().write_to_file(self.artifact_path())?;
        Ok(())
    }

    /// Runs the whole calibration and returns the best collision energy.
    ///
    /// The annotated library is read from the artifact when present, else
    /// built from `identifications` and the raw file and then saved.
    pub fn perform_alignment(&mut self, identifications: Vec<SpectrumRecord>) -> Result<f32> {
        self.state = CalibrationState::Uninitialized;
        self.alignment_library = None;
        self.ce_alignment = None;
        self.best_ce = None;

        let artifact = self.artifact_path();
        if artifact.exists() {
            info!("Loading annotated library from {}", artifact.display());
            self.base.set_library(Spectra::read_from_file(&artifact)?);
        } else {
            self.gen_lib(identifications)?;
            info!("Saving annotated library to {}", artifact.display());
            self.write_metadata_annotation()?;
        }
        self.state = CalibrationState::LibraryBuilt;

        if !self.library().records().iter().any(|x| x.fragmentation.is_hcd()) {
            info!(
                "No HCD spectra in {}, using default collision energy {}",
                self.raw_path.display(),
                DEFAULT_CE
            );
            self.best_ce = Some(DEFAULT_CE);
            self.state = CalibrationState::Calibrated;
            return Ok(DEFAULT_CE);
        }

        self.prepare_alignment()?;
        self.predict_alignment()?;
        self.alignment()?;
        self.get_best_ce()
    }

    /// Keeps the best scoring HCD target spectra and replicates them over
    /// [`CE_RANGE`].
    pub fn prepare_alignment(&mut self) -> Result<&Spectra> {
        self.require("prepare_alignment", CalibrationState::LibraryBuilt)?;
        let library = self.base.library();
        let rows = select_alignment_rows(library.records(), MAX_ALIGNMENT_SPECTRA);
        info!(
            "Using {} of {} spectra for the collision energy alignment",
            rows.len(),
            library.len()
        );
        let expanded = expand_ce_grid(library, &rows, CE_RANGE);
        debug!("Alignment library has {} rows", expanded.len());
        self.state = CalibrationState::AlignmentPrepared;
        Ok(self.alignment_library.insert(expanded))
    }

    pub fn predict_alignment(&mut self) -> Result<()> {
        self.require("predict_alignment", CalibrationState::AlignmentPrepared)?;
        let Some(mut library) = self.alignment_library.take() else {
            return Err(CeCalError::InvalidState {
                operation: "predict_alignment",
                state: "missing an alignment library".to_string(),
            });
        };
        let res = self.base.predict(&mut library, true);
        self.alignment_library = Some(library);
        res?;
        self.state = CalibrationState::Predicted;
        Ok(())
    }

    /// Scores every row of the alignment library and averages per
    /// collision energy.
    pub fn alignment(&mut self) -> Result<&CeAlignment> {
        self.require("alignment", CalibrationState::Predicted)?;
        let Some(library) = self.alignment_library.as_mut() else {
            return Err(CeCalError::InvalidState {
                operation: "alignment",
                state: "missing an alignment library".to_string(),
            });
        };
        let scores = spectral_angle(
            library.get_matrix(FragmentType::Pred)?,
            library.get_matrix(FragmentType::Raw)?,
        )?;
        let ce_alignment = CeAlignment::from_scores(library.records(), &scores);
        library.add_column(
            scores.iter().map(|x| *x as f64).collect(),
            SPECTRAL_ANGLE_COLUMN,
        )?;
        self.state = CalibrationState::Scored;
        Ok(self.ce_alignment.insert(ce_alignment))
    }

    pub fn get_best_ce(&mut self) -> Result<f32> {
        self.require("get_best_ce", CalibrationState::Scored)?;
        let best = self.ce_alignment.as_ref().and_then(|x| x.best());
        let best_ce = match best {
            Some((ce, score)) => {
                info!(
                    "Best collision energy for {} is {} (mean spectral angle {:.4})",
                    self.raw_path.display(),
                    ce,
                    score
                );
                ce as f32
            }
            None => {
                warn!(
                    "Nothing to score for {}, using default collision energy {}",
                    self.raw_path.display(),
                    DEFAULT_CE
                );
                DEFAULT_CE
            }
        };
        self.best_ce = Some(best_ce);
        self.state = CalibrationState::Calibrated;
        Ok(best_ce)
    }

    /// Writes the per row scores of the alignment library, if one was scored.
    pub fn write_alignment_scores(&self) -> Result<Option<PathBuf>> {
        let Some(library) = self.alignment_library.as_ref() else {
            return Ok(None);
        };
        if library.column(SPECTRAL_ANGLE_COLUMN).is_err() {
            return Ok(None);
        }
        let scores = AlignmentScore::from_scored_library(library)?;
        let path = self.alignment_scores_path();
        write_alignment_scores(&scores, &path)?;
        Ok(Some(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{
        FragmentIonAnnotator,
        IonSeries,
        NUM_FRAGMENT_POSITIONS,
        fragment_position,
    };
    use crate::data_sources::raw::write_test_mzml;
    use crate::library::tests::{
        FixedPredictor,
        ScanAnnotator,
        test_config,
    };
    use crate::models::{
        Fragmentation,
        SparseMatrix,
    };

    fn records(n: usize) -> Vec<SpectrumRecord> {
        (0..n)
            .map(|i| SpectrumRecord {
                scan_number: i as u32 + 1,
                score: i as f64,
                ..SpectrumRecord::sample()
            })
            .collect()
    }

    fn annotated(records: Vec<SpectrumRecord>) -> Spectra {
        let rows: Vec<Vec<f32>> = records
            .iter()
            .map(|x| {
                let mut row = vec![0.0; NUM_FRAGMENT_POSITIONS];
                row[0] = 1.0;
                row[1] = x.scan_number as f32;
                row
            })
            .collect();
        let mut lib = Spectra::new();
        lib.add_columns(records).unwrap();
        lib.add_matrix(
            SparseMatrix::from_dense_rows(&rows, NUM_FRAGMENT_POSITIONS).unwrap(),
            FragmentType::Raw,
        )
        .unwrap();
        lib
    }

    fn calibration(dir: &Path, predictor: FixedPredictor) -> CeCalibration {
        let base =
            SpectralLibrary::from_parts(test_config(), Box::new(predictor), Box::new(ScanAnnotator))
                .unwrap();
        CeCalibration::from_library(dir.join("run01.mzML"), dir.join("run01"), base)
    }

    #[test]
    fn test_paths() {
        let dir = tempfile::tempdir().unwrap();
        let cal = calibration(dir.path(), FixedPredictor::new(vec![]));
        assert_eq!(cal.artifact_path(), dir.path().join("run01.msgpack.zst"));
        assert_eq!(
            cal.alignment_scores_path(),
            dir.path().join("run01.alignment.parquet")
        );
    }

    #[test]
    fn test_expand_ce_grid() {
        let lib = annotated(records(3));
        let out = expand_ce_grid(&lib, &[2, 0], 18..21);
        assert_eq!(out.len(), 6);
        let ces: Vec<f32> = out.records().iter().map(|x| x.collision_energy).collect();
        assert_eq!(ces, vec![18.0, 18.0, 19.0, 19.0, 20.0, 20.0]);
        let scans: Vec<u32> = out.records().iter().map(|x| x.scan_number).collect();
        assert_eq!(scans, vec![3, 1, 3, 1, 3, 1]);
        let raw = out.get_matrix(FragmentType::Raw).unwrap();
        assert_eq!(raw.row_dense(4)[1], 3.0);
        // source untouched
        assert!(lib.records().iter().all(|x| x.collision_energy == 30.0));
    }

    #[test]
    fn test_expand_ce_grid_empty_selection() {
        let lib = annotated(records(3));
        let out = expand_ce_grid(&lib, &[], CE_RANGE);
        assert!(out.is_empty());
        assert!(out.has_matrix(FragmentType::Raw));
    }

    #[test]
    fn test_select_alignment_rows() {
        let mut recs = records(6);
        recs[5].reverse = true;
        recs[4].fragmentation = Fragmentation::Cid;
        recs[0].score = 3.0;
        let rows = select_alignment_rows(&recs, 3);
        // scores: 3, 1, 2, 3, (cid), (decoy)
        assert_eq!(rows, vec![0, 3, 2]);
    }

    #[test]
    fn test_select_alignment_rows_nan_scores_last() {
        let mut recs = records(4);
        recs[0].score = f64::NAN;
        recs[1].score = 5.0;
        recs[2].score = f64::NAN;
        recs[3].score = 1.0;
        assert_eq!(select_alignment_rows(&recs, 2), vec![1, 3]);
        assert_eq!(select_alignment_rows(&recs, 4), vec![1, 3, 0, 2]);
    }

    #[test]
    fn test_best_ce_tie_goes_to_lowest() {
        let alignment = CeAlignment {
            mean_scores: [(18, 0.5), (25, 0.9), (30, 0.9), (40, f64::NAN)]
                .into_iter()
                .collect(),
        };
        assert_eq!(alignment.best(), Some((25, 0.9)));
        assert_eq!(CeAlignment::default().best(), None);
    }

    #[test]
    fn test_alignment_means() {
        let mut recs = records(4);
        recs[0].collision_energy = 20.0;
        recs[1].collision_energy = 20.0;
        recs[2].collision_energy = 21.0;
        recs[3].collision_energy = 21.0;
        let alignment = CeAlignment::from_scores(&recs, &[0.2, 0.4, 1.0, 0.0]);
        assert!((alignment.mean_scores[&20] - 0.3).abs() < 1e-6);
        assert!((alignment.mean_scores[&21] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_no_hcd_uses_default() {
        let dir = tempfile::tempdir().unwrap();
        let predictor = FixedPredictor::new(vec![1.0; NUM_FRAGMENT_POSITIONS]);
        let requests = predictor.requests.clone();
        let mut cal = calibration(dir.path(), predictor);
        let mut recs = records(5);
        recs.iter_mut().for_each(|x| x.fragmentation = Fragmentation::Cid);
        annotated(recs).write_to_file(cal.artifact_path()).unwrap();

        assert_eq!(cal.perform_alignment(Vec::new()).unwrap(), 35.0);
        assert_eq!(cal.state(), CalibrationState::Calibrated);
        assert!(requests.borrow().is_empty());
        assert!(cal.alignment_library().is_none());
    }

    #[test]
    fn test_perform_alignment_from_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let mut row = vec![0.0; NUM_FRAGMENT_POSITIONS];
        row[0] = 1.0;
        let predictor = FixedPredictor::new(row);
        let requests = predictor.requests.clone();
        let mut cal = calibration(dir.path(), predictor);
        annotated(records(10)).write_to_file(cal.artifact_path()).unwrap();

        let best = cal.perform_alignment(Vec::new()).unwrap();
        // identical predictions for every energy
        assert_eq!(best, 18.0);
        assert_eq!(cal.best_ce(), Some(18.0));
        let alignment = cal.ce_alignment().unwrap();
        assert_eq!(alignment.mean_scores.len(), CE_RANGE.len());

        let requests = requests.borrow();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].len(), 10 * CE_RANGE.len());
        assert_eq!(requests[0].models.len(), 1);
        assert_eq!(requests[0].collision_energies[0], 0.18);

        let written = cal.write_alignment_scores().unwrap().unwrap();
        assert!(written.exists());
    }

    #[test]
    fn test_decoys_only_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let predictor = FixedPredictor::new(vec![1.0; NUM_FRAGMENT_POSITIONS]);
        let requests = predictor.requests.clone();
        let mut cal = calibration(dir.path(), predictor);
        let mut recs = records(3);
        recs.iter_mut().for_each(|x| x.reverse = true);
        annotated(recs).write_to_file(cal.artifact_path()).unwrap();

        assert_eq!(cal.perform_alignment(Vec::new()).unwrap(), DEFAULT_CE);
        assert!(requests.borrow().is_empty());
        assert!(cal.ce_alignment().unwrap().is_empty());
    }

    #[test]
    fn test_prediction_failure_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let mut predictor = FixedPredictor::new(vec![]);
        predictor.fail = true;
        let mut cal = calibration(dir.path(), predictor);
        annotated(records(2)).write_to_file(cal.artifact_path()).unwrap();

        let res = cal.perform_alignment(Vec::new());
        assert!(matches!(res, Err(CeCalError::Prediction(_))));
        assert_eq!(cal.state(), CalibrationState::AlignmentPrepared);
        assert!(cal.best_ce().is_none());
    }

    #[test]
    fn test_out_of_order_transition() {
        let dir = tempfile::tempdir().unwrap();
        let mut cal = calibration(dir.path(), FixedPredictor::new(vec![]));
        assert!(matches!(
            cal.get_best_ce(),
            Err(CeCalError::InvalidState { .. })
        ));
        assert!(matches!(
            cal.prepare_alignment(),
            Err(CeCalError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_missing_raw_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut cal = calibration(dir.path(), FixedPredictor::new(vec![]));
        let res = cal.perform_alignment(records(2));
        assert!(matches!(res, Err(CeCalError::DataReading(_))));
        assert_eq!(cal.state(), CalibrationState::Uninitialized);
        assert!(!cal.artifact_path().exists());
    }

    #[test]
    fn test_perform_alignment_from_mzml() {
        let dir = tempfile::tempdir().unwrap();
        write_test_mzml(&dir.path().join("run01.mzML")).unwrap();
        let y1 = fragment_position(IonSeries::Y, 1, 1);
        let b2 = fragment_position(IonSeries::B, 2, 1);
        let mut row = vec![0.0; NUM_FRAGMENT_POSITIONS];
        row[y1] = 0.5;
        row[b2] = 1.0;
        let predictor = FixedPredictor::new(row);
        let requests = predictor.requests.clone();
        let base = SpectralLibrary::from_parts(
            test_config(),
            Box::new(predictor),
            Box::new(FragmentIonAnnotator::default()),
        )
        .unwrap();
        let mut cal = CeCalibration::from_library(
            dir.path().join("run01.mzML"),
            dir.path().join("run01"),
            base,
        );
        assert!(!cal.artifact_path().exists());

        let mut ids = records(3);
        ids[0].scan_number = 2;
        ids[1].scan_number = 3;
        // scan 9 is not in the file
        ids[2].scan_number = 9;
        let best = cal.perform_alignment(ids).unwrap();

        assert!(cal.artifact_path().exists());
        let lib = cal.library();
        assert_eq!(lib.len(), 2);
        let ces: Vec<f32> = lib.records().iter().map(|x| x.collision_energy).collect();
        assert_eq!(ces, vec![27.0, 30.0]);
        let raw = lib.get_matrix(FragmentType::Raw).unwrap();
        assert!((raw.row_dense(0)[y1] - 0.5).abs() < 1e-6);
        assert!((raw.row_dense(0)[b2] - 1.0).abs() < 1e-6);
        assert!(raw.row_dense(1).iter().all(|x| *x == 0.0));

        // scan 2 matches the prediction, scan 3 has no annotated peaks
        let alignment = cal.ce_alignment().unwrap();
        assert!(alignment.mean_scores.values().all(|x| (x - 0.5).abs() < 1e-3));
        assert_eq!(best, 18.0);
        assert_eq!(requests.borrow()[0].len(), 2 * CE_RANGE.len());
    }
}
