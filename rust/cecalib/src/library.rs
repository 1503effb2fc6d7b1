use crate::annotation::{
    AnnotatedSpectrum,
    FragmentIonAnnotator,
    NUM_FRAGMENT_POSITIONS,
    PeakAnnotator,
};
use crate::config::{
    Config,
    JobType,
    TagVariant,
};
use crate::data_sources::fasta::{
    ProteinSequenceCollection,
    peptides_from_proteins,
};
use crate::data_sources::peptide_list::{
    DIGEST_FILE_NAME,
    find_peptide_list,
    read_peptide_list,
    write_peptide_list,
};
use crate::data_sources::raw::load_observed;
use crate::data_sources::search_results::read_search;
use crate::data_sources::{
    ObservedSpectrum,
    Spectra,
};
use crate::errors::{
    DataReadingError,
    Result,
};
use crate::models::{
    FragmentType,
    SparseMatrix,
    SpectrumRecord,
};
use crate::prediction::{
    HCD_CODE,
    HttpPredictor,
    OTHER_FRAGMENTATION_CODE,
    PredictionRequest,
    Predictions,
    Predictor,
    is_tagged_model,
};
use std::collections::HashMap;
use std::path::Path;
use tracing::{
    debug,
    error,
    info,
    warn,
};

pub const CALCULATED_MASS_COLUMN: &str = "CALCULATED_MASS";
pub const PREDICTED_IRT_COLUMN: &str = "PREDICTED_IRT";
pub const PROTEOTYPICITY_COLUMN: &str = "PROTEOTYPICITY";

/// What a prediction run handed back.
#[derive(Debug)]
pub enum PredictOutcome {
    /// Library generation jobs get the predictions untouched.
    Raw(Predictions),
    /// Predictions were registered on the library.
    Registered,
}

/// Builds a [`Spectra`] container from identifications and measured
/// spectra and folds model predictions back into it.
pub struct SpectralLibrary {
    config: Config,
    library: Spectra,
    predictor: Box<dyn Predictor>,
    annotator: Box<dyn PeakAnnotator>,
}

impl SpectralLibrary {
    /// Validates the config and connects to the configured prediction server.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let predictor = HttpPredictor::new(config.prediction_server()?)?;
        Self::from_parts(
            config,
            Box::new(predictor),
            Box::new(FragmentIonAnnotator::default()),
        )
    }

    pub fn from_parts(
        config: Config,
        predictor: Box<dyn Predictor>,
        annotator: Box<dyn PeakAnnotator>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            library: Spectra::new(),
            predictor,
            annotator,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn library(&self) -> &Spectra {
        &self.library
    }

    pub fn set_library(&mut self, library: Spectra) {
        self.library = library;
    }

    pub fn into_library(self) -> Spectra {
        self.library
    }

    /// Reads identifications in the configured search format.
    pub fn read_identifications(&self, path: &Path) -> Result<Vec<SpectrumRecord>> {
        let format = self.config.search_format()?;
        Ok(read_search(path, format)?)
    }

    /// Reads the measured spectra of one raw file in the configured format.
    pub fn read_observed(&self, raw_path: &Path, out_dir: &Path) -> Result<Vec<ObservedSpectrum>> {
        let format = self.config.raw_format()?;
        Ok(load_observed(
            raw_path,
            format,
            &self.config.thermo_converter,
            out_dir,
        )?)
    }

    /// Joins identifications with measured spectra on
    /// `(raw_file, scan_number)`, annotates the matches and replaces the
    /// library with the result.
    ///
    /// Matches that cannot be annotated are dropped with a warning.
    pub fn gen_lib(
        &mut self,
        identifications: Vec<SpectrumRecord>,
        observed: &[ObservedSpectrum],
    ) -> Result<()> {
        let by_key: HashMap<(&str, u32), &ObservedSpectrum> = observed
            .iter()
            .map(|x| ((x.raw_file.as_str(), x.scan_number), x))
            .collect();

        let num_ids = identifications.len();
        let mut records = Vec::with_capacity(num_ids);
        let mut spectra = Vec::with_capacity(num_ids);
        for mut rec in identifications {
            let obs: &ObservedSpectrum = match by_key.get(&rec.key()) {
                Some(x) => *x,
                None => continue,
            };
            if let Some(ce) = obs.collision_energy {
                rec.collision_energy = ce;
            }
            records.push(rec);
            spectra.push(obs);
        }
        info!(
            "Matched {} of {} identifications to {} spectra",
            records.len(),
            num_ids,
            observed.len()
        );

        if records.is_empty() {
            warn!("No identification matched a measured spectrum, library is empty");
            self.library = empty_annotated_library()?;
            return Ok(());
        }

        let mut kept = Vec::with_capacity(records.len());
        let mut annotated: Vec<AnnotatedSpectrum> = Vec::with_capacity(records.len());
        let mut num_failed = 0;
        for (rec, obs) in records.into_iter().zip(spectra.iter()) {
            match self.annotator.annotate(&rec, obs) {
                Ok(x) => {
                    kept.push(rec);
                    annotated.push(x);
                }
                Err(e) => {
                    debug!("Skipping scan {} of {}: {}", rec.scan_number, rec.raw_file, e);
                    num_failed += 1;
                }
            }
        }
        if num_failed > 0 {
            warn!(
                "Dropped {} of {} matched spectra that could not be annotated",
                num_failed,
                num_failed + kept.len()
            );
        }
        if kept.is_empty() {
            self.library = empty_annotated_library()?;
            return Ok(());
        }
        let records = kept;

        let raw: Vec<&[f32]> = annotated.iter().map(|x| x.intensities.as_slice()).collect();
        let mz: Vec<&[f32]> = annotated.iter().map(|x| x.mz.as_slice()).collect();
        let masses: Vec<f64> = annotated.iter().map(|x| x.calculated_mass).collect();

        let mut library = Spectra::new();
        library.add_columns(records)?;
        library.add_matrix(
            SparseMatrix::from_dense_rows(&raw, NUM_FRAGMENT_POSITIONS)?,
            FragmentType::Raw,
        )?;
        library.add_matrix(
            SparseMatrix::from_dense_rows(&mz, NUM_FRAGMENT_POSITIONS)?,
            FragmentType::Mz,
        )?;
        library.add_column(masses, CALCULATED_MASS_COLUMN)?;
        self.library = library;
        Ok(())
    }

    /// Fills the library for a library generation job: the configured
    /// FASTA is digested when set, else the peptide list in `search_dir`
    /// is read.
    pub fn gen_lib_from_inputs(&mut self, search_dir: &Path, out_dir: &Path) -> Result<()> {
        match self.config.fasta_path(search_dir) {
            Some(fasta) => self.gen_lib_from_fasta(&fasta, out_dir),
            None => self.gen_lib_from_peptide_list(search_dir),
        }
    }

    /// Digests `fasta`, keeps the peptide list as [`DIGEST_FILE_NAME`] in
    /// `out_dir` and fills the library with it.
    pub fn gen_lib_from_fasta(&mut self, fasta: &Path, out_dir: &Path) -> Result<()> {
        let proteins = ProteinSequenceCollection::from_fasta_file(fasta)?;
        let peptides = peptides_from_proteins(
            &proteins,
            &self.config.digestion,
            self.config.tag_variant()?,
        )?;
        write_peptide_list(&peptides, out_dir.join(DIGEST_FILE_NAME))?;
        let mut library = Spectra::new();
        library.add_columns(peptides)?;
        self.library = library;
        Ok(())
    }

    /// Fills the library from the peptide list in `search_dir`.
    pub fn gen_lib_from_peptide_list(&mut self, search_dir: &Path) -> Result<()> {
        let path = find_peptide_list(search_dir)?.ok_or_else(|| DataReadingError::IoError {
            source: std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no peptide list (.csv) found",
            ),
            path: search_dir.to_path_buf(),
        })?;
        let peptides = read_peptide_list(&path)?;
        let mut library = Spectra::new();
        library.add_columns(peptides)?;
        self.library = library;
        Ok(())
    }

    fn build_request(&self, records: &[SpectrumRecord], models: &[String]) -> Result<PredictionRequest> {
        let tagged = models.iter().any(|x| is_tagged_model(x));
        let tag = self.config.tag_variant()?;
        let sequences = records
            .iter()
            .map(|x| model_sequence(&x.modified_sequence, tagged, tag))
            .collect();
        let fragmentation = tagged.then(|| {
            records
                .iter()
                .map(|x| {
                    if x.fragmentation.is_hcd() {
                        HCD_CODE
                    } else {
                        OTHER_FRAGMENTATION_CODE
                    }
                })
                .collect()
        });
        Ok(PredictionRequest {
            sequences,
            charges: records.iter().map(|x| x.precursor_charge).collect(),
            collision_energies: records.iter().map(|x| x.collision_energy / 100.0).collect(),
            fragmentation,
            models: models.to_vec(),
        })
    }

    /// Runs the configured models on `library`.
    ///
    /// Library generation jobs get the raw predictions back. Otherwise the
    /// intensity predictions are registered as the PRED matrix and, outside
    /// of alignment mode, retention time and proteotypicity as columns.
    /// In alignment mode only the intensity model is queried.
    ///
    /// A failing prediction service is logged with the offending sequences
    /// and returned as an error; the library is not modified.
    pub fn predict(&self, library: &mut Spectra, alignment: bool) -> Result<PredictOutcome> {
        let models = self.config.models.selected(alignment);
        let job = self.config.job_type()?;
        debug!("Predicting {} rows with {:?}", library.len(), models);

        if library.is_empty() {
            warn!("Library is empty, skipping prediction");
            if job == JobType::SpectralLibraryGeneration {
                return Ok(PredictOutcome::Raw(Predictions::default()));
            }
            library.add_matrix(
                SparseMatrix::empty(NUM_FRAGMENT_POSITIONS),
                FragmentType::Pred,
            )?;
            return Ok(PredictOutcome::Registered);
        }

        let request = self.build_request(library.records(), &models)?;
        let predictions = match self.predictor.predict(&request) {
            Ok(x) => x,
            Err(e) => {
                error!(
                    "Prediction of {} rows with models {:?} failed: {}",
                    request.len(),
                    models,
                    e
                );
                error!("Sequences in the failed request: {:?}", request.sequences);
                return Err(e.into());
            }
        };

        if job == JobType::SpectralLibraryGeneration {
            return Ok(PredictOutcome::Raw(predictions));
        }

        predictions.check_complete(&models, library.len())?;
        let intensities = predictions.intensities(&models[0])?;
        let width = intensities
            .first()
            .map(|x| x.len())
            .unwrap_or(NUM_FRAGMENT_POSITIONS);
        library.add_matrix(
            SparseMatrix::from_dense_rows(intensities, width)?,
            FragmentType::Pred,
        )?;
        if alignment {
            return Ok(PredictOutcome::Registered);
        }

        let scalar_models = [
            (&self.config.models.irt, PREDICTED_IRT_COLUMN),
            (&self.config.models.proteotypicity, PROTEOTYPICITY_COLUMN),
        ];
        for (model, column) in scalar_models {
            let Some(model) = model.as_deref().filter(|x| !x.trim().is_empty()) else {
                continue;
            };
            let values = predictions.scalars(model)?;
            library.add_column(values.iter().map(|x| *x as f64).collect(), column)?;
        }
        Ok(PredictOutcome::Registered)
    }

    /// [`SpectralLibrary::predict`] on the owned library.
    pub fn predict_library(&mut self) -> Result<PredictOutcome> {
        let mut library = std::mem::take(&mut self.library);
        let out = self.predict(&mut library, false);
        self.library = library;
        out
    }
}

/// Sequence as sent to a model.
///
/// Tagged models get the N-terminal tag accession of the configured tag
/// variant removed. The TMTpro accession is dropped everywhere else.
pub fn model_sequence(sequence: &str, tagged: bool, tag: TagVariant) -> String {
    if tagged {
        if let Some(rest) = tag.accession().and_then(|acc| sequence.strip_prefix(acc)) {
            return rest.trim_start_matches('-').to_string();
        }
    }
    sequence.replace("[UNIMOD:2016]", "")
}

fn empty_annotated_library() -> Result<Spectra> {
    let mut library = Spectra::new();
    library.add_matrix(SparseMatrix::empty(NUM_FRAGMENT_POSITIONS), FragmentType::Raw)?;
    library.add_matrix(SparseMatrix::empty(NUM_FRAGMENT_POSITIONS), FragmentType::Mz)?;
    library.add_column(Vec::new(), CALCULATED_MASS_COLUMN)?;
    Ok(library)
}
