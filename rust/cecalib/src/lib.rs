pub mod annotation;
pub mod calibration;
pub mod config;
pub mod data_sources;
pub mod errors;
pub mod library;
pub mod models;
pub mod prediction;
pub mod scoring;
extern crate parquet;
#[macro_use]
extern crate parquet_derive;

pub use calibration::{
    CalibrationState,
    CeAlignment,
    CeCalibration,
};
pub use config::Config;
pub use data_sources::{
    ObservedSpectrum,
    Spectra,
};
pub use errors::{
    CeCalError,
    Result,
};
pub use library::{
    PredictOutcome,
    SpectralLibrary,
};
pub use models::{
    FragmentType,
    SparseMatrix,
    SpectrumRecord,
};
