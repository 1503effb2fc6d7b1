use crate::models::FragmentType;
use std::fmt::Display;
use std::path::PathBuf;

#[derive(Debug)]
pub enum ConfigError {
    UnsupportedSearchType(String),
    UnsupportedRawType(String),
    UnsupportedTag(String),
    UnsupportedJobType(String),
    UnsupportedEnzyme(String),
    InvalidDigestion(String),
    MissingIntensityModel,
    MissingPredictionServer,
    FileReadingError {
        source: std::io::Error,
        path: PathBuf,
    },
    ParseError {
        source: serde_json::Error,
        path: Option<PathBuf>,
    },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedSearchType(x) => write!(f, "{} is not supported as search-type", x),
            Self::UnsupportedRawType(x) => write!(f, "{} is not supported as rawfile-type", x),
            Self::UnsupportedTag(x) => write!(f, "{} is not supported as tag", x),
            Self::UnsupportedJobType(x) => write!(f, "{} is not supported as job type", x),
            Self::UnsupportedEnzyme(x) => write!(f, "{} is not supported as enzyme", x),
            Self::InvalidDigestion(x) => write!(f, "Invalid digestion settings: {}", x),
            Self::MissingIntensityModel => write!(f, "No intensity model configured"),
            Self::MissingPredictionServer => {
                write!(f, "No prediction server configured")
            }
            Self::FileReadingError { source, path } => {
                write!(f, "Error reading config file {}: {}", path.display(), source)
            }
            Self::ParseError { source, path } => match path {
                Some(path) => write!(f, "Error parsing config file {}: {}", path.display(), source),
                None => write!(f, "Error parsing config: {}", source),
            },
        }
    }
}

/// Violations of the row alignment between the metadata table and
/// the matrices of a [`crate::Spectra`] container.
#[derive(Debug)]
pub enum SpectraError {
    RowCountMismatch {
        expected: usize,
        other: usize,
        context: &'static str,
    },
    MissingMatrix(FragmentType),
    MissingColumn(String),
    ColumnWidthMismatch {
        fragment_type: FragmentType,
        expected: usize,
        other: usize,
    },
    SerializationError(String),
    FileError {
        source: std::io::Error,
        path: PathBuf,
    },
}

impl Display for SpectraError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RowCountMismatch {
                expected,
                other,
                context,
            } => write!(
                f,
                "Expected {} rows but got {} ({})",
                expected, other, context
            ),
            Self::MissingMatrix(x) => write!(f, "No matrix registered for {:?}", x),
            Self::MissingColumn(x) => write!(f, "No column named {}", x),
            Self::ColumnWidthMismatch {
                fragment_type,
                expected,
                other,
            } => write!(
                f,
                "{:?} matrix has {} fragment positions, library uses {}",
                fragment_type, other, expected
            ),
            Self::SerializationError(x) => write!(f, "Error (de)serializing library: {}", x),
            Self::FileError { source, path } => {
                write!(f, "Error accessing {}: {}", path.display(), source)
            }
        }
    }
}

#[derive(Debug)]
pub enum DataProcessingError {
    ExpectedSameShape {
        expected: (usize, usize),
        other: (usize, usize),
        context: String,
    },
    ExpectedRowWidth {
        expected: usize,
        other: usize,
        row: usize,
    },
}

impl Display for DataProcessingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug)]
pub enum DataReadingError {
    IoError {
        source: std::io::Error,
        path: PathBuf,
    },
    CsvError {
        source: csv::Error,
        path: PathBuf,
    },
    InvalidField {
        field: &'static str,
        value: String,
        path: PathBuf,
    },
    SpectrumDecodingError {
        scan: String,
        msg: String,
    },
    ConverterFailed {
        command: String,
        msg: String,
    },
}

impl Display for DataReadingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IoError { source, path } => {
                write!(f, "Error reading {}: {}", path.display(), source)
            }
            Self::CsvError { source, path } => {
                write!(f, "Error parsing {}: {}", path.display(), source)
            }
            Self::InvalidField { field, value, path } => write!(
                f,
                "Invalid value {:?} for {} in {}",
                value,
                field,
                path.display()
            ),
            Self::SpectrumDecodingError { scan, msg } => {
                write!(f, "Unable to decode spectrum {}: {}", scan, msg)
            }
            Self::ConverterFailed { command, msg } => {
                write!(f, "Raw file conversion with `{}` failed: {}", command, msg)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationError {
    InvalidSequence { sequence: String, reason: String },
}

impl Display for AnnotationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidSequence { sequence, reason } => {
                write!(f, "Unable to interpret sequence {}: {}", sequence, reason)
            }
        }
    }
}

#[derive(Debug)]
pub enum PredictionError {
    Transport(String),
    InvalidRequest(String),
    Rejected { status: u16, body: String },
    MalformedResponse(String),
    MissingModelOutput(String),
    UnexpectedOutputLength {
        model: String,
        expected: usize,
        other: usize,
    },
}

impl Display for PredictionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(x) => write!(f, "Prediction service unreachable: {}", x),
            Self::InvalidRequest(x) => write!(f, "Unable to encode prediction request: {}", x),
            Self::Rejected { status, body } => {
                write!(f, "Prediction service rejected request ({}): {}", status, body)
            }
            Self::MalformedResponse(x) => write!(f, "Malformed prediction response: {}", x),
            Self::MissingModelOutput(x) => write!(f, "No predictions returned for model {}", x),
            Self::UnexpectedOutputLength {
                model,
                expected,
                other,
            } => write!(
                f,
                "Model {} returned {} predictions, expected {}",
                model, other, expected
            ),
        }
    }
}

#[derive(Debug)]
pub enum CeCalError {
    Config(ConfigError),
    Spectra(SpectraError),
    DataProcessing(DataProcessingError),
    DataReading(DataReadingError),
    Annotation(AnnotationError),
    Prediction(PredictionError),
    Parquet(parquet::errors::ParquetError),
    InvalidState {
        operation: &'static str,
        state: String,
    },
    Io {
        source: std::io::Error,
        path: Option<PathBuf>,
    },
}

impl Display for CeCalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(x) => write!(f, "Configuration error: {}", x),
            Self::Spectra(x) => write!(f, "{}", x),
            Self::DataProcessing(x) => write!(f, "{}", x),
            Self::DataReading(x) => write!(f, "{}", x),
            Self::Annotation(x) => write!(f, "Annotation error: {}", x),
            Self::Prediction(x) => write!(f, "{}", x),
            Self::Parquet(x) => write!(f, "Error writing parquet: {}", x),
            Self::InvalidState { operation, state } => {
                write!(f, "Cannot run {} while calibration is {}", operation, state)
            }
            Self::Io { source, path } => match path {
                Some(path) => write!(f, "IO error at {}: {}", path.display(), source),
                None => write!(f, "IO error: {}", source),
            },
        }
    }
}

impl std::error::Error for CeCalError {}

pub type Result<T> = std::result::Result<T, CeCalError>;

impl From<ConfigError> for CeCalError {
    fn from(x: ConfigError) -> Self {
        Self::Config(x)
    }
}

impl From<SpectraError> for CeCalError {
    fn from(x: SpectraError) -> Self {
        Self::Spectra(x)
    }
}

impl From<DataProcessingError> for CeCalError {
    fn from(x: DataProcessingError) -> Self {
        Self::DataProcessing(x)
    }
}

impl From<DataReadingError> for CeCalError {
    fn from(x: DataReadingError) -> Self {
        Self::DataReading(x)
    }
}

impl From<AnnotationError> for CeCalError {
    fn from(x: AnnotationError) -> Self {
        Self::Annotation(x)
    }
}

impl From<PredictionError> for CeCalError {
    fn from(x: PredictionError) -> Self {
        Self::Prediction(x)
    }
}

impl From<parquet::errors::ParquetError> for CeCalError {
    fn from(x: parquet::errors::ParquetError) -> Self {
        Self::Parquet(x)
    }
}
