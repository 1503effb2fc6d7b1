use crate::errors::ConfigError;
use serde::{
    Deserialize,
    Serialize,
};
use std::path::{
    Path,
    PathBuf,
};
use std::str::FromStr;
use tracing::debug;

/// What a run produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobType {
    CollisionEnergyCalibration,
    SpectralLibraryGeneration,
}

impl FromStr for JobType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CollisionEnergyCalibration" => Ok(Self::CollisionEnergyCalibration),
            "SpectralLibraryGeneration" => Ok(Self::SpectralLibraryGeneration),
            other => Err(ConfigError::UnsupportedJobType(other.to_string())),
        }
    }
}

/// Format of the identification (search engine) results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchFormat {
    Internal,
    MaxQuant,
}

impl FromStr for SearchFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "internal" => Ok(Self::Internal),
            "maxquant" => Ok(Self::MaxQuant),
            _ => Err(ConfigError::UnsupportedSearchType(s.to_string())),
        }
    }
}

/// Format of the measured spectra.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawFormat {
    MzML,
    Thermo,
}

impl RawFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::MzML => "mzML",
            Self::Thermo => "raw",
        }
    }
}

impl FromStr for RawFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mzml" => Ok(Self::MzML),
            "thermo" => Ok(Self::Thermo),
            _ => Err(ConfigError::UnsupportedRawType(s.to_string())),
        }
    }
}

/// Isobaric labelling of the sample, decides which N-terminal
/// accession is trimmed before querying a tagged model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagVariant {
    Untagged,
    Tmt,
    TmtPro,
}

impl TagVariant {
    /// N-terminal accession carried by tagged sequences.
    pub fn accession(&self) -> Option<&'static str> {
        match self {
            Self::Untagged => None,
            Self::Tmt => Some("[UNIMOD:737]"),
            Self::TmtPro => Some("[UNIMOD:2016]"),
        }
    }
}

impl FromStr for TagVariant {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "" => Ok(Self::Untagged),
            "tmt" => Ok(Self::Tmt),
            "tmtpro" => Ok(Self::TmtPro),
            _ => Err(ConfigError::UnsupportedTag(s.to_string())),
        }
    }
}

/// Cleavage rule of the in-silico digestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enzyme {
    /// After K or R, not before P.
    Trypsin,
    /// After K or R.
    TrypsinP,
}

impl FromStr for Enzyme {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trypsin" => Ok(Self::Trypsin),
            "trypsinp" | "trypsin/p" => Ok(Self::TrypsinP),
            _ => Err(ConfigError::UnsupportedEnzyme(s.to_string())),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct ModelsConfig {
    #[serde(default)]
    pub intensity: Option<String>,
    #[serde(default)]
    pub irt: Option<String>,
    #[serde(default)]
    pub proteotypicity: Option<String>,
}

impl ModelsConfig {
    /// Configured model ids in intensity, irt, proteotypicity order.
    /// Only the first one is returned in alignment mode.
    pub fn selected(&self, alignment: bool) -> Vec<String> {
        let all = [&self.intensity, &self.irt, &self.proteotypicity];
        let iter = all
            .into_iter()
            .flatten()
            .filter(|x| !x.trim().is_empty())
            .cloned();
        if alignment {
            iter.take(1).collect()
        } else {
            iter.collect()
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PredictionServerConfig {
    pub url: String,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_timeout() -> u64 {
    300
}

fn default_batch_size() -> usize {
    1000
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct InputConfig {
    #[serde(default = "default_search_type")]
    pub search_type: String,
    #[serde(default = "default_raw_type")]
    pub raw_type: String,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            search_type: default_search_type(),
            raw_type: default_raw_type(),
        }
    }
}

fn default_search_type() -> String {
    "maxquant".to_string()
}

fn default_raw_type() -> String {
    "thermo".to_string()
}

/// How a FASTA file is turned into a peptide list.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct DigestionConfig {
    pub enzyme: String,
    pub min_length: usize,
    pub max_length: usize,
    pub max_missed_cleavages: usize,
    /// Every peptide is listed once per charge.
    pub precursor_charges: Vec<u8>,
    pub collision_energy: f32,
    pub fragmentation: String,
}

impl Default for DigestionConfig {
    fn default() -> Self {
        Self {
            enzyme: "trypsin".to_string(),
            min_length: 7,
            max_length: 30,
            max_missed_cleavages: 2,
            precursor_charges: vec![2, 3],
            collision_energy: 30.0,
            fragmentation: "HCD".to_string(),
        }
    }
}

impl DigestionConfig {
    pub fn enzyme(&self) -> Result<Enzyme, ConfigError> {
        self.enzyme.parse()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.enzyme()?;
        if self.min_length == 0 || self.min_length > self.max_length {
            return Err(ConfigError::InvalidDigestion(format!(
                "peptide length range {}..={} is empty",
                self.min_length, self.max_length
            )));
        }
        if self.precursor_charges.is_empty() {
            return Err(ConfigError::InvalidDigestion(
                "no precursor charges".to_string(),
            ));
        }
        if let Some(x) = self.precursor_charges.iter().find(|x| !(1..=6).contains(*x)) {
            return Err(ConfigError::InvalidDigestion(format!(
                "precursor charge {} outside 1..=6",
                x
            )));
        }
        if self.collision_energy.is_nan() || self.collision_energy <= 0.0 {
            return Err(ConfigError::InvalidDigestion(format!(
                "collision energy {} is not positive",
                self.collision_energy
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct OutputConfig {
    pub directory: PathBuf,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Config {
    #[serde(rename = "type", default = "default_job_type")]
    pub job_type: String,
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub models: ModelsConfig,
    pub prediction_server: Option<PredictionServerConfig>,
    #[serde(default)]
    pub inputs: InputConfig,
    pub output: Option<OutputConfig>,
    #[serde(default = "default_thermo_converter")]
    pub thermo_converter: String,
    /// Protein database for library generation, used instead of a
    /// peptide list when set.
    #[serde(default)]
    pub fasta: Option<PathBuf>,
    #[serde(default)]
    pub digestion: DigestionConfig,
}

fn default_job_type() -> String {
    "CollisionEnergyCalibration".to_string()
}

fn default_thermo_converter() -> String {
    "ThermoRawFileParser".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            job_type: default_job_type(),
            tag: String::new(),
            models: ModelsConfig::default(),
            prediction_server: None,
            inputs: InputConfig::default(),
            output: None,
            thermo_converter: default_thermo_converter(),
            fasta: None,
            digestion: DigestionConfig::default(),
        }
    }
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::FileReadingError {
                source: e,
                path: path.to_path_buf(),
            })?;
        let config: Config =
            serde_json::from_str(&content).map_err(|e| ConfigError::ParseError {
                source: e,
                path: Some(path.to_path_buf()),
            })?;
        debug!("Loaded config from {}: {:?}", path.display(), config);
        Ok(config)
    }

    /// Checks every selector and the model setup, no I/O involved.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.job_type()?;
        self.search_format()?;
        self.raw_format()?;
        self.tag_variant()?;
        self.digestion.validate()?;
        if self.models.intensity.as_deref().is_none_or(|x| x.trim().is_empty()) {
            return Err(ConfigError::MissingIntensityModel);
        }
        Ok(())
    }

    pub fn job_type(&self) -> Result<JobType, ConfigError> {
        self.job_type.parse()
    }

    pub fn search_format(&self) -> Result<SearchFormat, ConfigError> {
        self.inputs.search_type.parse()
    }

    pub fn raw_format(&self) -> Result<RawFormat, ConfigError> {
        self.inputs.raw_type.parse()
    }

    pub fn tag_variant(&self) -> Result<TagVariant, ConfigError> {
        self.tag.parse()
    }

    /// FASTA file to digest, relative paths resolve against `search_dir`.
    pub fn fasta_path(&self, search_dir: &Path) -> Option<PathBuf> {
        self.fasta.as_ref().map(|x| {
            if x.is_absolute() {
                x.clone()
            } else {
                search_dir.join(x)
            }
        })
    }

    pub fn prediction_server(&self) -> Result<&PredictionServerConfig, ConfigError> {
        self.prediction_server
            .as_ref()
            .ok_or(ConfigError::MissingPredictionServer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_json() -> &'static str {
        r#"{
            "type": "CollisionEnergyCalibration",
            "tag": "tmt",
            "models": {
                "intensity": "Prosit_2020_intensity_TMT",
                "irt": "Prosit_2020_irt_TMT"
            },
            "prediction_server": {"url": "http://localhost:8501"},
            "inputs": {"search_type": "maxquant", "raw_type": "mzml"},
            "output": {"directory": "out"}
        }"#
    }

    #[test]
    fn test_parse_config() {
        let config: Config = serde_json::from_str(sample_json()).unwrap();
        config.validate().unwrap();
        assert_eq!(config.job_type().unwrap(), JobType::CollisionEnergyCalibration);
        assert_eq!(config.search_format().unwrap(), SearchFormat::MaxQuant);
        assert_eq!(config.raw_format().unwrap(), RawFormat::MzML);
        assert_eq!(config.tag_variant().unwrap(), TagVariant::Tmt);
        let server = config.prediction_server().unwrap();
        assert_eq!(server.timeout_seconds, 300);
        assert_eq!(server.batch_size, 1000);
        assert_eq!(config.thermo_converter, "ThermoRawFileParser");
    }

    #[test]
    fn test_unsupported_selectors() {
        let mut config: Config = serde_json::from_str(sample_json()).unwrap();
        config.inputs.search_type = "mascot".into();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedSearchType(ref x) if x == "mascot"));
        assert!(err.to_string().contains("mascot"));

        config.inputs.search_type = "internal".into();
        config.inputs.raw_type = "bruker".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnsupportedRawType(_))
        ));

        config.inputs.raw_type = "thermo".into();
        config.tag = "itraq".into();
        assert!(matches!(config.validate(), Err(ConfigError::UnsupportedTag(_))));
    }

    #[test]
    fn test_missing_intensity_model() {
        let mut config: Config = serde_json::from_str(sample_json()).unwrap();
        config.models.intensity = Some("  ".into());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingIntensityModel)
        ));
    }

    #[test]
    fn test_model_selection() {
        let models = ModelsConfig {
            intensity: Some("a".into()),
            irt: None,
            proteotypicity: Some("c".into()),
        };
        assert_eq!(models.selected(true), vec!["a".to_string()]);
        assert_eq!(models.selected(false), vec!["a".to_string(), "c".to_string()]);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, sample_json()).unwrap();
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.tag, "tmt");

        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            Config::from_file(&path),
            Err(ConfigError::ParseError { .. })
        ));
        assert!(matches!(
            Config::from_file(dir.path().join("missing.json")),
            Err(ConfigError::FileReadingError { .. })
        ));
    }

    #[test]
    fn test_digestion_settings() {
        let config: Config = serde_json::from_str(
            r#"{
                "type": "SpectralLibraryGeneration",
                "models": {"intensity": "Prosit_2020_intensity_HCD"},
                "fasta": "human.fasta",
                "digestion": {"max_missed_cleavages": 1, "precursor_charges": [2]}
            }"#,
        )
        .unwrap();
        config.validate().unwrap();
        assert_eq!(config.digestion.max_missed_cleavages, 1);
        assert_eq!(config.digestion.min_length, 7);
        assert_eq!(config.digestion.enzyme().unwrap(), Enzyme::Trypsin);
        assert_eq!(
            config.fasta_path(Path::new("/data")),
            Some(PathBuf::from("/data/human.fasta"))
        );
        assert_eq!(Config::default().fasta_path(Path::new("/data")), None);

        let mut bad = config.clone();
        bad.digestion.enzyme = "pepsin".into();
        assert!(matches!(bad.validate(), Err(ConfigError::UnsupportedEnzyme(_))));
        let mut bad = config.clone();
        bad.digestion.min_length = 40;
        assert!(matches!(bad.validate(), Err(ConfigError::InvalidDigestion(_))));
        let mut bad = config;
        bad.digestion.precursor_charges = vec![2, 9];
        assert!(matches!(bad.validate(), Err(ConfigError::InvalidDigestion(_))));
    }
}
