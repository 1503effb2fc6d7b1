use cecalib::CeCalError;
use cecalib::errors::ConfigError;

#[derive(Debug)]
pub enum CliError {
    Config { source: String },
    Io { source: String, path: Option<String> },
    Processing { source: String },
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::Config { source } => write!(f, "Error interpreting the config: {}", source),
            CliError::Io { source, path } => {
                if let Some(path) = path {
                    write!(f, "Error accessing file {}: {}", path, source)
                } else {
                    write!(f, "Error accessing file: {}", source)
                }
            }
            CliError::Processing { source } => write!(f, "Error processing data: {}", source),
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config {
            source: e.to_string(),
        }
    }
}

impl From<CeCalError> for CliError {
    fn from(e: CeCalError) -> Self {
        match e {
            CeCalError::Config(x) => x.into(),
            other => CliError::Processing {
                source: other.to_string(),
            },
        }
    }
}

impl CliError {
    pub fn io(source: std::io::Error, path: &std::path::Path) -> Self {
        CliError::Io {
            source: source.to_string(),
            path: Some(path.to_string_lossy().to_string()),
        }
    }
}
