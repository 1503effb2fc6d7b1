use clap::Parser;
use std::path::PathBuf;

pub const DEFAULT_CONFIG_NAME: &str = "config.json";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Directory containing the search results and raw files
    #[arg(short, long)]
    pub search_dir: PathBuf,

    /// Path to the JSON configuration file (defaults to config.json in the search directory)
    #[arg(short, long)]
    pub config_path: Option<PathBuf>,
}

impl Cli {
    pub fn config_path(&self) -> PathBuf {
        match &self.config_path {
            Some(x) => x.clone(),
            None => self.search_dir.join(DEFAULT_CONFIG_NAME),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_path() {
        let cli = Cli::parse_from(["cecalib", "--search-dir", "/data/search"]);
        assert_eq!(cli.config_path(), PathBuf::from("/data/search/config.json"));

        let cli = Cli::parse_from([
            "cecalib",
            "--search-dir",
            "/data/search",
            "--config-path",
            "/etc/other.json",
        ]);
        assert_eq!(cli.config_path(), PathBuf::from("/etc/other.json"));
    }
}
