mod cli;
mod errors;
mod processing;

use cecalib::Config;
use cecalib::config::JobType;
use clap::Parser;
use std::path::{
    Path,
    PathBuf,
};
use tracing::info;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use cli::Cli;
use errors::CliError;

#[cfg(target_os = "windows")]
use mimalloc::MiMalloc;

#[cfg(target_os = "windows")]
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Output directory from the config, relative paths resolve against the
/// search directory. Defaults to `<search_dir>/out`.
fn output_directory(config: &Config, search_dir: &Path) -> PathBuf {
    match &config.output {
        Some(x) if x.directory.is_absolute() => x.directory.clone(),
        Some(x) => search_dir.join(&x.directory),
        None => search_dir.join("out"),
    }
}

fn main() -> std::result::Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        ) // RUST_LOG
        .init();

    let args = Cli::parse();
    let config_path = args.config_path();
    if !config_path.exists() {
        return Err(CliError::Io {
            source: "config file not found".to_string(),
            path: Some(config_path.to_string_lossy().to_string()),
        });
    }
    let config = Config::from_file(&config_path)?;
    config.validate()?;
    info!("Parsed configuration: {:#?}", config);

    let out_dir = output_directory(&config, &args.search_dir);
    std::fs::create_dir_all(&out_dir).map_err(|e| CliError::io(e, &out_dir))?;
    info!("Writing outputs to {}", out_dir.display());

    match config.job_type()? {
        JobType::CollisionEnergyCalibration => {
            let summary = processing::run_calibration(&config, &args.search_dir, &out_dir)?;
            info!(
                "Calibrated {} raw files ({} failed)",
                summary.best_ce.len(),
                summary.failed.len()
            );
        }
        JobType::SpectralLibraryGeneration => {
            processing::run_library_generation(&config, &args.search_dir, &out_dir)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cecalib::config::OutputConfig;

    #[test]
    fn test_output_directory() {
        let search_dir = Path::new("/data/search");
        let mut config = Config::default();
        assert_eq!(
            output_directory(&config, search_dir),
            PathBuf::from("/data/search/out")
        );
        config.output = Some(OutputConfig {
            directory: "results".into(),
        });
        assert_eq!(
            output_directory(&config, search_dir),
            PathBuf::from("/data/search/results")
        );
        config.output = Some(OutputConfig {
            directory: "/tmp/results".into(),
        });
        assert_eq!(
            output_directory(&config, search_dir),
            PathBuf::from("/tmp/results")
        );
    }
}
