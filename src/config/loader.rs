use super::types::*;
use crate::managers::scheduler::CronSchedule;
use std::fs;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid cron expression '{expression}': {reason}")]
    InvalidCron { expression: String, reason: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Load and validate configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let contents = fs::read_to_string(path)?;
    parse_config(&contents)
}

/// Parse and validate configuration from TOML text
pub fn parse_config(contents: &str) -> Result<Config> {
    let mut config: Config = toml::from_str(contents)?;
    normalize(&mut config);
    validate_config(&config)?;
    Ok(config)
}

/// Expand `~` in paths and copy table keys into destination names
fn normalize(config: &mut Config) {
    config.global.root = super::expand_tilde(&config.global.root);
    config.global.temp_directory = super::expand_tilde(&config.global.temp_directory);
    config.global.log_directory = super::expand_tilde(&config.global.log_directory);

    for (name, destination) in config.destinations.iter_mut() {
        destination.name = name.clone();
        if let DestinationKind::Local { ref mut path } = destination.kind {
            *path = super::expand_tilde(path);
        }
    }
}

/// Validate the configuration
fn validate_config(config: &Config) -> Result<()> {
    if !config.global.root.is_dir() {
        return Err(ConfigError::ValidationError(format!(
            "Backup root is not a directory: {:?}",
            config.global.root
        )));
    }

    CronSchedule::parse(&config.global.cron)?;

    if let ArchiverConfig::Zip {
        multi_volume: true,
        volume_size: 0,
    } = config.archiver
    {
        return Err(ConfigError::ValidationError(
            "Multi-volume zip requires a volume_size greater than zero".to_string(),
        ));
    }

    if config.destinations.is_empty() {
        return Err(ConfigError::ValidationError(
            "No destinations defined".to_string(),
        ));
    }

    for (name, destination) in &config.destinations {
        validate_destination(name, destination)?;
    }

    Ok(())
}

fn validate_destination(name: &str, destination: &DestinationConfig) -> Result<()> {
    match destination.kind {
        DestinationKind::Local { ref path } => {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "Destination '{}': local path is empty",
                    name
                )));
            }
        }
        DestinationKind::S3 { ref bucket, .. } => {
            if bucket.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "Destination '{}': bucket is empty",
                    name
                )));
            }
        }
    }

    Ok(())
}
