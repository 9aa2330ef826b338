//! Configuration module for periodic-backup
//!
//! This module handles loading and validating configuration from TOML files.
//! The loaded values are plain data: the selector, archiver and destinations
//! are built from them by the executors at call time.
//!
//! ## Example Usage
//!
//! ```no_run
//! use periodic_backup::config;
//!
//! let config = config::load_config("periodic-backup.toml")?;
//!
//! for (name, destination) in &config.destinations {
//!     println!("Destination: {}, enabled: {}", name, destination.enabled);
//! }
//! # Ok::<(), config::ConfigError>(())
//! ```

mod loader;
mod types;

pub use loader::{load_config, parse_config, ConfigError, Result};
pub use types::*;

/// Expand tilde (~) in path
pub fn expand_tilde(path: &std::path::Path) -> std::path::PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    path.to_path_buf()
}
