//! Periodic Backup Library
//!
//! Selects files under a root directory, packs them with an archiver, and
//! replicates the result to one or more destinations on a schedule, with
//! retention and full restore.

pub mod archivers;
pub mod config;
pub mod destinations;
pub mod managers;
pub mod manifest;
pub mod selection;
pub mod utils;

// Re-export commonly used types
pub use archivers::{ArchiveSession, Archiver};
pub use config::{load_config, Config, ConfigError};
pub use destinations::{Destination, StoreOutcome};
pub use managers::backup::{BackupError, BackupExecutor, BackupPlan, BackupReport};
pub use managers::host::{CliHost, HostHooks, NoopHost};
pub use managers::logging::{init_console_logging, init_logging, LogGuard, LoggingConfig};
pub use managers::restore::{RestoreError, RestoreExecutor, RestoreReport};
pub use manifest::BackupManifest;
pub use selection::{FileSelector, SelectionError, SelectionRules};
