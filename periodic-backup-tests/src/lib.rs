//! Test utilities for periodic-backup
//!
//! This crate provides shared test utilities, a recording host, sample
//! trees, and helper functions for testing the backup pipeline.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use test_utils::{ConfigBuilder, TestContext, MockDestination};
//!
//! #[test]
//! fn my_test() {
//!     let builder = ConfigBuilder::minimal().with_sample_tree();
//!     let config = builder.build();
//!     // ... test code
//! }
//! ```

pub mod config_builder;
pub mod fixtures;
pub mod recording_host;
pub mod test_context;

// Re-export commonly used items
pub use config_builder::ConfigBuilder;
pub use fixtures::*;
pub use recording_host::{HostEvent, RecordingHost};
pub use test_context::{ResultAssertions, TestContext};

// Re-export types from the main crate for convenience
pub use periodic_backup::config::{
    ArchiverConfig, Config, DestinationConfig, DestinationKind, GlobalConfig, RetentionPolicy,
    SelectionSettings, SelectorConfig,
};
pub use periodic_backup::destinations::mock::{DestinationCall, MockDestination};
pub use periodic_backup::destinations::{Destination, LocalDirectory, StoreOutcome};
pub use periodic_backup::manifest::BackupManifest;

/// Common test result type
pub type TestResult<T = ()> = anyhow::Result<T>;
