//! Executors and services that drive backups and restores

pub mod backup;
pub mod host;
pub mod logging;
pub mod restore;
pub mod retention;
pub mod scheduler;
