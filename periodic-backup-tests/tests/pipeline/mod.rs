//! Pipeline tests for periodic-backup
//!
//! Full backup and restore runs against local directories. Backups share a
//! process-wide "in progress" flag, so every test that runs one is serial.

mod backup;
mod restore;
