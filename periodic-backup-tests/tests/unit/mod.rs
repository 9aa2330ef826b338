//! Unit tests for periodic-backup
//!
//! These tests exercise each component on its own, against real temp
//! directories and without a running daemon.

mod archivers;
mod destinations;
mod retention;
mod scheduler;
