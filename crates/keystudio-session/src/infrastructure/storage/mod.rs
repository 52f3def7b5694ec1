//! Storage infrastructure: configuration file persistence.
//!
//! The `config` sub-module reads and writes the TOML settings file from the
//! platform config directory and supplies defaults on first run.

pub mod config;
