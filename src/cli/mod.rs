//! Command-line interface for music-mirror.
//!
//! This module provides CLI commands for creating and syncing a library,
//! exporting it to a device, and browsing, rating and tagging tracks.

mod commands;

pub use commands::{Cli, Commands, run_command};
