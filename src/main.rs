//! Music Mirror - keeps a music catalog in sync with a directory tree.
//!
//! The catalog (tracks, albums, cover art and tags) is reconciled against the
//! files on disk with content hashing, so renamed or moved files keep their
//! ratings, tags and listening counts. A filtered, transcoded copy of the
//! library can be exported to a portable player.

pub mod catalog;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod instance;
pub mod library;
pub mod metadata;
pub mod model;
pub mod path_policy;
pub mod scanner;
#[cfg(test)]
pub mod test_utils;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(EnvFilter::from_default_env().add_directive("music_mirror=info".parse()?))
        .init();

    cli::run_command(&args)
}
