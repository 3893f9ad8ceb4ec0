//! CLI command definitions and dispatch.
//!
//! Each group of subcommands lives in its own submodule:
//! - `sync`: library creation and reconciliation
//! - `export`: mirroring the library to a device or folder
//! - `library`: browsing, ratings and tags

mod export;
mod library;
mod sync;

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tokio::runtime::Runtime;
use tracing::warn;

use crate::config::{self, Config};
use crate::instance::LibraryInstance;

pub use export::cmd_export;
pub use library::{cmd_albums, cmd_listened, cmd_list, cmd_rate, cmd_tag, cmd_tags};
pub use sync::{cmd_init, cmd_sync};

/// Music Mirror CLI
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Turn a directory into a library
    Init {
        /// Library root directory
        path: PathBuf,
    },
    /// Reconcile the catalog with the files on disk
    Sync {
        /// Library root (defaults to the last library used)
        path: Option<PathBuf>,
        /// Forget the catalog and rebuild it from disk
        #[arg(long)]
        resync: bool,
        /// Show what would change without touching the catalog
        #[arg(long)]
        dry_run: bool,
    },
    /// Mirror the library into a target directory
    Export {
        /// Target directory (e.g. a mounted player)
        target: PathBuf,
        /// Library root (defaults to the last library used)
        #[arg(short, long)]
        library: Option<PathBuf>,
        /// Album folders to leave out, comma separated
        #[arg(short, long, value_delimiter = ',')]
        exclude: Vec<String>,
        /// Don't ask before removing and adding files
        #[arg(short, long)]
        yes: bool,
    },
    /// List or search tracks
    List {
        /// Match against name, folder or tag
        query: Option<String>,
        /// alphabetical, most-played, rating or duration
        #[arg(short, long, default_value = "alphabetical")]
        sort: String,
        #[arg(short, long)]
        library: Option<PathBuf>,
    },
    /// Show the album tree, or the contents of one album
    Albums {
        /// Album folder relative to the library root
        folder: Option<String>,
        #[arg(short, long)]
        library: Option<PathBuf>,
    },
    /// Rate a track (omit the rating to clear it)
    Rate {
        track_id: i64,
        /// 0-5 stars
        rating: Option<i64>,
        #[arg(short, long)]
        library: Option<PathBuf>,
    },
    /// Count one listening of a track
    Listened {
        track_id: i64,
        #[arg(short, long)]
        library: Option<PathBuf>,
    },
    /// Attach a tag to a track, creating the tag if needed
    Tag {
        track_id: i64,
        name: String,
        /// Tag color for new tags, as #rrggbb
        #[arg(long)]
        color: Option<String>,
        /// Detach instead of attach
        #[arg(long)]
        remove: bool,
        #[arg(short, long)]
        library: Option<PathBuf>,
    },
    /// List all tags
    Tags {
        #[arg(short, long)]
        library: Option<PathBuf>,
    },
}

/// Run the specified CLI command.
pub fn run_command(cli: &Cli) -> anyhow::Result<()> {
    let rt = Runtime::new()?;
    let config = config::load();

    match &cli.command {
        Commands::Init { path } => cmd_init(&rt, &config, path),
        Commands::Sync {
            path,
            resync,
            dry_run,
        } => cmd_sync(&rt, &config, path.as_deref(), *resync, *dry_run),
        Commands::Export {
            target,
            library,
            exclude,
            yes,
        } => cmd_export(&rt, &config, library.as_deref(), target, exclude, *yes),
        Commands::List {
            query,
            sort,
            library,
        } => cmd_list(&rt, &config, library.as_deref(), query.as_deref(), sort),
        Commands::Albums { folder, library } => {
            cmd_albums(&rt, &config, library.as_deref(), folder.as_deref())
        }
        Commands::Rate {
            track_id,
            rating,
            library,
        } => cmd_rate(&rt, &config, library.as_deref(), *track_id, *rating),
        Commands::Listened { track_id, library } => {
            cmd_listened(&rt, &config, library.as_deref(), *track_id)
        }
        Commands::Tag {
            track_id,
            name,
            color,
            remove,
            library,
        } => cmd_tag(
            &rt,
            &config,
            library.as_deref(),
            *track_id,
            name,
            color.as_deref(),
            *remove,
        ),
        Commands::Tags { library } => cmd_tags(&rt, &config, library.as_deref()),
    }
}

// ============================================================================
// Shared helper functions
// ============================================================================

/// Open the library at `path`, or the remembered one.
pub(crate) fn resolve_library(path: Option<&Path>, config: &Config) -> anyhow::Result<LibraryInstance> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => config
            .library
            .last_library
            .clone()
            .context("No library given and none remembered; pass a library path")?,
    };
    LibraryInstance::open(&path)
        .with_context(|| format!("Failed to open library at {}", path.display()))
}

/// Remember `instance` as the default library for later commands.
pub(crate) fn remember_library(config: &Config, instance: &LibraryInstance) {
    if config.library.last_library.as_deref() == Some(instance.base_dir()) {
        return;
    }
    let mut config = config.clone();
    config.library.last_library = Some(instance.base_dir().to_path_buf());
    if let Err(e) = config::save(&config) {
        warn!("Could not remember library: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_export_exclude_is_comma_separated() {
        let cli = Cli::parse_from(["music-mirror", "export", "/mnt/player", "-e", "Live,Audiobooks"]);
        let Commands::Export { exclude, .. } = cli.command else {
            panic!("expected export command");
        };
        assert_eq!(exclude, vec!["Live".to_string(), "Audiobooks".to_string()]);
    }

    #[test]
    fn test_sync_flags() {
        let cli = Cli::parse_from(["music-mirror", "sync", "/music", "--resync", "--dry-run"]);
        assert!(matches!(
            cli.command,
            Commands::Sync {
                resync: true,
                dry_run: true,
                ..
            }
        ));
    }
}
