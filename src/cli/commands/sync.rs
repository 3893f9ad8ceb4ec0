//! Library creation and sync commands.

use std::path::Path;
use std::sync::Arc;
use tokio::runtime::Runtime;

use super::{remember_library, resolve_library};
use crate::catalog::SqliteCatalog;
use crate::config::Config;
use crate::error::Result;
use crate::instance::LibraryInstance;
use crate::library::{self, SyncGuard, SyncOptions, SyncReport};
use crate::metadata::{self, MetadataProbe};

static SYNC_GUARD: SyncGuard = SyncGuard::new();

/// Create a new library
pub fn cmd_init(rt: &Runtime, config: &Config, path: &Path) -> anyhow::Result<()> {
    let instance = rt.block_on(LibraryInstance::init(path))?;
    println!("Initialized library at {}", instance.base_dir().display());
    println!("Run `music-mirror sync` to build the catalog.");
    remember_library(config, &instance);
    Ok(())
}

/// Reconcile a library's catalog with its files
pub fn cmd_sync(
    rt: &Runtime,
    config: &Config,
    path: Option<&Path>,
    resync: bool,
    dry_run: bool,
) -> anyhow::Result<()> {
    let instance = resolve_library(path, config)?;
    let _ticket = SYNC_GUARD.try_acquire()?;

    println!("Syncing {}", instance.base_dir().display());
    if dry_run {
        println!("\n[DRY RUN MODE - The catalog will not be modified]\n");
    }

    let probe = metadata::probe_for(config.sync.probe, &config.tools.ffprobe);
    let options = SyncOptions { resync, dry_run };
    let report = rt.block_on(run_sync(&instance, probe, options))?;

    println!("{}", report);
    remember_library(config, &instance);
    Ok(())
}

async fn run_sync(
    instance: &LibraryInstance,
    probe: Arc<dyn MetadataProbe>,
    options: SyncOptions,
) -> Result<SyncReport> {
    let pool = instance.connect().await?;
    let mut catalog = SqliteCatalog::new(pool.clone());
    let report = library::reconcile(instance.base_dir(), &mut catalog, probe, options).await;
    drop(catalog);
    pool.close().await;
    report
}
