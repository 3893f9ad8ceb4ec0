//! Library sync: reconcile the catalog with the files on disk.
//!
//! A pass has two halves. [`plan_sync`] walks the tree, hashes new files and
//! probes their durations on a blocking thread. [`apply_plan`] then replays
//! the plan against a [`CatalogStore`]. [`reconcile`] runs both inside one
//! catalog transaction: it commits on success and rolls back on any error,
//! so callers never observe a half-applied pass.

mod plan;

pub use plan::{SyncPlan, TrackAddition, TrackMove, plan_sync};

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::catalog::{CatalogSnapshot, CatalogStore, NewTrack};
use crate::error::{Error, Result};
use crate::metadata::MetadataProbe;

/// Options for one reconciliation pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Wipe the catalog and rebuild it from disk
    pub resync: bool,
    /// Plan only; leave the catalog untouched
    pub dry_run: bool,
}

/// Counts of what a pass changed (or would change, for a dry run).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub moved: usize,
    pub added: usize,
    pub deleted: usize,
    pub relinked: usize,
    pub covers_added: usize,
    pub covers_deleted: usize,
    pub albums_created: usize,
    pub albums_deleted: usize,
    pub probe_failures: usize,
    pub dry_run: bool,
}

impl SyncReport {
    fn from_plan(plan: &SyncPlan, dry_run: bool) -> Self {
        Self {
            moved: plan.moved.len(),
            added: plan.added_tracks.len(),
            deleted: plan.deleted_tracks.len(),
            relinked: plan.orphaned_tracks.len(),
            covers_added: plan.added_covers.len(),
            covers_deleted: plan.deleted_covers.len(),
            albums_created: plan.missing_albums.len(),
            albums_deleted: plan.deleted_albums.len(),
            probe_failures: plan.probe_failures,
            dry_run,
        }
    }

    /// Total number of catalog mutations.
    pub fn mutations(&self) -> usize {
        self.moved
            + self.added
            + self.deleted
            + self.relinked
            + self.covers_added
            + self.covers_deleted
            + self.albums_created
            + self.albums_deleted
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Tracks:  {} added, {} moved, {} deleted, {} relinked", self.added, self.moved, self.deleted, self.relinked)?;
        writeln!(f, "Covers:  {} added, {} deleted", self.covers_added, self.covers_deleted)?;
        write!(f, "Albums:  {} created, {} deleted", self.albums_created, self.albums_deleted)?;
        if self.probe_failures > 0 {
            write!(f, "\nDuration unknown for {} new track(s)", self.probe_failures)?;
        }
        if self.dry_run {
            write!(f, "\n(dry run, catalog not modified)")?;
        }
        Ok(())
    }
}

/// Process-wide "already syncing" flag.
///
/// ```ignore
/// static GUARD: SyncGuard = SyncGuard::new();
/// let _ticket = GUARD.try_acquire()?;
/// ```
#[derive(Debug, Default)]
pub struct SyncGuard {
    running: AtomicBool,
}

impl SyncGuard {
    pub const fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
        }
    }

    /// Claim the guard until the returned ticket is dropped.
    pub fn try_acquire(&self) -> Result<SyncTicket<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| Error::SyncInProgress)?;
        Ok(SyncTicket { guard: self })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Held while a sync runs.
#[derive(Debug)]
pub struct SyncTicket<'a> {
    guard: &'a SyncGuard,
}

impl Drop for SyncTicket<'_> {
    fn drop(&mut self) {
        self.guard.running.store(false, Ordering::Release);
    }
}

/// Replay `plan` against `store`.
///
/// Moves run before deletions and additions; tracks and covers are removed
/// before the albums holding them, children before parents. Nothing is
/// committed here.
pub async fn apply_plan<S>(store: &mut S, plan: &SyncPlan) -> Result<()>
where
    S: CatalogStore + ?Sized,
{
    if plan.resync {
        store.clear().await?;
        info!(target: "library::sync", "Cleared catalog for resync");
    }

    for m in &plan.moved {
        let album_id = store.get_or_create_album_for_path(&m.to.folder).await?;
        store.move_track(m.track_id, &m.to, album_id, Some(m.file_size)).await?;
        info!(target: "library::sync", from = %m.from, to = %m.to, "Moved track");
    }

    for track in &plan.deleted_tracks {
        store.delete_track(track.id).await?;
        info!(target: "library::sync", location = %track.location, "Deleted track");
    }

    for addition in &plan.added_tracks {
        let album_id = store.get_or_create_album_for_path(&addition.location.folder).await?;
        store
            .insert_track(&NewTrack {
                location: addition.location.clone(),
                duration: addition.duration,
                file_hash: Some(addition.file_hash),
                file_size: Some(addition.file_size),
                album_id,
            })
            .await?;
        debug!(target: "library::sync", location = %addition.location, "Added track");
    }

    for (track_id, folder) in &plan.orphaned_tracks {
        let album_id = store.get_or_create_album_for_path(folder).await?;
        store.set_track_album(*track_id, album_id).await?;
        debug!(target: "library::sync", track_id, folder = %folder, "Linked orphaned track");
    }

    for cover in &plan.deleted_covers {
        store.delete_cover(cover.id).await?;
        debug!(target: "library::sync", location = %cover.location, "Deleted cover");
    }

    for location in &plan.added_covers {
        let album_id = store.get_or_create_album_for_path(&location.folder).await?;
        store.insert_cover(location, album_id).await?;
        debug!(target: "library::sync", location = %location, "Added cover");
    }

    for folder in &plan.missing_albums {
        store.get_or_create_album_for_path(folder).await?;
    }

    for album in &plan.deleted_albums {
        store.delete_album(album.id).await?;
        debug!(target: "library::sync", folder = %album.folder, "Deleted album");
    }

    Ok(())
}

/// Run one reconciliation pass of `base_dir` against `store`.
///
/// # Errors
///
/// Walk or hash failures and any catalog error abort the pass; the catalog
/// transaction is rolled back before the error is returned.
pub async fn reconcile<S>(
    base_dir: &Path,
    store: &mut S,
    probe: Arc<dyn MetadataProbe>,
    options: SyncOptions,
) -> Result<SyncReport>
where
    S: CatalogStore + ?Sized,
{
    let base = base_dir.to_path_buf();
    reconcile_with(base_dir, store, options, move |snapshot| {
        plan_sync(&base, snapshot, probe.as_ref())
    })
    .await
}

/// [`reconcile`] with the planning step supplied by the caller.
async fn reconcile_with<S, P>(
    base_dir: &Path,
    store: &mut S,
    options: SyncOptions,
    planner: P,
) -> Result<SyncReport>
where
    S: CatalogStore + ?Sized,
    P: FnOnce(&CatalogSnapshot) -> Result<SyncPlan> + Send + 'static,
{
    let started = Instant::now();
    info!(target: "library::sync", base_dir = %base_dir.display(), resync = options.resync, dry_run = options.dry_run, "Starting sync");

    let result = run_pass(store, planner, options).await;

    let report = match result {
        Ok(report) => {
            if options.dry_run {
                store.rollback().await?;
            } else {
                store.commit().await?;
            }
            report
        }
        Err(e) => {
            if let Err(rollback_err) = store.rollback().await {
                warn!(target: "library::sync", error = %rollback_err, "Rollback failed");
            }
            return Err(e);
        }
    };

    info!(
        target: "library::sync",
        moved = report.moved,
        added = report.added,
        deleted = report.deleted,
        relinked = report.relinked,
        covers_added = report.covers_added,
        covers_deleted = report.covers_deleted,
        albums_created = report.albums_created,
        albums_deleted = report.albums_deleted,
        probe_failures = report.probe_failures,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Sync finished"
    );
    Ok(report)
}

async fn run_pass<S, P>(store: &mut S, planner: P, options: SyncOptions) -> Result<SyncReport>
where
    S: CatalogStore + ?Sized,
    P: FnOnce(&CatalogSnapshot) -> Result<SyncPlan> + Send + 'static,
{
    let snapshot = if options.resync {
        CatalogSnapshot::default()
    } else {
        CatalogSnapshot::load(store).await?
    };

    let mut plan = tokio::task::spawn_blocking(move || planner(&snapshot))
        .await
        .map_err(|e| Error::TaskJoin(e.to_string()))??;
    plan.resync = options.resync;

    if !options.dry_run {
        apply_plan(store, &plan).await?;
    }
    Ok(SyncReport::from_plan(&plan, options.dry_run))
}
