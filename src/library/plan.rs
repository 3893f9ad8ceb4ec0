//! Planning half of a library sync.
//!
//! [`plan_sync`] compares a [`LibraryScan`] of the disk with a
//! [`CatalogSnapshot`] and decides every mutation up front. It never writes
//! to the catalog, so the result can be shown as a dry run or handed to
//! [`super::apply_plan`].

use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::path::Path;
use tracing::{debug, warn};

use crate::catalog::CatalogSnapshot;
use crate::error::{Error, Result};
use crate::metadata::MetadataProbe;
use crate::model::{Album, ContentHash, Cover, MediaLocation, Track, TrackId, folder_depth};
use crate::scanner::{LibraryScan, hash_file, scan_tree};

/// A catalog track whose file reappeared elsewhere with the same content.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackMove {
    pub track_id: TrackId,
    pub from: MediaLocation,
    pub to: MediaLocation,
    pub file_size: u64,
}

/// A new audio file with no content match among removed tracks.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackAddition {
    pub location: MediaLocation,
    /// NaN when probing failed
    pub duration: f64,
    pub file_hash: ContentHash,
    pub file_size: u64,
}

/// Every catalog mutation one sync pass will perform.
#[derive(Debug, Clone, Default)]
pub struct SyncPlan {
    /// Wipe the catalog before applying
    pub resync: bool,
    pub moved: Vec<TrackMove>,
    pub deleted_tracks: Vec<Track>,
    pub added_tracks: Vec<TrackAddition>,
    /// Retained tracks without an album, with the folder they belong to
    pub orphaned_tracks: Vec<(TrackId, String)>,
    pub deleted_covers: Vec<Cover>,
    pub added_covers: Vec<MediaLocation>,
    /// Album folders on disk with no album in the catalog yet
    pub missing_albums: Vec<String>,
    /// Deepest first
    pub deleted_albums: Vec<Album>,
    pub probe_failures: usize,
}

impl SyncPlan {
    /// True when applying the plan would not change the catalog.
    pub fn is_empty(&self) -> bool {
        !self.resync
            && self.moved.is_empty()
            && self.deleted_tracks.is_empty()
            && self.added_tracks.is_empty()
            && self.orphaned_tracks.is_empty()
            && self.deleted_covers.is_empty()
            && self.added_covers.is_empty()
            && self.missing_albums.is_empty()
            && self.deleted_albums.is_empty()
    }
}

/// Scan `base_dir` and plan the mutations that bring `snapshot` in line
/// with it.
///
/// New audio files are hashed (and later probed) on the rayon pool. The
/// full hash index of new files exists before any track is classified as
/// moved or deleted.
///
/// # Errors
///
/// Fails when the tree can't be walked or a new file can't be hashed.
/// Probe failures only produce a NaN duration.
pub fn plan_sync(
    base_dir: &Path,
    snapshot: &CatalogSnapshot,
    probe: &dyn MetadataProbe,
) -> Result<SyncPlan> {
    let scan = scan_tree(base_dir)?;
    plan_from_scan(base_dir, &scan, snapshot, probe)
}

pub(super) fn plan_from_scan(
    base_dir: &Path,
    scan: &LibraryScan,
    snapshot: &CatalogSnapshot,
    probe: &dyn MetadataProbe,
) -> Result<SyncPlan> {
    let mut plan = SyncPlan::default();

    let tracks_in_db: BTreeMap<&MediaLocation, &Track> =
        snapshot.tracks.iter().map(|t| (&t.location, t)).collect();

    let new_audio: Vec<&MediaLocation> = scan
        .audio
        .iter()
        .filter(|loc| !tracks_in_db.contains_key(loc))
        .collect();

    let hashed: Vec<(&MediaLocation, ContentHash, u64)> = new_audio
        .par_iter()
        .map(|loc| -> Result<(&MediaLocation, ContentHash, u64)> {
            let path = loc.resolve(base_dir);
            let hash = hash_file(&path).map_err(|e| Error::hash(&path, e))?;
            let size = std::fs::metadata(&path).map_err(|e| Error::hash(&path, e))?.len();
            Ok((*loc, hash, size))
        })
        .collect::<Result<_>>()?;
    debug!(target: "library::sync", new_files = hashed.len(), "Hashed new files");

    // Indices into `hashed`, in sorted path order per hash
    let mut by_hash: HashMap<ContentHash, VecDeque<usize>> = HashMap::new();
    for (i, (_, hash, _)) in hashed.iter().enumerate() {
        by_hash.entry(*hash).or_default().push_back(i);
    }

    let mut claimed = vec![false; hashed.len()];
    for (location, track) in &tracks_in_db {
        if scan.audio.contains(*location) {
            if track.album_id.is_none() {
                plan.orphaned_tracks.push((track.id, location.folder.clone()));
            }
            continue;
        }

        let target = track
            .file_hash
            .and_then(|hash| by_hash.get_mut(&hash))
            .and_then(|candidates| candidates.pop_front());

        match target {
            Some(i) => {
                claimed[i] = true;
                let (to, _, size) = &hashed[i];
                plan.moved.push(TrackMove {
                    track_id: track.id,
                    from: (*location).clone(),
                    to: (*to).clone(),
                    file_size: *size,
                });
            }
            None => plan.deleted_tracks.push((*track).clone()),
        }
    }

    let unclaimed: Vec<_> = hashed
        .iter()
        .zip(&claimed)
        .filter(|(_, claimed)| !**claimed)
        .map(|(entry, _)| entry)
        .collect();

    plan.added_tracks = unclaimed
        .par_iter()
        .map(|(loc, hash, size)| {
            let path = loc.resolve(base_dir);
            let duration = probe.probe_duration(&path).unwrap_or_else(|e| {
                warn!(target: "library::sync", path = %path.display(), error = %e, "Could not read duration");
                f64::NAN
            });
            TrackAddition {
                location: (*loc).clone(),
                duration,
                file_hash: *hash,
                file_size: *size,
            }
        })
        .collect();
    plan.probe_failures = plan.added_tracks.iter().filter(|t| t.duration.is_nan()).count();

    let covers_in_db: BTreeMap<&MediaLocation, &Cover> =
        snapshot.covers.iter().map(|c| (&c.location, c)).collect();
    plan.deleted_covers = covers_in_db
        .iter()
        .filter(|(loc, _)| !scan.covers.contains(**loc))
        .map(|(_, cover)| (*cover).clone())
        .collect();
    plan.added_covers = scan
        .covers
        .iter()
        .filter(|loc| !covers_in_db.contains_key(loc))
        .cloned()
        .collect();

    let albums_in_db: BTreeSet<&str> = snapshot.albums.iter().map(|a| a.folder.as_str()).collect();
    plan.missing_albums = scan
        .album_folders
        .iter()
        .filter(|folder| !albums_in_db.contains(folder.as_str()))
        .cloned()
        .collect();

    let mut deleted_albums: Vec<Album> = snapshot
        .albums
        .iter()
        .filter(|a| !scan.album_folders.contains(&a.folder))
        .cloned()
        .collect();
    deleted_albums.sort_by(|a, b| {
        folder_depth(&b.folder)
            .cmp(&folder_depth(&a.folder))
            .then_with(|| b.folder.cmp(&a.folder))
    });
    plan.deleted_albums = deleted_albums;

    Ok(plan)
}
