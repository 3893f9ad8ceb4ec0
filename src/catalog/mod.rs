//! The catalog store: the write path used by library sync.
//!
//! [`CatalogStore`] is the seam between the reconciler and persistence. All
//! mutations issued since the last [`CatalogStore::commit`] are atomic: they
//! become visible together on commit, or disappear on
//! [`CatalogStore::rollback`] (or when the store is dropped).
//!
//! Read-side browsing queries (search, tags, album subtrees) live in
//! [`crate::db`] and never go through this trait.

pub mod sqlite;

pub use sqlite::SqliteCatalog;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{Album, AlbumId, ContentHash, Cover, CoverId, MediaLocation, Track, TrackId};

/// Fields of a track about to be inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTrack {
    pub location: MediaLocation,
    /// Seconds; NaN when probing failed
    pub duration: f64,
    pub file_hash: Option<ContentHash>,
    pub file_size: Option<u64>,
    pub album_id: AlbumId,
}

/// Persistence operations needed to reconcile the catalog with disk.
#[async_trait]
pub trait CatalogStore: Send {
    async fn list_tracks(&mut self) -> Result<Vec<Track>>;

    async fn list_albums(&mut self) -> Result<Vec<Album>>;

    async fn list_covers(&mut self) -> Result<Vec<Cover>>;

    /// Look up the album for `folder`, creating it and any missing ancestor
    /// albums up to the root so the tree stays connected.
    async fn get_or_create_album_for_path(&mut self, folder: &str) -> Result<AlbumId>;

    async fn insert_track(&mut self, track: &NewTrack) -> Result<TrackId>;

    /// Point an existing track at a new location, keeping its id, rating,
    /// tags and listening count.
    async fn move_track(
        &mut self,
        id: TrackId,
        to: &MediaLocation,
        album_id: AlbumId,
        file_size: Option<u64>,
    ) -> Result<()>;

    async fn set_track_album(&mut self, id: TrackId, album_id: AlbumId) -> Result<()>;

    async fn delete_track(&mut self, id: TrackId) -> Result<()>;

    async fn insert_cover(&mut self, location: &MediaLocation, album_id: AlbumId) -> Result<CoverId>;

    async fn delete_cover(&mut self, id: CoverId) -> Result<()>;

    /// Delete one album. Callers must remove children first.
    async fn delete_album(&mut self, id: AlbumId) -> Result<()>;

    /// Remove every track, cover, album and tag assignment.
    async fn clear(&mut self) -> Result<()>;

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;
}

/// Everything the catalog held when a sync started.
#[derive(Debug, Default, Clone)]
pub struct CatalogSnapshot {
    pub tracks: Vec<Track>,
    pub albums: Vec<Album>,
    pub covers: Vec<Cover>,
}

impl CatalogSnapshot {
    pub async fn load<S: CatalogStore + ?Sized>(store: &mut S) -> Result<Self> {
        Ok(Self {
            tracks: store.list_tracks().await?,
            albums: store.list_albums().await?,
            covers: store.list_covers().await?,
        })
    }
}
