//! SQLite implementation of [`CatalogStore`].
//!
//! The first mutation or read after a commit opens a transaction; every
//! later statement runs inside it until [`CatalogStore::commit`] or
//! [`CatalogStore::rollback`]. Dropping the store with an open transaction
//! rolls it back.

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnection, SqlitePool};
use sqlx::{Sqlite, Transaction};
use tracing::debug;

use super::{CatalogStore, NewTrack};
use crate::db::{AlbumRow, CoverRow, TRACK_COLUMNS, TrackRow};
use crate::error::{Error, Result, ResultExt};
use crate::model::{
    Album, AlbumId, Cover, CoverId, MediaLocation, Track, TrackId, folder_ancestors,
};

/// Catalog backed by the library's SQLite database.
pub struct SqliteCatalog {
    pool: SqlitePool,
    tx: Option<Transaction<'static, Sqlite>>,
}

impl SqliteCatalog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool, tx: None }
    }

    /// The connection of the open transaction, starting one if needed.
    async fn conn(&mut self) -> Result<&mut SqliteConnection> {
        let tx = match self.tx.take() {
            Some(tx) => tx,
            None => self.pool.begin().await.with_context("Failed to begin transaction")?,
        };
        Ok(&mut **self.tx.insert(tx))
    }
}

fn sql_duration(duration: f64) -> Option<f64> {
    (!duration.is_nan()).then_some(duration)
}

fn sql_size(size: Option<u64>) -> Option<i64> {
    size.and_then(|s| i64::try_from(s).ok())
}

#[async_trait]
impl CatalogStore for SqliteCatalog {
    async fn list_tracks(&mut self) -> Result<Vec<Track>> {
        let sql = format!("SELECT {TRACK_COLUMNS} FROM tracks ORDER BY folder, name, extension");
        let conn = self.conn().await?;
        let rows = sqlx::query_as::<_, TrackRow>(&sql).fetch_all(&mut *conn).await?;
        Ok(rows.into_iter().map(Track::from).collect())
    }

    async fn list_albums(&mut self) -> Result<Vec<Album>> {
        let conn = self.conn().await?;
        let rows = sqlx::query_as::<_, AlbumRow>("SELECT id, folder, parent_id FROM albums ORDER BY folder")
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows.into_iter().map(Album::from).collect())
    }

    async fn list_covers(&mut self) -> Result<Vec<Cover>> {
        let conn = self.conn().await?;
        let rows = sqlx::query_as::<_, CoverRow>(
            "SELECT id, folder, name, extension, album_id FROM covers ORDER BY folder, name, extension",
        )
        .fetch_all(&mut *conn)
        .await?;
        Ok(rows.into_iter().map(Cover::from).collect())
    }

    async fn get_or_create_album_for_path(&mut self, folder: &str) -> Result<AlbumId> {
        let chain: Vec<&str> = folder_ancestors(folder).collect();
        let conn = self.conn().await?;

        // Walk from the root down so each new album can point at its parent
        let mut parent: Option<AlbumId> = None;
        for current in chain.into_iter().rev() {
            let existing: Option<(i64,)> = sqlx::query_as("SELECT id FROM albums WHERE folder = ?")
                .bind(current)
                .fetch_optional(&mut *conn)
                .await?;

            let id = match existing {
                Some((id,)) => id,
                None => {
                    let result = sqlx::query("INSERT INTO albums (folder, parent_id) VALUES (?, ?)")
                        .bind(current)
                        .bind(parent)
                        .execute(&mut *conn)
                        .await
                        .with_context(format!("Failed to create album {:?}", current))?;
                    debug!(target: "catalog", folder = current, "Created album");
                    result.last_insert_rowid()
                }
            };
            parent = Some(id);
        }

        parent.ok_or_else(|| Error::config(format!("Invalid album folder {:?}", folder)))
    }

    async fn insert_track(&mut self, track: &NewTrack) -> Result<TrackId> {
        let conn = self.conn().await?;
        let result = sqlx::query(
            r#"
            INSERT INTO tracks (folder, name, extension, duration, file_hash, file_size, album_id)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&track.location.folder)
        .bind(&track.location.name)
        .bind(&track.location.extension)
        .bind(sql_duration(track.duration))
        .bind(track.file_hash.map(|h| h.as_bytes().to_vec()))
        .bind(sql_size(track.file_size))
        .bind(track.album_id)
        .execute(&mut *conn)
        .await
        .with_context(format!("Failed to insert track {}", track.location))?;
        Ok(result.last_insert_rowid())
    }

    async fn move_track(
        &mut self,
        id: TrackId,
        to: &MediaLocation,
        album_id: AlbumId,
        file_size: Option<u64>,
    ) -> Result<()> {
        let conn = self.conn().await?;
        sqlx::query(
            r#"
            UPDATE tracks
            SET folder = ?, name = ?, extension = ?, album_id = ?,
                file_size = COALESCE(?, file_size)
            WHERE id = ?
            "#,
        )
        .bind(&to.folder)
        .bind(&to.name)
        .bind(&to.extension)
        .bind(album_id)
        .bind(sql_size(file_size))
        .bind(id)
        .execute(&mut *conn)
        .await
        .with_context(format!("Failed to move track {} to {}", id, to))?;
        Ok(())
    }

    async fn set_track_album(&mut self, id: TrackId, album_id: AlbumId) -> Result<()> {
        let conn = self.conn().await?;
        sqlx::query("UPDATE tracks SET album_id = ? WHERE id = ?")
            .bind(album_id)
            .bind(id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    async fn delete_track(&mut self, id: TrackId) -> Result<()> {
        let conn = self.conn().await?;
        sqlx::query("DELETE FROM tracks WHERE id = ?")
            .bind(id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    async fn insert_cover(&mut self, location: &MediaLocation, album_id: AlbumId) -> Result<CoverId> {
        let conn = self.conn().await?;
        let result = sqlx::query("INSERT INTO covers (folder, name, extension, album_id) VALUES (?, ?, ?, ?)")
            .bind(&location.folder)
            .bind(&location.name)
            .bind(&location.extension)
            .bind(album_id)
            .execute(&mut *conn)
            .await
            .with_context(format!("Failed to insert cover {}", location))?;
        Ok(result.last_insert_rowid())
    }

    async fn delete_cover(&mut self, id: CoverId) -> Result<()> {
        let conn = self.conn().await?;
        sqlx::query("DELETE FROM covers WHERE id = ?")
            .bind(id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    async fn delete_album(&mut self, id: AlbumId) -> Result<()> {
        let conn = self.conn().await?;
        sqlx::query("DELETE FROM albums WHERE id = ?")
            .bind(id)
            .execute(&mut *conn)
            .await
            .with_context(format!("Failed to delete album {}", id))?;
        Ok(())
    }

    async fn clear(&mut self) -> Result<()> {
        let conn = self.conn().await?;
        for statement in [
            "DELETE FROM track_tags",
            "DELETE FROM tracks",
            "DELETE FROM covers",
            "UPDATE albums SET parent_id = NULL",
            "DELETE FROM albums",
        ] {
            sqlx::query(statement).execute(&mut *conn).await?;
        }
        debug!(target: "catalog", "Cleared catalog");
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            tx.commit().await.with_context("Failed to commit catalog changes")?;
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            tx.rollback().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::model::ContentHash;
    use crate::test_utils::temp_db;

    fn new_track(folder: &str, name: &str, album_id: AlbumId) -> NewTrack {
        NewTrack {
            location: MediaLocation::new(folder, name, ".mp3"),
            duration: 120.0,
            file_hash: Some(ContentHash([7; 32])),
            file_size: Some(1024),
            album_id,
        }
    }

    #[tokio::test]
    async fn test_get_or_create_album_creates_ancestors() {
        let (pool, _dir) = temp_db().await;
        let mut catalog = SqliteCatalog::new(pool.clone());

        let leaf = catalog.get_or_create_album_for_path("A/B/C").await.unwrap();
        let again = catalog.get_or_create_album_for_path("A/B/C").await.unwrap();
        assert_eq!(leaf, again);
        catalog.commit().await.unwrap();

        let albums = db::list_albums(&pool).await.unwrap();
        let folders: Vec<&str> = albums.iter().map(|a| a.folder.as_str()).collect();
        assert_eq!(folders, vec!["", "A", "A/B", "A/B/C"]);

        let root = &albums[0];
        assert_eq!(root.parent_id, None);
        for pair in albums.windows(2) {
            assert_eq!(pair[1].parent_id, Some(pair[0].id));
        }
    }

    #[tokio::test]
    async fn test_rollback_discards_changes() {
        let (pool, _dir) = temp_db().await;
        let mut catalog = SqliteCatalog::new(pool.clone());

        let album = catalog.get_or_create_album_for_path("A").await.unwrap();
        catalog.insert_track(&new_track("A", "song", album)).await.unwrap();
        catalog.rollback().await.unwrap();

        assert!(db::list_albums(&pool).await.unwrap().is_empty());
        assert!(db::list_tracks(&pool).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_drop_without_commit_discards_changes() {
        let (pool, _dir) = temp_db().await;
        {
            let mut catalog = SqliteCatalog::new(pool.clone());
            catalog.get_or_create_album_for_path("A").await.unwrap();
        }
        assert!(db::list_albums(&pool).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_move_track_keeps_identity() {
        let (pool, _dir) = temp_db().await;
        let mut catalog = SqliteCatalog::new(pool.clone());

        let a = catalog.get_or_create_album_for_path("A").await.unwrap();
        let id = catalog.insert_track(&new_track("A", "song", a)).await.unwrap();
        catalog.commit().await.unwrap();
        db::set_rating(&pool, id, Some(5)).await.unwrap();

        let b = catalog.get_or_create_album_for_path("B").await.unwrap();
        let to = MediaLocation::new("B", "renamed", ".mp3");
        catalog.move_track(id, &to, b, None).await.unwrap();
        catalog.commit().await.unwrap();

        let track = db::get_track(&pool, id).await.unwrap().unwrap();
        assert_eq!(track.location, to);
        assert_eq!(track.album_id, Some(b));
        assert_eq!(track.rating, Some(5));
        assert_eq!(track.file_size, Some(1024));
    }

    #[tokio::test]
    async fn test_nan_duration_stored_as_null() {
        let (pool, _dir) = temp_db().await;
        let mut catalog = SqliteCatalog::new(pool.clone());

        let album = catalog.get_or_create_album_for_path("").await.unwrap();
        let track = NewTrack {
            duration: f64::NAN,
            ..new_track("", "broken", album)
        };
        catalog.insert_track(&track).await.unwrap();

        let listed = catalog.list_tracks().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].duration.is_nan());
        catalog.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_clear_removes_everything() {
        let (pool, _dir) = temp_db().await;
        let mut catalog = SqliteCatalog::new(pool.clone());

        let album = catalog.get_or_create_album_for_path("A/B").await.unwrap();
        let id = catalog.insert_track(&new_track("A/B", "song", album)).await.unwrap();
        catalog
            .insert_cover(&MediaLocation::new("A/B", "cover", ".jpg"), album)
            .await
            .unwrap();
        catalog.commit().await.unwrap();
        let tag = db::create_tag(&pool, "fav", None, None).await.unwrap();
        db::add_tag(&pool, id, tag).await.unwrap();

        catalog.clear().await.unwrap();
        catalog.commit().await.unwrap();

        assert!(db::list_tracks(&pool).await.unwrap().is_empty());
        assert!(db::list_albums(&pool).await.unwrap().is_empty());
        assert!(catalog.list_covers().await.unwrap().is_empty());
        // Tags themselves survive a clear
        assert_eq!(db::list_tags(&pool).await.unwrap().len(), 1);
    }
}
