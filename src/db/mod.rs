//! Database module: schema setup and read-side library queries.
//!
//! Uses SQLx with SQLite for lightweight, embedded storage. The write path
//! used by library sync lives in [`crate::catalog::SqliteCatalog`]; this
//! module holds the connection setup, row mapping and the browsing
//! operations (search, ratings, tags, album subtrees).
//!
//! # Example
//!
//! ```ignore
//! use music_mirror::db::{init_db, search_tracks, SortOrder};
//!
//! let pool = init_db("sqlite:catalog.sqlite3").await?;
//! let tracks = search_tracks(&pool, "live", SortOrder::Rating).await?;
//! ```

use sqlx::migrate::MigrateDatabase;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::error::{Error, Result};
use crate::model::{
    Album, AlbumId, ContentHash, Cover, MediaLocation, Tag, TagId, Track, TrackId,
};

/// Catalog file created by a new library.
pub const DEFAULT_DB_NAME: &str = "catalog.sqlite3";

/// Build a SQLite database URL from a file path.
pub fn db_url(path: &std::path::Path) -> String {
    format!("sqlite:{}", path.display())
}

/// Initialize the database connection pool and run migrations.
///
/// Creates the database file if it doesn't exist, establishes a connection
/// pool with up to 5 connections, and runs all pending migrations.
///
/// # Errors
///
/// Returns an error if:
/// - Database creation fails
/// - Connection cannot be established
/// - Migration fails
pub async fn init_db(db_url: &str) -> Result<SqlitePool> {
    if !sqlx::Sqlite::database_exists(db_url).await.unwrap_or(false) {
        sqlx::Sqlite::create_database(db_url).await?;
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

// ============================================================================
// Row Types
// ============================================================================

pub(crate) const TRACK_COLUMNS: &str =
    "id, folder, name, extension, duration, file_hash, file_size, rating, listenings, album_id";

/// Database row for the tracks table.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct TrackRow {
    id: i64,
    folder: String,
    name: String,
    extension: String,
    duration: Option<f64>,
    file_hash: Option<Vec<u8>>,
    file_size: Option<i64>,
    rating: Option<i64>,
    listenings: i64,
    album_id: Option<i64>,
}

impl From<TrackRow> for Track {
    fn from(row: TrackRow) -> Self {
        Track {
            id: row.id,
            location: MediaLocation::new(row.folder, row.name, row.extension),
            // SQLite stores NaN as NULL
            duration: row.duration.unwrap_or(f64::NAN),
            file_hash: row.file_hash.as_deref().and_then(ContentHash::from_slice),
            file_size: row.file_size.and_then(|s| u64::try_from(s).ok()),
            rating: row.rating.and_then(|r| u8::try_from(r).ok()),
            listenings: u32::try_from(row.listenings).unwrap_or(0),
            album_id: row.album_id,
        }
    }
}

/// Database row for the albums table.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct AlbumRow {
    id: i64,
    folder: String,
    parent_id: Option<i64>,
}

impl From<AlbumRow> for Album {
    fn from(row: AlbumRow) -> Self {
        Album {
            id: row.id,
            folder: row.folder,
            parent_id: row.parent_id,
        }
    }
}

/// Database row for the covers table.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct CoverRow {
    id: i64,
    folder: String,
    name: String,
    extension: String,
    album_id: i64,
}

impl From<CoverRow> for Cover {
    fn from(row: CoverRow) -> Self {
        Cover {
            id: row.id,
            location: MediaLocation::new(row.folder, row.name, row.extension),
            album_id: row.album_id,
        }
    }
}

/// Database row for the tags table.
#[derive(Debug, sqlx::FromRow)]
struct TagRow {
    id: i64,
    name: String,
    color: Option<Vec<u8>>,
    parent_id: Option<i64>,
}

impl From<TagRow> for Tag {
    fn from(row: TagRow) -> Self {
        Tag {
            id: row.id,
            name: row.name,
            color: row.color.and_then(|c| <[u8; 3]>::try_from(c.as_slice()).ok()),
            parent_id: row.parent_id,
        }
    }
}

// ============================================================================
// Track Queries
// ============================================================================

/// Ordering for track listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    /// Folder, then file name
    #[default]
    Alphabetical,
    /// Total time listened (listenings × duration), then rating
    MostPlayed,
    /// Highest rated first, unrated last
    Rating,
    /// Longest first
    Duration,
}

impl SortOrder {
    fn order_by(self) -> &'static str {
        match self {
            SortOrder::Alphabetical => "folder, name",
            SortOrder::MostPlayed => {
                "listenings * COALESCE(duration, 0) DESC, rating IS NULL, rating DESC, folder, name"
            }
            SortOrder::Rating => "rating IS NULL, rating DESC, folder, name",
            SortOrder::Duration => "duration IS NULL, duration DESC, folder, name",
        }
    }
}

impl std::str::FromStr for SortOrder {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "alphabetical" | "name" => Ok(SortOrder::Alphabetical),
            "most-played" | "played" => Ok(SortOrder::MostPlayed),
            "rating" => Ok(SortOrder::Rating),
            "duration" => Ok(SortOrder::Duration),
            other => Err(Error::config(format!("Unknown sort order: {}", other))),
        }
    }
}

fn like_pattern(query: &str) -> String {
    let escaped = query
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

/// Get all tracks from the database, alphabetically.
pub async fn list_tracks(pool: &SqlitePool) -> Result<Vec<Track>> {
    search_tracks(pool, "", SortOrder::Alphabetical).await
}

/// Find tracks whose name, folder or any tag name contains `query`
/// (case-insensitive for ASCII).
pub async fn search_tracks(pool: &SqlitePool, query: &str, order: SortOrder) -> Result<Vec<Track>> {
    let pattern = like_pattern(query);
    let sql = format!(
        r#"
        SELECT {TRACK_COLUMNS} FROM tracks t
        WHERE t.name LIKE ? ESCAPE '\'
           OR t.folder LIKE ? ESCAPE '\'
           OR EXISTS (
               SELECT 1 FROM track_tags tt
               JOIN tags g ON g.id = tt.tag_id
               WHERE tt.track_id = t.id AND g.name LIKE ? ESCAPE '\'
           )
        ORDER BY {}
        "#,
        order.order_by()
    );

    let rows = sqlx::query_as::<_, TrackRow>(&sql)
        .bind(&pattern)
        .bind(&pattern)
        .bind(&pattern)
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(Track::from).collect())
}

/// Get a track by its database ID.
pub async fn get_track(pool: &SqlitePool, track_id: TrackId) -> Result<Option<Track>> {
    let sql = format!("SELECT {TRACK_COLUMNS} FROM tracks WHERE id = ?");
    let row = sqlx::query_as::<_, TrackRow>(&sql)
        .bind(track_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(Track::from))
}

/// Set or clear a track's rating.
///
/// Returns `false` when no track has that id.
pub async fn set_rating(pool: &SqlitePool, track_id: TrackId, rating: Option<i64>) -> Result<bool> {
    if let Some(r) = rating
        && !(0..=5).contains(&r)
    {
        return Err(Error::InvalidRating(r));
    }

    let result = sqlx::query("UPDATE tracks SET rating = ? WHERE id = ?")
        .bind(rating)
        .bind(track_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Count one more listening of a track.
pub async fn record_listening(pool: &SqlitePool, track_id: TrackId) -> Result<bool> {
    let result = sqlx::query("UPDATE tracks SET listenings = listenings + 1 WHERE id = ?")
        .bind(track_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

// ============================================================================
// Tags
// ============================================================================

/// Create a tag and return its id.
pub async fn create_tag(
    pool: &SqlitePool,
    name: &str,
    color: Option<[u8; 3]>,
    parent_id: Option<TagId>,
) -> Result<TagId> {
    let result = sqlx::query("INSERT INTO tags (name, color, parent_id) VALUES (?, ?, ?)")
        .bind(name)
        .bind(color.map(|c| c.to_vec()))
        .bind(parent_id)
        .execute(pool)
        .await?;
    Ok(result.last_insert_rowid())
}

/// All tags, ordered by name.
pub async fn list_tags(pool: &SqlitePool) -> Result<Vec<Tag>> {
    let rows = sqlx::query_as::<_, TagRow>("SELECT id, name, color, parent_id FROM tags ORDER BY name")
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(Tag::from).collect())
}

/// Tags attached to one track, ordered by name.
pub async fn tags_for_track(pool: &SqlitePool, track_id: TrackId) -> Result<Vec<Tag>> {
    let rows = sqlx::query_as::<_, TagRow>(
        r#"
        SELECT g.id, g.name, g.color, g.parent_id
        FROM tags g
        JOIN track_tags tt ON tt.tag_id = g.id
        WHERE tt.track_id = ?
        ORDER BY g.name
        "#,
    )
    .bind(track_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(Tag::from).collect())
}

/// Attach a tag to a track. Attaching twice is a no-op.
pub async fn add_tag(pool: &SqlitePool, track_id: TrackId, tag_id: TagId) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO track_tags (track_id, tag_id) VALUES (?, ?)")
        .bind(track_id)
        .bind(tag_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Detach a tag from a track.
pub async fn remove_tag(pool: &SqlitePool, track_id: TrackId, tag_id: TagId) -> Result<bool> {
    let result = sqlx::query("DELETE FROM track_tags WHERE track_id = ? AND tag_id = ?")
        .bind(track_id)
        .bind(tag_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

// ============================================================================
// Album Browsing
// ============================================================================

/// All albums, ordered by folder.
pub async fn list_albums(pool: &SqlitePool) -> Result<Vec<Album>> {
    let rows = sqlx::query_as::<_, AlbumRow>("SELECT id, folder, parent_id FROM albums ORDER BY folder")
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(Album::from).collect())
}

/// Look up the album of a folder.
pub async fn get_album_by_folder(pool: &SqlitePool, folder: &str) -> Result<Option<Album>> {
    let row = sqlx::query_as::<_, AlbumRow>("SELECT id, folder, parent_id FROM albums WHERE folder = ?")
        .bind(folder)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(Album::from))
}

/// Direct children of an album (or the parentless albums for `None`).
pub async fn album_children(pool: &SqlitePool, parent_id: Option<AlbumId>) -> Result<Vec<Album>> {
    let rows = sqlx::query_as::<_, AlbumRow>(
        "SELECT id, folder, parent_id FROM albums WHERE parent_id IS ? ORDER BY folder",
    )
    .bind(parent_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(Album::from).collect())
}

/// Tracks sitting directly in an album, ordered by name.
pub async fn album_tracks(pool: &SqlitePool, album_id: AlbumId) -> Result<Vec<Track>> {
    let sql = format!("SELECT {TRACK_COLUMNS} FROM tracks WHERE album_id = ? ORDER BY name");
    let rows = sqlx::query_as::<_, TrackRow>(&sql)
        .bind(album_id)
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(Track::from).collect())
}

const SUBTREE_CTE: &str = r#"
    WITH RECURSIVE subtree(id) AS (
        SELECT id FROM albums WHERE id = ?
        UNION ALL
        SELECT a.id FROM albums a JOIN subtree s ON a.parent_id = s.id
    )
"#;

/// Ids of an album and every album below it.
pub async fn album_self_and_descendants(pool: &SqlitePool, album_id: AlbumId) -> Result<Vec<AlbumId>> {
    let sql = format!("{SUBTREE_CTE} SELECT id FROM subtree");
    let rows: Vec<(i64,)> = sqlx::query_as(&sql).bind(album_id).fetch_all(pool).await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Number of tracks anywhere in an album's subtree.
pub async fn subtree_track_count(pool: &SqlitePool, album_id: AlbumId) -> Result<i64> {
    let sql = format!("{SUBTREE_CTE} SELECT COUNT(*) FROM tracks WHERE album_id IN (SELECT id FROM subtree)");
    let (count,): (i64,) = sqlx::query_as(&sql).bind(album_id).fetch_one(pool).await?;
    Ok(count)
}

/// Covers anywhere in an album's subtree, ordered by location.
pub async fn subtree_covers(pool: &SqlitePool, album_id: AlbumId) -> Result<Vec<Cover>> {
    let sql = format!(
        "{SUBTREE_CTE} SELECT id, folder, name, extension, album_id FROM covers \
         WHERE album_id IN (SELECT id FROM subtree) ORDER BY folder, name, extension"
    );
    let rows = sqlx::query_as::<_, CoverRow>(&sql)
        .bind(album_id)
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(Cover::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{insert_track_at, temp_db};

    #[tokio::test]
    async fn test_init_db_creates_database() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let pool = init_db(&db_url(&db_path)).await.expect("Failed to init db");
        assert!(db_path.exists());

        let tracks = list_tracks(&pool).await.expect("Failed to query tracks");
        assert!(tracks.is_empty());
    }

    #[tokio::test]
    async fn test_nan_duration_roundtrip() {
        let (pool, _dir) = temp_db().await;
        let id = insert_track_at(&pool, "A", "song", ".mp3", f64::NAN).await;

        let track = get_track(&pool, id).await.unwrap().unwrap();
        assert!(track.duration.is_nan());
        assert_eq!(track.location.folder, "A");
    }

    #[tokio::test]
    async fn test_search_matches_name_folder_and_tag() {
        let (pool, _dir) = temp_db().await;
        let a = insert_track_at(&pool, "Live/2020", "Opener", ".flac", 200.0).await;
        let b = insert_track_at(&pool, "Studio", "Ballad", ".mp3", 180.0).await;
        let _c = insert_track_at(&pool, "Studio", "Closer", ".mp3", 240.0).await;

        let by_folder = search_tracks(&pool, "live", SortOrder::Alphabetical).await.unwrap();
        assert_eq!(by_folder.iter().map(|t| t.id).collect::<Vec<_>>(), vec![a]);

        let by_name = search_tracks(&pool, "BALL", SortOrder::Alphabetical).await.unwrap();
        assert_eq!(by_name.iter().map(|t| t.id).collect::<Vec<_>>(), vec![b]);

        let tag = create_tag(&pool, "chill", Some([10, 20, 30]), None).await.unwrap();
        add_tag(&pool, a, tag).await.unwrap();
        add_tag(&pool, a, tag).await.unwrap();
        let by_tag = search_tracks(&pool, "chi", SortOrder::Alphabetical).await.unwrap();
        assert_eq!(by_tag.iter().map(|t| t.id).collect::<Vec<_>>(), vec![a]);

        let tags = tags_for_track(&pool, a).await.unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].color, Some([10, 20, 30]));

        assert!(remove_tag(&pool, a, tag).await.unwrap());
        assert!(tags_for_track(&pool, a).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_escapes_wildcards() {
        let (pool, _dir) = temp_db().await;
        insert_track_at(&pool, "A", "100% Pure", ".mp3", 1.0).await;
        insert_track_at(&pool, "A", "1000 Pure", ".mp3", 1.0).await;

        let found = search_tracks(&pool, "100%", SortOrder::Alphabetical).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].location.name, "100% Pure");
    }

    #[tokio::test]
    async fn test_sort_orders() {
        let (pool, _dir) = temp_db().await;
        let short = insert_track_at(&pool, "A", "a", ".mp3", 60.0).await;
        let long = insert_track_at(&pool, "A", "b", ".mp3", 600.0).await;
        let unrated = insert_track_at(&pool, "A", "c", ".mp3", 120.0).await;

        set_rating(&pool, short, Some(5)).await.unwrap();
        set_rating(&pool, long, Some(2)).await.unwrap();
        for _ in 0..3 {
            record_listening(&pool, short).await.unwrap();
        }
        record_listening(&pool, long).await.unwrap();

        let ids = |tracks: Vec<Track>| tracks.into_iter().map(|t| t.id).collect::<Vec<_>>();

        let by_rating = search_tracks(&pool, "", SortOrder::Rating).await.unwrap();
        assert_eq!(ids(by_rating), vec![short, long, unrated]);

        let by_duration = search_tracks(&pool, "", SortOrder::Duration).await.unwrap();
        assert_eq!(ids(by_duration), vec![long, unrated, short]);

        // 1 × 600s beats 3 × 60s
        let most_played = search_tracks(&pool, "", SortOrder::MostPlayed).await.unwrap();
        assert_eq!(ids(most_played), vec![long, short, unrated]);
    }

    #[tokio::test]
    async fn test_set_rating_validates_range() {
        let (pool, _dir) = temp_db().await;
        let id = insert_track_at(&pool, "", "song", ".mp3", 1.0).await;

        assert!(matches!(set_rating(&pool, id, Some(6)).await, Err(Error::InvalidRating(6))));
        assert!(set_rating(&pool, id, Some(4)).await.unwrap());
        assert_eq!(get_track(&pool, id).await.unwrap().unwrap().rating, Some(4));
        assert!(set_rating(&pool, id, None).await.unwrap());
        assert_eq!(get_track(&pool, id).await.unwrap().unwrap().rating, None);
        assert!(!set_rating(&pool, 9999, Some(1)).await.unwrap());
    }

    #[tokio::test]
    async fn test_album_subtree_queries() {
        use crate::catalog::{CatalogStore, NewTrack, SqliteCatalog};

        let (pool, _dir) = temp_db().await;
        let mut catalog = SqliteCatalog::new(pool.clone());
        let live_2020 = catalog.get_or_create_album_for_path("Live/2020").await.unwrap();
        let studio = catalog.get_or_create_album_for_path("Studio").await.unwrap();
        for (album_id, folder, name) in [(live_2020, "Live/2020", "b"), (live_2020, "Live/2020", "a"), (studio, "Studio", "c")] {
            let track = NewTrack {
                location: MediaLocation::new(folder, name, ".mp3"),
                duration: 1.0,
                file_hash: None,
                file_size: None,
                album_id,
            };
            catalog.insert_track(&track).await.unwrap();
        }
        catalog
            .insert_cover(&MediaLocation::new("Live/2020", "cover", ".jpg"), live_2020)
            .await
            .unwrap();
        catalog.commit().await.unwrap();

        let root = get_album_by_folder(&pool, "").await.unwrap().unwrap();
        let live = get_album_by_folder(&pool, "Live").await.unwrap().unwrap();

        let top: Vec<String> = album_children(&pool, Some(root.id))
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.folder)
            .collect();
        assert_eq!(top, vec!["Live", "Studio"]);
        assert_eq!(album_children(&pool, None).await.unwrap(), vec![root.clone()]);

        let mut subtree = album_self_and_descendants(&pool, live.id).await.unwrap();
        subtree.sort();
        assert_eq!(subtree, vec![live.id, live_2020]);

        assert_eq!(subtree_track_count(&pool, live.id).await.unwrap(), 2);
        assert_eq!(subtree_track_count(&pool, root.id).await.unwrap(), 3);
        assert_eq!(subtree_covers(&pool, root.id).await.unwrap().len(), 1);
        assert!(subtree_covers(&pool, studio).await.unwrap().is_empty());

        assert!(album_tracks(&pool, live.id).await.unwrap().is_empty());
        let names: Vec<String> = album_tracks(&pool, live_2020)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.location.name)
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_sort_order_from_str() {
        assert_eq!("rating".parse::<SortOrder>().unwrap(), SortOrder::Rating);
        assert_eq!("Most-Played".parse::<SortOrder>().unwrap(), SortOrder::MostPlayed);
        assert!("random".parse::<SortOrder>().is_err());
    }
}
