//! A library directory and the catalog that belongs to it.
//!
//! A library is any directory holding a `music-mirror.toml` marker:
//!
//! ```toml
//! version = 1
//! database = "catalog.sqlite3"
//! ```
//!
//! The database path is relative to the library directory. Catalog records
//! only store library-relative locations; [`LibraryInstance::path_of`] is
//! the one place they become absolute paths.

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::db;
use crate::error::{Error, Result, ResultExt};
use crate::model::MediaLocation;

/// Name of the marker file in the library root.
pub const INSTANCE_FILE: &str = "music-mirror.toml";

const INSTANCE_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct InstanceFile {
    version: u32,
    database: PathBuf,
}

/// An opened library.
#[derive(Debug, Clone)]
pub struct LibraryInstance {
    base_dir: PathBuf,
    database: PathBuf,
}

impl LibraryInstance {
    /// Turn `base_dir` into a library, creating the directory, the marker
    /// file and the catalog schema.
    pub async fn init(base_dir: &Path) -> Result<Self> {
        fs::create_dir_all(base_dir)
            .with_context(format!("Failed to create {}", base_dir.display()))?;
        let base_dir = fs::canonicalize(base_dir)?;

        let marker = base_dir.join(INSTANCE_FILE);
        if marker.exists() {
            return Err(Error::config(format!(
                "{} is already a library",
                base_dir.display()
            )));
        }

        let file = InstanceFile {
            version: INSTANCE_VERSION,
            database: PathBuf::from(db::DEFAULT_DB_NAME),
        };
        let contents = toml::to_string_pretty(&file)
            .map_err(|e| Error::config(format!("Failed to serialize {}: {}", INSTANCE_FILE, e)))?;
        fs::write(&marker, contents).with_context(format!("Failed to write {}", marker.display()))?;

        let instance = Self {
            database: base_dir.join(&file.database),
            base_dir,
        };
        instance.connect().await?.close().await;

        info!(base_dir = %instance.base_dir.display(), "Initialized library");
        Ok(instance)
    }

    /// Open an existing library.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] without a marker file, [`Error::Config`] for an
    /// unreadable marker or an unknown version.
    pub fn open(base_dir: &Path) -> Result<Self> {
        let marker = base_dir.join(INSTANCE_FILE);
        if !marker.exists() {
            return Err(Error::not_found(marker));
        }

        let contents = fs::read_to_string(&marker)?;
        let file: InstanceFile = toml::from_str(&contents)
            .map_err(|e| Error::config(format!("Invalid {}: {}", marker.display(), e)))?;
        if file.version != INSTANCE_VERSION {
            return Err(Error::config(format!(
                "Unsupported library version {} in {}",
                file.version,
                marker.display()
            )));
        }

        let base_dir = fs::canonicalize(base_dir)?;
        Ok(Self {
            database: base_dir.join(file.database),
            base_dir,
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn database_path(&self) -> &Path {
        &self.database
    }

    /// Absolute path of a catalog record's file.
    pub fn path_of(&self, location: &MediaLocation) -> PathBuf {
        location.resolve(&self.base_dir)
    }

    /// Connect to the catalog, applying pending migrations.
    pub async fn connect(&self) -> Result<SqlitePool> {
        db::init_db(&db::db_url(&self.database)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_init_then_open() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("Music");

        let created = LibraryInstance::init(&base).await.unwrap();
        assert!(base.join(INSTANCE_FILE).exists());
        assert!(created.database_path().exists());

        let opened = LibraryInstance::open(&base).unwrap();
        assert_eq!(opened.base_dir(), created.base_dir());
        assert_eq!(opened.database_path(), created.database_path());

        let location = MediaLocation::new("A/B", "song", ".mp3");
        assert_eq!(opened.path_of(&location), opened.base_dir().join("A/B/song.mp3"));
    }

    #[tokio::test]
    async fn test_init_twice_fails() {
        let dir = tempdir().unwrap();
        LibraryInstance::init(dir.path()).await.unwrap();
        assert!(matches!(LibraryInstance::init(dir.path()).await, Err(Error::Config(_))));
    }

    #[test]
    fn test_open_without_marker() {
        let dir = tempdir().unwrap();
        assert!(matches!(LibraryInstance::open(dir.path()), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_open_rejects_unknown_version() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join(INSTANCE_FILE),
            "version = 2\ndatabase = \"catalog.sqlite3\"\n",
        )
        .unwrap();
        assert!(matches!(LibraryInstance::open(dir.path()), Err(Error::Config(_))));
    }
}
