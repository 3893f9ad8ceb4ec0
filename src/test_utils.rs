//! Test utilities and fixtures for music-mirror tests.
//!
//! Provides temp databases, file fixtures and hand-written mocks of the
//! collaborator traits ([`MetadataProbe`], [`Transcoder`], [`ExportPrompt`]).
//!
//! # Example
//!
//! ```ignore
//! use crate::test_utils::{temp_db, write_file, FixedProbe};
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let (pool, _dir) = temp_db().await;
//!     // ... test logic
//! }
//! ```

use sqlx::sqlite::SqlitePool;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::TempDir;

use crate::error::{Error, Result};
use crate::export::{ExportPrompt, ExportStage, ExportSummary, FileAction, Transcoder};
use crate::metadata::MetadataProbe;
use crate::model::TrackId;

/// Creates a temporary database for testing.
///
/// The database is created in a temporary directory that is automatically
/// cleaned up when the returned `TempDir` is dropped. Migrations are run
/// automatically.
///
/// Keep the TempDir alive for the duration of your test.
pub async fn temp_db() -> (SqlitePool, TempDir) {
    let dir = tempfile::tempdir().expect("Failed to create temp directory");
    let db_url = crate::db::db_url(&dir.path().join("test.db"));

    let pool = crate::db::init_db(&db_url)
        .await
        .expect("Failed to initialize test database");

    (pool, dir)
}

/// Write `bytes` to `root/rel`, creating parent directories.
pub fn write_file(root: &Path, rel: &str, bytes: &[u8]) -> PathBuf {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("Failed to create fixture directory");
    }
    fs::write(&path, bytes).expect("Failed to write fixture file");
    path
}

/// Insert a bare track row (no album) and return its id.
pub async fn insert_track_at(
    pool: &SqlitePool,
    folder: &str,
    name: &str,
    extension: &str,
    duration: f64,
) -> TrackId {
    sqlx::query("INSERT INTO tracks (folder, name, extension, duration) VALUES (?, ?, ?, ?)")
        .bind(folder)
        .bind(name)
        .bind(extension)
        .bind((!duration.is_nan()).then_some(duration))
        .execute(pool)
        .await
        .expect("Failed to insert test track")
        .last_insert_rowid()
}

/// Probe that reports the same duration for every file.
#[derive(Debug, Clone, Copy)]
pub struct FixedProbe(pub f64);

impl MetadataProbe for FixedProbe {
    fn probe_duration(&self, _path: &Path) -> Result<f64> {
        Ok(self.0)
    }
}

/// Probe that fails for every file.
#[derive(Debug, Clone, Copy)]
pub struct FailingProbe;

impl MetadataProbe for FailingProbe {
    fn probe_duration(&self, path: &Path) -> Result<f64> {
        Err(Error::metadata(path, "unreadable"))
    }
}

/// Transcoder that records calls and writes a placeholder output file.
#[derive(Debug, Default)]
pub struct RecordingTranscoder {
    calls: Mutex<Vec<(PathBuf, PathBuf)>>,
    failure: Option<String>,
}

impl RecordingTranscoder {
    /// A transcoder whose every call fails with `message`.
    pub fn failing(message: &str) -> Self {
        Self {
            calls: Mutex::default(),
            failure: Some(message.to_string()),
        }
    }

    pub fn calls(&self) -> Vec<(PathBuf, PathBuf)> {
        self.calls.lock().unwrap().clone()
    }
}

impl Transcoder for RecordingTranscoder {
    fn transcode(&self, src: &Path, dst: &Path) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push((src.to_path_buf(), dst.to_path_buf()));
        if let Some(message) = &self.failure {
            return Err(Error::transcode(src, message.clone()));
        }
        fs::write(dst, b"transcoded")?;
        Ok(())
    }
}

/// Prompt with canned answers that records what it was asked.
///
/// Answers `true` once the script runs out.
#[derive(Debug, Default)]
pub struct ScriptedPrompt {
    answers: VecDeque<bool>,
    pub asked: Vec<ExportStage>,
    pub summaries: Vec<ExportSummary>,
    pub events: Vec<(FileAction, PathBuf)>,
}

impl ScriptedPrompt {
    pub fn answering(answers: impl IntoIterator<Item = bool>) -> Self {
        Self {
            answers: answers.into_iter().collect(),
            ..Default::default()
        }
    }
}

impl ExportPrompt for ScriptedPrompt {
    fn confirm(&mut self, stage: ExportStage, summary: &ExportSummary) -> bool {
        self.asked.push(stage);
        self.summaries.push(*summary);
        self.answers.pop_front().unwrap_or(true)
    }

    fn on_file(&mut self, action: FileAction, path: &Path) {
        self.events.push((action, path.to_path_buf()));
    }
}
