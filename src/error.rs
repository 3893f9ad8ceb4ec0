//! Application-wide error types.
//!
//! Library modules return [`Result`] with the [`Error`] enum defined here,
//! while the CLI layer uses `anyhow` for convenient error propagation.
//!
//! # Error classes
//!
//! - Transient per-file problems (a duration probe failing) are absorbed by
//!   the reconciler and only show up as [`Error::Metadata`] in logs.
//! - Configuration problems ([`Error::UnsupportedFormat`], [`Error::Hash`],
//!   [`Error::Config`]) abort the pass.
//! - External tool failures ([`Error::Transcode`]) abort the export and carry
//!   the tool's diagnostic output.
//! - [`Error::StaleSnapshot`] means the target tree changed under the export.
//! - [`Error::Database`] during a sync rolls back the whole transaction.

use std::path::PathBuf;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level application error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migration error
    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// Metadata probing error
    #[error("Metadata error for {path}: {message}")]
    Metadata { path: PathBuf, message: String },

    /// A newly discovered file could not be hashed
    #[error("Failed to hash {path}: {source}")]
    Hash {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Extension with no export mapping
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// External transcoder failed
    #[error("Transcoding failed for {path}: {message}")]
    Transcode { path: PathBuf, message: String },

    /// A path listed during export planning vanished before removal
    #[error("Expected path to exist: {0}")]
    StaleSnapshot(PathBuf),

    /// File not found
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// Rating outside 0..=5
    #[error("Invalid rating: {0} (expected 0-5)")]
    InvalidRating(i64),

    /// Another reconciliation pass holds the sync guard
    #[error("A library sync is already running")]
    SyncInProgress,

    /// A blocking worker task panicked or was cancelled
    #[error("Background task failed: {0}")]
    TaskJoin(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create a metadata error.
    pub fn metadata(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Metadata {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a hashing error.
    pub fn hash(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Hash {
            path: path.into(),
            source,
        }
    }

    /// Create a transcoding error.
    pub fn transcode(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Transcode {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a not found error.
    pub fn not_found(path: impl Into<PathBuf>) -> Self {
        Self::NotFound(path.into())
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Add context to an error.
    pub fn context(self, ctx: impl Into<String>) -> Self {
        Self::WithContext {
            context: ctx.into(),
            source: Box::new(self),
        }
    }
}

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn with_context(self, ctx: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Io(e).context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, sqlx::Error> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Database(e).context(ctx))
    }
}
