//! Filesystem side of a library sync.
//!
//! Walks the library root and partitions every regular file (or link to
//! one) into audio, cover art and ignored files. Covers only count when they
//! sit in an album directory, i.e. a directory that (directly or through
//! subdirectories) contains audio.

mod hash;

pub use hash::hash_file;

use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{Result, ResultExt};
use crate::model::{MediaLocation, folder_ancestors};
use crate::path_policy::{FileKind, classify};

/// Everything a scan found under the library root, as relative locations.
#[derive(Debug, Default, Clone)]
pub struct LibraryScan {
    pub audio: BTreeSet<MediaLocation>,
    pub covers: BTreeSet<MediaLocation>,
    /// Every directory that has audio in it or below it, the root included
    pub album_folders: BTreeSet<String>,
    /// Files that are neither audio nor cover art
    pub ignored: usize,
}

/// Recursively scan `base_dir`.
///
/// Unreadable directories abort the scan: silently skipping them would make
/// their tracks look deleted.
pub fn scan_tree(base_dir: &Path) -> Result<LibraryScan> {
    let mut scan = LibraryScan::default();
    let mut images = Vec::new();

    for entry in WalkDir::new(base_dir).min_depth(1) {
        let entry = entry
            .map_err(std::io::Error::from)
            .with_context(format!("Failed to scan {}", base_dir.display()))?;
        if entry.path_is_symlink() {
            // Links to files count as files; directory links are not followed
            if !entry.path().is_file() {
                warn!(target: "scanner", path = %entry.path().display(), "Skipping symlink that does not point to a file");
                scan.ignored += 1;
                continue;
            }
        } else if !entry.file_type().is_file() {
            continue;
        }

        let kind = classify(entry.path());
        if kind == FileKind::Ignored {
            scan.ignored += 1;
            continue;
        }

        let location = entry
            .path()
            .strip_prefix(base_dir)
            .ok()
            .and_then(MediaLocation::from_relative);
        let Some(location) = location else {
            warn!(target: "scanner", path = %entry.path().display(), "Skipping file with non UTF-8 path");
            scan.ignored += 1;
            continue;
        };

        match kind {
            FileKind::Audio => {
                for folder in folder_ancestors(&location.folder) {
                    scan.album_folders.insert(folder.to_string());
                }
                scan.audio.insert(location);
            }
            FileKind::Cover => images.push(location),
            FileKind::Ignored => {}
        }
    }

    for image in images {
        if scan.album_folders.contains(&image.folder) {
            scan.covers.insert(image);
        } else {
            scan.ignored += 1;
        }
    }

    debug!(
        target: "scanner",
        audio = scan.audio.len(),
        covers = scan.covers.len(),
        albums = scan.album_folders.len(),
        ignored = scan.ignored,
        "Scan finished"
    );
    Ok(scan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::write_file;
    use tempfile::tempdir;

    #[test]
    fn test_scan_partitions_files() {
        let dir = tempdir().unwrap();
        let root = dir.path();

        write_file(root, "song.mp3", b"a");
        write_file(root, "Album/01.flac", b"b");
        write_file(root, "Album/cover.jpg", b"c");
        write_file(root, "Album/notes.txt", b"d");
        write_file(root, "Album/Disc 2/02.OGG", b"e");
        write_file(root, "Scans/booklet.png", b"f"); // no audio here or below

        let scan = scan_tree(root).unwrap();

        let audio: Vec<String> = scan.audio.iter().map(|l| l.to_string()).collect();
        assert_eq!(audio, vec!["song.mp3", "Album/01.flac", "Album/Disc 2/02.OGG"]);

        let covers: Vec<String> = scan.covers.iter().map(|l| l.to_string()).collect();
        assert_eq!(covers, vec!["Album/cover.jpg"]);

        let albums: Vec<&str> = scan.album_folders.iter().map(|s| s.as_str()).collect();
        assert_eq!(albums, vec!["", "Album", "Album/Disc 2"]);

        assert_eq!(scan.ignored, 2);
    }

    #[test]
    fn test_cover_in_parent_of_album_counts() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "Artist/folder.png", b"x");
        write_file(dir.path(), "Artist/Record/01.mp3", b"y");

        let scan = scan_tree(dir.path()).unwrap();
        assert_eq!(scan.covers.len(), 1);
        assert!(scan.album_folders.contains("Artist"));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_files_are_scanned() {
        let dir = tempdir().unwrap();
        let elsewhere = tempdir().unwrap();
        let real = write_file(elsewhere.path(), "real.mp3", b"linked");
        write_file(dir.path(), "Album/01.mp3", b"local");
        std::os::unix::fs::symlink(&real, dir.path().join("Album/02.mp3")).unwrap();
        std::os::unix::fs::symlink(elsewhere.path().join("missing.mp3"), dir.path().join("Album/03.mp3"))
            .unwrap();

        let scan = scan_tree(dir.path()).unwrap();

        let audio: Vec<String> = scan.audio.iter().map(|l| l.to_string()).collect();
        assert_eq!(audio, vec!["Album/01.mp3", "Album/02.mp3"]);
        assert_eq!(scan.ignored, 1);
    }

    #[test]
    fn test_scan_empty_library() {
        let dir = tempdir().unwrap();
        let scan = scan_tree(dir.path()).unwrap();
        assert!(scan.audio.is_empty());
        assert!(scan.album_folders.is_empty());
    }

    #[test]
    fn test_scan_missing_root_is_error() {
        assert!(scan_tree(Path::new("/nonexistent/library/root")).is_err());
    }
}
