//! Filename safety and format selection rules.
//!
//! Pure functions shared by the reconciler (which file types are library
//! content) and the export planner (how names and containers are mapped onto
//! a FAT/Windows-friendly target).

use crate::error::{Error, Result};
use std::path::Path;

/// Audio/video containers picked up by a library scan.
pub const AUDIO_EXTENSIONS: &[&str] = &[".mp3", ".wav", ".flac", ".ogg", ".opus", ".m4a", ".mp4"];

/// Image files recognised as album covers.
pub const COVER_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png"];

/// Containers the export target plays as-is.
const PASS_THROUGH_EXTENSIONS: &[&str] = &[
    ".mp2", ".mp3", ".wav", ".wma", ".m4a", ".m4b", ".aac", ".ogg", ".flac", ".mka",
];

/// Containers the export target can't play; they are converted to `.m4a`.
const FORCED_M4A_EXTENSIONS: &[&str] = &[".opus", ".mp4"];

/// Kind of file found during a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Audio,
    Cover,
    Ignored,
}

/// Classify a path by its extension (case-insensitive).
pub fn classify(path: &Path) -> FileKind {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return FileKind::Ignored;
    };
    let ext = format!(".{}", ext.to_ascii_lowercase());
    if AUDIO_EXTENSIONS.contains(&ext.as_str()) {
        FileKind::Audio
    } else if COVER_EXTENSIONS.contains(&ext.as_str()) {
        FileKind::Cover
    } else {
        FileKind::Ignored
    }
}

fn is_forbidden(c: char) -> bool {
    matches!(c, '<' | '>' | ':' | '"' | '\\' | '|' | '?' | '*') || ('\0'..='\x1f').contains(&c)
}

/// Replace characters that FAT/NTFS refuse with `_`.
///
/// With `strip_trailing_dot`, trailing `.` characters are removed as well;
/// Windows silently drops them from directory names.
pub fn sanitize_name(name: &str, strip_trailing_dot: bool) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| if is_forbidden(c) { '_' } else { c })
        .collect();
    if strip_trailing_dot {
        sanitized.trim_end_matches('.').to_string()
    } else {
        sanitized
    }
}

/// Extension a file with `source_ext` gets on the export target.
///
/// Pass-through containers keep the source spelling, so only a real change of
/// container (compared byte for byte) triggers a transcode.
pub fn export_extension(source_ext: &str) -> Result<&str> {
    let lower = source_ext.to_ascii_lowercase();
    if PASS_THROUGH_EXTENSIONS.contains(&lower.as_str()) {
        Ok(source_ext)
    } else if FORCED_M4A_EXTENSIONS.contains(&lower.as_str()) {
        Ok(".m4a")
    } else {
        Err(Error::UnsupportedFormat(source_ext.to_string()))
    }
}
