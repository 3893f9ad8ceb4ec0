//! Core data models for the music catalog.
//!
//! Defines the primary entities: [`Track`], [`Album`], [`Cover`] and [`Tag`].
//! Records are plain values; resolving a record to an absolute path is the
//! job of whoever owns the library base directory
//! (see [`crate::instance::LibraryInstance`]).
//!
//! # Folder paths
//!
//! Every entity stores its directory as a posix-style path relative to the
//! library root, without leading or trailing slash. The root directory itself
//! is the empty string `""`.

use std::collections::HashMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// Database ID of a track.
pub type TrackId = i64;
/// Database ID of an album.
pub type AlbumId = i64;
/// Database ID of a cover.
pub type CoverId = i64;
/// Database ID of a tag.
pub type TagId = i64;

/// SHA-256 digest of a file's bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash(pub [u8; 32]);

impl ContentHash {
    /// Rebuild a hash from a stored blob. Returns `None` for blobs of the wrong size.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        <[u8; 32]>::try_from(bytes).ok().map(Self)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Where a file lives inside the library: `folder / (name + extension)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MediaLocation {
    /// Relative directory (`""` for the root)
    pub folder: String,
    /// File stem
    pub name: String,
    /// Extension including the leading dot
    pub extension: String,
}

impl MediaLocation {
    pub fn new(
        folder: impl Into<String>,
        name: impl Into<String>,
        extension: impl Into<String>,
    ) -> Self {
        Self {
            folder: folder.into(),
            name: name.into(),
            extension: extension.into(),
        }
    }

    /// Build a location from a path relative to the library root.
    ///
    /// Returns `None` for paths that are not valid UTF-8, have no extension,
    /// or contain anything other than plain components.
    pub fn from_relative(rel: &Path) -> Option<Self> {
        let name = rel.file_stem()?.to_str()?;
        let extension = rel.extension()?.to_str()?;
        let folder = match rel.parent() {
            Some(parent) => folder_of(parent)?,
            None => String::new(),
        };
        Some(Self::new(folder, name, format!(".{}", extension)))
    }

    /// `name + extension`
    pub fn file_name(&self) -> String {
        format!("{}{}", self.name, self.extension)
    }

    /// Path relative to the library root.
    pub fn relative_path(&self) -> PathBuf {
        let mut path = PathBuf::new();
        if !self.folder.is_empty() {
            path.push(&self.folder);
        }
        path.push(self.file_name());
        path
    }

    /// Absolute path under `base_dir`.
    pub fn resolve(&self, base_dir: &Path) -> PathBuf {
        base_dir.join(self.relative_path())
    }
}

impl fmt::Display for MediaLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.folder.is_empty() {
            write!(f, "{}", self.file_name())
        } else {
            write!(f, "{}/{}", self.folder, self.file_name())
        }
    }
}

/// Convert a relative directory path to the posix folder form.
///
/// Returns `None` for non-UTF-8 names and for `..`, root or prefix components.
pub fn folder_of(rel_dir: &Path) -> Option<String> {
    let mut segments = Vec::new();
    for component in rel_dir.components() {
        match component {
            Component::Normal(segment) => segments.push(segment.to_str()?),
            Component::CurDir => {}
            _ => return None,
        }
    }
    Some(segments.join("/"))
}

/// Parent folder of `folder`; the root has none.
pub fn parent_folder(folder: &str) -> Option<&str> {
    if folder.is_empty() {
        return None;
    }
    Some(folder.rsplit_once('/').map(|(parent, _)| parent).unwrap_or(""))
}

/// Number of path segments (`""` is 0).
pub fn folder_depth(folder: &str) -> usize {
    if folder.is_empty() {
        0
    } else {
        folder.split('/').count()
    }
}

/// `folder` followed by each of its ancestors, ending with the root `""`.
pub fn folder_ancestors(folder: &str) -> impl Iterator<Item = &str> {
    std::iter::successors(Some(folder), |f| parent_folder(*f))
}

/// Last segment of `folder`.
pub fn folder_name(folder: &str) -> &str {
    folder.rsplit('/').next().unwrap_or("")
}

/// An album: one directory of the library tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Album {
    /// Database ID (auto-generated)
    pub id: AlbumId,
    /// Relative directory path (unique)
    pub folder: String,
    /// Album of the parent directory; `None` only for the root
    pub parent_id: Option<AlbumId>,
}

impl Album {
    /// Last path segment of the folder.
    pub fn name(&self) -> &str {
        folder_name(&self.folder)
    }
}

/// A track (audio file) in the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    /// Database ID (auto-generated)
    pub id: TrackId,
    pub location: MediaLocation,
    /// Duration in seconds, NaN when probing failed
    pub duration: f64,
    pub file_hash: Option<ContentHash>,
    pub file_size: Option<u64>,
    /// 0-5 stars
    pub rating: Option<u8>,
    pub listenings: u32,
    /// Owning album; only legacy rows lack one
    pub album_id: Option<AlbumId>,
}

/// A cover image sitting directly inside an album directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cover {
    pub id: CoverId,
    pub location: MediaLocation,
    pub album_id: AlbumId,
}

/// A user tag. Tags form their own tree through `parent_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub id: TagId,
    pub name: String,
    pub color: Option<[u8; 3]>,
    pub parent_id: Option<TagId>,
}

/// In-memory album hierarchy built from the flat album table.
///
/// Albums are stored once, keyed by id; parent/child links are ids only.
#[derive(Debug, Default)]
pub struct AlbumTree {
    albums: HashMap<AlbumId, Album>,
    children: HashMap<Option<AlbumId>, Vec<AlbumId>>,
}

impl AlbumTree {
    pub fn new(albums: Vec<Album>) -> Self {
        let mut children: HashMap<Option<AlbumId>, Vec<AlbumId>> = HashMap::new();
        for album in &albums {
            children.entry(album.parent_id).or_default().push(album.id);
        }
        let albums: HashMap<_, _> = albums.into_iter().map(|a| (a.id, a)).collect();
        for ids in children.values_mut() {
            ids.sort_by(|a, b| albums[a].folder.cmp(&albums[b].folder));
        }
        Self { albums, children }
    }

    pub fn get(&self, id: AlbumId) -> Option<&Album> {
        self.albums.get(&id)
    }

    pub fn len(&self) -> usize {
        self.albums.len()
    }

    pub fn is_empty(&self) -> bool {
        self.albums.is_empty()
    }

    /// Albums without a parent.
    pub fn roots(&self) -> impl Iterator<Item = &Album> {
        self.children_of(None)
    }

    /// Direct children, sorted by folder.
    pub fn children(&self, id: AlbumId) -> impl Iterator<Item = &Album> {
        self.children_of(Some(id))
    }

    fn children_of(&self, parent: Option<AlbumId>) -> impl Iterator<Item = &Album> {
        self.children
            .get(&parent)
            .into_iter()
            .flatten()
            .filter_map(|id| self.albums.get(id))
    }

    /// `id` and every album below it, in depth-first pre-order.
    pub fn self_and_descendants(&self, id: AlbumId) -> Vec<AlbumId> {
        let mut out = Vec::new();
        if !self.albums.contains_key(&id) {
            return out;
        }
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            out.push(current);
            if let Some(kids) = self.children.get(&Some(current)) {
                stack.extend(kids.iter().rev());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn album(id: AlbumId, folder: &str, parent_id: Option<AlbumId>) -> Album {
        Album {
            id,
            folder: folder.to_string(),
            parent_id,
        }
    }

    #[test]
    fn test_location_from_relative() {
        let loc = MediaLocation::from_relative(Path::new("Live/2020/01 Intro.flac")).unwrap();
        assert_eq!(loc.folder, "Live/2020");
        assert_eq!(loc.name, "01 Intro");
        assert_eq!(loc.extension, ".flac");
        assert_eq!(loc.relative_path(), PathBuf::from("Live/2020/01 Intro.flac"));
    }

    #[test]
    fn test_location_at_root() {
        let loc = MediaLocation::from_relative(Path::new("song.mp3")).unwrap();
        assert_eq!(loc.folder, "");
        assert_eq!(loc.relative_path(), PathBuf::from("song.mp3"));
        assert_eq!(loc.to_string(), "song.mp3");
    }

    #[test]
    fn test_location_keeps_inner_dots_in_name() {
        let loc = MediaLocation::from_relative(Path::new("A/v1.2 mix.ogg")).unwrap();
        assert_eq!(loc.name, "v1.2 mix");
        assert_eq!(loc.extension, ".ogg");
    }

    #[test]
    fn test_location_without_extension_is_rejected() {
        assert!(MediaLocation::from_relative(Path::new("A/README")).is_none());
    }

    #[test]
    fn test_folder_helpers() {
        assert_eq!(parent_folder(""), None);
        assert_eq!(parent_folder("A"), Some(""));
        assert_eq!(parent_folder("A/B/C"), Some("A/B"));
        assert_eq!(folder_depth(""), 0);
        assert_eq!(folder_depth("A/B"), 2);
        assert_eq!(folder_name("A/B"), "B");
        assert_eq!(folder_name(""), "");
        let ancestors: Vec<_> = folder_ancestors("A/B").collect();
        assert_eq!(ancestors, vec!["A/B", "A", ""]);
    }

    #[test]
    fn test_content_hash_display_is_hex() {
        let hash = ContentHash([0xab; 32]);
        let hex = hash.to_string();
        assert_eq!(hex.len(), 64);
        assert!(hex.starts_with("abab"));
        assert_eq!(ContentHash::from_slice(hash.as_bytes()), Some(hash));
        assert_eq!(ContentHash::from_slice(&[1, 2, 3]), None);
    }

    #[test]
    fn test_album_tree_traversal() {
        let tree = AlbumTree::new(vec![
            album(1, "", None),
            album(2, "Live", Some(1)),
            album(3, "Live/2020", Some(2)),
            album(4, "Live/2021", Some(2)),
            album(5, "Studio", Some(1)),
        ]);

        assert_eq!(tree.roots().map(|a| a.id).collect::<Vec<_>>(), vec![1]);
        assert_eq!(tree.children(2).map(|a| a.name()).collect::<Vec<_>>(), vec!["2020", "2021"]);
        assert_eq!(tree.self_and_descendants(2), vec![2, 3, 4]);
        assert_eq!(tree.self_and_descendants(1).len(), 5);
        assert!(tree.self_and_descendants(99).is_empty());
    }
}
