//! Browsing, rating and tagging commands.

use std::path::Path;
use tokio::runtime::Runtime;

use super::resolve_library;
use crate::config::Config;
use crate::db::{self, SortOrder};
use crate::error::{Error, Result};
use crate::instance::LibraryInstance;
use crate::model::{AlbumTree, TrackId, folder_depth};

/// List tracks, optionally filtered by a search query
pub fn cmd_list(
    rt: &Runtime,
    config: &Config,
    library: Option<&Path>,
    query: Option<&str>,
    sort: &str,
) -> anyhow::Result<()> {
    let instance = resolve_library(library, config)?;
    let order: SortOrder = sort.parse()?;

    let tracks = rt.block_on(async {
        let pool = instance.connect().await?;
        db::search_tracks(&pool, query.unwrap_or(""), order).await
    })?;

    for track in &tracks {
        let rating = track.rating.map(|r| format!("{}/5", r)).unwrap_or_else(|| "-".into());
        println!(
            "{:>6}  {:>4}  {:>8}  {}",
            track.id,
            rating,
            format_duration(track.duration),
            track.location
        );
    }
    println!("\n{} track(s)", tracks.len());
    Ok(())
}

/// Print the album tree, or one album's sub-albums, tracks and covers
pub fn cmd_albums(
    rt: &Runtime,
    config: &Config,
    library: Option<&Path>,
    folder: Option<&str>,
) -> anyhow::Result<()> {
    let instance = resolve_library(library, config)?;

    let lines = match folder {
        Some(folder) => rt.block_on(album_contents(&instance, folder.trim_matches('/')))?,
        None => rt.block_on(album_lines(&instance))?,
    };
    if lines.is_empty() {
        println!("No albums. Run `music-mirror sync` first.");
    }
    for line in lines {
        println!("{}", line);
    }
    Ok(())
}

async fn album_contents(instance: &LibraryInstance, folder: &str) -> Result<Vec<String>> {
    let pool = instance.connect().await?;
    let album = db::get_album_by_folder(&pool, folder)
        .await?
        .ok_or_else(|| Error::config(format!("No album at '{}'", folder)))?;

    let nested = db::album_self_and_descendants(&pool, album.id).await?.len().saturating_sub(1);
    let total = db::subtree_track_count(&pool, album.id).await?;
    let title = if album.folder.is_empty() { "." } else { album.name() };
    let mut lines = vec![format!("{}: {} track(s), {} nested album(s)", title, total, nested)];
    for child in db::album_children(&pool, Some(album.id)).await? {
        let count = db::subtree_track_count(&pool, child.id).await?;
        lines.push(format!("[{}] ({})", child.name(), count));
    }
    for track in db::album_tracks(&pool, album.id).await? {
        let tags: Vec<String> = db::tags_for_track(&pool, track.id)
            .await?
            .into_iter()
            .map(|t| t.name)
            .collect();
        let mut line = format!("{:>6}  {:>8}  {}", track.id, format_duration(track.duration), track.location.file_name());
        if !tags.is_empty() {
            line.push_str(&format!("  [{}]", tags.join(", ")));
        }
        lines.push(line);
    }
    for cover in db::subtree_covers(&pool, album.id).await? {
        lines.push(format!("cover: {}", instance.path_of(&cover.location).display()));
    }
    Ok(lines)
}

async fn album_lines(instance: &LibraryInstance) -> Result<Vec<String>> {
    let pool = instance.connect().await?;
    let tree = AlbumTree::new(db::list_albums(&pool).await?);

    let mut lines = Vec::with_capacity(tree.len());
    for root in tree.roots() {
        for id in tree.self_and_descendants(root.id) {
            let Some(album) = tree.get(id) else { continue };
            let count = db::subtree_track_count(&pool, id).await?;
            let name = if album.folder.is_empty() { "." } else { album.name() };
            lines.push(format!("{}{} ({})", "  ".repeat(folder_depth(&album.folder)), name, count));
        }
    }
    Ok(lines)
}

/// Set or clear a track's rating
pub fn cmd_rate(
    rt: &Runtime,
    config: &Config,
    library: Option<&Path>,
    track_id: TrackId,
    rating: Option<i64>,
) -> anyhow::Result<()> {
    let instance = resolve_library(library, config)?;
    let found = rt.block_on(async {
        let pool = instance.connect().await?;
        db::set_rating(&pool, track_id, rating).await
    })?;

    if !found {
        anyhow::bail!("No track with id {}", track_id);
    }
    match rating {
        Some(r) => println!("Rated track {} {}/5", track_id, r),
        None => println!("Cleared rating of track {}", track_id),
    }
    Ok(())
}

/// Count one listening of a track
pub fn cmd_listened(
    rt: &Runtime,
    config: &Config,
    library: Option<&Path>,
    track_id: TrackId,
) -> anyhow::Result<()> {
    let instance = resolve_library(library, config)?;
    let found = rt.block_on(async {
        let pool = instance.connect().await?;
        db::record_listening(&pool, track_id).await
    })?;

    if !found {
        anyhow::bail!("No track with id {}", track_id);
    }
    Ok(())
}

/// Attach a tag to a track (or detach it with `remove`)
pub fn cmd_tag(
    rt: &Runtime,
    config: &Config,
    library: Option<&Path>,
    track_id: TrackId,
    name: &str,
    color: Option<&str>,
    remove: bool,
) -> anyhow::Result<()> {
    let instance = resolve_library(library, config)?;
    let color = color.map(parse_color).transpose()?;

    rt.block_on(async {
        let pool = instance.connect().await?;
        if db::get_track(&pool, track_id).await?.is_none() {
            return Err(Error::config(format!("No track with id {}", track_id)));
        }

        let existing = db::list_tags(&pool).await?.into_iter().find(|t| t.name == name);
        match (existing, remove) {
            (Some(tag), true) => {
                db::remove_tag(&pool, track_id, tag.id).await?;
                println!("Removed tag '{}' from track {}", name, track_id);
            }
            (None, true) => println!("No tag named '{}'", name),
            (existing, false) => {
                let tag_id = match existing {
                    Some(tag) => tag.id,
                    None => db::create_tag(&pool, name, color, None).await?,
                };
                db::add_tag(&pool, track_id, tag_id).await?;
                println!("Tagged track {} with '{}'", track_id, name);
            }
        }
        Ok::<(), Error>(())
    })?;
    Ok(())
}

/// List all tags
pub fn cmd_tags(rt: &Runtime, config: &Config, library: Option<&Path>) -> anyhow::Result<()> {
    let instance = resolve_library(library, config)?;
    let tags = rt.block_on(async {
        let pool = instance.connect().await?;
        db::list_tags(&pool).await
    })?;

    for tag in tags {
        match tag.color {
            Some([r, g, b]) => println!("{:>4}  {}  #{:02x}{:02x}{:02x}", tag.id, tag.name, r, g, b),
            None => println!("{:>4}  {}", tag.id, tag.name),
        }
    }
    Ok(())
}

/// Format seconds as `m:ss`; unknown durations show as `?:??`.
fn format_duration(seconds: f64) -> String {
    if !seconds.is_finite() || seconds < 0.0 {
        return "?:??".to_string();
    }
    let total = seconds.round() as u64;
    format!("{}:{:02}", total / 60, total % 60)
}

/// Parse `#rrggbb` (the `#` is optional).
fn parse_color(s: &str) -> Result<[u8; 3]> {
    let hex = s.trim_start_matches('#');
    let invalid = || Error::config(format!("Invalid color '{}', expected #rrggbb", s));
    if hex.len() != 6 || !hex.is_ascii() {
        return Err(invalid());
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| invalid());
    Ok([channel(0)?, channel(2)?, channel(4)?])
}
