//! Export a filtered copy of the library to a target directory.
//!
//! The target tree is treated as a mirror: every catalog track outside the
//! excluded albums gets a sanitized path there, converted to a format
//! portable players understand. An export run computes the desired set of
//! paths, diffs it against what's on disk, removes the extras (deepest
//! first) and then copies or transcodes the missing files.
//!
//! Both mutating stages are gated by an [`ExportPrompt`], so the CLI can
//! ask before deleting anything on a device.

mod transcode;

pub use transcode::{FfmpegTranscoder, Transcoder};

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{Error, Result, ResultExt};
use crate::model::{Track, folder_ancestors};
use crate::path_policy::{export_extension, sanitize_name};

/// The two confirmation points of an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportStage {
    /// Before deleting extra paths from the target
    Remove,
    /// Before copying or transcoding missing files
    Add,
}

impl fmt::Display for ExportStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportStage::Remove => write!(f, "remove"),
            ExportStage::Add => write!(f, "add"),
        }
    }
}

/// What happened to one target path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileAction {
    Removed,
    Copied,
    Transcoded,
    /// Already present when its turn came
    Skipped,
}

/// Sizes of the pending diff, shown before each confirmation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportSummary {
    /// Paths currently under the target
    pub existing: usize,
    /// Paths the target should end up with, directories included
    pub targeted: usize,
    /// Files and directories to delete
    pub remove: usize,
    /// Files to write
    pub add: usize,
    /// Of `add`, files that need transcoding
    pub transcode: usize,
}

/// Confirmation and progress callbacks of an export run.
pub trait ExportPrompt {
    /// Return `false` to stop before `stage` mutates anything.
    fn confirm(&mut self, stage: ExportStage, summary: &ExportSummary) -> bool;

    /// Called after each target path is handled.
    fn on_file(&mut self, _action: FileAction, _path: &Path) {}
}

/// Counts of a finished export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportStats {
    pub removed: usize,
    pub copied: usize,
    pub transcoded: usize,
    pub skipped: usize,
}

/// Result of [`plan_and_apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportOutcome {
    /// Target already matched; nothing was asked or touched
    UpToDate,
    /// The user declined at this stage
    Cancelled(ExportStage),
    Completed(ExportStats),
}

/// Source of one exported file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportItem {
    pub source: PathBuf,
    /// Extension changes, so the file goes through the transcoder
    pub transcode: bool,
}

/// Desired state of the target directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportPlan {
    /// Relative export path → source file
    pub items: BTreeMap<PathBuf, ExportItem>,
    /// Every export path plus its ancestor directories
    pub desired: BTreeSet<PathBuf>,
}

/// Paths to remove from and add to the target, relative to it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportDiff {
    /// Deepest first, then by path
    pub to_remove: Vec<PathBuf>,
    pub to_add: BTreeSet<PathBuf>,
}

impl ExportDiff {
    pub fn is_empty(&self) -> bool {
        self.to_remove.is_empty() && self.to_add.is_empty()
    }
}

/// True when `folder` is an excluded album or lies inside one.
pub fn is_excluded(folder: &str, excluded: &[String]) -> bool {
    folder_ancestors(folder).any(|f| excluded.iter().any(|e| e.trim_matches('/') == f))
}

/// Relative path of a track inside the export target.
///
/// # Errors
///
/// [`Error::UnsupportedFormat`] when the extension has no export mapping.
pub fn export_name(track: &Track) -> Result<PathBuf> {
    let location = &track.location;
    let extension = export_extension(&location.extension)?;

    let mut path = PathBuf::new();
    let folder = sanitize_name(&location.folder, true);
    if !folder.is_empty() {
        path.push(folder);
    }
    path.push(format!("{}{}", sanitize_name(&location.name, false), extension));
    Ok(path)
}

/// Compute the desired target tree for `tracks`.
pub fn plan_export(tracks: &[Track], base_dir: &Path, excluded: &[String]) -> Result<ExportPlan> {
    let mut sorted: Vec<&Track> = tracks.iter().collect();
    sorted.sort_by(|a, b| a.location.cmp(&b.location));

    let mut plan = ExportPlan::default();
    for track in sorted {
        if is_excluded(&track.location.folder, excluded) {
            continue;
        }

        let name = export_name(track).with_context(format!("Cannot export {}", track.location))?;
        if let Some(existing) = plan.items.get(&name) {
            warn!(
                target: "export",
                kept = %existing.source.display(),
                dropped = %track.location,
                "Two tracks export to the same path"
            );
            continue;
        }

        for ancestor in name.ancestors().filter(|p| !p.as_os_str().is_empty()) {
            plan.desired.insert(ancestor.to_path_buf());
        }
        let transcode = export_extension(&track.location.extension)? != track.location.extension;
        plan.items.insert(
            name,
            ExportItem {
                source: track.location.resolve(base_dir),
                transcode,
            },
        );
    }
    Ok(plan)
}

/// Every file and directory under `target_dir`, relative to it.
///
/// A missing target counts as empty.
pub fn list_existing(target_dir: &Path) -> Result<BTreeSet<PathBuf>> {
    let mut existing = BTreeSet::new();
    if !target_dir.exists() {
        return Ok(existing);
    }

    for entry in WalkDir::new(target_dir).min_depth(1) {
        let entry = entry
            .map_err(std::io::Error::from)
            .with_context(format!("Failed to list {}", target_dir.display()))?;
        if let Ok(rel) = entry.path().strip_prefix(target_dir) {
            existing.insert(rel.to_path_buf());
        }
    }
    Ok(existing)
}

impl ExportPlan {
    /// Compare the desired tree with what exists on disk.
    pub fn diff(&self, existing: &BTreeSet<PathBuf>) -> ExportDiff {
        let mut to_remove: Vec<PathBuf> = existing.difference(&self.desired).cloned().collect();
        to_remove.sort_by(|a, b| {
            b.components()
                .count()
                .cmp(&a.components().count())
                .then_with(|| a.cmp(b))
        });
        let to_add = self.desired.difference(existing).cloned().collect();
        ExportDiff { to_remove, to_add }
    }

    fn summary(&self, existing: &BTreeSet<PathBuf>, diff: &ExportDiff) -> ExportSummary {
        let adding = || self.items.iter().filter(|(name, _)| diff.to_add.contains(*name));
        ExportSummary {
            existing: existing.len(),
            targeted: self.desired.len(),
            remove: diff.to_remove.len(),
            add: adding().count(),
            transcode: adding().filter(|(_, item)| item.transcode).count(),
        }
    }
}

/// Delete `to_remove` (already ordered deepest first) from `target_dir`.
fn remove_stale(target_dir: &Path, to_remove: &[PathBuf], prompt: &mut dyn ExportPrompt) -> Result<usize> {
    for rel in to_remove {
        let path = target_dir.join(rel);
        let metadata = fs::symlink_metadata(&path).map_err(|_| Error::StaleSnapshot(path.clone()))?;

        if metadata.is_dir() {
            fs::remove_dir(&path).with_context(format!("Failed to remove directory {}", path.display()))?;
        } else {
            fs::remove_file(&path).with_context(format!("Failed to remove {}", path.display()))?;
        }
        debug!(target: "export", path = %rel.display(), "Removed");
        prompt.on_file(FileAction::Removed, rel);
    }
    Ok(to_remove.len())
}

/// Copy or transcode every planned file that's in `to_add`.
fn add_missing(
    plan: &ExportPlan,
    diff: &ExportDiff,
    target_dir: &Path,
    prompt: &mut dyn ExportPrompt,
    transcoder: &dyn Transcoder,
    stats: &mut ExportStats,
) -> Result<()> {
    for (name, item) in plan.items.iter().filter(|(name, _)| diff.to_add.contains(*name)) {
        let dest = target_dir.join(name);
        if dest.exists() {
            stats.skipped += 1;
            prompt.on_file(FileAction::Skipped, name);
            continue;
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .with_context(format!("Failed to create directory {}", parent.display()))?;
        }

        let action = if item.transcode {
            transcoder.transcode(&item.source, &dest)?;
            stats.transcoded += 1;
            FileAction::Transcoded
        } else {
            fs::copy(&item.source, &dest)
                .with_context(format!("Failed to copy {} to {}", item.source.display(), dest.display()))?;
            stats.copied += 1;
            FileAction::Copied
        };
        debug!(target: "export", path = %name.display(), ?action, "Exported");
        prompt.on_file(action, name);
    }
    Ok(())
}

/// Bring `target_dir` in line with the catalog.
///
/// Nothing is asked or touched when the target already matches. Otherwise
/// the prompt confirms the removal stage and then the add stage; declining
/// either stops the run there.
///
/// # Errors
///
/// - [`Error::UnsupportedFormat`] for a track with no export mapping
/// - [`Error::StaleSnapshot`] when a listed path vanished before removal
/// - [`Error::Transcode`] when the transcoder fails (the run stops)
pub fn plan_and_apply(
    tracks: &[Track],
    base_dir: &Path,
    target_dir: &Path,
    excluded: &[String],
    prompt: &mut dyn ExportPrompt,
    transcoder: &dyn Transcoder,
) -> Result<ExportOutcome> {
    let plan = plan_export(tracks, base_dir, excluded)?;
    let existing = list_existing(target_dir)?;
    let diff = plan.diff(&existing);

    if diff.is_empty() {
        info!(target: "export", target = %target_dir.display(), "Export target is up to date");
        return Ok(ExportOutcome::UpToDate);
    }

    let summary = plan.summary(&existing, &diff);
    info!(
        target: "export",
        existing = summary.existing,
        targeted = summary.targeted,
        remove = summary.remove,
        add = summary.add,
        transcode = summary.transcode,
        "Export plan ready"
    );

    if !prompt.confirm(ExportStage::Remove, &summary) {
        return Ok(ExportOutcome::Cancelled(ExportStage::Remove));
    }
    let mut stats = ExportStats {
        removed: remove_stale(target_dir, &diff.to_remove, prompt)?,
        ..Default::default()
    };

    if !prompt.confirm(ExportStage::Add, &summary) {
        return Ok(ExportOutcome::Cancelled(ExportStage::Add));
    }
    add_missing(&plan, &diff, target_dir, prompt, transcoder, &mut stats)?;

    info!(
        target: "export",
        removed = stats.removed,
        copied = stats.copied,
        transcoded = stats.transcoded,
        skipped = stats.skipped,
        "Export finished"
    );
    Ok(ExportOutcome::Completed(stats))
}
