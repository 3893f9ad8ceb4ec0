//! Export command.

use std::io::{self, BufRead, Write};
use std::path::Path;
use tokio::runtime::Runtime;

use super::{remember_library, resolve_library};
use crate::config::Config;
use crate::db;
use crate::error::Result;
use crate::export::{
    self, ExportOutcome, ExportPrompt, ExportStage, ExportSummary, FfmpegTranscoder, FileAction,
};
use crate::instance::LibraryInstance;
use crate::model::Track;

/// Mirror the library into `target`
pub fn cmd_export(
    rt: &Runtime,
    config: &Config,
    library: Option<&Path>,
    target: &Path,
    exclude: &[String],
    yes: bool,
) -> anyhow::Result<()> {
    let instance = resolve_library(library, config)?;
    let tracks = rt.block_on(load_tracks(&instance))?;

    let mut excluded = config.export.exclude.clone();
    excluded.extend(exclude.iter().cloned());

    println!("Exporting library to {}", target.display());
    if !excluded.is_empty() {
        println!("Excluding: {}", excluded.join(", "));
    }

    let transcoder = FfmpegTranscoder::new(config.tools.ffmpeg.clone());
    let mut prompt = TerminalPrompt { assume_yes: yes };
    let outcome = export::plan_and_apply(
        &tracks,
        instance.base_dir(),
        target,
        &excluded,
        &mut prompt,
        &transcoder,
    )?;

    match outcome {
        ExportOutcome::UpToDate => println!("Target is already up to date."),
        ExportOutcome::Cancelled(stage) => println!("Cancelled before the {} stage.", stage),
        ExportOutcome::Completed(stats) => println!(
            "\nCompleted: {} removed, {} copied, {} transcoded, {} skipped",
            stats.removed, stats.copied, stats.transcoded, stats.skipped
        ),
    }
    remember_library(config, &instance);
    Ok(())
}

async fn load_tracks(instance: &LibraryInstance) -> Result<Vec<Track>> {
    let pool = instance.connect().await?;
    let tracks = db::list_tracks(&pool).await;
    pool.close().await;
    tracks
}

/// Asks on stdin before each export stage unless `--yes` was given.
struct TerminalPrompt {
    assume_yes: bool,
}

impl ExportPrompt for TerminalPrompt {
    fn confirm(&mut self, stage: ExportStage, summary: &ExportSummary) -> bool {
        match stage {
            ExportStage::Remove => println!(
                "{} path(s) on target, {} wanted, {} to remove",
                summary.existing, summary.targeted, summary.remove
            ),
            ExportStage::Add => println!(
                "{} file(s) to add, {} of them transcoded",
                summary.add, summary.transcode
            ),
        }
        if self.assume_yes {
            return true;
        }

        print!("Continue? [y/N] ");
        if io::stdout().flush().is_err() {
            return false;
        }
        let mut answer = String::new();
        if io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    }

    fn on_file(&mut self, action: FileAction, path: &Path) {
        let label = match action {
            FileAction::Removed => "REMOVED",
            FileAction::Copied => "COPIED",
            FileAction::Transcoded => "TRANSCODED",
            FileAction::Skipped => "SKIPPED",
        };
        println!("{}: {}", label, path.display());
    }
}
