//! Audio duration probing.
//!
//! The reconciler only needs one fact from a new audio file: how long it is.
//! Two backends are provided:
//! - [`LoftyProbe`] reads container properties in-process with `lofty`
//! - [`FfprobeProbe`] shells out to `ffprobe`, for formats lofty can't parse
//!
//! A probe failure is never fatal for a sync; the caller stores NaN instead.

use lofty::file::AudioFile;
use lofty::probe::Probe;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use crate::config::ProbeBackend;
use crate::error::{Error, Result};

/// Reads the duration of an audio file.
///
/// Implementations must be usable from several worker threads at once.
pub trait MetadataProbe: Send + Sync {
    /// Duration in seconds.
    fn probe_duration(&self, path: &Path) -> Result<f64>;
}

/// In-process probe backed by lofty.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoftyProbe;

impl MetadataProbe for LoftyProbe {
    fn probe_duration(&self, path: &Path) -> Result<f64> {
        let tagged_file = Probe::open(path)
            .and_then(|p| p.read())
            .map_err(|e| Error::metadata(path, e.to_string()))?;
        Ok(tagged_file.properties().duration().as_secs_f64())
    }
}

/// Probe that runs `ffprobe` and parses its JSON output.
#[derive(Debug, Clone)]
pub struct FfprobeProbe {
    program: String,
}

impl FfprobeProbe {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl MetadataProbe for FfprobeProbe {
    fn probe_duration(&self, path: &Path) -> Result<f64> {
        let output = Command::new(&self.program)
            .args(["-v", "quiet", "-print_format", "json", "-show_entries", "format=duration", "-i"])
            .arg(path)
            .output()
            .map_err(|e| Error::metadata(path, format!("Failed to run {}: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::metadata(
                path,
                format!("{} failed: {}", self.program, stderr.trim()),
            ));
        }

        parse_ffprobe_json(&String::from_utf8_lossy(&output.stdout))
            .ok_or_else(|| Error::metadata(path, "ffprobe reported no duration"))
    }
}

/// ffprobe JSON output structure
#[derive(serde::Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
}

#[derive(serde::Deserialize)]
struct FfprobeFormat {
    // ffprobe prints numbers as strings
    duration: Option<String>,
}

/// Parse the duration out of `ffprobe -print_format json` output.
fn parse_ffprobe_json(json: &str) -> Option<f64> {
    let parsed: FfprobeOutput = serde_json::from_str(json).ok()?;
    parsed.format.duration?.trim().parse().ok()
}

/// Build the probe selected in the configuration.
pub fn probe_for(backend: ProbeBackend, ffprobe: &str) -> Arc<dyn MetadataProbe> {
    match backend {
        ProbeBackend::Lofty => Arc::new(LoftyProbe),
        ProbeBackend::Ffprobe => Arc::new(FfprobeProbe::new(ffprobe)),
    }
}
