//! Format conversion for exported files.

use std::ffi::OsString;
use std::fs;
use std::path::Path;
use std::process::Command;
use tracing::debug;

use crate::error::{Error, Result};

/// Converts one audio file into the format implied by `dst`'s extension.
pub trait Transcoder: Send + Sync {
    /// Write a converted copy of `src` to `dst`. `src` is never modified.
    fn transcode(&self, src: &Path, dst: &Path) -> Result<()>;
}

/// Transcoder that runs `ffmpeg`.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    program: String,
}

impl FfmpegTranscoder {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Command-line arguments for converting `src` into `dst`.
    ///
    /// The audio stream is copied as-is unless the source is Opus, which
    /// has to be re-encoded to fit an MP4 container.
    fn args(src: &Path, dst: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-nostdin".into(), "-i".into(), src.into()];
        let is_opus = src
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("opus"));
        if !is_opus {
            args.extend(["-c:a".into(), "copy".into()]);
        }
        args.push(dst.into());
        args
    }
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl Transcoder for FfmpegTranscoder {
    fn transcode(&self, src: &Path, dst: &Path) -> Result<()> {
        debug!(target: "export", src = %src.display(), dst = %dst.display(), "Running {}", self.program);

        let output = Command::new(&self.program)
            .args(Self::args(src, dst))
            .output()
            .map_err(|e| Error::transcode(src, format!("Failed to run {}: {}", self.program, e)))?;

        if !output.status.success() {
            // Don't leave a truncated file that a later run would skip
            let _ = fs::remove_file(dst);
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::transcode(src, stderr.trim().to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args_of(src: &str, dst: &str) -> Vec<String> {
        FfmpegTranscoder::args(Path::new(src), Path::new(dst))
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_stream_copy_for_mp4() {
        assert_eq!(
            args_of("/music/a.mp4", "/out/a.m4a"),
            vec!["-nostdin", "-i", "/music/a.mp4", "-c:a", "copy", "/out/a.m4a"]
        );
    }

    #[test]
    fn test_opus_is_reencoded() {
        assert_eq!(
            args_of("/music/a.OPUS", "/out/a.m4a"),
            vec!["-nostdin", "-i", "/music/a.OPUS", "/out/a.m4a"]
        );
    }

    #[test]
    fn test_missing_binary_is_transcode_error() {
        let dir = tempfile::tempdir().unwrap();
        let transcoder = FfmpegTranscoder::new("/nonexistent/bin/ffmpeg");
        let result = transcoder.transcode(&dir.path().join("a.opus"), &dir.path().join("a.m4a"));
        assert!(matches!(result, Err(Error::Transcode { .. })));
    }
}
