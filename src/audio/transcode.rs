//! Container conversion through an external ffmpeg binary.

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::process::Command;

/// Output containers the service can produce.
pub const OUTPUT_FORMATS: &[&str] = &["wav", "mp3", "flac", "ogg"];

/// Whether `format` is one of [`OUTPUT_FORMATS`] (case-insensitive)
pub fn is_output_format(format: &str) -> bool {
    OUTPUT_FORMATS
        .iter()
        .any(|f| f.eq_ignore_ascii_case(format))
}

/// Transcodes audio files by shelling out to ffmpeg.
#[derive(Debug, Clone)]
pub struct Transcoder {
    ffmpeg_path: String,
}

impl Transcoder {
    pub fn new(ffmpeg_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }

    pub fn ffmpeg_path(&self) -> &str {
        &self.ffmpeg_path
    }

    /// Check that the configured ffmpeg can be started.
    pub fn is_available(&self) -> bool {
        Command::new(&self.ffmpeg_path)
            .arg("-version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    /// Convert `input` into the container implied by `output`'s extension.
    ///
    /// Channel count and sample rate are preserved.
    pub fn convert(&self, input: &Path, output: &Path) -> Result<()> {
        let mut cmd = Command::new(&self.ffmpeg_path);
        cmd.arg("-y")
            .arg("-hide_banner")
            .arg("-loglevel")
            .arg("error")
            .arg("-i")
            .arg(input);

        match output.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("mp3") => {
                cmd.arg("-codec:a").arg("libmp3lame");
            }
            Some(ext) if ext.eq_ignore_ascii_case("ogg") => {
                cmd.arg("-codec:a").arg("libvorbis");
            }
            _ => {}
        }

        let result = cmd
            .arg(output)
            .output()
            .with_context(|| format!("failed to run {}", self.ffmpeg_path))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            bail!("ffmpeg failed: {}", stderr.trim());
        }
        Ok(())
    }
}

impl Default for Transcoder {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}
