//! Voice-sample preprocessing: resample, downmix, normalize, pre-emphasis.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, error};

use crate::audio::{
    decode_file, AudioBuffer, Resampler, Transcoder, PRE_EMPHASIS_COEF, PROCESSED_SAMPLE_RATE,
};
use crate::error::{ServiceError, ServiceResult};

/// Turns an uploaded clip into a reference sample for the cloning model.
pub struct Preprocessor {
    resampler: Resampler,
    transcoder: Transcoder,
    target_rate: u32,
}

impl Preprocessor {
    pub fn new(transcoder: Transcoder) -> Self {
        Self {
            resampler: Resampler::default(),
            transcoder,
            target_rate: PROCESSED_SAMPLE_RATE,
        }
    }

    pub fn target_rate(&self) -> u32 {
        self.target_rate
    }

    /// Run the in-memory steps on already decoded mono audio.
    pub fn condition(&self, audio: &AudioBuffer) -> Result<AudioBuffer> {
        let mut audio = self.resampler.resample(audio, self.target_rate)?;
        audio.normalize();
        audio.pre_emphasis(PRE_EMPHASIS_COEF);
        // pre-emphasis can push peaks towards 2.0; rescale so the 16-bit
        // writer never clips
        audio.normalize();
        Ok(audio)
    }

    /// Process `input` into `output`. Any failure removes a partial output.
    pub fn process(&self, input: &Path, output: &Path) -> ServiceResult<PathBuf> {
        match self.run(input, output) {
            Ok(()) => Ok(output.to_path_buf()),
            Err(e) => {
                error!("Audio preprocessing failed for {}: {e:#}", input.display());
                if output.exists() {
                    let _ = std::fs::remove_file(output);
                }
                Err(ServiceError::internal(format!("Processing failed: {e:#}")))
            }
        }
    }

    fn run(&self, input: &Path, output: &Path) -> Result<()> {
        let mono = decode_file(input)?.into_mono();
        debug!(
            "preprocessing {} ({:.2}s @ {} Hz)",
            input.display(),
            mono.duration(),
            mono.sample_rate
        );
        let audio = self.condition(&mono)?;
        self.write(&audio, output)
    }

    /// Write WAV directly; other containers go through a temporary WAV.
    fn write(&self, audio: &AudioBuffer, output: &Path) -> Result<()> {
        let is_wav = output
            .extension()
            .map_or(true, |e| e.eq_ignore_ascii_case("wav"));
        if is_wav {
            return audio.save(output);
        }

        let staging = tempfile::Builder::new()
            .suffix(".wav")
            .tempfile()
            .context("failed to create temp wav")?;
        audio.save(staging.path())?;
        self.transcoder.convert(staging.path(), output)
    }
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new(Transcoder::default())
    }
}
