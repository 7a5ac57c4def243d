//! Mono sample buffers and WAV output.

use anyhow::{Context, Result};
use hound::{SampleFormat, WavSpec, WavWriter};
use std::path::Path;

/// Default pre-emphasis coefficient.
pub const PRE_EMPHASIS_COEF: f32 = 0.97;

/// Mono audio held as 32-bit floats.
///
/// Samples are nominally in \[-1.0, 1.0\]; intermediate processing steps
/// (pre-emphasis in particular) may push them past that range until the
/// buffer is normalized again.
///
/// # Example
///
/// ```rust,ignore
/// let mut audio = decode_file("sample.flac")?.into_mono();
/// audio.normalize();
/// audio.save("sample.wav")?;
/// ```
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    /// Mono audio samples
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

impl AudioBuffer {
    /// Create a new audio buffer
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Largest absolute sample value
    pub fn peak(&self) -> f32 {
        self.samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max)
    }

    /// Save to a 16-bit mono WAV file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        save_wav(path, &self.samples, self.sample_rate)
    }

    /// Scale so the peak absolute sample is exactly 1.0. Silence is left as is.
    pub fn normalize(&mut self) {
        let max_abs = self.peak();

        if max_abs > 0.0 && max_abs != 1.0 {
            for sample in &mut self.samples {
                *sample /= max_abs;
            }
        }
    }

    /// First-order high-frequency boost: `y[n] = x[n] - coef * x[n-1]`.
    ///
    /// The sample before the first one is extrapolated linearly as
    /// `2 * x[0] - x[1]`, so a ramp at the start of the clip is not turned
    /// into a click.
    pub fn pre_emphasis(&mut self, coef: f32) {
        let Some(&first) = self.samples.first() else {
            return;
        };
        let second = self.samples.get(1).copied().unwrap_or(first);
        let mut prev = 2.0 * first - second;
        for sample in &mut self.samples {
            let current = *sample;
            *sample = current - coef * prev;
            prev = current;
        }
    }
}

/// Save samples to a 16-bit mono WAV file
pub fn save_wav<P: AsRef<Path>>(path: P, samples: &[f32], sample_rate: u32) -> Result<()> {
    let path = path.as_ref();
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create WAV file: {}", path.display()))?;

    for &sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        let scaled = (clamped * 32767.0).round() as i16;
        writer.write_sample(scaled)?;
    }

    writer
        .finalize()
        .with_context(|| format!("Failed to finalize WAV file: {}", path.display()))?;
    Ok(())
}
