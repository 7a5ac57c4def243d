//! Audio resampling using rubato
//!
//! Converts mono buffers between sample rates. The output is trimmed of the
//! resampler's startup delay and cut to `round(len * ratio)` samples, so a
//! resampled clip keeps its duration.

use anyhow::{Context, Result};
use rubato::{
    FastFixedIn, PolynomialDegree, Resampler as RubatoResampler, SincFixedIn,
    SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use super::AudioBuffer;

const CHUNK_SIZE: usize = 1024;

/// Resampling quality preset
#[derive(Debug, Clone, Copy, Default)]
pub enum ResampleQuality {
    /// Fast resampling, lower quality
    Fast,
    /// Balanced speed and quality
    #[default]
    Normal,
    /// High quality, slower
    High,
}

/// Audio resampler
pub struct Resampler {
    quality: ResampleQuality,
}

impl Resampler {
    /// Create a new resampler
    pub fn new(quality: ResampleQuality) -> Self {
        Self { quality }
    }

    /// Resample audio to a target sample rate
    pub fn resample(&self, audio: &AudioBuffer, target_rate: u32) -> Result<AudioBuffer> {
        if audio.sample_rate == target_rate {
            return Ok(audio.clone());
        }
        if audio.is_empty() {
            return Ok(AudioBuffer::new(Vec::new(), target_rate));
        }

        let ratio = target_rate as f64 / audio.sample_rate as f64;

        let output = if matches!(self.quality, ResampleQuality::Fast) {
            let mut resampler =
                FastFixedIn::<f32>::new(ratio, 1.0, PolynomialDegree::Cubic, CHUNK_SIZE, 1)
                    .context("Failed to create fast resampler")?;
            process_chunks(&mut resampler, &audio.samples, ratio)?
        } else {
            let mut resampler = SincFixedIn::<f32>::new(
                ratio,
                1.0,
                self.sinc_parameters(),
                CHUNK_SIZE,
                1, // mono
            )
            .context("Failed to create sinc resampler")?;
            process_chunks(&mut resampler, &audio.samples, ratio)?
        };

        Ok(AudioBuffer::new(output, target_rate))
    }

    fn sinc_parameters(&self) -> SincInterpolationParameters {
        let high = matches!(self.quality, ResampleQuality::High);
        SincInterpolationParameters {
            sinc_len: if high { 256 } else { 128 },
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: if high { 256 } else { 128 },
            window: WindowFunction::BlackmanHarris2,
        }
    }
}

impl Default for Resampler {
    fn default() -> Self {
        Self::new(ResampleQuality::Normal)
    }
}

/// Feed samples through the resampler in fixed-size chunks, then flush its
/// internal delay line.
fn process_chunks<R: RubatoResampler<f32>>(
    resampler: &mut R,
    samples: &[f32],
    ratio: f64,
) -> Result<Vec<f32>> {
    let delay = resampler.output_delay();
    let expected = (samples.len() as f64 * ratio).round() as usize;
    let mut output = Vec::with_capacity(expected + delay);

    let mut chunks = samples.chunks_exact(CHUNK_SIZE);
    for chunk in chunks.by_ref() {
        let result = resampler
            .process(&[chunk], None)
            .context("Resampling failed")?;
        output.extend_from_slice(&result[0]);
    }

    let remainder = chunks.remainder();
    if !remainder.is_empty() {
        let result = resampler
            .process_partial(Some(&[remainder][..]), None)
            .context("Resampling failed")?;
        output.extend_from_slice(&result[0]);
    }

    while output.len() < expected + delay {
        let result = resampler
            .process_partial(None::<&[&[f32]]>, None)
            .context("Resampling flush failed")?;
        if result[0].is_empty() {
            break;
        }
        output.extend_from_slice(&result[0]);
    }

    output.drain(..delay.min(output.len()));
    output.truncate(expected);
    Ok(output)
}

/// Convenience function to resample audio
pub fn resample(audio: &AudioBuffer, target_rate: u32) -> Result<AudioBuffer> {
    Resampler::default().resample(audio, target_rate)
}
