//! Multi-format audio decoding.
//!
//! WAV goes through hound; everything else (MP3, FLAC, OGG/Vorbis) through
//! symphonia. Both paths produce interleaved f32 samples in \[-1, 1\].

use anyhow::{anyhow, bail, Context, Result};
use std::fs::File;
use std::path::Path;

use hound::{SampleFormat, WavReader};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::AudioBuffer;

/// Fully decoded audio stream, channels interleaved.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl DecodedAudio {
    /// Frames per channel
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Downmix to mono by averaging channels
    pub fn into_mono(self) -> AudioBuffer {
        let channels = self.channels.max(1) as usize;
        let samples = if channels > 1 {
            self.samples
                .chunks(channels)
                .map(|chunk| chunk.iter().sum::<f32>() / chunk.len() as f32)
                .collect()
        } else {
            self.samples
        };
        AudioBuffer::new(samples, self.sample_rate)
    }
}

/// Decode a whole audio file, picking the decoder from the extension.
pub fn decode_file<P: AsRef<Path>>(path: P) -> Result<DecodedAudio> {
    let path = path.as_ref();
    let is_wav = path
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("wav"));

    let decoded = if is_wav {
        decode_wav(path)?
    } else {
        decode_with_symphonia(path)?
    };

    if decoded.frames() == 0 {
        bail!("no audio frames decoded from {}", path.display());
    }
    Ok(decoded)
}

/// Duration of a written audio file, measured by decoding it.
pub fn probe_duration<P: AsRef<Path>>(path: P) -> Result<f64> {
    let path = path.as_ref();
    if path
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("wav"))
    {
        let reader = WavReader::open(path)
            .with_context(|| format!("Failed to open WAV file: {}", path.display()))?;
        let spec = reader.spec();
        return Ok(reader.duration() as f64 / spec.sample_rate as f64);
    }
    Ok(decode_with_symphonia(path)?.duration())
}

fn decode_wav(path: &Path) -> Result<DecodedAudio> {
    let reader = WavReader::open(path)
        .with_context(|| format!("Failed to open WAV file: {}", path.display()))?;

    let spec = reader.spec();
    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read WAV samples")?,
        SampleFormat::Int => {
            let max_val = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<Result<Vec<_>, _>>()
                .context("Failed to read WAV samples")?
        }
    };

    Ok(DecodedAudio {
        samples,
        sample_rate: spec.sample_rate,
        channels: spec.channels,
    })
}

fn decode_with_symphonia(path: &Path) -> Result<DecodedAudio> {
    let src =
        File::open(path).with_context(|| format!("Failed to open audio file: {}", path.display()))?;
    let mss = MediaSourceStream::new(Box::new(src), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .with_context(|| format!("Unsupported audio format: {}", path.display()))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| anyhow!("No supported audio tracks found in {}", path.display()))?;

    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate;
    let mut channels = track.codec_params.channels.map(|c| c.count() as u16);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .context("Unsupported codec")?;

    let mut all_samples: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(anyhow!("Error reading packet: {e}")),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate.get_or_insert(spec.rate);
                channels.get_or_insert(spec.channels.count() as u16);

                let buf = sample_buf.get_or_insert_with(|| {
                    SampleBuffer::new(decoded.capacity() as u64, spec)
                });
                buf.copy_interleaved_ref(decoded);
                all_samples.extend_from_slice(buf.samples());
            }
            // Corrupt packets are skipped; a stream with nothing decodable
            // is rejected by the frame count check in `decode_file`.
            Err(SymphoniaError::DecodeError(e)) => {
                tracing::debug!("skipping undecodable packet in {}: {e}", path.display());
            }
            Err(e) => return Err(anyhow!("Decode error: {e}")),
        }
    }

    let sample_rate = sample_rate.ok_or_else(|| anyhow!("Unknown sample rate"))?;
    Ok(DecodedAudio {
        samples: all_samples,
        sample_rate,
        channels: channels.unwrap_or(1),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_stereo_wav(path: &Path, frames: usize, sample_rate: u32) {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for _ in 0..frames {
            writer.write_sample(16384i16).unwrap();
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_decode_stereo_wav() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        write_stereo_wav(&path, 8000, 16000);

        let decoded = decode_file(&path).unwrap();
        assert_eq!(decoded.channels, 2);
        assert_eq!(decoded.sample_rate, 16000);
        assert_eq!(decoded.frames(), 8000);
        assert!((decoded.duration() - 0.5).abs() < 1e-9);

        let mono = decoded.into_mono();
        assert_eq!(mono.len(), 8000);
        assert!((mono.samples[0] - 0.25).abs() < 1e-4);
    }

    #[test]
    fn test_decode_float_wav() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("float.WAV");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for i in 0..800 {
            writer.write_sample(i as f32 / 800.0).unwrap();
        }
        writer.finalize().unwrap();

        let decoded = decode_file(&path).unwrap();
        assert_eq!(decoded.channels, 1);
        assert_eq!(decoded.frames(), 800);
    }

    #[test]
    fn test_probe_duration_wav() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        write_stereo_wav(&path, 24000, 16000);
        let duration = probe_duration(&path).unwrap();
        assert!((duration - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_empty_wav_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.wav");
        write_stereo_wav(&path, 0, 16000);
        assert!(decode_file(&path).is_err());
    }

    #[test]
    fn test_garbage_is_rejected() {
        let dir = tempdir().unwrap();
        for name in ["junk.wav", "junk.mp3", "junk.flac"] {
            let path = dir.path().join(name);
            std::fs::write(&path, b"definitely not audio").unwrap();
            assert!(decode_file(&path).is_err(), "{name} should fail");
        }
    }

    #[test]
    fn test_missing_file() {
        assert!(decode_file("/nonexistent/path/to/file.flac").is_err());
    }
}
